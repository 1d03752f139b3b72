//! Per-parser configuration

use once_cell::sync::Lazy;
use std::collections::BTreeSet;

/// Tag names elided from event emission unless the host overrides them.
pub static DEFAULT_IGNORED_TAGS: Lazy<BTreeSet<String>> = Lazy::new(|| {
    ["think", "thinking", "system", "thought"]
        .iter()
        .map(|s| s.to_string())
        .collect()
});

/// Default cap on accumulated primitive text, in bytes.
pub const DEFAULT_TEXT_BUDGET: usize = 64 * 1024 * 1024;

/// Configuration for a single parser instance. There is no global state;
/// every knob is per parser.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Tag names treated as transparent (see the ignored-tag rule).
    pub ignored_tags: BTreeSet<String>,
    /// Fatal cap on accumulated primitive text.
    pub max_text_bytes: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            ignored_tags: DEFAULT_IGNORED_TAGS.clone(),
            max_text_bytes: DEFAULT_TEXT_BUDGET,
        }
    }
}

impl ParserConfig {
    /// Add a tag name to the ignored set.
    pub fn ignore_tag(mut self, name: impl Into<String>) -> Self {
        self.ignored_tags.insert(name.into());
        self
    }

    /// Override the accumulated-text cap.
    pub fn text_budget(mut self, bytes: usize) -> Self {
        self.max_text_bytes = bytes;
        self
    }
}
