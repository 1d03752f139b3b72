//! Scanner event types

/// A single parsed attribute, entity-decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

/// Events produced by the tag scanner.
///
/// Text content is passed through verbatim; entity decoding of text is the
/// consumer's call, so raw accumulation stays byte-boundary invariant.
#[derive(Debug, Clone, PartialEq)]
pub enum TagEvent {
    Open { name: String, attrs: Vec<Attribute> },
    Close { name: String },
    Text(String),
}

impl TagEvent {
    /// Attribute lookup on an `Open` event.
    pub fn attr(&self, name: &str) -> Option<&str> {
        match self {
            TagEvent::Open { attrs, .. } => attrs
                .iter()
                .find(|a| a.name == name)
                .map(|a| a.value.as_str()),
            _ => None,
        }
    }
}

/// Attribute lookup on a raw attribute list.
pub fn find_attr<'a>(attrs: &'a [Attribute], name: &str) -> Option<&'a str> {
    attrs.iter().find(|a| a.name == name).map(|a| a.value.as_str())
}
