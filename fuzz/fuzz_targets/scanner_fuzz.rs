//! Fuzz test for the GASP tag scanner
//!
//! Feeds arbitrary byte sequences, split at an arbitrary point, to find:
//! - Panics or crashes
//! - Infinite loops
//! - Broken resumability across chunk boundaries
//!
//! Run with: cargo +nightly fuzz run scanner_fuzz -- -max_total_time=60

#![no_main]

use gasp_parser::scanner::{TagEvent, TagScanner};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut scanner = TagScanner::new(
        Some(vec!["Root".to_string()]),
        gasp_parser::ParserConfig::default().ignored_tags,
    );

    // Split the input at a data-derived point; consuming in two chunks must
    // never panic regardless of where the boundary lands.
    let cut = data.first().map(|b| *b as usize % (data.len())).unwrap_or(0);
    let mut events = scanner.consume(&data[..cut]);
    events.extend(scanner.consume(&data[cut..]));

    // Basic invariants that should always hold:
    for event in &events {
        match event {
            TagEvent::Open { name, .. } | TagEvent::Close { name } => {
                assert!(!name.is_empty(), "tag events always carry a name");
            }
            TagEvent::Text(_) => {}
        }
    }
});
