//! Fuzz test for the GASP streaming parser
//!
//! Drives the full scanner + stack machine pipeline with arbitrary bytes to
//! find panics, infinite loops, and accounting bugs in partial snapshots.
//!
//! Run with: cargo +nightly fuzz run parser_fuzz -- -max_total_time=60

#![no_main]

use gasp_parser::{Parser, TypeDescriptor};
use libfuzzer_sys::fuzz_target;

fn root_descriptor() -> TypeDescriptor {
    TypeDescriptor::class(
        "Root",
        vec![
            ("name", TypeDescriptor::string()),
            ("count", TypeDescriptor::int()),
            ("tags", TypeDescriptor::list(TypeDescriptor::string())),
            (
                "meta",
                TypeDescriptor::dict(TypeDescriptor::string(), TypeDescriptor::string()),
            ),
        ],
    )
    .expect("root descriptor")
}

fuzz_target!(|data: &[u8]| {
    let mut parser = Parser::new(root_descriptor()).expect("parser");

    let cut = data.first().map(|b| *b as usize % (data.len())).unwrap_or(0);
    let fed_ok = parser.feed(&data[..cut]).is_ok() && parser.feed(&data[cut..]).is_ok();

    // Snapshots must be callable at any point without panicking.
    let _ = parser.get_partial();
    let _ = parser.issues().len();

    if fed_ok && parser.is_complete() {
        // A closed root always yields a value, valid or not.
        assert!(parser.get_partial().is_some());
    }
});
