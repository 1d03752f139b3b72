//! GASP Parser - Streaming Tag-Directed Extraction
//!
//! This crate turns messy, incrementally-arriving LLM output into typed
//! value trees. One or more XML-like tagged regions carry the payload;
//! surrounding prose is ignored.
//!
//! Architecture:
//! ```text
//! LLM byte stream (chunks at arbitrary boundaries)
//!     ↓
//! TagScanner (resumable: Open / Close / Text events)
//!     ↓
//! StackMachine (type-directed frames → partial value tree)
//!     ↓
//! Parser (feed / get_partial / validate)
//! ```

mod machine;
pub mod parser;
pub mod scanner;

// Re-export key types for convenience
pub use parser::*;
pub use scanner::*;

pub use gasp_core::{
    Describe, DescriptorRegistry, FieldMap, GaspError, GaspResult, ObjectValue, ParseError,
    ParseIssue, ParserConfig, SchemaError, TypeDescriptor, TypeKind, ValidateError, Value,
};
