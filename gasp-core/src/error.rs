//! Error types for GASP operations

use crate::TypeKind;
use thiserror::Error;

/// Schema construction errors.
///
/// Surfaced immediately to the caller building a descriptor; a parser is
/// never constructed from an invalid schema.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Unsupported type: {reason}")]
    UnsupportedType { reason: String },

    #[error("Cyclic type while describing {type_name}: nesting exceeds {limit}")]
    CyclicType { type_name: String, limit: usize },

    #[error("Unknown type reference: {name}")]
    UnknownRef { name: String },

    #[error("Invalid type name: {name:?}")]
    InvalidName { name: String },

    #[error("Tuple descriptor must have at least one positional type")]
    EmptyTuple,

    #[error("Union needs at least two alternatives, got {count}")]
    NotEnoughAlternatives { count: usize },

    #[error("Union alternative must be class-like or primitive, got {kind:?}")]
    BadAlternative { kind: TypeKind },
}

/// Recoverable issues recorded while parsing.
///
/// None of these stop the stream; they are accumulated on the parser and
/// readable through its errors-list accessor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseIssue {
    #[error("Malformed token near byte {offset}: {reason}")]
    MalformedToken { offset: usize, reason: String },

    #[error("Unknown field {field} on {class}")]
    UnknownField { class: String, field: String },

    #[error("Union {name} has no alternative for tag {tag}")]
    UnresolvedUnion { name: String, tag: String },

    #[error("Invalid {kind:?} literal: {text:?}")]
    InvalidLiteral { kind: TypeKind, text: String },

    #[error("Dict entry <{tag}> without key attribute was dropped")]
    MissingKey { tag: String },

    #[error("Close tag </{found}> did not match open tag <{expected}>")]
    MismatchedClose { expected: String, found: String },

    #[error("Foreign tag <{tag}> skipped inside {context}")]
    ForeignTag { tag: String, context: String },

    #[error("Unresolvable type reference {name} treated as any")]
    UnknownRefType { name: String },
}

/// Fatal parse errors.
///
/// A fatal error poisons the parser: every later `feed` returns the same
/// failed state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Accumulated text exceeds the {limit} byte budget")]
    TextBudgetExceeded { limit: usize },
}

/// Validation errors surfaced by `Parser::validate`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidateError {
    #[error("Root value is not complete yet")]
    Incomplete,

    #[error("Required fields missing: {fields:?}")]
    MissingFields { fields: Vec<String> },
}

/// Master error type for all GASP errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GaspError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidateError),
}

/// Result type alias for GASP operations.
pub type GaspResult<T> = Result<T, GaspError>;
