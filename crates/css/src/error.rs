//! Engine errors.
//!
//! Sanitization itself never fails: anything suspect is deleted from the
//! output instead. Errors exist only for caller-supplied inputs that are
//! contract violations, such as malformed schema documents.

/// Error raised while loading a property schema definition.
#[derive(thiserror::Error, Debug)]
pub enum SchemaError {
    #[error("schema document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown value bit {bit:?} on entry {entry:?}")]
    UnknownBit { entry: String, bit: String },

    #[error("entry {entry:?} allows function {function:?} but the schema has no {key:?} entry")]
    DanglingFunction {
        entry: String,
        function: String,
        key: String,
    },
}

/// Result type for schema loading.
pub type SchemaResult<T> = Result<T, SchemaError>;
