//! Source-specific error types.

use crate::sources::SourceKind;
use thiserror::Error;

/// Errors raised while generating a value. Isolated to the failing source.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("generated a non-finite value at step {step}")]
    NonFinite { step: u64 },

    #[error("generator produced a {actual} value for a {expected} source")]
    KindMismatch {
        expected: SourceKind,
        actual: SourceKind,
    },

    #[error("unknown source '{0}'")]
    UnknownSource(String),

    #[error("source '{0}' already exists")]
    DuplicateSource(String),

    #[error("execution order is not a permutation of the registered sources")]
    InvalidExecutionOrder,

    #[error("plugin sources cannot be persisted")]
    NotPersistable,

    #[error("{0}")]
    Generator(String),
}

pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Errors raised while applying a parameter edit.
///
/// Out-of-range numbers never produce an error; they are clamped or rounded.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("parameter '{0}' is required")]
    Required(String),

    #[error("unknown parameter '{0}'")]
    UnknownParam(String),

    #[error("parameter '{key}' expects {expected}")]
    WrongType { key: String, expected: &'static str },

    #[error("'{value}' is not a valid value for '{key}'")]
    InvalidChoice { key: String, value: String },
}
