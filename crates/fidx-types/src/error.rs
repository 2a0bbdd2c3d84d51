use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("record id must not be empty")]
    EmptyId,

    #[error("record id must not end with '/': {0}")]
    DirectoryId(String),

    #[error("operation {kind} requires a payload")]
    MissingPayload { kind: &'static str },
}
