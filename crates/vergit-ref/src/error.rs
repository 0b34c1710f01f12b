use std::path::PathBuf;

/// Errors produced by reference operations.
#[derive(Debug, thiserror::Error)]
pub enum RefError {
    #[error("invalid ref name: {0}")]
    InvalidName(String),

    #[error("malformed HEAD: {0}")]
    MalformedHead(String),

    #[error("symbolic ref loop at {0}")]
    SymrefLoop(String),

    #[error("ref parse error: {0}")]
    Parse(String),

    #[error("I/O error on {path}: {source}")]
    IoPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Hash(#[from] vergit_hash::HashError),
}
