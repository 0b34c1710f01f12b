use std::path::PathBuf;

use vergit_hash::ObjectId;

/// Errors produced by repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("not a git repository (or any of the parent directories): {0}")]
    NotFound(PathBuf),

    #[error("invalid git directory {path}: {reason}")]
    InvalidGitDir { path: PathBuf, reason: String },

    #[error("object not found: {0}")]
    MissingObject(ObjectId),

    #[error("tag chain too deep at {0}")]
    TagChainTooDeep(ObjectId),

    #[error(transparent)]
    Odb(#[from] vergit_odb::OdbError),

    #[error(transparent)]
    Ref(#[from] vergit_ref::RefError),

    #[error(transparent)]
    Object(#[from] vergit_object::ObjectError),

    #[error(transparent)]
    Hash(#[from] vergit_hash::HashError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
