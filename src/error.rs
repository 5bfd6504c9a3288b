use std::io;

/// The error taxonomy for the FAT32 core: one variant per failure class a caller
/// needs to distinguish, not one variant per call site.
#[derive(thiserror::Error, Debug)]
pub enum Fat32Error {
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("file system integrity error: {0}")]
    Integrity(String),

    #[error("no free cluster available")]
    NoSpace,

    #[error("device I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Fat32Result<T> = Result<T, Fat32Error>;
