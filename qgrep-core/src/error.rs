use thiserror::Error;

/// Error kinds per the error handling design: most are fatal to the
/// operation that raised them, but `AllocationFailure` and
/// `CorruptChangeList` are meant to be caught by the caller and downgraded
/// to a skip/warn rather than aborting a whole search.
#[derive(Error, Debug)]
pub enum QgrepError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Magic bytes didn't match the current format version. The caller
    /// should treat this as "rebuild", not "abort".
    #[error("format outdated: {0}")]
    FormatOutdated(String),

    /// A chunk's header or offsets are internally inconsistent (short read,
    /// offsets past the end of the payload, etc). Aborts the query that hit it.
    #[error("malformed chunk: {0}")]
    MalformedChunk(String),

    #[error("invalid regex: {0}")]
    RegexParse(#[from] regex::Error),

    /// A chunk-sized allocation failed. The search continues with that
    /// chunk dropped.
    #[error("allocation failure: {0}")]
    AllocationFailure(String),

    /// The `.qgc` change list couldn't be parsed. Non-fatal: ignore it.
    #[error("corrupt change list: {0}")]
    CorruptChangeList(String),
}

pub type Result<T> = std::result::Result<T, QgrepError>;
