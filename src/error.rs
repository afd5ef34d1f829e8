// Error taxonomy for the buffer engine — a small closed set, not a
// catch-all.

use thiserror::Error;

/// Errors the buffer engine can report. Deliberately small and closed:
/// every operation that can fail fails in one of these ways.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufError {
    /// The configured allocator refused a request. The buffer is left
    /// unchanged or advanced by a consistent prefix of the requested work.
    #[error("out of memory")]
    OutOfMemory,

    /// Null/empty content where content was required, or `commit_space`
    /// called for more than was reserved.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A search found no match.
    #[error("not found")]
    NotFound,

    /// The requested mutation targets a READONLY or UNMANAGED page in a
    /// way that would write or free it.
    #[error("unsupported on this page: {0}")]
    Unsupported(&'static str),
}

pub type Result<T> = std::result::Result<T, BufError>;
