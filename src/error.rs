//! Error types for daqwire.
//!
//! Every variant carries a `src` string naming the originating call site
//! (`"Pool::alloc_buffer"`, `"DmaStream::accept_frame"`, ...), so a failure
//! deep in the pipeline can be traced without a backtrace.
//!
//! Memory-fabric completion codes (`ADDRESS_ERROR`, `SIZE_ERROR`, ...) are
//! NOT errors of this type; they travel as status words through
//! `done_transaction` and are only converted at the blocking master API.

use thiserror::Error;

/// Main error type for all daqwire operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A bounded wait on a device or transaction elapsed.
    #[error("{src}: timeout after {micros} microseconds")]
    Timeout { src: &'static str, micros: u64 },

    /// A backend device or file could not be opened.
    #[error("{src}: failed to open {path}")]
    Open { src: &'static str, path: String },

    /// The backend rejected the requested destination/channel.
    #[error("{src}: destination {dest} rejected for {path}")]
    Dest {
        src: &'static str,
        path: String,
        dest: u32,
    },

    /// An offset or size fell outside the valid range.
    #[error("{src}: position {pos} exceeds limit {limit}")]
    Boundary {
        src: &'static str,
        pos: usize,
        limit: usize,
    },

    /// Memory allocation failed.
    #[error("{src}: failed to allocate {size} bytes")]
    Allocation { src: &'static str, size: usize },

    /// A socket-level operation failed.
    #[error("{src}: network error for {host}:{port}")]
    Network {
        src: &'static str,
        host: String,
        port: u16,
    },

    /// A foreign call returned an error code, carried verbatim.
    #[error("{src}: {msg} (code {code})")]
    Return {
        src: &'static str,
        msg: String,
        code: i64,
    },

    /// Catch-all with a free-text message.
    #[error("{src}: {msg}")]
    General { src: &'static str, msg: String },
}

impl Error {
    /// A bounded wait elapsed after `micros` microseconds.
    pub fn timeout(src: &'static str, micros: u64) -> Self {
        Error::Timeout { src, micros }
    }

    /// A device or file open failed.
    pub fn open(src: &'static str, path: impl Into<String>) -> Self {
        Error::Open {
            src,
            path: path.into(),
        }
    }

    /// The backend rejected a destination selection.
    pub fn dest(src: &'static str, path: impl Into<String>, dest: u32) -> Self {
        Error::Dest {
            src,
            path: path.into(),
            dest,
        }
    }

    /// An offset/size check failed.
    pub fn boundary(src: &'static str, pos: usize, limit: usize) -> Self {
        Error::Boundary { src, pos, limit }
    }

    /// Allocation failure.
    pub fn allocation(src: &'static str, size: usize) -> Self {
        Error::Allocation { src, size }
    }

    /// Socket-level failure.
    pub fn network(src: &'static str, host: impl Into<String>, port: u16) -> Self {
        Error::Network {
            src,
            host: host.into(),
            port,
        }
    }

    /// A foreign call returned `code`.
    pub fn ret(src: &'static str, msg: impl Into<String>, code: i64) -> Self {
        Error::Return {
            src,
            msg: msg.into(),
            code,
        }
    }

    /// Free-text failure.
    pub fn general(src: &'static str, msg: impl Into<String>) -> Self {
        Error::General {
            src,
            msg: msg.into(),
        }
    }

    /// The call site that produced this error.
    pub fn src(&self) -> &'static str {
        match self {
            Error::Timeout { src, .. }
            | Error::Open { src, .. }
            | Error::Dest { src, .. }
            | Error::Boundary { src, .. }
            | Error::Allocation { src, .. }
            | Error::Network { src, .. }
            | Error::Return { src, .. }
            | Error::General { src, .. } => src,
        }
    }
}

/// Result type alias using the daqwire Error.
pub type Result<T> = std::result::Result<T, Error>;
