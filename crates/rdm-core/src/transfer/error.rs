//! Transfer error type and its classification.

use std::path::PathBuf;

/// Coarse failure class of an attempt, used to decide the final task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    RedirectLoop,
    ServerError,
    TransportError,
    FilesystemError,
    Interrupted,
}

/// Why one attempt did not produce a complete file.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// A URL was visited more than the allowed number of times while following redirects.
    #[error("redirect loop detected at {url}")]
    RedirectLoop { url: String },
    /// Final response was not 200/206, or a redirect carried no usable `Location`.
    #[error("server responded with HTTP {code}")]
    Server { code: u32 },
    /// Connect/read timeout, connection reset, DNS failure and the like.
    #[error("transport: {0}")]
    Transport(#[from] curl::Error),
    /// Connection closed before `Content-Length` bytes arrived.
    #[error("transfer truncated: expected {expected} bytes, got {received}")]
    Truncated { expected: u64, received: u64 },
    #[error("invalid URL {url:?}")]
    InvalidUrl { url: String },
    /// Destination could not be created, opened or written.
    #[error("destination {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Stopped by pause/cancel.
    #[error("transfer interrupted")]
    Interrupted,
}

impl TransferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::RedirectLoop { .. } => ErrorKind::RedirectLoop,
            TransferError::Server { .. } => ErrorKind::ServerError,
            TransferError::Transport(_)
            | TransferError::Truncated { .. }
            | TransferError::InvalidUrl { .. } => ErrorKind::TransportError,
            TransferError::Filesystem { .. } => ErrorKind::FilesystemError,
            TransferError::Interrupted => ErrorKind::Interrupted,
        }
    }

    pub(crate) fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TransferError::Filesystem {
            path: path.into(),
            source,
        }
    }
}
