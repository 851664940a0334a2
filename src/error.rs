//! Error types for the overlay engine.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the overlay engine.
///
/// Fetch and parse failures are recovered close to where they happen
/// (an unreachable changelog hour degrades to zero files, a malformed
/// changeset line is skipped); store, base reader and rebuild failures
/// surface to the caller.
#[derive(Error, Debug)]
pub enum Error {
    /// Listing a changelog directory failed (transport or non-2xx status)
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Downloading or decompressing a changeset file failed
    #[error("Download error: {0}")]
    Download(String),

    /// A changeset line, filename or cursor could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// An overlay store operation failed
    #[error("Store error: {0}")]
    Store(String),

    /// The base dataset reader failed
    #[error("Base reader error: {0}")]
    BaseReader(String),

    /// The external compaction run failed
    #[error("Rebuild error: {0}")]
    Rebuild(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Fetch(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Fetch("connection refused".to_string());
        assert_eq!(err.to_string(), "Fetch error: connection refused");
    }
}
