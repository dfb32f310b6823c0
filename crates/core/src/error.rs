//! Error types for oss-tool
//!
//! Every failure the core can report is a variant of [`Error`]. The CLI turns
//! an error into a process exit code, using [`Error::is_fatal`] to tell usage
//! errors from operation failures.

use thiserror::Error;

/// Result type alias using the crate's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the core library and the storage adapters
#[derive(Error, Debug)]
pub enum Error {
    /// An explicitly named configuration file does not exist
    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    /// A required value was neither given on the command line nor in the config file
    #[error("Missing required argument: {0}")]
    MissingArgument(String),

    /// A configuration value could not be parsed or is out of range
    #[error("Configuration error: {0}")]
    Config(String),

    /// A remote call failed
    #[error("Remote call failed: {0}")]
    Network(String),

    /// All attempts of a resumable multipart upload failed
    #[error("Upload of '{key}' failed after {attempts} attempt(s): {source}")]
    UploadExhausted {
        key: String,
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// A local file or folder given as input does not exist or is not a regular file/directory
    #[error("Local path not found: {0}")]
    LocalPathNotFound(String),

    /// A remote object, bucket or lifecycle rule does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The request conflicts with existing remote state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A key or path cannot be mapped safely
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    General(String),
}

impl Error {
    /// Whether the error aborts the whole invocation rather than a single item
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ConfigNotFound(_) | Error::MissingArgument(_) | Error::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_message_includes_cause() {
        let err = Error::UploadExhausted {
            key: "backup/db.tar".to_string(),
            attempts: 5,
            source: Box::new(Error::Network("connection reset".to_string())),
        };
        let msg = err.to_string();
        assert!(msg.contains("backup/db.tar"));
        assert!(msg.contains("5 attempt(s)"));
        assert!(msg.contains("connection reset"));
    }

    #[test]
    fn test_fatal_errors() {
        assert!(Error::ConfigNotFound("x.conf".to_string()).is_fatal());
        assert!(Error::MissingArgument("bucket".to_string()).is_fatal());
        assert!(!Error::LocalPathNotFound("a.txt".to_string()).is_fatal());
        assert!(!Error::Network("timeout".to_string()).is_fatal());
    }
}
