//! Error types for the bucket layer.
//!
//! Everything here is a storage-access failure except [`Error::Path`] and
//! [`Error::IncompatibleValue`], which only writers can hit. A missing bucket
//! is never an error: lookups return `None` instead.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crate::path::PathError;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Opening the store, running a transaction or committing it failed.
    #[error("Storage error: {0}")]
    Storage(#[from] redb::Error),

    #[error("An I/O error occurred on {path}: {error}")]
    Io { path: PathBuf, error: io::Error },

    /// Another handle kept the store file locked for the whole wait.
    #[error("Timed out after {timeout:?} waiting for the lock on {path}")]
    LockTimeout { path: PathBuf, timeout: Duration },

    #[error("{0}")]
    Path(#[from] PathError),

    /// A bucket was expected where a plain key lives, or the reverse.
    #[error("The entry at {path} is incompatible with the requested operation")]
    IncompatibleValue { path: String },

    #[error("The entry at {path} could not be decoded")]
    CorruptEntry { path: String },
}

impl From<redb::DatabaseError> for Error {
    fn from(e: redb::DatabaseError) -> Self {
        Error::Storage(e.into())
    }
}

impl From<redb::TransactionError> for Error {
    fn from(e: redb::TransactionError) -> Self {
        Error::Storage(e.into())
    }
}

impl From<redb::TableError> for Error {
    fn from(e: redb::TableError) -> Self {
        Error::Storage(e.into())
    }
}

impl From<redb::StorageError> for Error {
    fn from(e: redb::StorageError) -> Self {
        Error::Storage(e.into())
    }
}

impl From<redb::CommitError> for Error {
    fn from(e: redb::CommitError) -> Self {
        Error::Storage(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_timeout_display() {
        let e = Error::LockTimeout {
            path: PathBuf::from("/var/lib/agent/agent.db"),
            timeout: Duration::from_secs(15),
        };
        let display = e.to_string();
        assert!(display.contains("15s"));
        assert!(display.contains("agent.db"));
    }

    #[test]
    fn path_error_converts() {
        let e: Error = PathError::InvalidComponent {
            component: String::new(),
            position: 0,
            message: "name required".to_string(),
        }
        .into();
        assert!(matches!(e, Error::Path(_)));
    }

    #[test]
    fn storage_error_converts() {
        let e: Error = redb::StorageError::Corrupted("bad page".to_string()).into();
        assert!(matches!(e, Error::Storage(_)));
        assert!(e.to_string().contains("bad page"));
    }
}
