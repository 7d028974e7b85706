//! Error types
//!
//! Defines domain-specific error types for each module of the FTP server.

use std::io;
use thiserror::Error;

/// Authentication module errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid username: {0}")]
    InvalidUsername(String),
    #[error("Invalid password for user: {0}")]
    InvalidPassword(String),
    #[error("User not found: {0}")]
    UserNotFound(String),
    #[error("Malformed input: {0}")]
    MalformedInput(String),
    #[error("Anonymous login is disabled")]
    AnonymousDisabled,
}

/// Permission store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// The lock marker could not be created within the retry budget.
    #[error("could not lock permission store {path} after {attempts} attempts")]
    Lock { path: String, attempts: u32 },

    #[error("could not open permission store {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("could not write permission store {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("could not read permission store {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot scan {path} for import: {source}")]
    Import {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("permission store {path} is corrupt: {reason}")]
    Corrupt { path: String, reason: String },

    /// No key could be derived for the file, or no record exists under it.
    #[error("no record for {0}")]
    Key(String),
}

impl StoreError {
    /// Absence of a record is a normal outcome for most callers.
    pub fn is_key(&self) -> bool {
        matches!(self, StoreError::Key(_))
    }
}

/// Sharing declaration errors; parse failures carry the 1-based line number
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read sharing file {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("line {line}: {reason}")]
    Line { line: usize, reason: String },
}

impl ConfigError {
    pub fn line(line: usize, reason: impl Into<String>) -> Self {
        ConfigError::Line {
            line,
            reason: reason.into(),
        }
    }

    /// Line the error was reported on, if any.
    pub fn line_number(&self) -> Option<usize> {
        match self {
            ConfigError::Line { line, .. } => Some(*line),
            ConfigError::Unreadable { .. } => None,
        }
    }
}

/// Navigate module errors
#[derive(Debug, Error)]
pub enum NavigateError {
    #[error("Invalid path: {0}")]
    PathSyntax(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Directory not found: {0}")]
    NotFound(String),
    #[error("Not a directory: {0}")]
    NotADirectory(String),
    #[error("Name too long: {0}")]
    NameTooLong(String),
    #[error("Already at the root directory")]
    AtRoot,
    #[error("Path leads outside the shared tree: {0}")]
    LinkEscape(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Local error: {0}")]
    Local(#[from] io::Error),
}

impl NavigateError {
    /// Maps an OS failure of a directory hop into the taxonomy.
    pub fn from_hop(err: io::Error, target: &str) -> Self {
        if err.raw_os_error() == Some(libc::ENAMETOOLONG) {
            return NavigateError::NameTooLong(target.to_string());
        }
        match err.kind() {
            io::ErrorKind::NotFound => NavigateError::NotFound(target.to_string()),
            io::ErrorKind::PermissionDenied => NavigateError::PermissionDenied(target.to_string()),
            io::ErrorKind::NotADirectory => NavigateError::NotADirectory(target.to_string()),
            _ => NavigateError::Local(err),
        }
    }
}

/// General FTP server error that encompasses all error types
#[derive(Debug, Error)]
pub enum FtpServerError {
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Navigate error: {0}")]
    Navigate(#[from] NavigateError),
    #[error("Settings error: {0}")]
    Settings(#[from] ::config::ConfigError),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hop_errors_map_by_kind() {
        let e = NavigateError::from_hop(io::Error::from(io::ErrorKind::NotFound), "x");
        assert!(matches!(e, NavigateError::NotFound(_)));

        let e = NavigateError::from_hop(io::Error::from(io::ErrorKind::PermissionDenied), "x");
        assert!(matches!(e, NavigateError::PermissionDenied(_)));

        let e = NavigateError::from_hop(io::Error::from_raw_os_error(libc::ENAMETOOLONG), "x");
        assert!(matches!(e, NavigateError::NameTooLong(_)));

        let e = NavigateError::from_hop(io::Error::other("boom"), "x");
        assert!(matches!(e, NavigateError::Local(_)));
    }

    #[test]
    fn config_errors_carry_line() {
        assert_eq!(ConfigError::line(7, "bad").line_number(), Some(7));
        assert_eq!(ConfigError::line(7, "bad").to_string(), "line 7: bad");
    }
}
