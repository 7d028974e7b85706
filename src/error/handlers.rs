//! Error handlers
//!
//! Maps errors onto FTP reply codes and messages.

use crate::error::types::{FtpServerError, NavigateError, StoreError};
use log::error;

/// Handle an FTP server error
pub fn handle_error(err: &FtpServerError) {
    error!("FTP Server Error ({}): {}", error_to_ftp_code(err), err);
}

/// Convert error to FTP response code
pub fn error_to_ftp_code(err: &FtpServerError) -> u16 {
    match err {
        FtpServerError::Storage(e) => store_error_code(e),
        FtpServerError::Config(_) => 451,
        FtpServerError::Navigate(e) => navigate_error_code(e),
        FtpServerError::Settings(_) => 451,
        FtpServerError::IoError(_) => 451,
    }
}

/// Reply code for a failed directory walk.
pub fn navigate_error_code(err: &NavigateError) -> u16 {
    match err {
        NavigateError::PathSyntax(_) => 501,
        NavigateError::NameTooLong(_) => 553,
        NavigateError::Store(e) => store_error_code(e),
        NavigateError::Local(_) => 451,
        NavigateError::PermissionDenied(_)
        | NavigateError::NotFound(_)
        | NavigateError::NotADirectory(_)
        | NavigateError::AtRoot
        | NavigateError::LinkEscape(_) => 550,
    }
}

fn store_error_code(err: &StoreError) -> u16 {
    match err {
        StoreError::Key(_) => 550,
        _ => 451,
    }
}

/// Builds a complete reply line for a navigation failure.
///
/// Link escapes are reported as plain permission failures so the client
/// learns nothing about the physical layout.
pub fn navigate_reply(err: &NavigateError) -> String {
    let text = match err {
        NavigateError::PermissionDenied(_) | NavigateError::LinkEscape(_) => "Permission denied.",
        NavigateError::NotFound(_) | NavigateError::NotADirectory(_) => "Doesn't exist.",
        NavigateError::NameTooLong(_) => "Too long name.",
        NavigateError::AtRoot => "Can't go further up than root is.",
        NavigateError::PathSyntax(_) => "Syntax error in path.",
        NavigateError::Store(_) | NavigateError::Local(_) => "Local processing error.",
    };
    format!("{} {}\r\n", navigate_error_code(err), text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_look_like_denials() {
        let escape = navigate_reply(&NavigateError::LinkEscape("/etc".into()));
        let denied = navigate_reply(&NavigateError::PermissionDenied("x".into()));
        assert_eq!(escape, denied);
        assert!(!escape.contains("/etc"));
    }

    #[test]
    fn lock_failures_are_transient() {
        let err = FtpServerError::Storage(StoreError::Lock {
            path: "db".into(),
            attempts: 3,
        });
        assert_eq!(error_to_ftp_code(&err), 451);
    }
}
