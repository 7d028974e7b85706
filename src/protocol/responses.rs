//! FTP Response handling
//!
//! Defines FTP response codes and formatting.

/// Standard FTP response codes
pub const OK: u16 = 200;
pub const SYSTEM_STATUS: u16 = 211;
pub const FILE_STATUS: u16 = 213;
pub const READY: u16 = 220;
pub const CLOSING: u16 = 221;
pub const LOGIN_SUCCESS: u16 = 230;
pub const FILE_ACTION_OK: u16 = 250;
pub const PATH_CREATED: u16 = 257;
pub const PASSWORD_REQUIRED: u16 = 331;
pub const PENDING_FURTHER_INFO: u16 = 350;
pub const TOO_MANY_USERS: u16 = 421;
pub const ACTION_NOT_TAKEN: u16 = 450;
pub const LOCAL_ERROR: u16 = 451;
pub const UNKNOWN_COMMAND: u16 = 500;
pub const SYNTAX_ERROR: u16 = 501;
pub const BAD_SEQUENCE: u16 = 503;
pub const AUTH_FAILED: u16 = 530;
pub const FILE_NOT_FOUND: u16 = 550;
pub const NAME_NOT_ALLOWED: u16 = 553;

/// Format an FTP response message
pub fn format_response(code: u16, message: &str) -> String {
    format!("{} {}\r\n", code, message)
}

/// Format a multi-line reply: `code-first`, body lines indented, `code last`.
pub fn format_multiline(code: u16, first: &str, body: &[String], last: &str) -> String {
    let mut out = format!("{}-{}\r\n", code, first);
    for line in body {
        out.push(' ');
        out.push_str(line);
        out.push_str("\r\n");
    }
    out.push_str(&format_response(code, last));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiline_replies_end_with_plain_code() {
        let reply = format_multiline(213, "Status of /:", &["a".into(), "b".into()], "End of status.");
        assert_eq!(reply, "213-Status of /:\r\n a\r\n b\r\n213 End of status.\r\n");
    }
}
