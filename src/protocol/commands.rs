//! Module `command`
//!
//! Defines the core FTP command parsing logic and related data structures
//! used to represent commands, their status and results.

/// Represents an FTP command parsed from the client input.
///
/// Commands that require arguments store them as `String` variants.
#[derive(Debug, PartialEq)]
pub enum Command {
    QUIT,
    NOOP,
    PWD,
    CDUP,
    CWD(String),  // Change working directory
    USER(String), // Username for login
    PASS(String), // Password for login
    STAT(Option<String>), // Server status, or a listing of the path
    MKD(String),  // Make directory
    RMD(String),  // Remove directory
    DELE(String), // Delete file
    RNFR(String), // Rename from
    RNTO(String), // Rename to
    SIZE(String), // File size in bytes
    MDTM(String), // Modification time
    UNKNOWN(String), // Unknown, unsupported or missing its argument
}

/// Represents the outcome status of executing a command.
#[derive(Debug, PartialEq)]
pub enum CommandStatus {
    Success,
    Failure(String),
    CloseConnection,
}

/// Struct encapsulating the full result of a command execution.
#[derive(Debug)]
pub struct CommandResult {
    pub status: CommandStatus,
    pub message: Option<String>,
}

impl CommandResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Success,
            message: Some(message.into()),
        }
    }

    pub fn failure(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Failure(reason.into()),
            message: Some(message.into()),
        }
    }
}

/// Parses a raw command string received from a client into the `Command` enum.
///
/// Validates required arguments and returns `UNKNOWN` if a known command is misused.
pub fn parse_command(raw: &str) -> Command {
    let trimmed = raw.trim();
    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let cmd = parts.next().unwrap_or("").to_ascii_uppercase();
    let arg = parts.next().unwrap_or("").trim();

    match cmd.as_str() {
        "QUIT" => Command::QUIT,
        "NOOP" => Command::NOOP,
        "PWD" | "XPWD" => Command::PWD,
        "CDUP" | "XCUP" => Command::CDUP,
        "STAT" if arg.is_empty() => Command::STAT(None),
        "STAT" => Command::STAT(Some(arg.to_string())),
        "CWD" | "XCWD" if !arg.is_empty() => Command::CWD(arg.to_string()),
        "USER" if !arg.is_empty() => Command::USER(arg.to_string()),
        "PASS" if !arg.is_empty() => Command::PASS(arg.to_string()),
        "MKD" | "XMKD" if !arg.is_empty() => Command::MKD(arg.to_string()),
        "RMD" | "XRMD" if !arg.is_empty() => Command::RMD(arg.to_string()),
        "DELE" if !arg.is_empty() => Command::DELE(arg.to_string()),
        "RNFR" if !arg.is_empty() => Command::RNFR(arg.to_string()),
        "RNTO" if !arg.is_empty() => Command::RNTO(arg.to_string()),
        "SIZE" if !arg.is_empty() => Command::SIZE(arg.to_string()),
        "MDTM" if !arg.is_empty() => Command::MDTM(arg.to_string()),
        _ => Command::UNKNOWN(cmd),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_arguments_and_aliases() {
        assert_eq!(parse_command("cwd /films\r\n"), Command::CWD("/films".into()));
        assert_eq!(parse_command("XMKD new dir"), Command::MKD("new dir".into()));
        assert_eq!(parse_command("STAT"), Command::STAT(None));
        assert_eq!(parse_command("STAT -l"), Command::STAT(Some("-l".into())));
        assert_eq!(parse_command("cdup"), Command::CDUP);
    }

    #[test]
    fn missing_arguments_are_unknown() {
        assert_eq!(parse_command("CWD"), Command::UNKNOWN("CWD".into()));
        assert_eq!(parse_command("DELE   "), Command::UNKNOWN("DELE".into()));
        assert_eq!(parse_command("RETR x"), Command::UNKNOWN("RETR".into()));
    }
}
