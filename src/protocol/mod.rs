//! FTP Protocol implementation
//!
//! Handles FTP command parsing and translates commands into virtual
//! filesystem calls and replies.

pub mod commands;
pub mod handlers;
pub mod responses;

pub use commands::{Command, CommandResult, CommandStatus, parse_command};
pub use handlers::{handle_auth_command, handle_command};
