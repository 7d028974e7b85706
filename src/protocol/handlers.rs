//! Command handlers module for the RAX VFS server.
//!
//! Each handler turns one parsed command into calls on the session's
//! virtual filesystem and a reply. Every path a handler writes to is
//! resolved through the checked walk, never through the unchecked
//! virtual-to-physical conversion.

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use std::fs::{self, DirBuilder};
use std::os::unix::fs::DirBuilderExt;

use crate::auth;
use crate::client::{RenameSource, Session};
use crate::config::ServerConfig;
use crate::error::NavigateError;
use crate::error::handlers::navigate_reply;
use crate::navigate::split_parent;
use crate::protocol::responses::*;
use crate::protocol::{Command, CommandResult, CommandStatus};
use crate::vfs::{ANONYMOUS, NO_OWNER, Ownership, RightsMask, VfsFile};

/// Dispatches a received FTP command to its corresponding handler.
///
/// Only reached for logged-in sessions; see [`handle_auth_command`].
pub fn handle_command(session: &mut Session, command: &Command, config: &ServerConfig) -> CommandResult {
    match command {
        Command::QUIT => handle_cmd_quit(session),
        Command::NOOP => handle_cmd_noop(),
        Command::USER(_) | Command::PASS(_) => CommandResult::failure(
            "Already logged in",
            format_response(BAD_SEQUENCE, "Already logged in."),
        ),
        Command::PWD => handle_cmd_pwd(session),
        Command::CWD(path) => handle_cmd_cwd(session, path),
        Command::CDUP => handle_cmd_cwd(session, ".."),
        Command::STAT(path) => handle_cmd_stat(session, path.as_deref(), config),
        Command::MKD(path) => handle_cmd_mkd(session, path),
        Command::RMD(path) => handle_cmd_remove(session, path, Removal::Directory),
        Command::DELE(path) => handle_cmd_remove(session, path, Removal::File),
        Command::RNFR(path) => handle_cmd_rnfr(session, path),
        Command::RNTO(path) => handle_cmd_rnto(session, path),
        Command::SIZE(path) => handle_cmd_size(session, path),
        Command::MDTM(path) => handle_cmd_mdtm(session, path),
        Command::UNKNOWN(cmd) => handle_cmd_unknown(cmd),
    }
}

/// Handles commands before login: only USER, PASS, QUIT and NOOP are allowed.
pub fn handle_auth_command(session: &mut Session, command: &Command, config: &ServerConfig) -> CommandResult {
    match command {
        Command::USER(username) => handle_cmd_user(session, username, config),
        Command::PASS(password) => handle_cmd_pass(session, password, config),
        Command::QUIT => handle_cmd_quit(session),
        Command::NOOP => handle_cmd_noop(),
        _ => CommandResult::failure(
            "Authentication required",
            format_response(AUTH_FAILED, "Please login with USER and PASS."),
        ),
    }
}

/// Handles the QUIT command: logs out the client and signals connection close.
fn handle_cmd_quit(session: &mut Session) -> CommandResult {
    session.logout();

    CommandResult {
        status: CommandStatus::CloseConnection,
        message: Some(format_response(CLOSING, "Goodbye.")),
    }
}

fn handle_cmd_noop() -> CommandResult {
    CommandResult::success(format_response(OK, "NOOP command successful."))
}

/// Handles the USER command: validates username and sets session state accordingly.
fn handle_cmd_user(session: &mut Session, username: &str, config: &ServerConfig) -> CommandResult {
    match auth::validate_user(username, &config.startup) {
        Ok(()) => {
            session.set_user_valid(true);
            session.set_username(Some(username.to_string()));
            CommandResult::success(format_response(
                PASSWORD_REQUIRED,
                &format!("Password required for {}.", username),
            ))
        }
        Err(e) => {
            session.set_user_valid(false);
            session.set_username(None);
            CommandResult::failure(e.to_string(), format_response(AUTH_FAILED, "Login incorrect."))
        }
    }
}

/// Handles the PASS command: validates password if username was previously validated.
fn handle_cmd_pass(session: &mut Session, password: &str, config: &ServerConfig) -> CommandResult {
    let Some(username) = session.username().filter(|_| session.is_user_valid()).cloned() else {
        return CommandResult::failure(
            "Username not provided",
            format_response(BAD_SEQUENCE, "Login with USER first."),
        );
    };

    match auth::validate_password(&username, password, &config.startup) {
        Ok(actor) => {
            info!("User {} logged in as {}", username, actor);
            session.login(actor);
            CommandResult::success(format_response(LOGIN_SUCCESS, "User logged in, proceed."))
        }
        Err(e) => {
            warn!("Failed login for {}: {}", username, e);
            CommandResult::failure(e.to_string(), format_response(AUTH_FAILED, "Login incorrect."))
        }
    }
}

fn handle_cmd_pwd(session: &Session) -> CommandResult {
    let dir = session.vfs().current_virtual_dir();
    CommandResult::success(format_response(
        PATH_CREATED,
        &format!("\"{}\" is current directory.", dir),
    ))
}

/// Handles CWD and CDUP; a failed walk leaves the session where it was.
fn handle_cmd_cwd(session: &mut Session, path: &str) -> CommandResult {
    match session.vfs_mut().change_dir(path) {
        Ok(()) => CommandResult::success(format_response(FILE_ACTION_OK, "CWD command successful.")),
        Err(e) => navigation_failure(&e),
    }
}

/// STAT without argument reports the session, with an argument lists the
/// path on the control connection.
fn handle_cmd_stat(session: &Session, path: Option<&str>, config: &ServerConfig) -> CommandResult {
    let vfs = session.vfs();
    let Some(path) = path else {
        let body = vec![
            format!("Connected to {}", config.startup.control_socket()),
            format!("Logged in as {}", session.actor()),
            format!("Current directory is {}", vfs.current_virtual_dir()),
        ];
        return CommandResult::success(format_multiline(SYSTEM_STATUS, "RAX VFS server status:", &body, "End of status."));
    };

    let target = match path.to_ascii_lowercase().as_str() {
        "-a" | "-l" | "-al" | "-la" => ".",
        _ => path,
    };

    let entries = if vfs.is_dir(target) {
        match vfs.list(target) {
            Ok(files) => files,
            Err(e) => return navigation_failure(&e),
        }
    } else {
        match vfs.get_file_info(target) {
            Ok(file) if file.is_regular_file() => vec![file],
            Ok(_) => {
                return CommandResult::failure("No such file", format_response(ACTION_NOT_TAKEN, "Bad file name."));
            }
            Err(e) => return navigation_failure(&e),
        }
    };

    let actor = session.actor().name();
    let lines: Vec<String> = entries
        .iter()
        .filter(|file| visible_to(file, actor))
        .filter_map(|file| file.ls_line().ok())
        .collect();
    CommandResult::success(format_multiline(
        FILE_STATUS,
        &format!("Status of {}:", target),
        &lines,
        "End of status.",
    ))
}

/// Regular files owned by another named user are not shown.
fn visible_to(file: &VfsFile, actor: &str) -> bool {
    let owner = file.ownership.owner.as_str();
    owner == actor || owner == NO_OWNER || owner == ANONYMOUS || !file.is_regular_file()
}

/// Handles MKD: the new directory gets mode 0700 and belongs to the actor.
fn handle_cmd_mkd(session: &mut Session, path: &str) -> CommandResult {
    let path = trim_trailing_slash(path);
    let vfs = session.vfs();

    match vfs.allowed_to_write_to_dir(parent_of(path)) {
        Ok(true) => {}
        Ok(false) => return not_allowed("You don't have sufficient (directory) rights to create the directory."),
        Err(e) => return navigation_failure(&e),
    }

    let full = match vfs.resolve_physical(path) {
        Ok(full) => full,
        Err(e) => return navigation_failure(&e),
    };
    if let Err(e) = DirBuilder::new().mode(0o700).create(&full) {
        warn!("MKD {} failed: {}", full.display(), e);
        return CommandResult::failure(
            e.to_string(),
            format_response(FILE_NOT_FOUND, "Unable to create specified directory."),
        );
    }

    let ownership = Ownership::new(session.actor().name(), RightsMask::ALL, RightsMask::NONE);
    if let Err(e) = vfs.put_record(&full, &ownership) {
        error!("Created {} but could not record its owner: {}", full.display(), e);
    }
    CommandResult::success(format_response(
        PATH_CREATED,
        &format!("\"{}\" was successfully created.", path),
    ))
}

#[derive(Debug, Clone, Copy)]
enum Removal {
    File,
    Directory,
}

/// Handles DELE and RMD. The record goes first (its key needs the file to
/// exist) and is put back if the removal itself fails.
fn handle_cmd_remove(session: &mut Session, path: &str, kind: Removal) -> CommandResult {
    let path = trim_trailing_slash(path);
    let what = match kind {
        Removal::File => "file",
        Removal::Directory => "directory",
    };

    let file = match session.vfs().get_file_info(path) {
        Ok(file) if file.allows(session.actor(), RightsMask::WRITE) => file,
        _ => {
            return CommandResult::failure(
                "Insufficient rights",
                format_response(
                    FILE_NOT_FOUND,
                    &format!("Unable to delete specified {} (insufficient rights?).", what),
                ),
            );
        }
    };
    let Some(full) = file.full_path() else {
        return CommandResult::failure(
            "Virtual directory",
            format_response(FILE_NOT_FOUND, "Virtual directories can't be removed."),
        );
    };

    match session.vfs().allowed_to_write_to_dir(parent_of(path)) {
        Ok(true) => {}
        Ok(false) => {
            return not_allowed(&format!(
                "You don't have sufficient (directory) rights to delete the {}.",
                what
            ));
        }
        Err(e) => return navigation_failure(&e),
    }

    let had_record = match session.vfs_mut().delete_record(&full) {
        Ok(()) => true,
        Err(NavigateError::Store(e)) if e.is_key() => false,
        Err(e) => return navigation_failure(&e),
    };

    let removed = match kind {
        Removal::File => fs::remove_file(&full),
        Removal::Directory => fs::remove_dir(&full),
    };
    if let Err(e) = removed {
        warn!("Removing {} failed: {}", full.display(), e);
        if had_record {
            if let Err(e) = session.vfs().put_record(&full, &file.ownership) {
                error!("Lost the record of {}: {}", full.display(), e);
            }
        }
        return CommandResult::failure(
            e.to_string(),
            format_response(ACTION_NOT_TAKEN, &format!("An error occurred while deleting the {}.", what)),
        );
    }

    info!("{} removed {}", session.actor(), full.display());
    CommandResult::success(format_response(FILE_ACTION_OK, &format!("{} deleted.", capitalize(what))))
}

fn handle_cmd_rnfr(session: &mut Session, path: &str) -> CommandResult {
    let file = match session.vfs().get_file_info(path) {
        Ok(file) if file.allows(session.actor(), RightsMask::WRITE) => file,
        _ => return CommandResult::failure("Not available", format_response(FILE_NOT_FOUND, "File not available.")),
    };
    let Some(physical) = file.full_path().filter(|p| p.exists()) else {
        return CommandResult::failure("Not available", format_response(FILE_NOT_FOUND, "File not available."));
    };

    session.set_rename_from(RenameSource { file, physical });
    CommandResult::success(format_response(
        PENDING_FURTHER_INFO,
        "Requested file action pending further information.",
    ))
}

/// Handles RNTO. The record follows the file to its new name; when the
/// rename fails the old record is restored.
fn handle_cmd_rnto(session: &mut Session, path: &str) -> CommandResult {
    let Some(source) = session.take_rename_from() else {
        return CommandResult::failure(
            "No RNFR",
            format_response(BAD_SEQUENCE, "Bad command sequence. RNTO needs previous RNFR."),
        );
    };

    match session.vfs().allowed_to_write_to_dir(parent_of(path)) {
        Ok(true) => {}
        Ok(false) => return not_allowed("Filename or directory not allowed."),
        Err(e) => return navigation_failure(&e),
    }
    let target = match session.vfs().resolve_physical(path) {
        Ok(target) => target,
        Err(e) => return navigation_failure(&e),
    };

    let had_record = match session.vfs_mut().delete_record(&source.physical) {
        Ok(()) => true,
        Err(NavigateError::Store(e)) if e.is_key() => false,
        Err(e) => return navigation_failure(&e),
    };

    if let Err(e) = fs::rename(&source.physical, &target) {
        warn!(
            "Rename {} -> {} failed: {}",
            source.physical.display(),
            target.display(),
            e
        );
        if had_record {
            if let Err(e) = session.vfs().put_record(&source.physical, &source.file.ownership) {
                error!("Lost the record of {}: {}", source.physical.display(), e);
            }
        }
        return not_allowed("Some problem occurred while renaming.");
    }

    if let Err(e) = session.vfs().put_record(&target, &source.file.ownership) {
        error!("Renamed to {} but could not record its owner: {}", target.display(), e);
    }
    CommandResult::success(format_response(FILE_ACTION_OK, "Renaming completed."))
}

/// Physical file behind `path` if the actor may read it.
fn readable_file(session: &Session, path: &str) -> Result<std::path::PathBuf, CommandResult> {
    let unavailable = || CommandResult::failure("Not available", format_response(FILE_NOT_FOUND, "File not available."));
    let file = match session.vfs().get_file_info(path) {
        Ok(file) if file.allows(session.actor(), RightsMask::READ) => file,
        _ => return Err(unavailable()),
    };
    file.full_path().filter(|p| p.is_file()).ok_or_else(unavailable)
}

fn handle_cmd_size(session: &Session, path: &str) -> CommandResult {
    let full = match readable_file(session, path) {
        Ok(full) => full,
        Err(reply) => return reply,
    };
    match fs::metadata(&full) {
        Ok(meta) => CommandResult::success(format_response(FILE_STATUS, &meta.len().to_string())),
        Err(e) => CommandResult::failure(e.to_string(), format_response(ACTION_NOT_TAKEN, "File busy.")),
    }
}

fn handle_cmd_mdtm(session: &Session, path: &str) -> CommandResult {
    let full = match readable_file(session, path) {
        Ok(full) => full,
        Err(reply) => return reply,
    };
    match fs::metadata(&full).and_then(|meta| meta.modified()) {
        Ok(modified) => {
            let stamp: DateTime<Utc> = modified.into();
            CommandResult::success(format_response(FILE_STATUS, &stamp.format("%Y%m%d%H%M%S").to_string()))
        }
        Err(e) => CommandResult::failure(e.to_string(), format_response(ACTION_NOT_TAKEN, "File busy.")),
    }
}

fn handle_cmd_unknown(cmd: &str) -> CommandResult {
    CommandResult::failure(
        format!("Unknown command {}", cmd),
        format_response(UNKNOWN_COMMAND, "Syntax error, command unrecognized."),
    )
}

fn navigation_failure(err: &NavigateError) -> CommandResult {
    CommandResult::failure(err.to_string(), navigate_reply(err))
}

fn not_allowed(text: &str) -> CommandResult {
    CommandResult::failure(text, format_response(NAME_NOT_ALLOWED, text))
}

/// Directory argument for the write check on `path`'s parent.
fn parent_of(path: &str) -> &str {
    split_parent(path).0.unwrap_or(".")
}

fn trim_trailing_slash(path: &str) -> &str {
    if path.len() > 1 { path.trim_end_matches('/') } else { path }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
