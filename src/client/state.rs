//! Module `client`
//!
//! Defines the `Session` struct: everything one control connection carries
//! between commands, including its own view of the virtual filesystem.

use std::path::PathBuf;

use crate::vfs::{Actor, Vfs, VfsFile};

/// Source of a pending rename, staged by RNFR.
#[derive(Debug, Clone)]
pub struct RenameSource {
    pub file: VfsFile,
    pub physical: PathBuf,
}

/// Represents the state of a connected FTP client.
///
/// Tracks authentication status, the staged rename source and the
/// session's virtual filesystem.
pub struct Session {
    username: Option<String>,
    is_user_valid: bool,
    is_logged_in: bool,
    rename_from: Option<RenameSource>,
    vfs: Vfs,
}

impl Session {
    pub fn new(vfs: Vfs) -> Self {
        Self {
            username: None,
            is_user_valid: false,
            is_logged_in: false,
            rename_from: None,
            vfs,
        }
    }

    /// Resets the session, logging out and returning to the root.
    pub fn logout(&mut self) {
        self.username = None;
        self.is_user_valid = false;
        self.is_logged_in = false;
        self.rename_from = None;
        self.vfs.set_actor(Actor::Anonymous);
        // The root is always reachable.
        let _ = self.vfs.change_dir("/");
    }

    /// Marks the session logged in as `actor`.
    pub fn login(&mut self, actor: Actor) {
        self.is_logged_in = true;
        self.vfs.set_actor(actor);
    }

    // --------------------
    // Getter methods
    // --------------------

    /// Returns whether the USER command was accepted.
    pub fn is_user_valid(&self) -> bool {
        self.is_user_valid
    }

    pub fn is_logged_in(&self) -> bool {
        self.is_logged_in
    }

    pub fn username(&self) -> Option<&String> {
        self.username.as_ref()
    }

    pub fn actor(&self) -> &Actor {
        self.vfs.actor()
    }

    pub fn vfs(&self) -> &Vfs {
        &self.vfs
    }

    pub fn vfs_mut(&mut self) -> &mut Vfs {
        &mut self.vfs
    }

    // --------------------
    // Setter methods
    // --------------------

    pub fn set_user_valid(&mut self, valid: bool) {
        self.is_user_valid = valid;
    }

    pub fn set_username(&mut self, username: Option<String>) {
        self.username = username;
    }

    pub fn set_rename_from(&mut self, source: RenameSource) {
        self.rename_from = Some(source);
    }

    /// Takes the staged rename source; a second RNTO finds none.
    pub fn take_rename_from(&mut self) -> Option<RenameSource> {
        self.rename_from.take()
    }
}
