//! Navigation operations implementation
//!
//! `change_dir` walks a path component by component over a copy of the
//! session state and hands the copy back only when every hop succeeded and
//! every hop stayed inside a shared directory.

use log::{debug, warn};
use std::ffi::CString;
use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use crate::error::NavigateError;
use crate::navigate::path::{ROOT_TOKEN, split_path};
use crate::navigate::state::{NavigationState, PhysicalDir};
use crate::storage::PermissionStore;
use crate::vfs::rights::{Actor, Ownership, RightsMask};
use crate::vfs::tree::{NodeId, VirtualTree};

/// Everything a walk needs besides the state being moved.
pub struct Navigator<'a> {
    pub tree: &'a VirtualTree,
    pub store: &'a PermissionStore,
    pub actor: &'a Actor,
}

impl<'a> Navigator<'a> {
    pub fn new(tree: &'a VirtualTree, store: &'a PermissionStore, actor: &'a Actor) -> Self {
        Self { tree, store, actor }
    }

    /// Resolves `path` from `state`. On failure nothing has moved; the
    /// caller still owns the untouched `state`.
    pub fn change_dir(&self, state: &NavigationState, path: &str) -> Result<NavigationState, NavigateError> {
        let parts = split_path(path)?;
        let mut next = state.clone();
        for part in &parts {
            self.simple_cd(&mut next, part)?;
            self.security_check(&mut next)?;
        }
        debug!(
            "{} moved to {} ({:?})",
            self.actor,
            next.virtual_dir(self.tree),
            next.physical_dir(self.tree)
        );
        Ok(next)
    }

    /// One component of a walk.
    fn simple_cd(&self, state: &mut NavigationState, part: &str) -> Result<(), NavigateError> {
        match part {
            "." => Ok(()),
            ROOT_TOKEN => {
                *state = NavigationState::root();
                Ok(())
            }
            ".." => match &state.physical {
                PhysicalDir::AtNode => {
                    let parent = self.tree.parent(state.node).ok_or(NavigateError::AtRoot)?;
                    *state = NavigationState::at_node(parent);
                    Ok(())
                }
                PhysicalDir::Within(current) => {
                    let from = current.clone();
                    self.physical_hop(state, &from, "..")
                }
            },
            name => match &state.physical {
                PhysicalDir::AtNode => self.enter_from_node(state, name),
                PhysicalDir::Within(current) => {
                    let from = current.clone();
                    self.physical_hop(state, &from, name)
                }
            },
        }
    }

    fn enter_from_node(&self, state: &mut NavigationState, name: &str) -> Result<(), NavigateError> {
        if let Some(child) = self.tree.find_child(state.node, name) {
            if !self.tree.node(child).allows(self.actor, RightsMask::READ) {
                return Err(NavigateError::PermissionDenied(name.to_string()));
            }
            *state = NavigationState::at_node(child);
            return Ok(());
        }

        let from = self
            .tree
            .node(state.node)
            .physical()
            .map(Path::to_path_buf)
            .ok_or_else(|| NavigateError::NotFound(name.to_string()))?;
        self.physical_hop(state, &from, name)
    }

    /// Moves into `from/name` on the real filesystem, subject to the
    /// target's stored READ right.
    fn physical_hop(&self, state: &mut NavigationState, from: &Path, name: &str) -> Result<(), NavigateError> {
        let target = from.join(name);
        let ownership = self.lookup(&target)?;
        if !ownership.allows(self.actor, RightsMask::READ) {
            return Err(NavigateError::PermissionDenied(name.to_string()));
        }

        let resolved = enter_dir(&target, name)?;
        state.physical = match self.tree.node(state.node).physical() {
            Some(mount) if mount == resolved => PhysicalDir::AtNode,
            _ => PhysicalDir::Within(resolved),
        };
        Ok(())
    }

    /// Rebinds a location reached through a symlink to the shared directory
    /// that contains it, or refuses it.
    fn security_check(&self, state: &mut NavigationState) -> Result<(), NavigateError> {
        let PhysicalDir::Within(current) = &state.physical else {
            return Ok(());
        };
        if let Some(mount) = self.tree.node(state.node).physical() {
            if current.starts_with(mount) {
                return Ok(());
            }
        }

        match self.tree.find_containing(current) {
            Some(owner) => {
                debug!(
                    "{} is shared as {}; rebinding",
                    current.display(),
                    self.tree.full_virtual_path(owner)
                );
                // The hop was authorized already; the new node's READ is not
                // re-checked (see "Escape rebinding" in DESIGN.md).
                let at_mount = self.tree.node(owner).physical() == Some(current.as_path());
                state.node = owner;
                if at_mount {
                    state.physical = PhysicalDir::AtNode;
                }
                Ok(())
            }
            None => {
                warn!(
                    "Link escape refused: {} reached {} outside every share",
                    self.actor,
                    current.display()
                );
                Err(NavigateError::LinkEscape(current.display().to_string()))
            }
        }
    }

    /// Stored ownership of `path`, the default policy when there is none.
    pub fn lookup(&self, path: &Path) -> Result<Ownership, NavigateError> {
        match self.store.get(path) {
            Ok(record) => Ok(record.ownership()),
            Err(e) if e.is_key() => Ok(Ownership::default_policy()),
            Err(e) => Err(NavigateError::Store(e)),
        }
    }

    /// Maps a virtual path to the physical path it names without touching the
    /// filesystem and without the escape check.
    pub fn convert_to_physical_path(&self, state: &NavigationState, path: &str) -> Result<PathBuf, NavigateError> {
        let parts = split_path(path)?;
        let mut rest = parts.iter().map(String::as_str).peekable();

        let base = if rest.peek() == Some(&ROOT_TOKEN) {
            rest.next();
            self.virtual_prefix(self.tree.root(), &mut rest)?
        } else {
            match &state.physical {
                PhysicalDir::AtNode => self.virtual_prefix(state.node, &mut rest)?,
                PhysicalDir::Within(current) => current.clone(),
            }
        };

        Ok(rest.fold(base, |mut acc, part| {
            acc.push(part);
            acc
        }))
    }

    /// Walks virtual nodes as far as the components allow and returns the
    /// physical directory reached. Unconsumed components stay in `rest`.
    fn virtual_prefix<'p, I>(
        &self,
        start: NodeId,
        rest: &mut std::iter::Peekable<I>,
    ) -> Result<PathBuf, NavigateError>
    where
        I: Iterator<Item = &'p str>,
    {
        let mut node = start;
        while let Some(part) = rest.peek() {
            match *part {
                "." => {}
                ".." => node = self.tree.parent(node).unwrap_or(node),
                name => match self.tree.find_child(node, name) {
                    Some(child) => node = child,
                    None => break,
                },
            }
            rest.next();
        }

        self.tree
            .node(node)
            .physical()
            .map(Path::to_path_buf)
            .ok_or_else(|| NavigateError::NotFound(self.tree.full_virtual_path(node)))
    }
}

/// Verifies `target` is an enterable directory and returns it canonical.
/// Entering needs search permission only, as with chdir.
pub fn enter_dir(target: &Path, name: &str) -> Result<PathBuf, NavigateError> {
    let resolved = fs::canonicalize(target).map_err(|e| NavigateError::from_hop(e, name))?;
    if !resolved.is_dir() {
        return Err(NavigateError::NotADirectory(name.to_string()));
    }
    let c_path = CString::new(resolved.as_os_str().as_bytes())
        .map_err(|e| NavigateError::from_hop(io::Error::new(io::ErrorKind::InvalidInput, e), name))?;
    let rc = unsafe { libc::access(c_path.as_ptr(), libc::X_OK) };
    if rc != 0 {
        return Err(NavigateError::from_hop(io::Error::last_os_error(), name));
    }
    Ok(resolved)
}
