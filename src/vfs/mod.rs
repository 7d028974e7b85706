//! Virtual filesystem
//!
//! Multiplexes the shared physical directories into one virtual tree and
//! decides, per path operation, whether the session's actor may do it.
//! Each connection owns one [`Vfs`]; only the permission store is shared.

pub mod file;
pub mod listing;
pub mod loader;
pub mod rights;
pub mod tree;

use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, NavigateError};
use crate::navigate::{NavigationState, Navigator, PhysicalDir, split_parent};
use crate::storage::{PermissionRecord, PermissionStore};

pub use file::VfsFile;
pub use listing::DirectoryListing;
pub use loader::ConfigLoader;
pub use rights::{ANONYMOUS, Actor, NO_OWNER, Ownership, RightsMask};
pub use tree::{NodeId, VirtualNode, VirtualTree};

pub struct Vfs {
    tree: VirtualTree,
    store: PermissionStore,
    state: NavigationState,
    listing: DirectoryListing,
    actor: Actor,
    ignore_hidden: bool,
}

impl Vfs {
    /// Session positioned at the root, acting anonymously until
    /// [`Vfs::set_actor`] is called.
    pub fn new(tree: VirtualTree, store: PermissionStore) -> Self {
        let ignore_hidden = store.options().ignore_hidden;
        Self {
            tree,
            store,
            state: NavigationState::root(),
            listing: DirectoryListing::new(),
            actor: Actor::Anonymous,
            ignore_hidden,
        }
    }

    pub fn set_actor(&mut self, actor: Actor) {
        self.actor = actor;
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn set_ignore_hidden(&mut self, ignore: bool) {
        self.ignore_hidden = ignore;
        self.store.set_ignore_hidden(ignore);
    }

    pub fn tree(&self) -> &VirtualTree {
        &self.tree
    }

    pub fn state(&self) -> &NavigationState {
        &self.state
    }

    fn navigator(&self) -> Navigator<'_> {
        Navigator::new(&self.tree, &self.store, &self.actor)
    }

    /// Moves the session. A failed walk leaves it where it was.
    pub fn change_dir(&mut self, path: &str) -> Result<(), NavigateError> {
        let next = self.navigator().change_dir(&self.state, path)?;
        self.state = next;
        self.listing.reset();
        Ok(())
    }

    pub fn current_virtual_dir(&self) -> String {
        self.state.virtual_dir(&self.tree)
    }

    /// `None` while at a virtual directory with no physical counterpart.
    pub fn current_physical_dir(&self) -> Option<PathBuf> {
        self.state.physical_dir(&self.tree).map(Path::to_path_buf)
    }

    /// Unchecked mapping; see [`Navigator::convert_to_physical_path`].
    pub fn convert_to_physical_path(&self, path: &str) -> Result<PathBuf, NavigateError> {
        self.navigator().convert_to_physical_path(&self.state, path)
    }

    /// Checked walk to the directory containing `path`, on a scratch state.
    fn resolve_entry<'p>(&self, path: &'p str) -> Result<(NavigationState, &'p str), NavigateError> {
        let (parent, name) = split_parent(path);
        if name.is_empty() || name.contains('/') {
            return Err(NavigateError::PathSyntax(path.to_string()));
        }
        let state = match parent {
            Some(dir) => self.navigator().change_dir(&self.state, dir)?,
            None => self.state.clone(),
        };
        Ok((state, name))
    }

    /// Physical path of the entry `path` names, through the checked walk.
    pub fn resolve_physical(&self, path: &str) -> Result<PathBuf, NavigateError> {
        let (state, name) = self.resolve_entry(path)?;
        let dir = state
            .physical_dir(&self.tree)
            .ok_or_else(|| NavigateError::NotFound(path.to_string()))?;
        Ok(dir.join(name))
    }

    /// Describes `path`. Missing records yield the default policy and are
    /// not created.
    pub fn get_file_info(&self, path: &str) -> Result<VfsFile, NavigateError> {
        if path == "/" {
            let root = self.tree.node(self.tree.root());
            return Ok(VfsFile::virtual_dir("/", root.ownership.clone()));
        }

        let (state, name) = self.resolve_entry(path)?;
        if name == "." || name == ".." {
            let target = self.navigator().change_dir(&state, name)?;
            return self.describe_location(&target);
        }

        if state.is_at_node() {
            if let Some(child) = self.tree.find_child(state.node, name) {
                let child = self.tree.node(child);
                return Ok(VfsFile::virtual_dir(name, child.ownership.clone()));
            }
        }

        let dir = state
            .physical_dir(&self.tree)
            .ok_or_else(|| NavigateError::NotFound(path.to_string()))?;
        let ownership = self.navigator().lookup(&dir.join(name))?;
        Ok(VfsFile::physical(name, dir, ownership))
    }

    fn describe_location(&self, state: &NavigationState) -> Result<VfsFile, NavigateError> {
        match &state.physical {
            PhysicalDir::AtNode => {
                let node = self.tree.node(state.node);
                Ok(VfsFile::virtual_dir(node.virtual_name.clone(), node.ownership.clone()))
            }
            PhysicalDir::Within(dir) => {
                let parent = dir.parent().unwrap_or(dir);
                let ownership = self.navigator().lookup(dir)?;
                Ok(VfsFile::physical(file::file_name_of(dir), parent, ownership))
            }
        }
    }

    /// Stores ownership for the entry at `path`, replacing any previous record.
    pub fn put_file_info(
        &self,
        path: &str,
        owner: &str,
        owner_rights: RightsMask,
        others_rights: RightsMask,
    ) -> Result<(), NavigateError> {
        let full = self.resolve_physical(path)?;
        self.put_record(&full, &Ownership::new(owner, owner_rights, others_rights))
    }

    pub fn delete_file_info(&mut self, path: &str) -> Result<(), NavigateError> {
        let full = self.resolve_physical(path)?;
        self.delete_record(&full)
    }

    /// Stores `ownership` for an already resolved physical path.
    pub fn put_record(&self, full: &Path, ownership: &Ownership) -> Result<(), NavigateError> {
        let record = PermissionRecord::new(
            ownership.owner.clone(),
            full.display().to_string(),
            ownership.owner_rights,
            ownership.others_rights,
        );
        self.store.put(&record)?;
        Ok(())
    }

    /// Removes the record of an already resolved physical path.
    pub fn delete_record(&mut self, full: &Path) -> Result<(), NavigateError> {
        self.store.delete(full)?;
        Ok(())
    }

    /// Whether the actor may create entries in `dir`. Unresolvable
    /// directories and missing records both answer `false`; only store
    /// failures are errors.
    pub fn allowed_to_write_to_dir(&self, dir: &str) -> Result<bool, NavigateError> {
        let write = RightsMask::WRITE;
        if dir == "/" {
            return Ok(self.tree.node(self.tree.root()).allows(&self.actor, write));
        }
        if dir == "." {
            return self.write_allowed_at(&self.state);
        }

        let (state, name) = match self.resolve_entry(dir) {
            Ok(found) => found,
            Err(NavigateError::Store(e)) => return Err(NavigateError::Store(e)),
            Err(_) => return Ok(false),
        };

        if name == "." || name == ".." {
            return match self.navigator().change_dir(&state, name) {
                Ok(target) => self.write_allowed_at(&target),
                Err(NavigateError::Store(e)) => Err(NavigateError::Store(e)),
                Err(_) => Ok(false),
            };
        }

        if state.is_at_node() {
            if let Some(child) = self.tree.find_child(state.node, name) {
                let child = self.tree.node(child);
                return Ok(child.is_bound() && child.allows(&self.actor, write));
            }
        }

        match state.physical_dir(&self.tree) {
            Some(parent) => self.write_allowed_by_record(&parent.join(name)),
            None => Ok(false),
        }
    }

    /// WRITE at a resolved location. Unbound nodes have nowhere to write to.
    fn write_allowed_at(&self, state: &NavigationState) -> Result<bool, NavigateError> {
        match &state.physical {
            PhysicalDir::AtNode => {
                let node = self.tree.node(state.node);
                Ok(node.is_bound() && node.allows(&self.actor, RightsMask::WRITE))
            }
            PhysicalDir::Within(current) => self.write_allowed_by_record(current),
        }
    }

    fn write_allowed_by_record(&self, path: &Path) -> Result<bool, NavigateError> {
        match self.store.get(path) {
            Ok(record) => Ok(record.ownership().allows(&self.actor, RightsMask::WRITE)),
            Err(e) if e.is_key() => Ok(false),
            Err(e) => Err(NavigateError::Store(e)),
        }
    }

    pub fn is_file(&self, path: &str) -> bool {
        self.resolve_physical(path)
            .ok()
            .and_then(|full| fs::metadata(full).ok())
            .is_some_and(|meta| meta.is_file())
    }

    pub fn is_dir(&self, path: &str) -> bool {
        if path == "/" || path == "." {
            return true;
        }
        let Ok((state, name)) = self.resolve_entry(path) else {
            return false;
        };
        if state.is_at_node() && self.tree.find_child(state.node, name).is_some() {
            return true;
        }
        state
            .physical_dir(&self.tree)
            .and_then(|dir| fs::metadata(dir.join(name)).ok())
            .is_some_and(|meta| meta.is_dir())
    }

    /// All entries of the directory at `path`, leaving the session's own
    /// enumeration untouched.
    pub fn list(&self, path: &str) -> Result<Vec<VfsFile>, NavigateError> {
        let nav = self.navigator();
        let state = nav.change_dir(&self.state, path)?;
        let mut listing = DirectoryListing::new();
        let mut files = Vec::new();
        while let Some(file) = listing.next_file(&nav, &state, self.ignore_hidden)? {
            files.push(file);
        }
        Ok(files)
    }

    /// Next entry of the current directory; `None` once exhausted, after
    /// which enumeration starts over.
    pub fn next_file(&mut self) -> Result<Option<VfsFile>, NavigateError> {
        let nav = Navigator::new(&self.tree, &self.store, &self.actor);
        self.listing.next_file(&nav, &self.state, self.ignore_hidden)
    }

    pub fn reset_files(&mut self) {
        self.listing.reset();
    }

    /// Replaces the tree with one parsed from `path`. A parse failure keeps
    /// the current tree. The session then re-enters its previous virtual
    /// directory if it still exists, else the root.
    pub fn reload_config_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let tree = ConfigLoader::load(path)?;
        let previous = self.current_virtual_dir();

        self.tree = tree;
        self.state = NavigationState::root();
        self.listing.reset();

        if let Err(e) = self.change_dir(&previous) {
            warn!("{} is gone after reload ({}); back at /", previous, e);
        }
        info!("Reloaded sharing from {}", path.display());
        Ok(())
    }

    /// Adds default-policy records for the entries of the directory at
    /// virtual `path` that have none. Returns the number added.
    pub fn import_directory(&self, path: &str) -> Result<usize, NavigateError> {
        let state = self.navigator().change_dir(&self.state, path)?;
        let dir = state
            .physical_dir(&self.tree)
            .ok_or_else(|| NavigateError::NotFound(path.to_string()))?;
        Ok(self.store.bulk_import(dir)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoreOptions;
    use tempfile::TempDir;

    struct Fixture {
        tmp: TempDir,
        base: PathBuf,
        vfs: Vfs,
    }

    fn write_shares(base: &Path, extra: &str) -> PathBuf {
        let shares = base.join("shares.conf");
        let text = format!(
            "{root}\n{films} /films alice 3 1\n{upload} /pub/upload none 0 3\n{extra}",
            root = base.join("root").display(),
            films = base.join("films").display(),
            upload = base.join("upload").display(),
        );
        fs::write(&shares, text).unwrap();
        shares
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().canonicalize().unwrap();
        for dir in ["root", "films/sub", "upload", "spare"] {
            fs::create_dir_all(base.join(dir)).unwrap();
        }
        fs::write(base.join("films/a.mp4"), b"aaaa").unwrap();
        fs::write(base.join("films/.hidden"), b"h").unwrap();

        let tree = ConfigLoader::load(&write_shares(&base, "")).unwrap();
        let store = PermissionStore::open(base.join("perms.db"), StoreOptions::default()).unwrap();
        let mut vfs = Vfs::new(tree, store);
        vfs.set_actor(Actor::User("bob".into()));
        Fixture { tmp, base, vfs }
    }

    #[test]
    fn listing_merges_virtual_and_physical_entries() {
        let mut f = fixture();
        f.vfs.change_dir("/films").unwrap();

        let mut names = Vec::new();
        while let Some(file) = f.vfs.next_file().unwrap() {
            names.push(file.name);
        }
        names.sort();
        assert_eq!(names, vec!["a.mp4", "sub"]);

        // Exhaustion restarts the enumeration.
        assert!(f.vfs.next_file().unwrap().is_some());
    }

    #[test]
    fn root_lists_virtual_children_newest_first() {
        let mut f = fixture();
        let first = f.vfs.next_file().unwrap().unwrap();
        let second = f.vfs.next_file().unwrap().unwrap();
        assert_eq!((first.name.as_str(), second.name.as_str()), ("pub", "films"));
        assert!(first.is_virtual());
        assert_eq!(second.ownership.owner, "alice");
        assert!(f.vfs.next_file().unwrap().is_none());
    }

    #[test]
    fn hidden_entries_follow_the_setting() {
        let mut f = fixture();
        f.vfs.set_ignore_hidden(false);
        f.vfs.change_dir("/films").unwrap();
        let mut names = Vec::new();
        while let Some(file) = f.vfs.next_file().unwrap() {
            names.push(file.name);
        }
        assert!(names.contains(&".hidden".to_string()));
    }

    #[test]
    fn file_info_defaults_without_writing() {
        let f = fixture();
        let before = fs::read(f.base.join("perms.db")).unwrap();

        let info = f.vfs.get_file_info("/films/a.mp4").unwrap();
        assert_eq!(info.ownership, Ownership::default_policy());
        assert_eq!(info.full_path(), Some(f.base.join("films/a.mp4")));
        assert_eq!(fs::read(f.base.join("perms.db")).unwrap(), before);

        let films = f.vfs.get_file_info("/films").unwrap();
        assert!(films.is_virtual());
        assert_eq!(films.ownership.owner, "alice");
    }

    #[test]
    fn put_then_delete_file_info() {
        let mut f = fixture();
        f.vfs.change_dir("/films").unwrap();
        f.vfs
            .put_file_info("a.mp4", "bob", RightsMask::ALL, RightsMask::NONE)
            .unwrap();

        let info = f.vfs.get_file_info("/films/a.mp4").unwrap();
        assert_eq!(info.ownership, Ownership::new("bob", RightsMask::ALL, RightsMask::NONE));

        f.vfs.delete_file_info("a.mp4").unwrap();
        assert!(matches!(
            f.vfs.delete_file_info("a.mp4"),
            Err(NavigateError::Store(e)) if e.is_key()
        ));
    }

    #[test]
    fn write_checks_fail_closed() {
        let mut f = fixture();
        assert!(!f.vfs.allowed_to_write_to_dir("/").unwrap());
        assert!(!f.vfs.allowed_to_write_to_dir("films").unwrap());
        assert!(f.vfs.allowed_to_write_to_dir("/pub/upload").unwrap());
        // "pub" is an unbound intermediate node.
        assert!(!f.vfs.allowed_to_write_to_dir("pub").unwrap());
        assert!(!f.vfs.allowed_to_write_to_dir("/nowhere/x").unwrap());

        f.vfs.change_dir("/films").unwrap();
        assert!(!f.vfs.allowed_to_write_to_dir("sub").unwrap());
        f.vfs
            .put_file_info("sub", "bob", RightsMask::ALL, RightsMask::NONE)
            .unwrap();
        assert!(f.vfs.allowed_to_write_to_dir("sub").unwrap());
        assert!(f.vfs.allowed_to_write_to_dir("/films/sub").unwrap());

        f.vfs.change_dir("sub").unwrap();
        assert!(f.vfs.allowed_to_write_to_dir(".").unwrap());
    }

    #[test]
    fn parent_components_are_walked_before_write_check() {
        let mut f = fixture();
        // A record on the directory above every share must not count.
        f.vfs
            .put_record(&f.base, &Ownership::new("bob", RightsMask::ALL, RightsMask::ALL))
            .unwrap();
        f.vfs.change_dir("/films").unwrap();
        assert!(!f.vfs.allowed_to_write_to_dir("..").unwrap());

        f.vfs.set_actor(Actor::User("alice".into()));
        f.vfs.change_dir("sub").unwrap();
        assert!(f.vfs.allowed_to_write_to_dir("..").unwrap());
        assert!(f.vfs.allowed_to_write_to_dir("/films/sub/..").unwrap());

        // "/pub" is unbound even though its line grants everyone write.
        f.vfs.change_dir("/pub/upload").unwrap();
        assert!(!f.vfs.allowed_to_write_to_dir("..").unwrap());
    }

    #[test]
    fn file_and_dir_probes() {
        let f = fixture();
        assert!(f.vfs.is_dir("/"));
        assert!(f.vfs.is_dir("films"));
        assert!(f.vfs.is_dir("/films/sub/"));
        assert!(!f.vfs.is_dir("/films/a.mp4"));
        assert!(f.vfs.is_file("/films/a.mp4"));
        assert!(!f.vfs.is_file("/films/sub"));
        assert!(!f.vfs.is_file("/films/missing"));
    }

    #[test]
    fn reload_keeps_or_resets_position() {
        let mut f = fixture();
        f.vfs.change_dir("/films/sub").unwrap();

        let shares = write_shares(&f.base, &format!("{} /spare none 0 1\n", f.base.join("spare").display()));
        f.vfs.reload_config_file(&shares).unwrap();
        assert_eq!(f.vfs.current_virtual_dir(), "/films/sub");
        assert!(f.vfs.change_dir("/spare").is_ok());

        let narrowed = f.tmp.path().join("narrow.conf");
        fs::write(&narrowed, format!("{}\n", f.base.join("root").display())).unwrap();
        f.vfs.reload_config_file(&narrowed).unwrap();
        assert_eq!(f.vfs.current_virtual_dir(), "/");

        let broken = f.tmp.path().join("broken.conf");
        fs::write(&broken, "relative\n").unwrap();
        assert!(f.vfs.reload_config_file(&broken).is_err());
        assert_eq!(f.vfs.tree().len(), 1);
    }

    #[test]
    fn listing_other_directory_keeps_position() {
        let mut f = fixture();
        f.vfs.change_dir("/films").unwrap();
        let first = f.vfs.next_file().unwrap().unwrap();

        let sub = f.vfs.list("/").unwrap();
        assert_eq!(sub.len(), 2);
        assert_eq!(f.vfs.current_virtual_dir(), "/films");

        let second = f.vfs.next_file().unwrap().unwrap();
        assert_ne!(first.name, second.name);
    }

    #[test]
    fn import_fills_missing_records() {
        let f = fixture();
        let added = f.vfs.import_directory("/films").unwrap();
        assert_eq!(added, 2);
        assert_eq!(f.vfs.import_directory("/films").unwrap(), 0);
    }
}
