use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use rax_vfs_server::error::NavigateError;
use rax_vfs_server::storage::{PermissionRecord, PermissionStore, StoreOptions};
use rax_vfs_server::vfs::{Actor, ConfigLoader, Ownership, RightsMask, Vfs};

struct Share {
    _tmp: TempDir,
    base: PathBuf,
}

impl Share {
    fn db(&self) -> PathBuf {
        self.base.join("perms.db")
    }

    fn vfs(&self, actor: Actor) -> Vfs {
        let tree = ConfigLoader::load(&self.base.join("shares.conf")).unwrap();
        let store = PermissionStore::open(self.db(), StoreOptions::default()).unwrap();
        let mut vfs = Vfs::new(tree, store);
        vfs.set_actor(actor);
        vfs
    }
}

/// root/ shared as "/", films/ as "/films" (alice, others read) and
/// incoming/ as "/pub" (anonymous read+write). A link inside films points
/// at a directory outside every share.
fn share() -> Share {
    share_with_pub("none 0 3")
}

fn share_with_pub(pub_rights: &str) -> Share {
    let tmp = TempDir::new().unwrap();
    let base = tmp.path().canonicalize().unwrap();
    for dir in ["root", "films/subdir", "incoming", "outside"] {
        fs::create_dir_all(base.join(dir)).unwrap();
    }
    fs::write(base.join("outside/secret"), b"s").unwrap();
    fs::write(base.join("films/movie.mp4"), b"frames").unwrap();
    symlink(base.join("outside"), base.join("films/evil")).unwrap();

    fs::write(
        base.join("shares.conf"),
        format!(
            "{root}\n{films} /films alice 3 1\n{incoming} /pub {pub_rights}\n",
            root = base.join("root").display(),
            films = base.join("films").display(),
            incoming = base.join("incoming").display(),
        ),
    )
    .unwrap();
    Share { _tmp: tmp, base }
}

fn db_bytes(path: &Path) -> Vec<u8> {
    fs::read(path).unwrap()
}

#[test]
fn link_out_of_share_is_refused_and_position_kept() {
    let s = share();
    let mut vfs = s.vfs(Actor::User("bob".into()));
    vfs.change_dir("/films").unwrap();

    let err = vfs.change_dir("evil").unwrap_err();
    assert!(matches!(err, NavigateError::LinkEscape(_)));
    assert_eq!(vfs.current_virtual_dir(), "/films");
    assert_eq!(vfs.current_physical_dir(), Some(s.base.join("films")));

    assert!(matches!(
        vfs.change_dir("/films/evil/secret"),
        Err(NavigateError::LinkEscape(_))
    ));
}

#[test]
fn walks_into_physical_subdirectory() {
    let s = share();
    let mut vfs = s.vfs(Actor::User("bob".into()));

    vfs.change_dir("/films/subdir").unwrap();
    assert_eq!(vfs.current_virtual_dir(), "/films/subdir");
    assert_eq!(vfs.current_physical_dir(), Some(s.base.join("films/subdir")));

    vfs.change_dir("..").unwrap();
    assert_eq!(vfs.current_virtual_dir(), "/films");
}

#[test]
fn file_info_of_unrecorded_file_does_not_touch_store() {
    let s = share();
    let vfs = s.vfs(Actor::Anonymous);
    let before = db_bytes(&s.db());

    let info = vfs.get_file_info("/films/movie.mp4").unwrap();
    assert_eq!(info.ownership, Ownership::default_policy());
    assert!(info.allows(&Actor::Anonymous, RightsMask::READ));
    assert!(!info.allows(&Actor::Anonymous, RightsMask::WRITE));

    assert_eq!(db_bytes(&s.db()), before);
}

#[test]
fn anonymous_upload_area() {
    let s = share();
    let mut vfs = s.vfs(Actor::Anonymous);

    vfs.change_dir("/pub").unwrap();
    // "/" itself carries the default policy: readable, never writable.
    assert!(!vfs.allowed_to_write_to_dir("/").unwrap());
    assert!(vfs.allowed_to_write_to_dir(".").unwrap());
    assert!(vfs.allowed_to_write_to_dir("/pub").unwrap());

    fs::write(s.base.join("incoming/upload.bin"), b"data").unwrap();
    vfs.put_file_info("upload.bin", "anonymous", RightsMask::ALL, RightsMask::READ)
        .unwrap();

    let info = vfs.get_file_info("/pub/upload.bin").unwrap();
    assert_eq!(info.ownership.owner, "anonymous");
    assert_eq!(info.ownership.owner_rights, RightsMask::ALL);
    assert_eq!(info.ownership.others_rights, RightsMask::READ);

    // Another user only gets the others' rights.
    let bob = s.vfs(Actor::User("bob".into()));
    let seen = bob.get_file_info("/pub/upload.bin").unwrap();
    assert!(!seen.allows(&Actor::User("bob".into()), RightsMask::WRITE));
}

#[test]
fn read_only_pub_keeps_stored_rights_exactly() {
    let s = share_with_pub("none 0 1");
    let mut vfs = s.vfs(Actor::Anonymous);

    vfs.change_dir("/pub").unwrap();
    assert_eq!(vfs.current_virtual_dir(), "/pub");
    assert!(!vfs.allowed_to_write_to_dir("/pub").unwrap());
    assert!(!vfs.allowed_to_write_to_dir(".").unwrap());

    fs::write(s.base.join("incoming/report.pdf"), b"pdf").unwrap();
    vfs.put_file_info("report.pdf", "anonymous", RightsMask::ALL, RightsMask::NONE)
        .unwrap();

    let info = vfs.get_file_info("/pub/report.pdf").unwrap();
    assert_eq!(
        info.ownership,
        Ownership::new("anonymous", RightsMask::ALL, RightsMask::NONE)
    );
    assert!(info.allows(&Actor::Anonymous, RightsMask::WRITE));
    assert!(!info.allows(&Actor::User("bob".into()), RightsMask::READ));
}

#[test]
fn bulk_import_keeps_existing_records() {
    let s = share();
    let store = PermissionStore::open(s.db(), StoreOptions::default()).unwrap();
    let movie = s.base.join("films/movie.mp4");
    store
        .put(&PermissionRecord::new(
            "alice",
            movie.display().to_string(),
            RightsMask::ALL,
            RightsMask::NONE,
        ))
        .unwrap();

    let vfs = s.vfs(Actor::User("alice".into()));
    let added = vfs.import_directory("/films").unwrap();
    // subdir and the link; movie.mp4 already had a record.
    assert_eq!(added, 2);

    let record = store.get(&movie).unwrap();
    assert_eq!(record.owner, "alice");
    assert_eq!(record.others_rights, RightsMask::NONE);
    assert!(!vfs
        .get_file_info("/films/movie.mp4")
        .unwrap()
        .allows(&Actor::User("bob".into()), RightsMask::READ));
}

#[test]
fn private_directory_blocks_others() {
    let s = share();
    let alice = s.vfs(Actor::User("alice".into()));
    alice
        .put_file_info("/films/subdir", "alice", RightsMask::ALL, RightsMask::NONE)
        .unwrap();

    let mut bob = s.vfs(Actor::User("bob".into()));
    assert!(matches!(
        bob.change_dir("/films/subdir"),
        Err(NavigateError::PermissionDenied(_))
    ));
    assert_eq!(bob.current_virtual_dir(), "/");

    let mut alice = alice;
    alice.change_dir("/films/subdir").unwrap();
}
