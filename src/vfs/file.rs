//! A directory entry as seen through the virtual filesystem.

use chrono::{DateTime, Local};
use std::fs;
use std::io;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use crate::vfs::rights::{Actor, Ownership, RightsMask};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VfsFile {
    pub name: String,
    /// Containing physical directory; `None` for a virtual directory.
    pub dir: Option<PathBuf>,
    pub ownership: Ownership,
}

impl VfsFile {
    pub fn physical(name: impl Into<String>, dir: impl Into<PathBuf>, ownership: Ownership) -> Self {
        Self {
            name: name.into(),
            dir: Some(dir.into()),
            ownership,
        }
    }

    pub fn virtual_dir(name: impl Into<String>, ownership: Ownership) -> Self {
        Self {
            name: name.into(),
            dir: None,
            ownership,
        }
    }

    pub fn is_virtual(&self) -> bool {
        self.dir.is_none()
    }

    /// Full physical path, `None` for a virtual directory.
    pub fn full_path(&self) -> Option<PathBuf> {
        self.dir.as_ref().map(|dir| dir.join(&self.name))
    }

    pub fn allows(&self, actor: &Actor, cap: RightsMask) -> bool {
        self.ownership.allows(actor, cap)
    }

    pub fn is_regular_file(&self) -> bool {
        self.full_path()
            .and_then(|path| fs::metadata(path).ok())
            .is_some_and(|meta| meta.is_file())
    }

    /// `ls -l` style line without a line terminator.
    pub fn ls_line(&self) -> io::Result<String> {
        let Some(path) = self.full_path() else {
            return Ok(format!(
                "drwxrwxrwx {:>4} {:<9}{:>12} Jan 01 01:00 {}",
                1, self.ownership.owner, 1024, self.name
            ));
        };

        let meta = fs::metadata(&path)?;
        let modified: DateTime<Local> = meta.modified()?.into();
        Ok(format!(
            "{} {:>4} {:<9}{:>12} {} {}",
            mode_string(&meta),
            meta.nlink(),
            self.ownership.owner,
            meta.len(),
            modified.format("%b %d %H:%M"),
            self.name
        ))
    }
}

fn mode_string(meta: &fs::Metadata) -> String {
    let mode = meta.permissions().mode();
    let mut out = String::with_capacity(10);
    out.push(if meta.is_dir() { 'd' } else { '-' });
    for shift in [6, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}

/// Name component of `path` as a string, empty for `/`.
pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
