//! Restartable enumeration of the current directory.
//!
//! Virtual children of the current node come first, most recently declared
//! first, then the entries of the physical directory in readdir order.

use std::fs::{self, ReadDir};
use std::path::PathBuf;

use crate::error::NavigateError;
use crate::navigate::{NavigationState, Navigator, PhysicalDir};
use crate::vfs::file::VfsFile;

#[derive(Debug, Default)]
pub struct DirectoryListing {
    started: bool,
    virtual_children: Vec<VfsFile>,
    dir: Option<PathBuf>,
    entries: Option<ReadDir>,
}

impl DirectoryListing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops the open directory handle; the next call starts over.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn next_file(
        &mut self,
        nav: &Navigator<'_>,
        state: &NavigationState,
        ignore_hidden: bool,
    ) -> Result<Option<VfsFile>, NavigateError> {
        if !self.started {
            self.start(nav, state)?;
        }

        if let Some(child) = self.virtual_children.pop() {
            return Ok(Some(child));
        }

        if let (Some(entries), Some(dir)) = (self.entries.as_mut(), self.dir.as_ref()) {
            for entry in entries {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().into_owned();
                if name == "." || name == ".." || (ignore_hidden && name.starts_with('.')) {
                    continue;
                }
                let ownership = nav.lookup(&dir.join(&name))?;
                return Ok(Some(VfsFile::physical(name, dir.clone(), ownership)));
            }
        }

        self.reset();
        Ok(None)
    }

    fn start(&mut self, nav: &Navigator<'_>, state: &NavigationState) -> Result<(), NavigateError> {
        self.started = true;
        match &state.physical {
            PhysicalDir::AtNode => {
                let node = nav.tree.node(state.node);
                self.virtual_children = node
                    .children()
                    .iter()
                    .map(|id| {
                        let child = nav.tree.node(*id);
                        VfsFile::virtual_dir(child.virtual_name.clone(), child.ownership.clone())
                    })
                    .collect();
                // A mount whose directory vanished still lists its virtual children.
                if let Some(dir) = node.physical() {
                    self.entries = fs::read_dir(dir).ok();
                    self.dir = Some(dir.to_path_buf());
                }
            }
            PhysicalDir::Within(dir) => {
                let name = dir.display().to_string();
                self.entries = Some(fs::read_dir(dir).map_err(|e| NavigateError::from_hop(e, &name))?);
                self.dir = Some(dir.clone());
            }
        }
        Ok(())
    }
}
