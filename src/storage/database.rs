//! Permission store engine.
//!
//! Maps a file's inode number to its [`PermissionRecord`]. The store file is
//! shared by every connection, so each public call takes the lock marker,
//! opens the file, performs exactly one operation and closes it again.

use log::{debug, info, warn};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::StoreError;
use crate::storage::lock::LockGuard;
use crate::storage::record::{
    MAGIC, PermissionRecord, SLOT_LEN, clear_key, decode_slot, encode_slot, slot_key,
};

/// Tunables of the store.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Skip dot-files during bulk import.
    pub ignore_hidden: bool,
    pub lock_retry_interval: Duration,
    pub lock_attempts: u32,
    /// Deletions after which the file is rewritten without free slots.
    pub compaction_threshold: u32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            ignore_hidden: true,
            lock_retry_interval: Duration::from_millis(10),
            lock_attempts: 200,
            compaction_threshold: 50,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PermissionStore {
    path: PathBuf,
    lock_path: PathBuf,
    options: StoreOptions,
    deleted_items: u32,
}

impl PermissionStore {
    /// Opens the store at `path`, creating an empty one if it does not exist.
    pub fn open(path: impl Into<PathBuf>, options: StoreOptions) -> Result<Self, StoreError> {
        let path = path.into();
        let mut lock_name = path.clone().into_os_string();
        lock_name.push("_lock");

        let store = Self {
            lock_path: PathBuf::from(lock_name),
            path,
            options,
            deleted_items: 0,
        };

        let _guard = store.lock()?;
        match OpenOptions::new().write(true).create_new(true).open(&store.path) {
            Ok(mut file) => {
                file.write_all(MAGIC).map_err(|e| store.write_error(e))?;
                file.sync_all().map_err(|e| store.write_error(e))?;
                info!("Created permission store {}", store.path.display());
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                store.read_all()?;
                info!("Opened permission store {}", store.path.display());
            }
            Err(e) => return Err(store.open_error(e)),
        }

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub fn set_ignore_hidden(&mut self, ignore: bool) {
        self.options.ignore_hidden = ignore;
    }

    /// Key under which `path` is stored: its inode number in decimal.
    ///
    /// Symlinks are followed, so a link shares its target's record.
    pub fn key_for(path: &Path) -> Result<String, StoreError> {
        fs::metadata(path)
            .map(|meta| meta.ino().to_string())
            .map_err(|_| StoreError::Key(path.display().to_string()))
    }

    /// Stores `record`, replacing any record of the same file.
    pub fn put(&self, record: &PermissionRecord) -> Result<(), StoreError> {
        let key = Self::key_for(Path::new(&record.name))?;
        let slot = encode_slot(&key, record);

        let _guard = self.lock()?;
        let mut file = self.open_rw()?;
        let data = self.read_from(&mut file)?;

        let offset = match find_slot(&data, &key) {
            Some(offset) => offset as u64,
            None => data.len() as u64,
        };
        file.seek(SeekFrom::Start(offset))
            .and_then(|_| file.write_all(&slot))
            .and_then(|_| file.sync_data())
            .map_err(|e| self.write_error(e))?;

        debug!("Stored record for {} under key {}", record.name, key);
        Ok(())
    }

    /// Fetches the record of `name`. A missing record is `StoreError::Key`.
    pub fn get(&self, name: &Path) -> Result<PermissionRecord, StoreError> {
        let key = Self::key_for(name)?;

        let _guard = self.lock()?;
        let data = self.read_all()?;

        let offset = find_slot(&data, &key).ok_or_else(|| StoreError::Key(name.display().to_string()))?;
        decode_slot(&data[offset..offset + SLOT_LEN]).map_err(|reason| self.corrupt(reason))
    }

    /// Removes the record of `name`. Crossing the compaction threshold
    /// rewrites the file; a failed rewrite is only logged.
    pub fn delete(&mut self, name: &Path) -> Result<(), StoreError> {
        let key = Self::key_for(name)?;

        let _guard = self.lock()?;
        let mut file = self.open_rw()?;
        let data = self.read_from(&mut file)?;

        let offset = find_slot(&data, &key).ok_or_else(|| StoreError::Key(name.display().to_string()))?;
        let mut slot = data[offset..offset + SLOT_LEN].to_vec();
        clear_key(&mut slot);
        file.seek(SeekFrom::Start(offset as u64))
            .and_then(|_| file.write_all(&slot))
            .and_then(|_| file.sync_data())
            .map_err(|e| self.write_error(e))?;
        drop(file);

        self.deleted_items += 1;
        if self.deleted_items >= self.options.compaction_threshold {
            match self.compact() {
                Ok(live) => info!("Compacted {} ({} live records)", self.path.display(), live),
                Err(e) => warn!("Compaction of {} failed: {}", self.path.display(), e),
            }
            self.deleted_items = 0;
        }

        debug!("Deleted record for {} (key {})", name.display(), key);
        Ok(())
    }

    /// Inserts a default-policy record for every entry of `dir` that has none
    /// yet. Existing records are never touched. Returns the number inserted.
    pub fn bulk_import(&self, dir: &Path) -> Result<usize, StoreError> {
        let entries = fs::read_dir(dir).map_err(|e| StoreError::Import {
            path: dir.display().to_string(),
            source: e,
        })?;

        let mut candidates = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == "." || name == ".." {
                continue;
            }
            if self.options.ignore_hidden && name.starts_with('.') {
                continue;
            }
            let full = entry.path();
            match Self::key_for(&full) {
                Ok(key) => candidates.push((key, full)),
                Err(_) => warn!("Skipping {} during import: cannot stat", full.display()),
            }
        }

        let _guard = self.lock()?;
        let mut file = self.open_rw()?;
        let data = self.read_from(&mut file)?;

        let mut known: HashSet<String> = live_slots(&data).filter_map(|(_, slot)| slot_key(slot)).collect();
        let mut batch = Vec::new();
        for (key, full) in candidates {
            if !known.insert(key.clone()) {
                continue;
            }
            let record = PermissionRecord::with_default_policy(full.display().to_string());
            batch.extend_from_slice(&encode_slot(&key, &record));
        }

        let inserted = batch.len() / SLOT_LEN;
        if inserted > 0 {
            file.seek(SeekFrom::End(0))
                .and_then(|_| file.write_all(&batch))
                .and_then(|_| file.sync_data())
                .map_err(|e| self.write_error(e))?;
        }

        info!("Imported {} new records from {}", inserted, dir.display());
        Ok(inserted)
    }

    /// All live records with their keys, in file order.
    pub fn records(&self) -> Result<Vec<(String, PermissionRecord)>, StoreError> {
        let _guard = self.lock()?;
        let data = self.read_all()?;

        live_slots(&data)
            .filter_map(|(_, slot)| slot_key(slot).map(|key| (key, slot)))
            .map(|(key, slot)| {
                decode_slot(slot)
                    .map(|record| (key, record))
                    .map_err(|reason| self.corrupt(reason))
            })
            .collect()
    }

    /// Rewrites the store without free slots. Caller holds the lock.
    fn compact(&self) -> Result<usize, StoreError> {
        let data = self.read_all()?;

        let mut out = Vec::with_capacity(data.len());
        out.extend_from_slice(MAGIC);
        let mut live = 0;
        for (_, slot) in live_slots(&data) {
            if slot_key(slot).is_some() {
                out.extend_from_slice(slot);
                live += 1;
            }
        }

        let mut tmp_name = self.path.clone().into_os_string();
        tmp_name.push(".compact");
        let tmp = PathBuf::from(tmp_name);
        fs::write(&tmp, &out)
            .and_then(|_| fs::rename(&tmp, &self.path))
            .map_err(|e| self.write_error(e))?;
        Ok(live)
    }

    fn lock(&self) -> Result<LockGuard, StoreError> {
        LockGuard::acquire(
            &self.lock_path,
            self.options.lock_retry_interval,
            self.options.lock_attempts,
        )
    }

    fn open_rw(&self) -> Result<File, StoreError> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| self.open_error(e))
    }

    fn read_all(&self) -> Result<Vec<u8>, StoreError> {
        let mut file = File::open(&self.path).map_err(|e| self.open_error(e))?;
        self.read_from(&mut file)
    }

    fn read_from(&self, file: &mut File) -> Result<Vec<u8>, StoreError> {
        let mut data = Vec::new();
        file.read_to_end(&mut data).map_err(|e| StoreError::Read {
            path: self.path.display().to_string(),
            source: e,
        })?;

        if data.len() < MAGIC.len() || &data[..MAGIC.len()] != MAGIC {
            return Err(self.corrupt("bad header".into()));
        }
        if (data.len() - MAGIC.len()) % SLOT_LEN != 0 {
            return Err(self.corrupt("truncated slot".into()));
        }
        Ok(data)
    }

    fn open_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Open {
            path: self.path.display().to_string(),
            source,
        }
    }

    fn write_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Write {
            path: self.path.display().to_string(),
            source,
        }
    }

    fn corrupt(&self, reason: String) -> StoreError {
        StoreError::Corrupt {
            path: self.path.display().to_string(),
            reason,
        }
    }
}

/// Slots of a validated store image with their byte offsets.
fn live_slots(data: &[u8]) -> impl Iterator<Item = (usize, &[u8])> {
    data[MAGIC.len()..]
        .chunks_exact(SLOT_LEN)
        .enumerate()
        .map(|(i, slot)| (MAGIC.len() + i * SLOT_LEN, slot))
}

fn find_slot(data: &[u8], key: &str) -> Option<usize> {
    live_slots(data)
        .find(|(_, slot)| slot_key(slot).as_deref() == Some(key))
        .map(|(offset, _)| offset)
}
