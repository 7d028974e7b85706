//! Fixed-width record layout of the permission store.
//!
//! A store file is the 8-byte [`MAGIC`] followed by [`SLOT_LEN`]-byte slots:
//!
//! | offset | len | field                                        |
//! |--------|-----|----------------------------------------------|
//! | 0      | 24  | key: decimal inode, NUL padded (zero = free) |
//! | 24     | 20  | owner, UTF-8, NUL padded                     |
//! | 44     | 256 | name (full physical path), UTF-8, NUL padded |
//! | 300    | 4   | owner rights, u32 LE                         |
//! | 304    | 4   | others rights, u32 LE                        |
//!
//! Text fields keep at least one trailing NUL: longer values are cut on a
//! char boundary, never spilled into the next field.

use crate::vfs::rights::{Ownership, RightsMask};

pub const MAGIC: &[u8; 8] = b"RAXPDB01";

pub const KEY_LEN: usize = 24;
pub const MAX_OWNER_LEN: usize = 20;
pub const MAX_NAME_LEN: usize = 256;

const OWNER_AT: usize = KEY_LEN;
const NAME_AT: usize = OWNER_AT + MAX_OWNER_LEN;
const OWNER_RIGHTS_AT: usize = NAME_AT + MAX_NAME_LEN;
const OTHERS_RIGHTS_AT: usize = OWNER_RIGHTS_AT + 4;

pub const SLOT_LEN: usize = OTHERS_RIGHTS_AT + 4;

/// Persisted ownership metadata for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRecord {
    pub owner: String,
    pub name: String,
    pub owner_rights: RightsMask,
    pub others_rights: RightsMask,
}

impl PermissionRecord {
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        owner_rights: RightsMask,
        others_rights: RightsMask,
    ) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            owner_rights,
            others_rights,
        }
    }

    /// Record carrying the default policy for `name`.
    pub fn with_default_policy(name: impl Into<String>) -> Self {
        let policy = Ownership::default_policy();
        Self::new(policy.owner, name, policy.owner_rights, policy.others_rights)
    }

    pub fn ownership(&self) -> Ownership {
        Ownership::new(self.owner.clone(), self.owner_rights, self.others_rights)
    }

    /// The record exactly as it would read back after a store round trip.
    pub fn truncated(&self) -> Self {
        Self {
            owner: truncate_utf8(&self.owner, MAX_OWNER_LEN - 1).to_string(),
            name: truncate_utf8(&self.name, MAX_NAME_LEN - 1).to_string(),
            ..self.clone()
        }
    }
}

/// Encodes `record` under `key` into one slot.
pub fn encode_slot(key: &str, record: &PermissionRecord) -> [u8; SLOT_LEN] {
    let mut slot = [0u8; SLOT_LEN];
    put_text(&mut slot[..KEY_LEN], key);
    put_text(&mut slot[OWNER_AT..NAME_AT], &record.owner);
    put_text(&mut slot[NAME_AT..OWNER_RIGHTS_AT], &record.name);
    slot[OWNER_RIGHTS_AT..OTHERS_RIGHTS_AT].copy_from_slice(&record.owner_rights.bits().to_le_bytes());
    slot[OTHERS_RIGHTS_AT..SLOT_LEN].copy_from_slice(&record.others_rights.bits().to_le_bytes());
    slot
}

/// Key stored in a slot, `None` for a free slot.
pub fn slot_key(slot: &[u8]) -> Option<String> {
    let key = get_text(&slot[..KEY_LEN]);
    if key.is_empty() { None } else { Some(key) }
}

/// Decodes the record part of a slot.
pub fn decode_slot(slot: &[u8]) -> Result<PermissionRecord, String> {
    if slot.len() != SLOT_LEN {
        return Err(format!("slot is {} bytes, expected {}", slot.len(), SLOT_LEN));
    }
    let owner_rights = read_rights(&slot[OWNER_RIGHTS_AT..OTHERS_RIGHTS_AT])?;
    let others_rights = read_rights(&slot[OTHERS_RIGHTS_AT..SLOT_LEN])?;
    Ok(PermissionRecord {
        owner: get_text(&slot[OWNER_AT..NAME_AT]),
        name: get_text(&slot[NAME_AT..OWNER_RIGHTS_AT]),
        owner_rights,
        others_rights,
    })
}

/// Overwrites the key so the slot reads as free.
pub fn clear_key(slot: &mut [u8]) {
    slot[..KEY_LEN].fill(0);
}

fn read_rights(bytes: &[u8]) -> Result<RightsMask, String> {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(bytes);
    let value = u32::from_le_bytes(raw);
    RightsMask::from_bits(value).ok_or_else(|| format!("rights value {value} out of range"))
}

fn put_text(field: &mut [u8], value: &str) {
    let value = truncate_utf8(value, field.len() - 1);
    field[..value.len()].copy_from_slice(value.as_bytes());
}

fn get_text(field: &[u8]) -> String {
    let end = field.iter().position(|b| *b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

fn truncate_utf8(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}
