//! Rights masks and the capability rule shared by tree nodes and store records.

use std::fmt;

/// Owner name used when nobody owns an entry.
pub const NO_OWNER: &str = "none";

/// Name recorded for anonymous sessions.
pub const ANONYMOUS: &str = "anonymous";

/// 2-bit combination of READ and WRITE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RightsMask(u8);

impl RightsMask {
    pub const NONE: RightsMask = RightsMask(0);
    pub const READ: RightsMask = RightsMask(1);
    pub const WRITE: RightsMask = RightsMask(2);
    pub const ALL: RightsMask = RightsMask(3);

    /// Accepts only the four defined values.
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0..=3 => Some(RightsMask(bits as u8)),
            _ => None,
        }
    }

    pub fn bits(self) -> u32 {
        u32::from(self.0)
    }

    pub fn contains(self, other: RightsMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for RightsMask {
    type Output = RightsMask;

    fn bitor(self, rhs: RightsMask) -> RightsMask {
        RightsMask(self.0 | rhs.0)
    }
}

impl fmt::Display for RightsMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = if self.contains(RightsMask::READ) { 'r' } else { '-' };
        let w = if self.contains(RightsMask::WRITE) { 'w' } else { '-' };
        write!(f, "{r}{w}")
    }
}

/// Identity on whose behalf an operation is evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    Anonymous,
    User(String),
}

impl Actor {
    /// Name compared against stored owners.
    pub fn name(&self) -> &str {
        match self {
            Actor::Anonymous => ANONYMOUS,
            Actor::User(name) => name,
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ownership and rights of one entry, wherever they were declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ownership {
    pub owner: String,
    pub owner_rights: RightsMask,
    pub others_rights: RightsMask,
}

impl Ownership {
    pub fn new(owner: impl Into<String>, owner_rights: RightsMask, others_rights: RightsMask) -> Self {
        Self {
            owner: owner.into(),
            owner_rights,
            others_rights,
        }
    }

    /// Policy substituted when the store has no record.
    pub fn default_policy() -> Self {
        Self::new(NO_OWNER, RightsMask::NONE, RightsMask::READ)
    }

    /// Actor holds `cap` iff it owns the entry and the owner rights grant it,
    /// or the others rights grant it.
    pub fn allows(&self, actor: &Actor, cap: RightsMask) -> bool {
        (actor.name() == self.owner && self.owner_rights.contains(cap))
            || self.others_rights.contains(cap)
    }
}
