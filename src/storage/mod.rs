//! Permission storage
//!
//! Persistent map from a file's inode to its owner and rights.

pub mod database;
pub mod lock;
pub mod record;

pub use database::{PermissionStore, StoreOptions};
pub use record::PermissionRecord;
