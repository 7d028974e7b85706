//! Navigate module
//!
//! Tracks where a client is as a (tree node, physical directory) pair and
//! moves it along virtual and physical paths.

pub mod operations;
pub mod path;
pub mod state;

pub use operations::{Navigator, enter_dir};
pub use path::{split_parent, split_path};
pub use state::{NavigationState, PhysicalDir};
