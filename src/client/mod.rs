//! Client management system
//!
//! Handles client connections, session state and the session lifecycle.

pub mod handler;
pub mod state;

pub use handler::{ClientRegistry, handle_client};
pub use state::{RenameSource, Session};
