//! Server core functionality
//!
//! This module contains the listener, the per-connection authentication
//! phase and the hand-off to the session handler.

pub mod core;

pub use core::Server;
