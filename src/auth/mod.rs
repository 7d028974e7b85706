//! Authentication system
//!
//! Maps USER/PASS pairs onto the actor the virtual filesystem evaluates
//! rights for.

pub mod credentials;
pub mod validator;

pub use validator::{validate_password, validate_user};
