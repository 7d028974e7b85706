//! Authentication validator
//!
//! Implements FTP user authentication logic, including username and password validation.
//! Uses a static in-memory credential store for demonstration purposes.

use super::credentials::{CREDENTIALS, is_anonymous_login};
use crate::config::StartupConfig;
use crate::error::AuthError;
use crate::vfs::{Actor, NO_OWNER};

/// Performs basic input sanitation to check for malicious or malformed usernames/passwords.
fn is_valid_input(input: &str, max_length: usize) -> bool {
    !input.trim().is_empty() && input.len() <= max_length && !input.contains(['\r', '\n', '\0'])
}

/// Validates that the given username may log in.
pub fn validate_user(username: &str, config: &StartupConfig) -> Result<(), AuthError> {
    if !is_valid_input(username, config.max_username_length) {
        return Err(AuthError::MalformedInput("Invalid username format".into()));
    }

    if is_anonymous_login(username) {
        return if config.anonymous_allowed {
            Ok(())
        } else {
            Err(AuthError::AnonymousDisabled)
        };
    }

    // Check for invalid username characters/format; "none" marks unowned files
    if username.contains(['@', '#', ',', '%', '/'])
        || username.starts_with(char::is_numeric)
        || username == NO_OWNER
    {
        return Err(AuthError::InvalidUsername(username.to_string()));
    }

    if CREDENTIALS.contains_key(username) {
        Ok(())
    } else {
        Err(AuthError::UserNotFound(username.to_string()))
    }
}

/// Validates the password and returns the actor the session will act as.
/// Anonymous logins accept any password (conventionally an e-mail address).
pub fn validate_password(
    username: &str,
    password: &str,
    config: &StartupConfig,
) -> Result<Actor, AuthError> {
    if is_anonymous_login(username) {
        return if config.anonymous_allowed {
            Ok(Actor::Anonymous)
        } else {
            Err(AuthError::AnonymousDisabled)
        };
    }

    if !is_valid_input(password, config.max_username_length) {
        return Err(AuthError::MalformedInput("Invalid password format".into()));
    }

    match CREDENTIALS.get(username) {
        Some(stored) if stored == &password => Ok(Actor::User(username.to_string())),
        Some(_) => Err(AuthError::InvalidPassword(username.to_string())),
        None => Err(AuthError::UserNotFound(username.to_string())),
    }
}
