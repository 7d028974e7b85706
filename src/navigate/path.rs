//! Path splitting shared by navigation and the sharing-file loader.

use crate::error::NavigateError;

/// Token standing for the tree root at the start of an absolute path.
pub const ROOT_TOKEN: &str = "/";

/// Splits `path` into components. An absolute path yields a leading
/// [`ROOT_TOKEN`]; one trailing slash is allowed, any other empty
/// component is a syntax error.
pub fn split_path(path: &str) -> Result<Vec<String>, NavigateError> {
    if path.is_empty() {
        return Err(NavigateError::PathSyntax("empty path".into()));
    }

    let mut parts = Vec::new();
    let mut rest = path;
    if let Some(stripped) = rest.strip_prefix('/') {
        parts.push(ROOT_TOKEN.to_string());
        rest = stripped;
    }
    let rest = rest.strip_suffix('/').unwrap_or(rest);

    if rest.is_empty() {
        // Only "/" is allowed to be this short; "//" is not.
        if path.len() > 1 && parts.len() == 1 {
            return Err(NavigateError::PathSyntax(path.to_string()));
        }
        return Ok(parts);
    }

    for component in rest.split('/') {
        if component.is_empty() {
            return Err(NavigateError::PathSyntax(path.to_string()));
        }
        parts.push(component.to_string());
    }
    Ok(parts)
}

/// Splits `path` into its parent part and final name, both as given.
/// `"a/b/c"` gives `(Some("a/b"), "c")`, `"/c"` gives `(Some("/"), "c")`.
pub fn split_parent(path: &str) -> (Option<&str>, &str) {
    let trimmed = if path.len() > 1 { path.trim_end_matches('/') } else { path };
    match trimmed.rfind('/') {
        Some(0) if trimmed.len() > 1 => (Some("/"), &trimmed[1..]),
        Some(0) => (None, trimmed),
        Some(i) => (Some(&trimmed[..i]), &trimmed[i + 1..]),
        None => (None, trimmed),
    }
}
