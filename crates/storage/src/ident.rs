//! SQL identifier handling.

use crate::error::{Error, Result};

/// Returns `name` double-quoted, after checking it matches
/// `[A-Za-z_][A-Za-z0-9_]*`.
pub(crate) fn quoted(name: &str) -> Result<String> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(Error::InvalidIdentifier(name.to_owned()));
    }
    Ok(format!("\"{name}\""))
}
