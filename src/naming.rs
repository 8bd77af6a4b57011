//! Container and blob name validation.
//!
//! Container rules:
//! - 3-63 characters long
//! - Only lowercase letters, numbers and hyphens
//! - Must begin and end with a letter or number
//! - No two consecutive hyphens
//! - `$root` and `$logs` are reserved names and always valid
//!
//! Blob rules:
//! - 1-1024 characters long
//! - At most 254 path segments
//! - Must not end with `/`, `\` or `.`

use crate::errors::{CopyError, NameKind};

const MIN_CONTAINER_NAME_LEN: usize = 3;
const MAX_CONTAINER_NAME_LEN: usize = 63;
const MAX_BLOB_NAME_LEN: usize = 1024;
const MAX_BLOB_PATH_SEGMENTS: usize = 254;

const RESERVED_CONTAINERS: &[&str] = &["$root", "$logs"];

fn invalid(kind: NameKind, name: &str, rule: &str) -> CopyError {
    CopyError::InvalidName {
        kind,
        name: name.to_string(),
        rule: rule.to_string(),
    }
}

/// Validate that a container name conforms to the service naming rules.
pub fn validate_container_name(name: &str) -> Result<(), CopyError> {
    if RESERVED_CONTAINERS.contains(&name) {
        return Ok(());
    }

    let len = name.chars().count();
    if !(MIN_CONTAINER_NAME_LEN..=MAX_CONTAINER_NAME_LEN).contains(&len) {
        return Err(invalid(
            NameKind::Container,
            name,
            "must be 3-63 characters long",
        ));
    }

    if !name
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-')
    {
        return Err(invalid(
            NameKind::Container,
            name,
            "may only contain lowercase letters, numbers and hyphens",
        ));
    }

    // Length check above guarantees at least one character.
    let first = name.as_bytes()[0];
    let last = name.as_bytes()[name.len() - 1];
    if first == b'-' || last == b'-' {
        return Err(invalid(
            NameKind::Container,
            name,
            "must begin and end with a letter or number",
        ));
    }

    if name.contains("--") {
        return Err(invalid(
            NameKind::Container,
            name,
            "must not contain consecutive hyphens",
        ));
    }

    Ok(())
}

/// Validate that a blob name conforms to the service naming rules.
pub fn validate_blob_name(name: &str) -> Result<(), CopyError> {
    let len = name.chars().count();
    if len == 0 || len > MAX_BLOB_NAME_LEN {
        return Err(invalid(
            NameKind::Blob,
            name,
            "must be 1-1024 characters long",
        ));
    }

    if name.split('/').count() > MAX_BLOB_PATH_SEGMENTS {
        return Err(invalid(
            NameKind::Blob,
            name,
            "must not have more than 254 path segments",
        ));
    }

    if name.ends_with('/') || name.ends_with('\\') || name.ends_with('.') {
        return Err(invalid(
            NameKind::Blob,
            name,
            "must not end with a path separator or a dot",
        ));
    }

    Ok(())
}
