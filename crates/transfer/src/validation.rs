use std::path::{Component, Path};

use crate::TransferError;

/// Validates that a file identifier is a bare file name.
///
/// Rejects:
/// - Empty names
/// - Anything with a directory part (`sub/file`, `/abs`, `./file`)
/// - `.` and `..`
/// - Windows prefix components (`C:`, `\\server`)
pub fn validate_file_name(name: &str) -> Result<(), TransferError> {
    single_component(name, "file name")
}

/// Validates a grouping key used as one directory level.
pub fn validate_group(group: &str) -> Result<(), TransferError> {
    single_component(group, "group")
}

fn single_component(value: &str, what: &str) -> Result<(), TransferError> {
    if value.is_empty() {
        return Err(TransferError::InvalidPath(format!("empty {what}")));
    }
    if value.contains('\0') {
        return Err(TransferError::InvalidPath(format!("{what} contains NUL: {value:?}")));
    }

    let mut components = Path::new(value).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part == value => Ok(()),
        (Some(Component::ParentDir), _) => Err(TransferError::InvalidPath(format!(
            "parent directory traversal not allowed: {value}"
        ))),
        (Some(Component::RootDir | Component::Prefix(_)), _) => Err(TransferError::InvalidPath(
            format!("absolute path not allowed: {value}"),
        )),
        _ => Err(TransferError::InvalidPath(format!(
            "{what} must be a single path component: {value}"
        ))),
    }
}
