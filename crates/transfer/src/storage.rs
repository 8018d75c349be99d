use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::TransferError;
use crate::validation::{validate_file_name, validate_group};

/// Where incoming files land under the data directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoragePolicy {
    /// Every file directly in the data directory.
    #[default]
    #[serde(alias = "none")]
    Flat,
    /// One subdirectory per group key.
    #[serde(alias = "propid")]
    ByGroup,
}

/// Resolves the absolute destination of `file_name` under `data_dir`.
///
/// Under [`StoragePolicy::ByGroup`] the request must carry a group.
pub fn destination_path(
    data_dir: &Path,
    policy: StoragePolicy,
    file_name: &str,
    group: Option<&str>,
) -> Result<PathBuf, TransferError> {
    validate_file_name(file_name)?;

    let dir = match policy {
        StoragePolicy::Flat => data_dir.to_path_buf(),
        StoragePolicy::ByGroup => {
            let group = group.filter(|g| !g.is_empty()).ok_or_else(|| {
                TransferError::InvalidPath(format!(
                    "'{file_name}' has no group but storage is by-group"
                ))
            })?;
            validate_group(group)?;
            data_dir.join(group)
        }
    };

    Ok(std::path::absolute(dir.join(file_name))?)
}

/// Moves an existing file at `path` aside with a timestamp suffix.
///
/// The new name is `<name>.YYYYMMDD-HHMMSS` in local time; if that name
/// is also taken a `-N` counter is appended. Returns the new location,
/// or `None` when nothing was there.
pub fn rename_if_exists(path: &Path) -> io::Result<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }

    let stamp = chrono::Local::now().format(".%Y%m%d-%H%M%S").to_string();
    let mut base = path.as_os_str().to_owned();
    base.push(&stamp);

    let mut candidate = PathBuf::from(&base);
    let mut n = 0u32;
    while candidate.exists() {
        n += 1;
        let mut next = base.clone();
        next.push(format!("-{n}"));
        candidate = PathBuf::from(next);
    }

    std::fs::rename(path, &candidate)?;
    tracing::warn!(
        path = %path.display(),
        renamed_to = %candidate.display(),
        "file exists; moved aside"
    );
    Ok(Some(candidate))
}
