//! Relative object keys.
//!
//! A file published as part of an artifact is stored under a relative key:
//! its path with the strip prefix removed, or its bare file name when no
//! prefix is given. Keys always use forward slashes and never escape the
//! artifact's directory.

use std::path::{Component, Path, PathBuf};

/// Compute the relative key for a local file.
pub fn relative_key(path: &Path, strip_prefix: Option<&Path>) -> Result<String, String> {
    let relative: &Path = match strip_prefix {
        Some(prefix) => path.strip_prefix(prefix).map_err(|_| {
            format!(
                "'{}' is not under strip prefix '{}'",
                path.display(),
                prefix.display()
            )
        })?,
        None => path
            .file_name()
            .map(Path::new)
            .ok_or_else(|| format!("'{}' has no file name", path.display()))?,
    };

    let mut segments: Vec<&str> = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(segment) => segments.push(
                segment
                    .to_str()
                    .ok_or_else(|| format!("'{}' is not valid UTF-8", path.display()))?,
            ),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(format!("'{}' escapes the artifact root", path.display()));
            }
        }
    }

    if segments.is_empty() {
        return Err(format!("'{}' yields an empty key", path.display()));
    }
    Ok(segments.join("/"))
}

/// Whether a key read back from a store is safe to join onto a local directory.
pub fn is_safe_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('/')
        && !key.contains('\\')
        && key.split('/').all(|s| !s.is_empty() && s != "." && s != "..")
}

/// Whether an action or artifact name can be used as one path segment.
pub fn is_safe_name(name: &str) -> bool {
    is_safe_key(name) && !name.contains('/')
}

/// Local path for a key below `base`, or `None` for an unsafe key.
pub fn key_path(base: &Path, key: &str) -> Option<PathBuf> {
    if !is_safe_key(key) {
        return None;
    }
    Some(key.split('/').fold(base.to_path_buf(), |acc, s| acc.join(s)))
}
