use npmlocal_util::fs::normalize_path;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Name of the manifest file every package carries.
pub const PACKAGE_JSON: &str = "package.json";

/// Find the nearest directory at or above `start` that contains a `package.json`.
#[must_use]
pub fn find_manifest_dir(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        if current.join(PACKAGE_JSON).is_file() {
            return Some(current);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// A path as the user wrote it (relative to `cwd`) together with its absolute form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelativeAbsolute {
    pub relative: PathBuf,
    pub absolute: PathBuf,
}

impl RelativeAbsolute {
    /// Resolve `path` against `cwd`.
    ///
    /// Absolute inputs keep a relative form computed from `cwd` when they live
    /// below it, and fall back to the absolute path otherwise.
    #[must_use]
    pub fn resolve(path: &Path, cwd: &Path) -> Self {
        if path.is_absolute() {
            let absolute = normalize_path(path);
            let relative = absolute
                .strip_prefix(cwd)
                .map_or_else(|_| absolute.clone(), Path::to_path_buf);
            Self { relative, absolute }
        } else {
            Self {
                relative: path.to_path_buf(),
                absolute: normalize_path(&cwd.join(path)),
            }
        }
    }
}
