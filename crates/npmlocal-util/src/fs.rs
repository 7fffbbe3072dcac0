use std::fs::{self, File, FileTimes};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Atomically write bytes to a file by writing to a temp file then renaming.
///
/// The file will either have the old contents or the new contents, never a
/// partial write.
///
/// # Errors
/// Returns an error if the write or rename fails.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));

    // Same directory so the rename stays on one filesystem
    let mut temp_path = parent.to_path_buf();
    temp_path.push(format!(
        ".{}.tmp.{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("file"),
        std::process::id()
    ));

    {
        let mut file = File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    match fs::rename(&temp_path, path) {
        Ok(()) => Ok(()),
        Err(e) => {
            // On Windows, rename can fail if target exists. Try copy + remove as fallback.
            if cfg!(windows) {
                fs::copy(&temp_path, path)?;
                let _ = fs::remove_file(&temp_path);
                Ok(())
            } else {
                let _ = fs::remove_file(&temp_path);
                Err(e)
            }
        }
    }
}

/// Lexically normalize a path: drop `.` components and fold `..` into the
/// preceding component. Does not touch the filesystem, so symlinks are not
/// resolved and the path does not have to exist.
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = match out.components().next_back() {
                    Some(Component::Normal(_)) => out.pop(),
                    _ => false,
                };
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }

    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Whether anything (file, directory, or dangling symlink) exists at `path`.
#[must_use]
pub fn path_exists_no_follow(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Recursively copy `src` to `dst`, preserving modification and access times.
///
/// Symlinks inside the tree are recreated as symlinks rather than followed.
/// Existing files at the destination are overwritten; an existing symlink at a
/// destination file path is replaced instead of being written through.
///
/// # Errors
/// Returns an error if any entry cannot be read, created, or copied.
pub fn copy_preserving_timestamps(src: &Path, dst: &Path) -> io::Result<()> {
    let mut copied_dirs = Vec::new();

    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(io::Error::other)?;
        let target = if relative.as_os_str().is_empty() {
            dst.to_path_buf()
        } else {
            dst.join(relative)
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            if fs::symlink_metadata(&target).is_ok_and(|m| !m.is_dir()) {
                remove_path(&target)?;
            }
            fs::create_dir_all(&target)?;
            copied_dirs.push((entry.path().to_path_buf(), target));
        } else if file_type.is_symlink() {
            let link_target = fs::read_link(entry.path())?;
            if path_exists_no_follow(&target) {
                remove_path(&target)?;
            }
            ensure_parent(&target)?;
            create_symlink(&link_target, &target)?;
        } else {
            if fs::symlink_metadata(&target).is_ok_and(|m| m.file_type().is_symlink()) {
                fs::remove_file(&target)?;
            }
            ensure_parent(&target)?;
            fs::copy(entry.path(), &target)?;
            copy_times(entry.path(), &target)?;
        }
    }

    // Children touch their parent's mtime, so directories go last, deepest first.
    for (source_dir, target_dir) in copied_dirs.iter().rev() {
        // Directory times are not settable on every platform.
        let _ = copy_times(source_dir, target_dir);
    }

    Ok(())
}

fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

fn copy_times(src: &Path, dst: &Path) -> io::Result<()> {
    let metadata = fs::metadata(src)?;
    let mut times = FileTimes::new().set_modified(metadata.modified()?);
    if let Ok(accessed) = metadata.accessed() {
        times = times.set_accessed(accessed);
    }

    let file = if metadata.is_dir() {
        File::open(dst)?
    } else {
        File::options().write(true).open(dst)?
    };
    file.set_times(times)
}

/// Create a symlink at `link` pointing to `target`.
///
/// On Windows the link flavor (file or directory) follows the target.
///
/// # Errors
/// Returns an error if the link cannot be created.
pub fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link)
    }

    #[cfg(windows)]
    {
        let resolved = if target.is_absolute() {
            target.to_path_buf()
        } else {
            link.parent().unwrap_or(Path::new(".")).join(target)
        };
        if resolved.is_dir() {
            std::os::windows::fs::symlink_dir(target, link)
        } else {
            std::os::windows::fs::symlink_file(target, link)
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        copy_preserving_timestamps(target, link)
    }
}

/// Remove a symlink, file, or directory tree.
///
/// A symlink is removed itself; its target is never touched. Removing a path
/// that does not exist is not an error.
///
/// # Errors
/// Returns an error if the path exists but cannot be removed.
pub fn remove_path(path: &Path) -> io::Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    if metadata.file_type().is_symlink() {
        // Windows directory symlinks need remove_dir
        return fs::remove_file(path).or_else(|_| fs::remove_dir(path));
    }

    if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use tempfile::tempdir;

    #[test]
    fn test_atomic_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("package.json");

        atomic_write(&path, b"{}").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");

        atomic_write(&path, b"{\"name\":\"a\"}").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"name\":\"a\"}");
    }

    #[test]
    fn test_atomic_write_no_temp_left_on_success() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("package.json");

        atomic_write(&path, b"content").unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].as_ref().unwrap().file_name().to_str().unwrap(),
            "package.json"
        );
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("/a/b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize_path(Path::new("/a/./b/")), PathBuf::from("/a/b"));
        assert_eq!(normalize_path(Path::new("../x/y")), PathBuf::from("../x/y"));
        assert_eq!(normalize_path(Path::new("a/../..")), PathBuf::from(".."));
        assert_eq!(normalize_path(Path::new("a/..")), PathBuf::from("."));
        assert_eq!(normalize_path(Path::new("/..")), PathBuf::from("/"));
    }

    #[test]
    fn test_copy_tree_preserves_mtime() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();

        let lib = src.path().join("lib");
        fs::create_dir_all(lib.join("nested")).unwrap();
        fs::write(lib.join("index.js"), "module.exports = 1;").unwrap();
        fs::write(lib.join("nested").join("util.js"), "exports.x = 2;").unwrap();

        let old = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000_000);
        File::options()
            .write(true)
            .open(lib.join("index.js"))
            .unwrap()
            .set_modified(old)
            .unwrap();

        let target = dst.path().join("lib");
        copy_preserving_timestamps(&lib, &target).unwrap();

        assert_eq!(
            fs::read_to_string(target.join("nested").join("util.js")).unwrap(),
            "exports.x = 2;"
        );
        let copied_mtime = fs::metadata(target.join("index.js"))
            .unwrap()
            .modified()
            .unwrap();
        assert_eq!(copied_mtime, old);
    }

    #[test]
    fn test_copy_single_file() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        fs::write(src.path().join("README.md"), "# readme").unwrap();

        let target = dst.path().join("pkg").join("README.md");
        copy_preserving_timestamps(&src.path().join("README.md"), &target).unwrap();

        assert_eq!(fs::read_to_string(target).unwrap(), "# readme");
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_replaces_symlink_instead_of_writing_through() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        fs::write(src.path().join("a.js"), "new").unwrap();

        let victim = dst.path().join("victim.js");
        fs::write(&victim, "keep me").unwrap();
        let target = dst.path().join("a.js");
        create_symlink(&victim, &target).unwrap();

        copy_preserving_timestamps(&src.path().join("a.js"), &target).unwrap();

        assert_eq!(fs::read_to_string(&victim).unwrap(), "keep me");
        assert_eq!(fs::read_to_string(&target).unwrap(), "new");
        assert!(!fs::symlink_metadata(&target).unwrap().file_type().is_symlink());
    }

    #[cfg(unix)]
    #[test]
    fn test_remove_symlink_keeps_target() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("dist");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("index.js"), "").unwrap();

        let link = dir.path().join("link");
        create_symlink(&target, &link).unwrap();
        remove_path(&link).unwrap();

        assert!(!path_exists_no_follow(&link));
        assert!(target.join("index.js").exists());
    }

    #[test]
    fn test_remove_missing_path_is_ok() {
        let dir = tempdir().unwrap();
        remove_path(&dir.path().join("nope")).unwrap();
    }

    #[test]
    fn test_remove_directory_tree() {
        let dir = tempdir().unwrap();
        let tree = dir.path().join("node_modules").join("dep");
        fs::create_dir_all(tree.join("lib")).unwrap();
        fs::write(tree.join("lib").join("a.js"), "").unwrap();

        remove_path(&tree).unwrap();
        assert!(!tree.exists());
    }
}
