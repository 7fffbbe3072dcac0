//! Which paths of a dependency get installed.
//!
//! Mirrors npm's publish selection closely enough for module resolution:
//! `files` wins when present, otherwise `main`/`module`/`types` are probed.

use super::package::PackageNode;
use crate::error::{Error, Result};
use crate::paths::PACKAGE_JSON;
use npmlocal_util::fs::normalize_path;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

const NODE_MODULES: &str = "node_modules";
const PNPM_STORE: &str = ".pnpm";

/// One top-level installable path of a dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    /// Path relative to the package root, or the absolute path for absolute entries.
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
}

impl FileEntry {
    /// Name the entry gets under the install destination.
    #[must_use]
    pub fn basename(&self) -> Option<&std::ffi::OsStr> {
        self.absolute_path.file_name()
    }

    fn is_manifest_or_nested_modules(&self) -> bool {
        let first = self.relative_path.components().next();
        self.relative_path == Path::new(PACKAGE_JSON)
            || matches!(first, Some(Component::Normal(name)) if name == NODE_MODULES)
    }
}

/// File entries keyed by absolute path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FileSet {
    entries: BTreeMap<PathBuf, FileEntry>,
}

/// Result of comparing two file sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSetDiff {
    pub added: FileSet,
    pub removed: FileSet,
}

impl FileSetDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

impl FileSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry; an entry with the same absolute path is replaced.
    pub fn insert(&mut self, entry: FileEntry) {
        self.entries.insert(entry.absolute_path.clone(), entry);
    }

    pub fn remove(&mut self, absolute_path: &Path) -> Option<FileEntry> {
        self.entries.remove(absolute_path)
    }

    #[must_use]
    pub fn contains(&self, absolute_path: &Path) -> bool {
        self.entries.contains_key(absolute_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the set holds anything besides the manifest and the nested
    /// `node_modules` entries.
    #[must_use]
    pub fn has_payload(&self) -> bool {
        self.iter().any(|entry| !entry.is_manifest_or_nested_modules())
    }

    /// Set difference by absolute path, in both directions.
    #[must_use]
    pub fn diff(&self, next: &FileSet) -> FileSetDiff {
        let pick = |from: &FileSet, other: &FileSet| FileSet {
            entries: from
                .entries
                .iter()
                .filter(|(key, _)| !other.entries.contains_key(*key))
                .map(|(key, entry)| (key.clone(), entry.clone()))
                .collect(),
        };

        FileSetDiff {
            added: pick(next, self),
            removed: pick(self, next),
        }
    }
}

impl FromIterator<FileEntry> for FileSet {
    fn from_iter<T: IntoIterator<Item = FileEntry>>(iter: T) -> Self {
        let mut set = Self::new();
        for entry in iter {
            set.insert(entry);
        }
        set
    }
}

impl<'a> IntoIterator for &'a FileSet {
    type Item = &'a FileEntry;
    type IntoIter = std::collections::btree_map::Values<'a, PathBuf, FileEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.values()
    }
}

/// Compute the file set of a loaded dependency.
pub async fn resolve_file_set(package: &PackageNode) -> Result<FileSet> {
    let fields = package
        .manifest
        .fields()
        .ok_or_else(|| Error::ManifestNotLoaded {
            path: package.manifest.path(),
        })?;
    let root = package.project_dir();
    let mut set = FileSet::new();

    set.insert(FileEntry {
        relative_path: PathBuf::from(PACKAGE_JSON),
        absolute_path: root.join(PACKAGE_JSON),
    });

    if fields.files.is_empty() {
        for probe in [&fields.main, &fields.module].into_iter().flatten() {
            if let Some(entry) = probe_entry(&root, probe).await {
                set.insert(entry);
            }
        }

        for declared in [&fields.types, &fields.typings].into_iter().flatten() {
            let Some(entry) = entry_for(&root, declared) else {
                continue;
            };
            if exists(&entry.absolute_path).await {
                set.insert(top_level(&root, entry));
            } else {
                warn!(path = %entry.absolute_path.display(), "declared types not found, skipping");
            }
        }
    } else {
        for declared in &fields.files {
            if is_glob(declared) {
                for entry in expand_glob(&root, declared) {
                    set.insert(entry);
                }
            } else if let Some(entry) = entry_for(&root, declared) {
                set.insert(entry);
            }
        }
    }

    let nested_modules = root.join(NODE_MODULES);
    if exists(&nested_modules).await {
        set.insert(FileEntry {
            relative_path: PathBuf::from(NODE_MODULES),
            absolute_path: nested_modules.clone(),
        });
        let store = nested_modules.join(PNPM_STORE);
        if exists(&store).await {
            set.insert(FileEntry {
                relative_path: Path::new(NODE_MODULES).join(PNPM_STORE),
                absolute_path: store,
            });
        }
    }

    debug!(package = %package.display_name(), entries = set.len(), "file set resolved");
    Ok(set)
}

/// Entry for a path declared in the manifest. Relative paths that leave the
/// package root are dropped.
fn entry_for(root: &Path, declared: &str) -> Option<FileEntry> {
    let declared_path = Path::new(declared);
    if declared_path.is_absolute() {
        return Some(FileEntry {
            relative_path: declared_path.to_path_buf(),
            absolute_path: declared_path.to_path_buf(),
        });
    }

    let absolute_path = normalize_path(&root.join(declared_path));
    match absolute_path.strip_prefix(root) {
        Ok(relative) if !relative.as_os_str().is_empty() => Some(FileEntry {
            relative_path: relative.to_path_buf(),
            absolute_path,
        }),
        _ => {
            warn!(
                entry = declared,
                root = %root.display(),
                "entry escapes the package root, skipping"
            );
            None
        }
    }
}

/// Widen a relative entry to its first path component.
fn top_level(root: &Path, entry: FileEntry) -> FileEntry {
    if entry.relative_path.is_absolute() {
        return entry;
    }
    match entry.relative_path.components().next() {
        Some(Component::Normal(first)) => FileEntry {
            relative_path: PathBuf::from(first),
            absolute_path: root.join(first),
        },
        _ => entry,
    }
}

/// `main`/`module`: a directory is installed as is, a file through its
/// top-level containing directory. A file at the package root is installed
/// on its own.
async fn probe_entry(root: &Path, declared: &str) -> Option<FileEntry> {
    let entry = entry_for(root, declared)?;

    match tokio::fs::metadata(&entry.absolute_path).await {
        Ok(meta) if meta.is_dir() => Some(top_level(root, entry)),
        Ok(_) => {
            if entry.relative_path.is_absolute() {
                let parent = entry.absolute_path.parent()?.to_path_buf();
                return Some(FileEntry {
                    relative_path: parent.clone(),
                    absolute_path: parent,
                });
            }
            if entry.relative_path.components().count() == 1 {
                return Some(entry);
            }
            Some(top_level(root, entry))
        }
        Err(e) => {
            warn!(
                path = %entry.absolute_path.display(),
                error = %e,
                "cannot probe entry point, skipping"
            );
            None
        }
    }
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

fn expand_glob(root: &Path, pattern: &str) -> Vec<FileEntry> {
    // The root is literal; only the declared part may hold metacharacters
    let full = if Path::new(pattern).is_absolute() {
        PathBuf::from(pattern)
    } else {
        PathBuf::from(glob::Pattern::escape(&root.to_string_lossy())).join(pattern)
    };

    let paths = match glob::glob(&full.to_string_lossy()) {
        Ok(paths) => paths,
        Err(e) => {
            warn!(pattern, error = %e, "invalid files pattern, skipping");
            return Vec::new();
        }
    };

    let entries: Vec<FileEntry> = paths
        .filter_map(|path| match path {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(pattern, error = %e, "unreadable glob match");
                None
            }
        })
        .filter_map(|path| match path.strip_prefix(root) {
            Ok(relative) => entry_for(root, &relative.to_string_lossy()),
            Err(_) => Some(FileEntry {
                relative_path: path.clone(),
                absolute_path: path,
            }),
        })
        .collect();

    if entries.is_empty() {
        warn!(pattern, "files pattern matched nothing");
    }
    entries
}

async fn exists(path: &Path) -> bool {
    tokio::fs::symlink_metadata(path).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::fs;
    use tempfile::tempdir;

    async fn package(dir: &Path, manifest: &Value) -> PackageNode {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(PACKAGE_JSON), manifest.to_string()).unwrap();
        let mut node = PackageNode::new(dir, dir, false);
        node.load().await.unwrap();
        node
    }

    fn relative_paths(set: &FileSet) -> Vec<PathBuf> {
        let mut paths: Vec<_> = set.iter().map(|e| e.relative_path.clone()).collect();
        paths.sort();
        paths
    }

    fn entry(root: &Path, relative: &str) -> FileEntry {
        FileEntry {
            relative_path: PathBuf::from(relative),
            absolute_path: root.join(relative),
        }
    }

    #[tokio::test]
    async fn test_explicit_files_win() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("lib")).unwrap();
        fs::create_dir_all(root.join("dist")).unwrap();
        fs::write(root.join("dist/index.js"), "").unwrap();
        fs::write(root.join("README.md"), "").unwrap();

        let node = package(
            root,
            &json!({ "name": "d", "main": "dist/index.js", "files": ["lib", "README.md"] }),
        )
        .await;
        let set = resolve_file_set(&node).await.unwrap();

        assert_eq!(
            relative_paths(&set),
            vec![
                PathBuf::from("README.md"),
                PathBuf::from("lib"),
                PathBuf::from("package.json")
            ]
        );
    }

    #[tokio::test]
    async fn test_inferred_from_main() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("dist")).unwrap();
        fs::write(root.join("dist/index.js"), "").unwrap();

        let node = package(root, &json!({ "name": "d", "main": "dist/index.js" })).await;
        let set = resolve_file_set(&node).await.unwrap();

        assert_eq!(
            relative_paths(&set),
            vec![PathBuf::from("dist"), PathBuf::from("package.json")]
        );
        assert!(set.has_payload());
    }

    #[tokio::test]
    async fn test_main_and_module_share_directory() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("dist/esm")).unwrap();
        fs::write(root.join("dist/index.js"), "").unwrap();
        fs::write(root.join("dist/esm/index.js"), "").unwrap();

        let node = package(
            root,
            &json!({ "name": "d", "main": "dist/index.js", "module": "dist/esm/index.js" }),
        )
        .await;
        let set = resolve_file_set(&node).await.unwrap();

        assert_eq!(set.len(), 2);
        assert!(set.contains(&root.join("dist")));
    }

    #[tokio::test]
    async fn test_root_level_main_and_types() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("index.js"), "").unwrap();
        fs::write(root.join("index.d.ts"), "").unwrap();

        let node = package(
            root,
            &json!({
                "name": "d",
                "main": "index.js",
                "types": "index.d.ts",
                "typings": "missing.d.ts"
            }),
        )
        .await;
        let set = resolve_file_set(&node).await.unwrap();

        assert_eq!(
            relative_paths(&set),
            vec![
                PathBuf::from("index.d.ts"),
                PathBuf::from("index.js"),
                PathBuf::from("package.json")
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_main_is_skipped() {
        let dir = tempdir().unwrap();
        let node = package(dir.path(), &json!({ "name": "d", "main": "nope/index.js" })).await;
        let set = resolve_file_set(&node).await.unwrap();

        assert_eq!(set.len(), 1);
        assert!(!set.has_payload());
    }

    #[tokio::test]
    async fn test_empty_package() {
        let dir = tempdir().unwrap();
        let node = package(dir.path(), &json!({ "name": "d", "version": "1.0.0" })).await;
        let set = resolve_file_set(&node).await.unwrap();

        assert_eq!(relative_paths(&set), vec![PathBuf::from("package.json")]);
        assert!(!set.has_payload());
    }

    #[tokio::test]
    async fn test_nested_node_modules_included() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("node_modules/.pnpm")).unwrap();
        fs::create_dir_all(root.join("lib")).unwrap();

        let node = package(root, &json!({ "name": "d", "files": ["lib"] })).await;
        let set = resolve_file_set(&node).await.unwrap();

        assert!(set.contains(&root.join("node_modules")));
        assert!(set.contains(&root.join("node_modules/.pnpm")));
        assert!(!FileSet::from_iter([entry(root, "node_modules"), entry(root, "package.json")])
            .has_payload());
    }

    #[tokio::test]
    async fn test_entries_escaping_root_are_dropped() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("pkg");
        let node = package(&root, &json!({ "name": "d", "files": ["../secret", "lib"] })).await;
        let set = resolve_file_set(&node).await.unwrap();

        assert_eq!(
            relative_paths(&set),
            vec![PathBuf::from("lib"), PathBuf::from("package.json")]
        );
    }

    #[tokio::test]
    async fn test_absolute_entries_pass_through() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("pkg");
        let shared = dir.path().join("shared");
        let node = package(
            &root,
            &json!({ "name": "d", "files": [shared.to_string_lossy()] }),
        )
        .await;
        let set = resolve_file_set(&node).await.unwrap();

        assert!(set.contains(&shared));
    }

    #[tokio::test]
    async fn test_files_glob() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.js"), "").unwrap();
        fs::write(root.join("b.js"), "").unwrap();
        fs::write(root.join("c.ts"), "").unwrap();

        let node = package(root, &json!({ "name": "d", "files": ["*.js"] })).await;
        let set = resolve_file_set(&node).await.unwrap();

        assert_eq!(
            relative_paths(&set),
            vec![
                PathBuf::from("a.js"),
                PathBuf::from("b.js"),
                PathBuf::from("package.json")
            ]
        );
    }

    #[tokio::test]
    async fn test_files_glob_under_bracketed_root() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("pkg[1]");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("a.js"), "").unwrap();
        fs::create_dir_all(dir.path().join("pkg1")).unwrap();
        fs::write(dir.path().join("pkg1/decoy.js"), "").unwrap();

        let node = package(&root, &json!({ "name": "d", "files": ["*.js"] })).await;
        let set = resolve_file_set(&node).await.unwrap();

        assert_eq!(
            relative_paths(&set),
            vec![PathBuf::from("a.js"), PathBuf::from("package.json")]
        );
    }

    #[test]
    fn test_diff() {
        let root = Path::new("/pkg");
        let current = FileSet::from_iter([entry(root, "a"), entry(root, "b")]);
        let next = FileSet::from_iter([entry(root, "a"), entry(root, "c")]);

        let diff = current.diff(&next);

        assert_eq!(diff.added, FileSet::from_iter([entry(root, "c")]));
        assert_eq!(diff.removed, FileSet::from_iter([entry(root, "b")]));
        assert!(current.diff(&current).is_empty());
    }
}
