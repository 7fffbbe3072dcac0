//! A project directory together with its manifest.

use super::descriptor::{DependencyDescriptor, DEFAULT_INSTALL_DIR};
use super::manifest::{LocalProp, ManifestAccessor};
use crate::error::{Error, Result};
use crate::paths::RelativeAbsolute;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A dependency resolved against its consumer.
#[derive(Debug, Clone)]
pub struct ResolvedDependency {
    pub node: PackageNode,
    pub descriptor: DependencyDescriptor,
}

/// A project on disk, its cached manifest, and the local dependencies
/// resolved for it.
#[derive(Debug, Clone)]
pub struct PackageNode {
    root: RelativeAbsolute,
    pub manifest: ManifestAccessor,
    pub dependencies: BTreeMap<String, ResolvedDependency>,
}

impl PackageNode {
    /// Wrap the project at `path`, resolved against `cwd`.
    #[must_use]
    pub fn new(path: &Path, cwd: &Path, find_up: bool) -> Self {
        let root = RelativeAbsolute::resolve(path, cwd);
        let manifest = if find_up {
            ManifestAccessor::find_up(&root.absolute)
        } else {
            ManifestAccessor::new(&root.absolute)
        };

        Self {
            root,
            manifest,
            dependencies: BTreeMap::new(),
        }
    }

    /// Load the manifest. Fails with `NoPackageJson` when it is missing.
    pub async fn load(&mut self) -> Result<()> {
        self.manifest.load().await?;
        Ok(())
    }

    /// Directory holding the manifest. Differs from the root only with find-up.
    #[must_use]
    pub fn project_dir(&self) -> PathBuf {
        self.manifest
            .path()
            .parent()
            .map_or_else(|| self.root.absolute.clone(), Path::to_path_buf)
    }

    /// Absolute path of `segments` joined below the project directory.
    #[must_use]
    pub fn absolute_path<I, S>(&self, segments: I) -> PathBuf
    where
        I: IntoIterator<Item = S>,
        S: AsRef<Path>,
    {
        let mut path = self.project_dir();
        for segment in segments {
            path.push(segment);
        }
        path
    }

    /// Like [`PackageNode::absolute_path`], relative to the path the node was created from.
    #[must_use]
    pub fn relative_path<I, S>(&self, segments: I) -> PathBuf
    where
        I: IntoIterator<Item = S>,
        S: AsRef<Path>,
    {
        let mut path = self.root.relative.clone();
        for segment in segments {
            path.push(segment);
        }
        path
    }

    /// Declared package name, when the manifest is loaded and has one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.manifest.name().filter(|name| !name.is_empty())
    }

    /// Declared name, or the directory name as a last resort.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.name().map_or_else(
            || {
                self.project_dir()
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            },
            str::to_string,
        )
    }

    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.manifest.version()
    }

    /// Consumer entry recorded for `name`, without creating the `local` namespace.
    #[must_use]
    pub fn existing_local_dependency(&self, name: &str) -> Option<DependencyDescriptor> {
        let value = self
            .manifest
            .existing_local_prop(LocalProp::Dependencies)?
            .get(name)?;
        match DependencyDescriptor::from_value(value) {
            Ok(descriptor) => Some(descriptor),
            Err(e) => {
                warn!(dependency = name, error = %e, "ignoring unreadable local dependency entry");
                None
            }
        }
    }

    /// Every entry of `local.dependencies`, in manifest order.
    pub fn local_dependency_descriptors(&self) -> Result<Vec<DependencyDescriptor>> {
        let Some(deps) = self.manifest.existing_local_prop(LocalProp::Dependencies) else {
            return Ok(Vec::new());
        };
        deps.values().map(DependencyDescriptor::from_value).collect()
    }

    /// Record the resolved dependency `name` in both manifests.
    ///
    /// The consumer gets `local.dependencies[name]`, the dependency gets
    /// `local.usedBy[consumer] = <consumer absolute path>`. Nothing is written
    /// to disk here.
    pub async fn add_local_dependency(&mut self, name: &str) -> Result<DependencyDescriptor> {
        let consumer_dir = self.project_dir();
        let Self {
            manifest,
            dependencies,
            ..
        } = self;

        let resolved = dependencies.get_mut(name).ok_or_else(|| {
            Error::bad_argument(format!("\"{name}\" is not a resolved local dependency"))
        })?;

        manifest.read_json(false).await?;
        resolved.node.manifest.read_json(false).await?;

        let consumer_name = match manifest.name().filter(|n| !n.is_empty()) {
            Some(n) => n.to_string(),
            None => {
                let fallback = consumer_dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                warn!(
                    path = %consumer_dir.display(),
                    fallback = %fallback,
                    "consumer package.json has no name"
                );
                fallback
            }
        };

        let descriptor = DependencyDescriptor {
            mode: resolved.descriptor.mode,
            source_path: resolved.node.project_dir().to_string_lossy().into_owned(),
            version: resolved.node.version().map(str::to_string),
            install_dir: resolved.descriptor.install_dir.clone(),
        };

        // Both sides must be writable before either is touched
        let used_by = resolved.node.manifest.local_prop(LocalProp::UsedBy).await?;
        let local_dependencies = manifest.local_prop(LocalProp::Dependencies).await?;

        local_dependencies.insert(name.to_string(), descriptor.unparse().to_value());
        used_by.insert(
            consumer_name,
            Value::String(consumer_dir.to_string_lossy().into_owned()),
        );

        debug!(dependency = name, spec = %descriptor.spec(), "local dependency recorded");
        Ok(descriptor)
    }

    /// Copy each `local.dependencies` entry into `dependencies` as `^<version>`.
    ///
    /// Returns the names that were written. Entries without a valid semver
    /// version are skipped with a warning.
    pub async fn copy_local_dependencies_to_npm(&mut self) -> Result<Vec<String>> {
        self.manifest.read_json(false).await?;

        let mut ranges = Vec::new();
        for (name, descriptor) in self.local_dependency_pairs()? {
            match descriptor.version.as_deref().map(semver::Version::parse) {
                Some(Ok(version)) => ranges.push((name, format!("^{version}"))),
                Some(Err(e)) => {
                    warn!(dependency = %name, error = %e, "version is not valid semver, skipping");
                }
                None => warn!(dependency = %name, "no recorded version, skipping"),
            }
        }

        let path = self.manifest.path();
        let json = self.manifest.read_json(false).await?;
        let root = json
            .as_object_mut()
            .ok_or_else(|| Error::manifest_invalid(&path, "package.json must be a JSON object"))?;
        let deps = root
            .entry("dependencies")
            .or_insert_with(|| Value::Object(serde_json::Map::new()))
            .as_object_mut()
            .ok_or_else(|| Error::manifest_invalid(&path, "\"dependencies\" must be an object"))?;

        let mut written = Vec::with_capacity(ranges.len());
        for (name, range) in ranges {
            deps.insert(name.clone(), Value::String(range));
            written.push(name);
        }
        Ok(written)
    }

    fn local_dependency_pairs(&self) -> Result<Vec<(String, DependencyDescriptor)>> {
        let Some(deps) = self.manifest.existing_local_prop(LocalProp::Dependencies) else {
            return Ok(Vec::new());
        };
        deps.iter()
            .map(|(name, value)| Ok((name.clone(), DependencyDescriptor::from_value(value)?)))
            .collect()
    }

    /// Path of the install directory `install_dir` of this project.
    #[must_use]
    pub fn install_root(&self, install_dir: &str) -> PathBuf {
        let dir = if install_dir.is_empty() {
            DEFAULT_INSTALL_DIR
        } else {
            install_dir
        };
        self.absolute_path([dir])
    }
}
