//! Copy or link a dependency's file set into its consumer.

use super::descriptor::{DependencyDescriptor, InstallMode};
use super::files::{resolve_file_set, FileEntry, FileSet};
use super::package::PackageNode;
use crate::error::Result;
use futures::future::join_all;
use npmlocal_util::fs::{copy_preserving_timestamps, create_symlink, remove_path};
use serde::Serialize;
use std::error::Error as _;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Outcome of installing one file entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Installed,
    Skipped { reason: String },
}

/// One entry of an installed set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledFile {
    pub source: FileEntry,
    pub destination: PathBuf,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Per-entry outcomes of one dependency install.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstalledSet {
    #[serde(skip_serializing)]
    pub destination: PathBuf,
    pub files: Vec<InstalledFile>,
}

impl InstalledSet {
    /// Entries that were copied or linked.
    pub fn installed(&self) -> impl Iterator<Item = &InstalledFile> {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, Outcome::Installed))
    }

    /// Entries that failed, with their reasons.
    pub fn skipped(&self) -> impl Iterator<Item = (&InstalledFile, &str)> {
        self.files.iter().filter_map(|f| match &f.outcome {
            Outcome::Skipped { reason } => Some((f, reason.as_str())),
            Outcome::Installed => None,
        })
    }

    /// Forget entries whose source is no longer installed.
    pub fn forget(&mut self, source: &Path) {
        self.files.retain(|f| f.source.absolute_path != source);
    }

    pub fn extend(&mut self, other: InstalledSet) {
        for file in other.files {
            self.forget(&file.source.absolute_path);
            self.files.push(file);
        }
    }
}

/// Outcome of installing one dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum InstallOutcome {
    Installed(InstalledSet),
    Skipped { reason: String },
}

impl InstallOutcome {
    #[must_use]
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}

/// Installs one dependency into one consumer.
#[derive(Debug, Clone)]
pub struct Installer {
    dependency_name: String,
    destination: PathBuf,
    mode: InstallMode,
}

impl Installer {
    /// Installer for `dependency` into `<consumer>/<installDir>/<name>`.
    #[must_use]
    pub fn new(
        consumer: &PackageNode,
        dependency_name: &str,
        descriptor: &DependencyDescriptor,
    ) -> Self {
        Self {
            dependency_name: dependency_name.to_string(),
            destination: consumer
                .install_root(&descriptor.install_dir)
                .join(dependency_name),
            mode: descriptor.mode,
        }
    }

    #[must_use]
    pub fn dependency_name(&self) -> &str {
        &self.dependency_name
    }

    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    #[must_use]
    pub fn mode(&self) -> InstallMode {
        self.mode
    }

    /// Where `entry` lands: `<destination>/<basename>`.
    #[must_use]
    pub fn destination_for(&self, entry: &FileEntry) -> Option<PathBuf> {
        entry.basename().map(|name| self.destination.join(name))
    }

    /// Reason to skip the install, when the consumer already has this version.
    pub async fn up_to_date(
        &self,
        consumer: &PackageNode,
        dependency: &PackageNode,
    ) -> Option<String> {
        let recorded = consumer.existing_local_dependency(&self.dependency_name)?;
        let current = dependency.version()?;
        if recorded.version.as_deref() != Some(current) {
            debug!(
                dependency = %self.dependency_name,
                recorded = ?recorded.version,
                current,
                "version changed, reinstalling"
            );
            return None;
        }
        if tokio::fs::symlink_metadata(&self.destination).await.is_err() {
            return None;
        }
        Some(format!(
            "{} is already installed with the latest version {current}",
            self.dependency_name
        ))
    }

    /// Replace the destination with the dependency's file set.
    ///
    /// The file set is resolved when not given. Per-entry failures are
    /// recorded as skipped outcomes; an empty set skips the whole dependency
    /// without touching the destination.
    pub async fn copy_files(
        &self,
        dependency: &PackageNode,
        files: Option<FileSet>,
    ) -> Result<InstallOutcome> {
        let files = match files {
            Some(files) => files,
            None => resolve_file_set(dependency).await?,
        };

        if !files.has_payload() {
            return Ok(InstallOutcome::skipped(format!(
                "no files to be installed in {}",
                dependency.project_dir().display()
            )));
        }

        if let Err(e) = remove_blocking(self.destination.clone()).await {
            warn!(
                path = %self.destination.display(),
                error = %e,
                "failed to remove previous install"
            );
        }
        tokio::fs::create_dir_all(&self.destination).await?;

        Ok(InstallOutcome::Installed(self.install_entries(&files).await))
    }

    /// Copy or link every entry of `files`, concurrently, without clearing the destination.
    pub async fn install_entries(&self, files: &FileSet) -> InstalledSet {
        let installs = files.iter().map(|entry| async move {
            let Some(destination) = self.destination_for(entry) else {
                return InstalledFile {
                    source: entry.clone(),
                    destination: self.destination.clone(),
                    outcome: Outcome::Skipped {
                        reason: format!("{} has no file name", entry.absolute_path.display()),
                    },
                };
            };

            let outcome = match self.copy_or_link(&entry.absolute_path, &destination).await {
                Ok(()) => {
                    trace!(
                        source = %entry.absolute_path.display(),
                        destination = %destination.display(),
                        mode = %self.mode,
                        "installed"
                    );
                    Outcome::Installed
                }
                Err(e) => {
                    warn!(source = %entry.absolute_path.display(), error = %e, "could not install");
                    Outcome::Skipped {
                        reason: format!("{}: {}", entry.absolute_path.display(), error_chain(&e)),
                    }
                }
            };

            InstalledFile {
                source: entry.clone(),
                destination,
                outcome,
            }
        });

        InstalledSet {
            destination: self.destination.clone(),
            files: join_all(installs).await,
        }
    }

    /// Copy (timestamps preserved) or symlink `source` to `destination`.
    pub async fn copy_or_link(&self, source: &Path, destination: &Path) -> io::Result<()> {
        let source = source.to_path_buf();
        let destination = destination.to_path_buf();
        let mode = self.mode;

        tokio::task::spawn_blocking(move || {
            if let Some(parent) = destination.parent() {
                std::fs::create_dir_all(parent)?;
            }
            match mode {
                InstallMode::Copy => copy_preserving_timestamps(&source, &destination),
                InstallMode::Link => {
                    remove_path(&destination)?;
                    create_symlink(&source, &destination)
                }
            }
        })
        .await
        .map_err(io::Error::other)?
    }

    /// Delete the installed counterpart of `entry`.
    pub async fn remove_entry(&self, entry: &FileEntry) -> io::Result<Option<PathBuf>> {
        let Some(destination) = self.destination_for(entry) else {
            return Ok(None);
        };
        remove_blocking(destination.clone()).await?;
        Ok(Some(destination))
    }
}

/// `error` followed by each of its causes.
fn error_chain(error: &io::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

async fn remove_blocking(path: PathBuf) -> io::Result<()> {
    tokio::task::spawn_blocking(move || remove_path(&path))
        .await
        .map_err(io::Error::other)?
}
