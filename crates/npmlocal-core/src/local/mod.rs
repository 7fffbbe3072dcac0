//! Local dependency installation.
//!
//! Leaves first: spec parsing ([`descriptor`]), manifest access
//! ([`manifest`]), project nodes ([`package`]) and graph resolution
//! ([`graph`]); then file-set selection ([`files`]), copy/link
//! ([`installer`]), two-sided bookkeeping ([`bookkeeping`]), live sync
//! ([`watcher`]) and the run that ties them together ([`install`]).

pub mod bookkeeping;
pub mod descriptor;
pub mod files;
pub mod graph;
pub mod install;
pub mod installer;
pub mod manifest;
pub mod package;
pub mod watcher;

pub use bookkeeping::ManifestBookkeeper;
pub use descriptor::{DependencyDescriptor, DependencyEntry, InstallMode, DEFAULT_INSTALL_DIR};
pub use files::{resolve_file_set, FileEntry, FileSet, FileSetDiff};
pub use graph::{DependencyGraphBuilder, UnresolvedDependency};
pub use install::{DependencyReport, InstallReport, InstallSession, LocalInstall};
pub use installer::{InstallOutcome, InstalledFile, InstalledSet, Installer, Outcome};
pub use manifest::{LocalProp, ManifestAccessor, ManifestFields, LOCAL_KEY};
pub use package::{PackageNode, ResolvedDependency};
pub use watcher::{ChangeKind, WatchError, WatchSession, WatchState, Watcher};
