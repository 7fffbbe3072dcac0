//! Resolve descriptors into the consumer's dependency map.

use super::descriptor::DependencyDescriptor;
use super::package::{PackageNode, ResolvedDependency};
use crate::error::Error;
use futures::future::join_all;
use npmlocal_util::fs::normalize_path;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A descriptor that could not be resolved.
#[derive(Debug)]
pub struct UnresolvedDependency {
    pub descriptor: DependencyDescriptor,
    pub error: Error,
}

/// Builds `PackageNode::dependencies` for one consumer.
#[derive(Debug, Clone)]
pub struct DependencyGraphBuilder {
    cwd: PathBuf,
    find_up: bool,
}

impl DependencyGraphBuilder {
    /// `cwd` anchors relative source paths.
    #[must_use]
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            find_up: false,
        }
    }

    #[must_use]
    pub fn with_find_up(mut self, find_up: bool) -> Self {
        self.find_up = find_up;
        self
    }

    /// Load every dependency manifest concurrently and insert the results
    /// into `root.dependencies`, keyed by declared package name.
    ///
    /// Later descriptors win on name collisions. Descriptors whose project
    /// cannot be loaded are returned instead of failing the whole graph.
    pub async fn build(
        &self,
        root: &mut PackageNode,
        descriptors: Vec<DependencyDescriptor>,
    ) -> Vec<UnresolvedDependency> {
        let loads = descriptors.into_iter().map(|descriptor| async move {
            let mut node = PackageNode::new(&descriptor.source_dir(), &self.cwd, self.find_up);
            match node.load().await {
                Ok(()) => Ok((node, descriptor)),
                Err(error) => Err(UnresolvedDependency { descriptor, error }),
            }
        });

        let mut unresolved = Vec::new();
        for loaded in join_all(loads).await {
            let (node, descriptor) = match loaded {
                Ok(pair) => pair,
                Err(failed) => {
                    warn!(
                        source = %failed.descriptor.source_path,
                        error = %failed.error,
                        "cannot resolve local dependency"
                    );
                    unresolved.push(failed);
                    continue;
                }
            };

            let name = node.display_name();
            if node.name().is_none() {
                warn!(
                    path = %node.project_dir().display(),
                    fallback = %name,
                    "package.json has no name"
                );
            }

            if let Some(previous) = root.dependencies.get(&name) {
                if conflicts(&previous.descriptor, &descriptor) {
                    warn!(
                        dependency = %name,
                        previous = %previous.descriptor.spec(),
                        next = %descriptor.spec(),
                        "conflicting descriptors for the same package, keeping the last one"
                    );
                }
            }

            debug!(dependency = %name, spec = %descriptor.spec(), "dependency resolved");
            root.dependencies
                .insert(name, ResolvedDependency { node, descriptor });
        }

        unresolved
    }
}

fn conflicts(a: &DependencyDescriptor, b: &DependencyDescriptor) -> bool {
    a.mode != b.mode
        || a.install_dir != b.install_dir
        || !same_source(&a.source_path, &b.source_path)
}

fn same_source(a: &str, b: &str) -> bool {
    normalize_path(Path::new(a)) == normalize_path(Path::new(b))
}
