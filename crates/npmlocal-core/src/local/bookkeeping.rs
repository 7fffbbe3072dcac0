//! Two-sided `local` bookkeeping after an install.

use super::descriptor::DependencyDescriptor;
use super::package::PackageNode;
use crate::error::{Error, Result};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Collects the dependencies recorded during one run and writes every touched
/// manifest once at the end.
#[derive(Debug, Default)]
pub struct ManifestBookkeeper {
    recorded: BTreeSet<String>,
}

impl ManifestBookkeeper {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `name` in the consumer's and the dependency's cached manifests.
    pub async fn record(
        &mut self,
        consumer: &mut PackageNode,
        name: &str,
    ) -> Result<DependencyDescriptor> {
        let descriptor = consumer.add_local_dependency(name).await?;
        self.recorded.insert(name.to_string());
        Ok(descriptor)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recorded.is_empty()
    }

    /// Write the consumer manifest, then each recorded dependency's.
    ///
    /// Only the consumer write is fatal. A failed dependency write is logged
    /// and returned by name so the run can report it against that dependency.
    pub async fn flush(&mut self, consumer: &PackageNode) -> Result<Vec<(String, Error)>> {
        if self.recorded.is_empty() {
            return Ok(Vec::new());
        }

        consumer.manifest.write().await?;
        let mut failed = Vec::new();
        for name in std::mem::take(&mut self.recorded) {
            let Some(resolved) = consumer.dependencies.get(&name) else {
                continue;
            };
            match resolved.node.manifest.write().await {
                Ok(()) => debug!(dependency = %name, "usedBy written"),
                Err(e) => {
                    warn!(dependency = %name, error = %e, "failed to write usedBy");
                    failed.push((name, e));
                }
            }
        }
        Ok(failed)
    }
}
