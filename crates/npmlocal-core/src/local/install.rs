//! One install run: resolve, install concurrently, record, optionally watch.

use super::bookkeeping::ManifestBookkeeper;
use super::descriptor::{DependencyDescriptor, InstallMode};
use super::graph::DependencyGraphBuilder;
use super::installer::{InstallOutcome, Installer};
use super::package::PackageNode;
use super::watcher::{WatchSession, Watcher};
use crate::config::InstallOptions;
use crate::error::Result;
use futures::future::join_all;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Result for one dependency.
#[derive(Debug, Clone, Serialize)]
pub struct DependencyReport {
    pub name: String,
    pub source: PathBuf,
    pub destination: Option<PathBuf>,
    pub mode: InstallMode,
    #[serde(flatten)]
    pub outcome: InstallOutcome,
    /// Set when the files were installed but the `local` bookkeeping failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_error: Option<String>,
}

/// Result of an install run, one entry per dependency.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InstallReport {
    pub consumer: String,
    pub project_dir: PathBuf,
    pub dependencies: Vec<DependencyReport>,
}

impl InstallReport {
    #[must_use]
    pub fn installed_count(&self) -> usize {
        self.dependencies
            .iter()
            .filter(|d| !d.outcome.is_skipped())
            .count()
    }

    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.dependencies.len() - self.installed_count()
    }
}

/// The report plus the watchers started for it.
#[derive(Debug, Default)]
pub struct InstallSession {
    pub report: InstallReport,
    pub watchers: Vec<Watcher>,
}

impl InstallSession {
    /// Stop every running watcher and wait for their event loops to drain.
    pub async fn stop_watching(&mut self) {
        for watcher in &mut self.watchers {
            if !watcher.is_watching() {
                continue;
            }
            if let Err(e) = watcher.stop() {
                warn!(error = %e, "failed to stop watcher");
            }
            watcher.closed().await;
        }
    }
}

struct Pipeline {
    name: String,
    installer: Installer,
    outcome: InstallOutcome,
}

/// Installs the local dependencies of one consumer.
#[derive(Debug, Clone)]
pub struct LocalInstall {
    options: InstallOptions,
    cwd: PathBuf,
}

impl LocalInstall {
    /// `cwd` anchors the project directory and relative dependency paths.
    #[must_use]
    pub fn new(options: InstallOptions, cwd: impl Into<PathBuf>) -> Self {
        Self {
            options,
            cwd: cwd.into(),
        }
    }

    /// Run the install.
    ///
    /// Fails only on malformed package specs or an unreadable consumer
    /// manifest. Everything else ends up as a skipped entry in the report.
    pub async fn install(&self) -> Result<InstallSession> {
        let requested = self.options.validate()?;

        let mut consumer =
            PackageNode::new(&self.options.project_dir, &self.cwd, self.options.find_up);
        consumer.load().await?;

        let descriptors = if requested.is_empty() {
            self.recorded_descriptors(&consumer)?
        } else {
            requested
        };

        let mut report = InstallReport {
            consumer: consumer.display_name(),
            project_dir: consumer.project_dir(),
            dependencies: Vec::new(),
        };
        if descriptors.is_empty() {
            info!(consumer = %report.consumer, "no local dependencies to install");
            return Ok(InstallSession {
                report,
                watchers: Vec::new(),
            });
        }

        let unresolved = DependencyGraphBuilder::new(&self.cwd)
            .with_find_up(self.options.find_up)
            .build(&mut consumer, descriptors)
            .await;
        for failed in unresolved {
            report.dependencies.push(DependencyReport {
                name: failed.descriptor.source_path.clone(),
                source: failed.descriptor.source_dir(),
                destination: None,
                mode: failed.descriptor.mode,
                outcome: InstallOutcome::skipped(failed.error.to_string()),
                manifest_error: None,
            });
        }

        let pipelines = join_all(consumer.dependencies.iter().map(|(name, resolved)| {
            self.run_pipeline(&consumer, name, &resolved.node, &resolved.descriptor)
        }))
        .await;

        let mut bookkeeper = ManifestBookkeeper::new();
        let mut watchers = Vec::new();
        for pipeline in pipelines {
            let mut manifest_error = None;
            if !pipeline.outcome.is_skipped() {
                if let Err(e) = bookkeeper.record(&mut consumer, &pipeline.name).await {
                    warn!(dependency = %pipeline.name, error = %e, "failed to record dependency");
                    manifest_error = Some(e.to_string());
                }
            }

            let resolved = &consumer.dependencies[&pipeline.name];
            if self.options.watch {
                let installed = match &pipeline.outcome {
                    InstallOutcome::Installed(set) => set.clone(),
                    InstallOutcome::Skipped { .. } => Default::default(),
                };
                watchers.push(Watcher::new(WatchSession::new(
                    resolved.node.clone(),
                    pipeline.installer.clone(),
                    installed,
                )));
            }

            report.dependencies.push(DependencyReport {
                name: pipeline.name,
                source: resolved.node.project_dir(),
                destination: Some(pipeline.installer.destination().to_path_buf()),
                mode: pipeline.installer.mode(),
                outcome: pipeline.outcome,
                manifest_error,
            });
        }

        for (name, error) in bookkeeper.flush(&consumer).await? {
            if let Some(entry) = report.dependencies.iter_mut().find(|d| d.name == name) {
                entry.manifest_error = Some(error.to_string());
            }
        }

        for watcher in &mut watchers {
            if let Err(e) = watcher.start().await {
                warn!(error = %e, "failed to start watcher");
            }
        }

        Ok(InstallSession { report, watchers })
    }

    /// Descriptors recorded in the consumer's `local.dependencies`.
    fn recorded_descriptors(&self, consumer: &PackageNode) -> Result<Vec<DependencyDescriptor>> {
        let mut descriptors = consumer.local_dependency_descriptors()?;
        if let Some(mode) = self.options.mode {
            for descriptor in &mut descriptors {
                descriptor.mode = mode;
            }
        }
        debug!(count = descriptors.len(), "installing from package.json");
        Ok(descriptors)
    }

    async fn run_pipeline(
        &self,
        consumer: &PackageNode,
        name: &str,
        dependency: &PackageNode,
        descriptor: &DependencyDescriptor,
    ) -> Pipeline {
        let installer = Installer::new(consumer, name, descriptor);

        if let Some(reason) = installer.up_to_date(consumer, dependency).await {
            if !self.options.force {
                return Pipeline {
                    name: name.to_string(),
                    installer,
                    outcome: InstallOutcome::Skipped { reason },
                };
            }
            info!(dependency = name, "reinstalling by force");
        }

        let outcome = match installer.copy_files(dependency, None).await {
            Ok(outcome) => outcome,
            Err(e) => InstallOutcome::skipped(e.to_string()),
        };

        Pipeline {
            name: name.to_string(),
            installer,
            outcome,
        }
    }
}
