//! `npmlocal add` / `npmlocal install` command implementation.
//!
//! Installs local packages into a project by copy or symlink, records them in
//! both package.json files, and optionally keeps them in sync until Ctrl-C.

use super::{fail, runtime};
use miette::{IntoDiagnostic, Result};
use npmlocal_core::local::installer::Outcome;
use npmlocal_core::{
    InstallMode, InstallOptions, InstallOutcome, InstallReport, LocalInstall, LocalPackage,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Install command action.
#[derive(Debug, Clone)]
pub struct InstallAction {
    pub project_dir: PathBuf,
    pub packages: Vec<String>,
    pub install_dir: String,
    pub mode: Option<InstallMode>,
    pub force: bool,
    pub watch: bool,
    pub find_up: bool,
    pub verbose: u8,
}

impl InstallAction {
    fn options(&self) -> InstallOptions {
        let mut options = InstallOptions::new(&self.project_dir)
            .with_install_dir(&self.install_dir)
            .with_force(self.force)
            .with_packages(self.packages.iter().map(LocalPackage::new));
        options.mode = self.mode;
        options.watch = self.watch;
        options.find_up = self.find_up;
        options.verbose = self.verbose;
        options
    }
}

#[derive(Serialize)]
struct InstallResult<'a> {
    ok: bool,
    installed: usize,
    skipped: usize,
    #[serde(flatten)]
    report: &'a InstallReport,
}

/// Run the install command.
pub fn run(action: InstallAction, cwd: &Path, json: bool) -> Result<()> {
    if action.watch && json {
        eprintln!("error: --watch and --json cannot be combined");
        eprintln!("hint: --json prints exactly one object; watch mode keeps running");
        std::process::exit(2);
    }

    let runtime = runtime()?;
    runtime.block_on(async {
        let install = LocalInstall::new(action.options(), cwd);
        let mut session = match install.install().await {
            Ok(session) => session,
            Err(e) => return fail(e, json),
        };

        if json {
            let result = InstallResult {
                ok: true,
                installed: session.report.installed_count(),
                skipped: session.report.skipped_count(),
                report: &session.report,
            };
            println!("{}", serde_json::to_string_pretty(&result).into_diagnostic()?);
            return Ok(());
        }

        print_report(&session.report, action.verbose > 0);

        let watching = session.watchers.iter().filter(|w| w.is_watching()).count();
        if watching > 0 {
            println!("\nWatching {watching} package(s), press Ctrl-C to stop");
            tokio::signal::ctrl_c().await.into_diagnostic()?;
            info!("stopping watchers");
            session.stop_watching().await;
        }
        Ok(())
    })
}

fn print_report(report: &InstallReport, verbose: bool) {
    if report.dependencies.is_empty() {
        println!("No local dependencies to install in {}", report.consumer);
        return;
    }

    for dep in &report.dependencies {
        match &dep.outcome {
            InstallOutcome::Installed(set) => {
                let destination = dep
                    .destination
                    .as_deref()
                    .unwrap_or(&set.destination)
                    .display();
                println!(
                    "+ {} installed in {} ({}: {destination})",
                    dep.name, report.consumer, dep.mode
                );
                for file in &set.files {
                    match &file.outcome {
                        Outcome::Installed if verbose => println!(
                            "    {} -> {}",
                            file.source.absolute_path.display(),
                            file.destination.display()
                        ),
                        Outcome::Installed => {}
                        Outcome::Skipped { reason } => println!(
                            "    ! could not install {}: {reason}",
                            file.source.relative_path.display()
                        ),
                    }
                }
            }
            InstallOutcome::Skipped { reason } => println!("- {}: {reason}", dep.name),
        }
        if let Some(error) = &dep.manifest_error {
            println!("    ! package.json not updated: {error}");
        }
    }

    println!(
        "\n{} installed, {} skipped",
        report.installed_count(),
        report.skipped_count()
    );
}
