//! `npmlocal local-to-npm` command implementation.
//!
//! Copies every `local.dependencies` entry into `dependencies` as a caret
//! range on the recorded version, ready for publishing.

use super::{fail, runtime};
use miette::{IntoDiagnostic, Result};
use npmlocal_core::PackageNode;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct LocalToNpmResult {
    ok: bool,
    written: Vec<String>,
}

/// Run the local-to-npm command.
pub fn run(project_dir: &Path, find_up: bool, cwd: &Path, json: bool) -> Result<()> {
    let runtime = runtime()?;
    let result = runtime.block_on(async {
        let mut node = PackageNode::new(project_dir, cwd, find_up);
        node.load().await?;
        let written = node.copy_local_dependencies_to_npm().await?;
        if !written.is_empty() {
            node.manifest.write().await?;
        }
        Ok::<_, npmlocal_core::Error>((node.display_name(), written))
    });

    let (name, written) = match result {
        Ok(pair) => pair,
        Err(e) => return fail(e, json),
    };

    if json {
        let result = LocalToNpmResult { ok: true, written };
        println!("{}", serde_json::to_string(&result).into_diagnostic()?);
    } else if written.is_empty() {
        println!("No local dependencies with a version to copy in {name}");
    } else {
        for dep in &written {
            println!("+ {dep} added to {name} dependencies");
        }
    }
    Ok(())
}
