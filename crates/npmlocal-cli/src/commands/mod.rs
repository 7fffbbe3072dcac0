pub mod install;
pub mod local_to_npm;
pub mod version;

use miette::{IntoDiagnostic, Result};
use npmlocal_core::Error;
use serde::Serialize;

/// Error payload of the JSON output.
#[derive(Serialize)]
pub struct ErrorInfo {
    pub code: &'static str,
    pub message: String,
}

impl From<&Error> for ErrorInfo {
    fn from(e: &Error) -> Self {
        Self {
            code: e.code(),
            message: e.to_string(),
        }
    }
}

/// Print a core error and exit, or hand it to miette for text output.
pub fn fail(e: Error, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::json!({ "ok": false, "error": ErrorInfo::from(&e) })
        );
        std::process::exit(1);
    }
    Err(miette::miette!(code = e.code(), "{e}"))
}

/// Runtime for a single command. The work is I/O bound, one thread is enough.
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .into_diagnostic()
}
