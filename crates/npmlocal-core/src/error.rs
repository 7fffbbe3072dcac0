use std::path::PathBuf;
use thiserror::Error;

/// Stable error codes, surfaced in JSON output.
pub mod codes {
    pub const NO_PACKAGE_JSON: &str = "NO_PACKAGE_JSON";
    pub const BAD_ARGUMENT: &str = "BAD_ARGUMENT";
    pub const MANIFEST_READ_FAILED: &str = "MANIFEST_READ_FAILED";
    pub const MANIFEST_INVALID: &str = "MANIFEST_INVALID";
    pub const MANIFEST_NOT_LOADED: &str = "MANIFEST_NOT_LOADED";
    pub const MANIFEST_WRITE_FAILED: &str = "MANIFEST_WRITE_FAILED";
    pub const WATCH_FAILED: &str = "WATCH_FAILED";
    pub const IO_ERROR: &str = "IO_ERROR";
}

/// Core error type for npmlocal operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("The directory \"{}\" does not have a package.json", path.display())]
    NoPackageJson { path: PathBuf },

    #[error("Bad argument: {0}")]
    BadArgument(String),

    #[error("Failed to read {}: {source}", path.display())]
    ManifestRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", path.display())]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid manifest {}: {message}", path.display())]
    ManifestInvalid { path: PathBuf, message: String },

    #[error("Manifest {} has not been loaded", path.display())]
    ManifestNotLoaded { path: PathBuf },

    #[error("Failed to write {}: {source}", path.display())]
    ManifestWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    #[must_use]
    pub fn bad_argument(msg: impl Into<String>) -> Self {
        Self::BadArgument(msg.into())
    }

    #[must_use]
    pub fn manifest_invalid(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ManifestInvalid {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Get the stable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoPackageJson { .. } => codes::NO_PACKAGE_JSON,
            Self::BadArgument(_) => codes::BAD_ARGUMENT,
            Self::ManifestRead { .. } => codes::MANIFEST_READ_FAILED,
            Self::ManifestParse { .. } | Self::ManifestInvalid { .. } => codes::MANIFEST_INVALID,
            Self::ManifestNotLoaded { .. } => codes::MANIFEST_NOT_LOADED,
            Self::ManifestWrite { .. } => codes::MANIFEST_WRITE_FAILED,
            Self::Watch(_) => codes::WATCH_FAILED,
            Self::Io(_) => codes::IO_ERROR,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
