#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

pub mod config;
pub mod error;
pub mod local;
pub mod paths;
pub mod version;

pub use config::{Config, InstallOptions, LocalPackage};
pub use error::{Error, Result};
pub use local::{
    DependencyDescriptor, DependencyEntry, InstallMode, InstallOutcome, InstallReport,
    InstallSession, LocalInstall, PackageNode, DEFAULT_INSTALL_DIR,
};
pub use version::VERSION;
