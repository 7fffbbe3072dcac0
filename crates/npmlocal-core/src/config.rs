use crate::error::Result;
use crate::local::{DependencyDescriptor, InstallMode, DEFAULT_INSTALL_DIR};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::Level;

/// Settings shared by every command of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory relative paths are resolved against.
    pub cwd: PathBuf,
    /// Emit JSON: log lines and command output alike.
    pub json: bool,
    /// 0 = INFO, 1 = DEBUG, 2+ = TRACE.
    pub verbosity: u8,
    /// Only report errors.
    pub quiet: bool,
}

impl Config {
    #[must_use]
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            json: false,
            verbosity: 0,
            quiet: false,
        }
    }

    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    #[must_use]
    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Most detailed level to log. Quiet wins over any verbosity.
    #[must_use]
    pub fn log_level(&self) -> Level {
        if self.quiet {
            return Level::ERROR;
        }
        match self.verbosity {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

/// A local package requested on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalPackage {
    /// Spec string: `[<mode>:]<path>[@<version>]`.
    pub path: String,
    /// Mode override for this package only.
    pub mode: Option<InstallMode>,
}

impl LocalPackage {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: None,
        }
    }
}

/// Options of one install run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallOptions {
    /// Project receiving the dependencies.
    pub project_dir: PathBuf,
    /// Install directory relative to the project.
    pub install_dir: String,
    /// Mode applied to packages that do not choose one.
    pub mode: Option<InstallMode>,
    pub verbose: u8,
    /// Reinstall even when the recorded version is current.
    pub force: bool,
    /// Keep watching the installed dependencies.
    pub watch: bool,
    /// Look for package.json in ancestor directories.
    pub find_up: bool,
    /// Packages to install; empty means "reinstall what package.json records".
    pub local_packages: Vec<LocalPackage>,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            project_dir: PathBuf::from("."),
            install_dir: DEFAULT_INSTALL_DIR.to_string(),
            mode: None,
            verbose: 0,
            force: false,
            watch: false,
            find_up: false,
            local_packages: Vec::new(),
        }
    }
}

impl InstallOptions {
    #[must_use]
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_packages(mut self, packages: impl IntoIterator<Item = LocalPackage>) -> Self {
        self.local_packages.extend(packages);
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: InstallMode) -> Self {
        self.mode = Some(mode);
        self
    }

    #[must_use]
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    #[must_use]
    pub fn with_install_dir(mut self, install_dir: impl Into<String>) -> Self {
        self.install_dir = install_dir.into();
        self
    }

    /// Parse every requested package into a descriptor.
    ///
    /// No filesystem access happens here: one malformed spec rejects the
    /// whole batch before anything is touched.
    pub fn validate(&self) -> Result<Vec<DependencyDescriptor>> {
        self.local_packages
            .iter()
            .map(|package| {
                let fallback = package.mode.or(self.mode).unwrap_or_default();
                let mut descriptor =
                    DependencyDescriptor::parse_with_mode(&package.path, fallback)?;
                if let Some(mode) = package.mode {
                    descriptor.mode = mode;
                }
                descriptor.install_dir.clone_from(&self.install_dir);
                Ok(descriptor)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_validate_applies_options() {
        let options = InstallOptions::new("app")
            .with_install_dir("vendor")
            .with_mode(InstallMode::Copy)
            .with_packages([LocalPackage::new("../lib"), LocalPackage::new("link:../util")]);

        let descriptors = options.validate().unwrap();

        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].mode, InstallMode::Copy);
        assert_eq!(descriptors[0].install_dir, "vendor");
        // An explicit prefix beats the run-wide mode
        assert_eq!(descriptors[1].mode, InstallMode::Link);
    }

    #[test]
    fn test_validate_package_mode_wins() {
        let options = InstallOptions::new("app").with_packages([LocalPackage {
            path: "link:../lib".to_string(),
            mode: Some(InstallMode::Copy),
        }]);

        let descriptors = options.validate().unwrap();
        assert_eq!(descriptors[0].mode, InstallMode::Copy);
    }

    #[test]
    fn test_validate_rejects_whole_batch() {
        let options = InstallOptions::new("app")
            .with_packages([LocalPackage::new("../ok"), LocalPackage::new("move:../bad")]);

        assert!(matches!(options.validate(), Err(Error::BadArgument(_))));
    }

    #[test]
    fn test_log_level() {
        let config = Config::new("/work");
        assert_eq!(config.log_level(), Level::INFO);
        assert_eq!(config.clone().with_verbosity(1).log_level(), Level::DEBUG);
        assert_eq!(config.clone().with_verbosity(3).log_level(), Level::TRACE);
        assert_eq!(
            config.with_verbosity(2).with_quiet(true).log_level(),
            Level::ERROR
        );
    }

    #[test]
    fn test_default_mode_is_link() {
        let options = InstallOptions::new("app").with_packages([LocalPackage::new("../lib")]);
        assert_eq!(options.validate().unwrap()[0].mode, InstallMode::Link);
    }
}
