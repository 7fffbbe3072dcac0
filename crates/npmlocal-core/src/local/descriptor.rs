//! Local dependency specs: `[<mode>:]<path>[@<version>]`.
//!
//! The string form is what ends up in `local.dependencies`. When the install
//! directory differs from `node_modules` the entry becomes an object
//! `{ "path": "<spec>", "installDir": "<dir>" }`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default install directory, relative to the consumer root.
pub const DEFAULT_INSTALL_DIR: &str = "node_modules";

/// How a dependency's files reach the install directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallMode {
    Copy,
    #[default]
    Link,
}

impl InstallMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Link => "link",
        }
    }
}

impl fmt::Display for InstallMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstallMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "copy" => Ok(Self::Copy),
            "link" => Ok(Self::Link),
            other => Err(Error::bad_argument(format!(
                "unknown install mode \"{other}\" (expected \"copy\" or \"link\")"
            ))),
        }
    }
}

/// Serialized form of one `local.dependencies` value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyEntry {
    Spec(String),
    Detail {
        path: String,
        #[serde(
            rename = "installDir",
            alias = "install-dir",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        install_dir: Option<String>,
    },
}

impl DependencyEntry {
    /// Decode an entry read from a manifest.
    pub fn from_value(value: &Value) -> Result<Self> {
        Self::deserialize(value).map_err(|e| {
            Error::bad_argument(format!("invalid local dependency entry {value}: {e}"))
        })
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Spec(spec) => Value::String(spec.clone()),
            Self::Detail { path, install_dir } => {
                let mut map = serde_json::Map::new();
                map.insert("path".to_string(), Value::String(path.clone()));
                if let Some(dir) = install_dir {
                    map.insert("installDir".to_string(), Value::String(dir.clone()));
                }
                Value::Object(map)
            }
        }
    }
}

/// A parsed local dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyDescriptor {
    pub mode: InstallMode,
    /// Path of the dependency project, as written in the spec.
    pub source_path: String,
    /// Version recorded at the last install, if any.
    pub version: Option<String>,
    pub install_dir: String,
}

impl DependencyDescriptor {
    /// Parse a string spec; the mode defaults to `link`.
    pub fn parse(spec: &str) -> Result<Self> {
        Self::parse_with_mode(spec, InstallMode::default())
    }

    /// Parse a string spec, using `default_mode` when it has no mode prefix.
    pub fn parse_with_mode(spec: &str, default_mode: InstallMode) -> Result<Self> {
        if spec.is_empty() {
            return Err(Error::bad_argument("empty local dependency spec"));
        }

        let (mode, rest) = split_mode(spec)?;
        let (path, version) = split_version(rest, spec)?;

        if path.is_empty() {
            return Err(Error::bad_argument(format!("missing path in \"{spec}\"")));
        }
        if has_colon_outside_drive(path) {
            return Err(Error::bad_argument(format!(
                "\":\" is not allowed in the path of \"{spec}\""
            )));
        }

        Ok(Self {
            mode: mode.unwrap_or(default_mode),
            source_path: path.to_string(),
            version: version.map(str::to_string),
            install_dir: DEFAULT_INSTALL_DIR.to_string(),
        })
    }

    /// Parse either serialized form.
    pub fn from_entry(entry: &DependencyEntry) -> Result<Self> {
        match entry {
            DependencyEntry::Spec(spec) => Self::parse(spec),
            DependencyEntry::Detail { path, install_dir } => {
                let mut descriptor = Self::parse(path)?;
                if let Some(dir) = install_dir {
                    descriptor.install_dir.clone_from(dir);
                }
                Ok(descriptor)
            }
        }
    }

    /// Parse a raw manifest value.
    pub fn from_value(value: &Value) -> Result<Self> {
        Self::from_entry(&DependencyEntry::from_value(value)?)
    }

    /// The string form: `<mode>:<path>[@<version>]`.
    #[must_use]
    pub fn spec(&self) -> String {
        match &self.version {
            Some(version) => format!("{}:{}@{version}", self.mode, self.source_path),
            None => format!("{}:{}", self.mode, self.source_path),
        }
    }

    /// Serialize back to a manifest entry. The object form is only used when
    /// the install directory is not the default.
    #[must_use]
    pub fn unparse(&self) -> DependencyEntry {
        if self.install_dir == DEFAULT_INSTALL_DIR {
            DependencyEntry::Spec(self.spec())
        } else {
            DependencyEntry::Detail {
                path: self.spec(),
                install_dir: Some(self.install_dir.clone()),
            }
        }
    }

    #[must_use]
    pub fn source_dir(&self) -> PathBuf {
        PathBuf::from(&self.source_path)
    }
}

fn is_drive_prefix(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/')
}

fn has_colon_outside_drive(path: &str) -> bool {
    let tail = if is_drive_prefix(path) { &path[2..] } else { path };
    tail.contains(':')
}

fn split_mode(spec: &str) -> Result<(Option<InstallMode>, &str)> {
    if is_drive_prefix(spec) {
        return Ok((None, spec));
    }

    match spec.split_once(':') {
        Some((prefix, rest))
            if !prefix.is_empty()
                && prefix
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') =>
        {
            Ok((Some(prefix.parse()?), rest))
        }
        _ => Ok((None, spec)),
    }
}

fn starts_segment(path: &str, index: usize) -> bool {
    index == 0 || matches!(path.as_bytes()[index - 1], b'/' | b'\\')
}

fn split_version<'a>(rest: &'a str, spec: &str) -> Result<(&'a str, Option<&'a str>)> {
    let (path, version) = match rest.rfind('@') {
        Some(index) if !starts_segment(rest, index) => {
            let version = &rest[index + 1..];
            if version.is_empty() {
                return Err(Error::bad_argument(format!("empty version in \"{spec}\"")));
            }
            if version.contains(['/', '\\']) {
                return Err(Error::bad_argument(format!(
                    "\"@\" inside a path segment is ambiguous in \"{spec}\""
                )));
            }
            (&rest[..index], Some(version))
        }
        _ => (rest, None),
    };

    // Only scope-style segments (`@scope/...`) may carry an "@" in the path
    if let Some((index, _)) = path
        .match_indices('@')
        .find(|(index, _)| !starts_segment(path, *index))
    {
        return Err(Error::bad_argument(format!(
            "unexpected \"@\" at offset {index} in \"{spec}\""
        )));
    }

    Ok((path, version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_full_spec() {
        let d = DependencyDescriptor::parse("copy:../lib@1.2.3").unwrap();
        assert_eq!(d.mode, InstallMode::Copy);
        assert_eq!(d.source_path, "../lib");
        assert_eq!(d.version.as_deref(), Some("1.2.3"));
        assert_eq!(d.install_dir, DEFAULT_INSTALL_DIR);
    }

    #[test]
    fn test_parse_defaults_to_link() {
        let d = DependencyDescriptor::parse("../lib").unwrap();
        assert_eq!(d.mode, InstallMode::Link);
        assert_eq!(d.version, None);
    }

    #[test]
    fn test_parse_scoped_directory() {
        let d = DependencyDescriptor::parse("link:../@scope/pkg").unwrap();
        assert_eq!(d.source_path, "../@scope/pkg");
        assert_eq!(d.version, None);

        let d = DependencyDescriptor::parse("link:@scope/pkg@2.0.0").unwrap();
        assert_eq!(d.source_path, "@scope/pkg");
        assert_eq!(d.version.as_deref(), Some("2.0.0"));
    }

    #[test]
    fn test_parse_windows_drive() {
        let d = DependencyDescriptor::parse(r"C:\work\lib@1.0.0").unwrap();
        assert_eq!(d.mode, InstallMode::Link);
        assert_eq!(d.source_path, r"C:\work\lib");

        let d = DependencyDescriptor::parse(r"copy:C:\work\lib").unwrap();
        assert_eq!(d.mode, InstallMode::Copy);
        assert_eq!(d.source_path, r"C:\work\lib");
    }

    #[test]
    fn test_parse_rejects_unknown_mode() {
        let err = DependencyDescriptor::parse("move:../lib").unwrap_err();
        assert!(matches!(err, Error::BadArgument(_)));
        assert!(err.to_string().contains("move"));
    }

    #[test]
    fn test_parse_rejects_delimiter_collisions() {
        for spec in ["", "link:", "../lib@", "../a@b/c", "../a@b/c@1.0.0", "./x:y", "copy:a:b"] {
            assert!(
                matches!(DependencyDescriptor::parse(spec), Err(Error::BadArgument(_))),
                "expected rejection of {spec:?}"
            );
        }
    }

    #[test]
    fn test_round_trip_strings() {
        for spec in [
            "link:../lib",
            "copy:../lib@1.0.0",
            "link:/abs/path/pkg@0.0.1-beta.3",
            "copy:../@scope/pkg@3.1.4",
            "link:@scope/pkg",
        ] {
            let entry = DependencyEntry::Spec(spec.to_string());
            let parsed = DependencyDescriptor::from_entry(&entry).unwrap();
            assert_eq!(parsed.unparse(), entry, "round trip of {spec}");
        }
    }

    #[test]
    fn test_mode_is_normalized_on_unparse() {
        let d = DependencyDescriptor::parse("../lib@1.0.0").unwrap();
        assert_eq!(d.unparse(), DependencyEntry::Spec("link:../lib@1.0.0".into()));
    }

    #[test]
    fn test_custom_install_dir_uses_object_form() {
        let value = json!({ "path": "copy:/work/lib@1.0.0", "installDir": "vendor" });
        let d = DependencyDescriptor::from_value(&value).unwrap();
        assert_eq!(d.install_dir, "vendor");
        assert_eq!(d.unparse().to_value(), value);
    }

    #[test]
    fn test_default_install_dir_collapses_to_string() {
        let value = json!({ "path": "link:/work/lib@1.0.0", "installDir": "node_modules" });
        let d = DependencyDescriptor::from_value(&value).unwrap();
        assert_eq!(d.unparse().to_value(), json!("link:/work/lib@1.0.0"));
    }

    #[test]
    fn test_legacy_install_dir_key() {
        let value = json!({ "path": "link:/work/lib@1.0.0", "install-dir": "vendor" });
        let d = DependencyDescriptor::from_value(&value).unwrap();
        assert_eq!(d.install_dir, "vendor");
        assert_eq!(
            d.unparse().to_value(),
            json!({ "path": "link:/work/lib@1.0.0", "installDir": "vendor" })
        );
    }

    #[test]
    fn test_invalid_entry_value() {
        assert!(matches!(
            DependencyDescriptor::from_value(&json!(42)),
            Err(Error::BadArgument(_))
        ));
    }
}
