//! Cached access to one project's `package.json`.
//!
//! The accessor owns the single parsed document of its project. Every
//! mutation goes through it and reaches disk only on an explicit
//! [`ManifestAccessor::write`].

use crate::error::{Error, Result};
use crate::paths::{find_manifest_dir, PACKAGE_JSON};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Key of the bookkeeping namespace inside package.json.
pub const LOCAL_KEY: &str = "local";

const DEFAULT_INDENT: &str = "  ";

/// Sub-maps of the `local` namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalProp {
    Dependencies,
    UsedBy,
}

impl LocalProp {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dependencies => "dependencies",
            Self::UsedBy => "usedBy",
        }
    }
}

/// The package.json fields the installer cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestFields {
    pub name: Option<String>,
    pub version: Option<String>,
    pub main: Option<String>,
    pub module: Option<String>,
    pub files: Vec<String>,
    pub types: Option<String>,
    pub typings: Option<String>,
}

impl ManifestFields {
    /// Extract the fields, ignoring values of the wrong type.
    #[must_use]
    pub fn from_value(json: &Value) -> Self {
        let string = |key: &str| {
            json.get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let files = json
            .get("files")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            name: string("name"),
            version: string("version"),
            main: string("main"),
            module: string("module"),
            files,
            types: string("types"),
            typings: string("typings"),
        }
    }
}

/// Reader/writer for one project's package.json.
#[derive(Debug, Clone)]
pub struct ManifestAccessor {
    directory: PathBuf,
    find_up: bool,
    path: Option<PathBuf>,
    json: Option<Value>,
    indent: String,
    trailing_newline: bool,
}

impl ManifestAccessor {
    /// Accessor for `<directory>/package.json`.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            find_up: false,
            path: None,
            json: None,
            indent: DEFAULT_INDENT.to_string(),
            trailing_newline: true,
        }
    }

    /// Accessor that looks for package.json in `directory` or its ancestors.
    #[must_use]
    pub fn find_up(directory: impl Into<PathBuf>) -> Self {
        Self {
            find_up: true,
            ..Self::new(directory)
        }
    }

    /// Location of the manifest file.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return path.clone();
        }
        if self.find_up {
            if let Some(dir) = find_manifest_dir(&self.directory) {
                return dir.join(PACKAGE_JSON);
            }
        }
        self.directory.join(PACKAGE_JSON)
    }

    /// Whether the manifest file exists.
    pub async fn has_package_json(&self) -> bool {
        tokio::fs::metadata(self.path())
            .await
            .is_ok_and(|m| m.is_file())
    }

    /// Load the manifest, failing with `NoPackageJson` when it is absent.
    pub async fn load(&mut self) -> Result<&mut Value> {
        if !self.has_package_json().await {
            return Err(Error::NoPackageJson {
                path: self.directory.clone(),
            });
        }
        self.read_json(false).await
    }

    /// Return the cached document, reading it from disk on first use or when forced.
    pub async fn read_json(&mut self, force: bool) -> Result<&mut Value> {
        if self.json.is_none() || force {
            let path = self.path();
            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(Error::NoPackageJson {
                        path: self.directory.clone(),
                    });
                }
                Err(source) => return Err(Error::ManifestRead { path, source }),
            };

            let json: Value = serde_json::from_str(&content).map_err(|source| {
                Error::ManifestParse {
                    path: path.clone(),
                    source,
                }
            })?;
            if !json.is_object() {
                return Err(Error::manifest_invalid(&path, "package.json must be a JSON object"));
            }

            debug!(path = %path.display(), force, "package.json read");
            self.indent = detect_indent(&content);
            self.trailing_newline = content.ends_with('\n');
            self.path = Some(path);
            self.json = Some(json);
        }

        let path = self.path();
        self.json
            .as_mut()
            .ok_or(Error::ManifestNotLoaded { path })
    }

    /// The cached document, if it has been read.
    #[must_use]
    pub fn json(&self) -> Option<&Value> {
        self.json.as_ref()
    }

    /// Typed view of the cached document.
    #[must_use]
    pub fn fields(&self) -> Option<ManifestFields> {
        self.json.as_ref().map(ManifestFields::from_value)
    }

    /// `name` of the cached document.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.json.as_ref()?.get("name")?.as_str()
    }

    /// `version` of the cached document.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.json.as_ref()?.get("version")?.as_str()
    }

    /// Get-or-create the `local` namespace on the cached document.
    ///
    /// Creating the namespace mutates the document even for callers that only
    /// read; use [`ManifestAccessor::existing_local_prop`] for strict reads.
    pub fn local_sync(&mut self) -> Result<&mut Map<String, Value>> {
        let path = self.path();
        let json = self
            .json
            .as_mut()
            .ok_or_else(|| Error::ManifestNotLoaded { path: path.clone() })?;
        get_or_create_object(json, LOCAL_KEY, &path)
    }

    /// Like [`ManifestAccessor::local_sync`], reading the manifest first if needed.
    pub async fn local(&mut self) -> Result<&mut Map<String, Value>> {
        self.read_json(false).await?;
        self.local_sync()
    }

    /// Get-or-create `local.<prop>` on the cached document.
    pub fn local_prop_sync(&mut self, prop: LocalProp) -> Result<&mut Map<String, Value>> {
        let path = self.path();
        let local = self.local_sync()?;
        let entry = local
            .entry(prop.as_str())
            .or_insert_with(|| Value::Object(Map::new()));
        entry.as_object_mut().ok_or_else(|| {
            Error::manifest_invalid(&path, format!("\"local.{}\" must be an object", prop.as_str()))
        })
    }

    /// Like [`ManifestAccessor::local_prop_sync`], reading the manifest first if needed.
    pub async fn local_prop(&mut self, prop: LocalProp) -> Result<&mut Map<String, Value>> {
        self.read_json(false).await?;
        self.local_prop_sync(prop)
    }

    /// Read `local.<prop>` without creating anything.
    #[must_use]
    pub fn existing_local_prop(&self, prop: LocalProp) -> Option<&Map<String, Value>> {
        self.json
            .as_ref()?
            .get(LOCAL_KEY)?
            .get(prop.as_str())?
            .as_object()
    }

    /// Serialize the cached document to disk, keeping the indentation it was read with.
    pub async fn write(&self) -> Result<()> {
        let path = self.path();
        let json = self
            .json
            .as_ref()
            .ok_or_else(|| Error::ManifestNotLoaded { path: path.clone() })?;

        let mut bytes = to_indented_json(json, &self.indent).map_err(|source| {
            Error::ManifestParse {
                path: path.clone(),
                source,
            }
        })?;
        if self.trailing_newline {
            bytes.push(b'\n');
        }

        let target = path.clone();
        tokio::task::spawn_blocking(move || npmlocal_util::fs::atomic_write(&target, &bytes))
            .await
            .map_err(|e| Error::ManifestWrite {
                path: path.clone(),
                source: std::io::Error::other(e),
            })?
            .map_err(|source| Error::ManifestWrite {
                path: path.clone(),
                source,
            })?;

        debug!(path = %path.display(), "package.json written");
        Ok(())
    }
}

fn get_or_create_object<'a>(
    json: &'a mut Value,
    key: &str,
    path: &Path,
) -> Result<&'a mut Map<String, Value>> {
    let root = json
        .as_object_mut()
        .ok_or_else(|| Error::manifest_invalid(path, "package.json must be a JSON object"))?;
    let entry = root
        .entry(key)
        .or_insert_with(|| Value::Object(Map::new()));
    entry
        .as_object_mut()
        .ok_or_else(|| Error::manifest_invalid(path, format!("\"{key}\" must be an object")))
}

/// Indentation of the first indented line, or two spaces.
fn detect_indent(content: &str) -> String {
    content
        .lines()
        .skip(1)
        .find_map(|line| {
            let indent: String = line
                .chars()
                .take_while(|c| *c == ' ' || *c == '\t')
                .collect();
            (!indent.is_empty() && indent.len() < line.len()).then_some(indent)
        })
        .unwrap_or_else(|| DEFAULT_INDENT.to_string())
}

fn to_indented_json(json: &Value, indent: &str) -> serde_json::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
    let mut serializer = serde_json::Serializer::with_formatter(&mut bytes, formatter);
    json.serialize(&mut serializer)?;
    Ok(bytes)
}
