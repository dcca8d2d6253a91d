//! Configuration source loading.
//!
//! [`SourceLoader`] turns configuration files into ranked raw trees for the
//! engine. The format is chosen by extension:
//!
//! | Extension | Format |
//! |-----------|--------|
//! | `.yaml`, `.yml` | YAML |
//! | `.json` | JSON |
//! | `.toml` | TOML |
//!
//! A top-level `config:` key (a path or a list of paths, relative to the
//! including file) pulls other files in at *lower* precedence than the file
//! that names them. Later includes rank above earlier ones.
//!
//! # Example
//!
//! ```no_run
//! use confgraph_loader::SourceLoader;
//!
//! let sources = SourceLoader::new()
//!     .load_all(&["base.yaml", "experiment.toml"])
//!     .unwrap();
//! // `sources` is ordered lowest to highest precedence.
//! println!("{} source trees", sources.len());
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use confgraph_core::RawTree;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{LoadError, Result};

/// Key naming files to include.
pub const INCLUDE_KEY: &str = "config";

/// Serialization format of a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Yaml,
    Json,
    Toml,
}

impl SourceFormat {
    /// Picks the format from a file extension.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::UnsupportedFormat`] for any other extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Ok(SourceFormat::Yaml),
            Some("json") => Ok(SourceFormat::Json),
            Some("toml") => Ok(SourceFormat::Toml),
            _ => Err(LoadError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    /// Parses `text` into an untyped value.
    ///
    /// # Errors
    ///
    /// Besides parse failures, YAML and TOML floats such as `.inf` or `nan`
    /// are rejected with [`LoadError::NonFiniteNumber`]: they have no JSON
    /// form and would otherwise turn into `null`.
    pub fn parse_value(self, text: &str) -> Result<Value> {
        let value = match self {
            SourceFormat::Yaml => {
                let native: serde_yaml::Value = serde_yaml::from_str(text)?;
                check_yaml_finite(&native, "")?;
                serde_json::to_value(native)?
            }
            SourceFormat::Json => serde_json::from_str(text)?,
            SourceFormat::Toml => {
                let native: toml::Table = toml::from_str(text)?;
                for (key, value) in &native {
                    check_toml_finite(value, key)?;
                }
                serde_json::to_value(native)?
            }
        };
        Ok(value)
    }
}

fn non_finite(path: &str, value: f64) -> LoadError {
    let at = if path.is_empty() { "<root>" } else { path };
    LoadError::NonFiniteNumber(format!("{at} = {value}"))
}

fn check_yaml_finite(value: &serde_yaml::Value, path: &str) -> Result<()> {
    match value {
        serde_yaml::Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && !f.is_finite() => Err(non_finite(path, f)),
            _ => Ok(()),
        },
        serde_yaml::Value::Sequence(items) => items
            .iter()
            .enumerate()
            .try_for_each(|(i, item)| check_yaml_finite(item, &format!("{path}[{i}]"))),
        serde_yaml::Value::Mapping(map) => map.iter().try_for_each(|(key, item)| {
            let key = key.as_str().map_or_else(|| format!("{key:?}"), str::to_string);
            let child = if path.is_empty() { key } else { format!("{path}.{key}") };
            check_yaml_finite(item, &child)
        }),
        serde_yaml::Value::Tagged(tagged) => check_yaml_finite(&tagged.value, path),
        _ => Ok(()),
    }
}

fn check_toml_finite(value: &toml::Value, path: &str) -> Result<()> {
    match value {
        toml::Value::Float(f) if !f.is_finite() => Err(non_finite(path, *f)),
        toml::Value::Array(items) => items
            .iter()
            .enumerate()
            .try_for_each(|(i, item)| check_toml_finite(item, &format!("{path}[{i}]"))),
        toml::Value::Table(table) => table
            .iter()
            .try_for_each(|(key, item)| check_toml_finite(item, &format!("{path}.{key}"))),
        _ => Ok(()),
    }
}

/// Loads configuration files into raw trees.
#[derive(Debug, Clone, Default)]
pub struct SourceLoader {
    follow_includes: bool,
}

impl SourceLoader {
    /// Creates a loader that follows `config:` includes.
    pub fn new() -> Self {
        Self {
            follow_includes: true,
        }
    }

    /// Treats `config:` as an ordinary key instead of an include list.
    pub fn without_includes(mut self) -> Self {
        self.follow_includes = false;
        self
    }

    /// Parses one in-memory document.
    ///
    /// Includes are not followed; the `config` key is left in place.
    ///
    /// # Examples
    ///
    /// ```
    /// use confgraph_loader::{SourceFormat, SourceLoader};
    ///
    /// let tree = SourceLoader::new()
    ///     .load_str("DataConfig:\n  batch_size: 4\n", SourceFormat::Yaml)
    ///     .unwrap();
    /// assert_eq!(tree["DataConfig"]["batch_size"], 4);
    /// ```
    pub fn load_str(&self, text: &str, format: SourceFormat) -> Result<RawTree> {
        into_tree(format.parse_value(text)?)
    }

    /// Loads one file and its includes.
    ///
    /// Returns the trees in ascending precedence: every included file first
    /// (recursively expanded), then the file itself.
    ///
    /// # Errors
    ///
    /// I/O, parse and format errors are wrapped in [`LoadError::InFile`];
    /// include cycles yield [`LoadError::IncludeCycle`].
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Vec<RawTree>> {
        let mut ranked = Vec::new();
        self.load_into(path.as_ref(), &mut Vec::new(), &mut ranked)?;
        Ok(ranked)
    }

    /// Loads several files in parallel, preserving the caller's order.
    ///
    /// The result is ready to hand to the engine as its source list.
    pub fn load_all<P: AsRef<Path> + Sync>(&self, paths: &[P]) -> Result<Vec<RawTree>> {
        use rayon::prelude::*;

        let loaded: Vec<Vec<RawTree>> = paths
            .par_iter()
            .map(|path| {
                self.load_file(path).inspect_err(|err| {
                    warn!(path = %path.as_ref().display(), error = %err, "Rejected configuration source");
                })
            })
            .collect::<Result<_>>()?;

        let sources: Vec<RawTree> = loaded.into_iter().flatten().collect();
        debug!(files = paths.len(), sources = sources.len(), "Loaded configuration files");
        Ok(sources)
    }

    fn load_into(&self, path: &Path, stack: &mut Vec<PathBuf>, ranked: &mut Vec<RawTree>) -> Result<()> {
        let key = fs::canonicalize(path).map_err(|e| LoadError::from(e).in_file(path))?;
        if let Some(start) = stack.iter().position(|p| *p == key) {
            let mut chain = stack[start..].to_vec();
            chain.push(key);
            return Err(LoadError::IncludeCycle(chain));
        }

        let mut tree = read_tree(path).map_err(|e| e.in_file(path))?;

        let includes = if self.follow_includes {
            match tree.remove(INCLUDE_KEY) {
                Some(value) => include_paths(&value).map_err(|e| e.in_file(path))?,
                None => Vec::new(),
            }
        } else {
            Vec::new()
        };

        stack.push(key);
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        for include in &includes {
            self.load_into(&base.join(include), stack, ranked)?;
        }
        stack.pop();

        debug!(
            path = %path.display(),
            keys = tree.len(),
            includes = includes.len(),
            "Loaded configuration source"
        );
        ranked.push(tree);
        Ok(())
    }
}

fn read_tree(path: &Path) -> Result<RawTree> {
    let format = SourceFormat::from_path(path)?;
    let text = fs::read_to_string(path)?;
    into_tree(format.parse_value(&text)?)
}

fn into_tree(value: Value) -> Result<RawTree> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(RawTree::new()),
        Value::Array(_) => Err(LoadError::NotAMapping("a list".to_string())),
        other => Err(LoadError::NotAMapping(format!("the scalar {other}"))),
    }
}

fn include_paths(value: &Value) -> Result<Vec<PathBuf>> {
    match value {
        Value::String(path) => Ok(vec![PathBuf::from(path)]),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(path) => Ok(PathBuf::from(path)),
                other => Err(LoadError::InvalidInclude(format!("expected a path, found {other}"))),
            })
            .collect(),
        other => Err(LoadError::InvalidInclude(format!(
            "expected a path or a list of paths, found {other}"
        ))),
    }
}
