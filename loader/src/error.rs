//! Error types for source loading.
//!
//! Covers every way an external input can be rejected before it reaches the
//! engine: I/O, parse failures per format, unsupported files, include
//! cycles, malformed declarations and malformed command-line overrides.

use std::path::PathBuf;

use confgraph_core::ResolutionError;
use thiserror::Error;

/// Errors that can occur while loading sources, declarations or overrides.
#[derive(Debug, Error)]
pub enum LoadError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON parsing failure.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// YAML parsing failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML parsing failure.
    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// File extension is not one of `.yaml`, `.yml`, `.json`, `.toml`.
    #[error("unsupported configuration file type: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    /// Top level of a source is not a mapping.
    #[error("top level must be a mapping, found {0}")]
    NotAMapping(String),

    /// A YAML or TOML float is infinite or NaN.
    #[error("non-finite number at {0}")]
    NonFiniteNumber(String),

    /// A `config:` include value is not a path or a list of paths.
    #[error("invalid 'config' include: {0}")]
    InvalidInclude(String),

    /// Files include each other.
    #[error("include cycle: {}", format_chain(.0))]
    IncludeCycle(Vec<PathBuf>),

    /// A command-line override could not be parsed.
    #[error("invalid override '{arg}': {reason}")]
    InvalidOverride { arg: String, reason: String },

    /// A declaration file is malformed.
    #[error("invalid declaration: {0}")]
    InvalidDeclaration(String),

    /// Failure while reading a specific file.
    #[error("{}: {source}", .path.display())]
    InFile {
        path: PathBuf,
        #[source]
        source: Box<LoadError>,
    },
}

fn format_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl LoadError {
    /// Attaches the file the error came from, unless one is already attached.
    pub fn in_file(self, path: impl Into<PathBuf>) -> Self {
        match self {
            LoadError::InFile { .. } | LoadError::IncludeCycle(_) => self,
            other => LoadError::InFile {
                path: path.into(),
                source: Box::new(other),
            },
        }
    }
}

impl From<LoadError> for ResolutionError {
    fn from(error: LoadError) -> Self {
        match error {
            LoadError::InFile { path, source } => ResolutionError::SourceLoad {
                source_name: path.display().to_string(),
                message: source.to_string(),
            },
            other => ResolutionError::SourceLoad {
                source_name: "<input>".to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// Convenience alias for results with [`LoadError`].
pub type Result<T> = std::result::Result<T, LoadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_file_wraps_once() {
        let err = LoadError::NotAMapping("list".into())
            .in_file("a.yaml")
            .in_file("b.yaml");
        assert_eq!(err.to_string(), "a.yaml: top level must be a mapping, found list");
    }

    #[test]
    fn test_converts_to_source_load_error() {
        let err: ResolutionError = LoadError::UnsupportedFormat("conf.foo".into())
            .in_file("conf.foo")
            .into();
        assert!(matches!(
            err,
            ResolutionError::SourceLoad { ref source_name, .. } if source_name == "conf.foo"
        ));
    }
}
