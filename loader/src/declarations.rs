//! Schema declaration files.
//!
//! Declarations may be written in any source format. Enums are given either
//! as a list of `{name, literals}` entries or as a mapping from name to
//! literals:
//!
//! ```yaml
//! enums:
//!   Activation: [relu, gelu, tanh]
//! schemas:
//!   - name: OptimizerConfig
//!     fields:
//!       - { name: lr, type: float, default: 0.01 }
//!   - name: SGDConfig
//!     parent: OptimizerConfig
//!     fields:
//!       - { name: momentum, type: float }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use confgraph_core::{Declarations, EnumDecl, SchemaDecl};
use serde::Deserialize;
use tracing::debug;

use crate::error::{LoadError, Result};
use crate::loader::SourceFormat;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeclarationFile {
    #[serde(default)]
    enums: EnumTable,
    #[serde(default)]
    schemas: Vec<SchemaDecl>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EnumTable {
    List(Vec<EnumDecl>),
    Map(BTreeMap<String, Vec<String>>),
}

impl Default for EnumTable {
    fn default() -> Self {
        EnumTable::List(Vec::new())
    }
}

impl From<DeclarationFile> for Declarations {
    fn from(file: DeclarationFile) -> Self {
        let enums = match file.enums {
            EnumTable::List(list) => list,
            EnumTable::Map(map) => map
                .into_iter()
                .map(|(name, literals)| EnumDecl::new(&name, literals))
                .collect(),
        };
        Declarations {
            enums,
            schemas: file.schemas,
        }
    }
}

/// Parses declarations from an in-memory document.
///
/// # Examples
///
/// ```
/// use confgraph_loader::{SourceFormat, parse_declarations};
///
/// let text = r#"
/// [enums]
/// Optimizer = ["SGD", "Adam"]
///
/// [[schemas]]
/// name = "DataConfig"
/// fields = [
///     { name = "batch_size", type = "int", default = 2 },
///     { name = "n_samples", type = "int" },
/// ]
/// "#;
/// let decls = parse_declarations(text, SourceFormat::Toml).unwrap();
/// assert_eq!(decls.enums[0].name, "Optimizer");
/// assert_eq!(decls.schemas[0].fields.len(), 2);
/// ```
pub fn parse_declarations(text: &str, format: SourceFormat) -> Result<Declarations> {
    let file: DeclarationFile = match format {
        SourceFormat::Yaml => serde_yaml::from_str(text)?,
        SourceFormat::Json => serde_json::from_str(text)?,
        SourceFormat::Toml => toml::from_str(text)?,
    };
    if file.schemas.is_empty() {
        return Err(LoadError::InvalidDeclaration(
            "no schemas are declared".to_string(),
        ));
    }
    Ok(file.into())
}

/// Loads a declaration file, choosing the format by extension.
pub fn load_declarations(path: impl AsRef<Path>) -> Result<Declarations> {
    let path = path.as_ref();
    let read = || -> Result<Declarations> {
        let format = SourceFormat::from_path(path)?;
        let text = fs::read_to_string(path)?;
        parse_declarations(&text, format)
    };
    let decls = read().map_err(|e| e.in_file(path))?;
    debug!(
        path = %path.display(),
        schemas = decls.schemas.len(),
        enums = decls.enums.len(),
        "Loaded schema declarations"
    );
    Ok(decls)
}

/// Loads and concatenates several declaration files in order.
pub fn load_all_declarations<P: AsRef<Path>>(paths: &[P]) -> Result<Declarations> {
    let mut all = Declarations::new();
    for path in paths {
        all.extend(load_declarations(path)?);
    }
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
enums:
  Activation: [relu, gelu, tanh]
schemas:
  - name: OptimizerConfig
    fields:
      - { name: lr, type: float, default: 0.01 }
  - name: SGDConfig
    parent: OptimizerConfig
    fields:
      - { name: momentum, type: float }
"#;

    #[test]
    fn test_yaml_with_enum_mapping() {
        let decls = parse_declarations(YAML, SourceFormat::Yaml).unwrap();
        assert_eq!(decls.enums, vec![EnumDecl::new("Activation", ["relu", "gelu", "tanh"])]);
        assert_eq!(decls.schemas[1].parent.as_deref(), Some("OptimizerConfig"));
    }

    #[test]
    fn test_json_with_enum_list() {
        let text = r#"{
            "enums": [{"name": "Optimizer", "literals": ["SGD", "Adam"]}],
            "schemas": [{"name": "A", "repeatable": true, "fields": []}]
        }"#;
        let decls = parse_declarations(text, SourceFormat::Json).unwrap();
        assert_eq!(decls.enums[0].literals, vec!["SGD", "Adam"]);
        assert!(decls.schemas[0].repeatable);
    }

    #[test]
    fn test_unknown_top_level_key_is_rejected() {
        let text = "schemas: [{name: A}]\nplugins: []\n";
        assert!(parse_declarations(text, SourceFormat::Yaml).is_err());
    }

    #[test]
    fn test_empty_declaration_is_rejected() {
        assert!(matches!(
            parse_declarations("enums: {}\n", SourceFormat::Yaml),
            Err(LoadError::InvalidDeclaration(_))
        ));
    }
}
