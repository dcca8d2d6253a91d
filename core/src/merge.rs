//! Ranked source merging.
//!
//! Sources are raw value trees ordered from lowest to highest precedence.
//! [`merge_sources`] folds them into one section per schema: for every
//! top-level key of a section, the highest-precedence source that defines it
//! wins. Merging is shallow; a nested mapping or list from a higher source
//! replaces the lower one wholesale.
//!
//! Top-level keys of a source are either schema names (mapping sections, or
//! lists of mappings for repeatable schemas) or *global* parameters: plain
//! values that apply to every schema declaring a field with that name. A
//! schema's own section overrides globals from the same source.
//!
//! # Example
//!
//! ```
//! use confgraph_core::{Declarations, FieldDecl, MergedSection, Registry, SchemaDecl,
//!     merge_sources, resolve_inheritance};
//! use serde_json::json;
//!
//! let decls = Declarations::new().with_schema(
//!     SchemaDecl::new("OptimizerConfig").with_field(FieldDecl::new("lr", "float")),
//! );
//! let registry = Registry::build(&decls).unwrap();
//! let schemas = resolve_inheritance(&registry).unwrap();
//!
//! let low = json!({"OptimizerConfig": {"lr": 0.1}});
//! let high = json!({"OptimizerConfig": {"lr": 0.05}});
//! let sources = [low.as_object().unwrap().clone(), high.as_object().unwrap().clone()];
//!
//! let mut errors = Vec::new();
//! let merged = merge_sources(&schemas, &sources, None, &mut errors);
//! assert!(errors.is_empty());
//! match merged.section("OptimizerConfig") {
//!     Some(MergedSection::Single(fields)) => assert_eq!(fields["lr"], json!(0.05)),
//!     other => panic!("unexpected section: {other:?}"),
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ResolutionError;
use crate::inherit::EffectiveSchema;

/// An untyped source tree: schema name or global field → raw value.
pub type RawTree = Map<String, Value>;

/// The merged raw input of one schema.
#[derive(Debug, Clone, PartialEq)]
pub enum MergedSection {
    /// One instance with its merged fields.
    Single(Map<String, Value>),
    /// Several instances of a repeatable schema, in source order.
    Repeated(Vec<Map<String, Value>>),
}

impl Default for MergedSection {
    fn default() -> Self {
        MergedSection::Single(Map::new())
    }
}

impl MergedSection {
    fn apply_global(&mut self, key: &str, value: &Value) {
        match self {
            MergedSection::Single(fields) => {
                fields.insert(key.to_string(), value.clone());
            }
            MergedSection::Repeated(instances) => {
                for fields in instances {
                    fields.insert(key.to_string(), value.clone());
                }
            }
        }
    }

    fn apply_mapping(&mut self, section: &Map<String, Value>) {
        match self {
            MergedSection::Single(fields) => {
                for (key, value) in section {
                    fields.insert(key.clone(), value.clone());
                }
            }
            MergedSection::Repeated(_) => *self = MergedSection::Single(section.clone()),
        }
    }
}

/// Result of merging every source, one section per schema name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedSources {
    sections: BTreeMap<String, MergedSection>,
    source_count: usize,
}

impl MergedSources {
    /// Returns the merged section of `schema`, if any source defined it.
    pub fn section(&self, schema: &str) -> Option<&MergedSection> {
        self.sections.get(schema)
    }

    /// Returns the number of sources that were merged, overrides included.
    pub fn source_count(&self) -> usize {
        self.source_count
    }
}

/// Merges `sources` (ascending precedence) and `overrides` (highest).
///
/// Unknown schemas, global keys no schema declares, and sections of the
/// wrong shape are pushed onto `errors`; merging continues so every problem
/// is reported. Missing required values are not checked here.
pub fn merge_sources(
    schemas: &[EffectiveSchema],
    sources: &[RawTree],
    overrides: Option<&RawTree>,
    errors: &mut Vec<ResolutionError>,
) -> MergedSources {
    let by_name: BTreeMap<&str, &EffectiveSchema> =
        schemas.iter().map(|s| (s.name.as_str(), s)).collect();

    let mut merged = MergedSources::default();
    let mut reported = BTreeSet::new();

    for tree in sources.iter().chain(overrides) {
        merged.source_count += 1;

        for (key, value) in tree {
            if by_name.contains_key(key.as_str()) || value.is_object() {
                continue;
            }
            let targets: Vec<&str> = schemas
                .iter()
                .filter(|s| s.field(key).is_some())
                .map(|s| s.name.as_str())
                .collect();
            if targets.is_empty() {
                if reported.insert(format!("global:{key}")) {
                    errors.push(ResolutionError::UnknownField {
                        schema: None,
                        field: key.clone(),
                    });
                }
                continue;
            }
            for target in targets {
                merged
                    .sections
                    .entry(target.to_string())
                    .or_default()
                    .apply_global(key, value);
            }
        }

        for (key, value) in tree {
            let Some(schema) = by_name.get(key.as_str()) else {
                if value.is_object() && reported.insert(format!("schema:{key}")) {
                    errors.push(ResolutionError::UnknownSchema {
                        schema: key.clone(),
                    });
                }
                continue;
            };

            match value {
                Value::Object(section) => {
                    merged
                        .sections
                        .entry(key.clone())
                        .or_default()
                        .apply_mapping(section);
                }
                Value::Array(items) if schema.repeatable => {
                    match collect_instances(key, items) {
                        Ok(mut instances) => {
                            // Globals from this source sit under each instance's own keys.
                            let globals = tree.iter().filter(|(name, global)| {
                                !by_name.contains_key(name.as_str())
                                    && !global.is_object()
                                    && schema.field(name).is_some()
                            });
                            for (name, global) in globals {
                                for fields in &mut instances {
                                    fields.entry(name.clone()).or_insert_with(|| global.clone());
                                }
                            }
                            merged
                                .sections
                                .insert(key.clone(), MergedSection::Repeated(instances));
                        }
                        Err(error) => errors.push(error),
                    }
                }
                other => errors.push(ResolutionError::InvalidType {
                    schema: key.clone(),
                    field: "<section>".to_string(),
                    expected: if schema.repeatable {
                        "a mapping or a list of mappings".to_string()
                    } else {
                        "a mapping".to_string()
                    },
                    found: describe_value(other),
                }),
            }
        }
    }

    debug!(
        sources = merged.source_count,
        sections = merged.sections.len(),
        "Merged configuration sources"
    );
    merged
}

fn collect_instances(schema: &str, items: &[Value]) -> Result<Vec<Map<String, Value>>, ResolutionError> {
    items
        .iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(fields) => Ok(fields.clone()),
            other => Err(ResolutionError::InvalidType {
                schema: schema.to_string(),
                field: format!("<section>[{index}]"),
                expected: "a mapping".to_string(),
                found: describe_value(other),
            }),
        })
        .collect()
}

/// Short human-readable description of a raw value for error messages.
pub(crate) fn describe_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("bool {b}"),
        Value::Number(n) if n.is_f64() => format!("float {n}"),
        Value::Number(n) => format!("integer {n}"),
        Value::String(s) => format!("string \"{s}\""),
        Value::Array(items) => format!("list of {} element(s)", items.len()),
        Value::Object(_) => "mapping".to_string(),
    }
}
