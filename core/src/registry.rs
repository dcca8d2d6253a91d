//! Schema registry for one resolution run.
//!
//! The registry is built once from the caller's [`Declarations`]: named
//! enums are validated, every schema declaration is extracted, and
//! duplicate registrations are recorded so reference resolution can report
//! them. The set is closed once built; there is no late registration.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::error::ResolutionError;
use crate::extract::{ExtractContext, extract_schema, is_identifier};
use crate::types::{Declarations, Schema};

/// The closed set of extracted schemas for one run.
#[derive(Debug, Clone)]
pub struct Registry {
    schemas: Vec<Schema>,
    by_name: BTreeMap<String, Vec<usize>>,
}

impl Registry {
    /// Validates and extracts every declaration.
    ///
    /// Duplicate schema names are *not* an error here; they are reported by
    /// [`duplicate_registrations`](Self::duplicate_registrations) and during
    /// reference resolution.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::SchemaDeclaration`] for the first
    /// declaration (enum or schema) that cannot be extracted.
    ///
    /// # Examples
    ///
    /// ```
    /// use confgraph_core::{Declarations, FieldDecl, Registry, SchemaDecl};
    ///
    /// let decls = Declarations::new()
    ///     .with_schema(SchemaDecl::new("OptimizerConfig").with_field(FieldDecl::new("lr", "float")))
    ///     .with_schema(SchemaDecl::new("SGDConfig").with_parent("OptimizerConfig"));
    ///
    /// let registry = Registry::build(&decls).unwrap();
    /// assert_eq!(registry.len(), 2);
    /// assert!(registry.get("SGDConfig").is_some());
    /// ```
    pub fn build(decls: &Declarations) -> Result<Self, ResolutionError> {
        let schema_names: BTreeSet<String> = decls.schemas.iter().map(|s| s.name.clone()).collect();

        let mut enums = BTreeMap::new();
        for decl in &decls.enums {
            let fail = |message: String| ResolutionError::SchemaDeclaration {
                schema: decl.name.clone(),
                message,
            };
            if !is_identifier(&decl.name) {
                return Err(fail(format!("'{}' is not a valid enum name", decl.name)));
            }
            if schema_names.contains(&decl.name) {
                return Err(fail(format!(
                    "enum '{}' has the same name as a schema",
                    decl.name
                )));
            }
            if decl.literals.is_empty() {
                return Err(fail("enum must declare at least one literal".to_string()));
            }
            let unique: BTreeSet<&String> = decl.literals.iter().collect();
            if unique.len() != decl.literals.len() {
                return Err(fail("enum declares a literal more than once".to_string()));
            }
            if enums
                .insert(decl.name.clone(), decl.literals.clone())
                .is_some()
            {
                return Err(fail(format!("enum '{}' is declared twice", decl.name)));
            }
        }

        let ctx = ExtractContext::new(enums, schema_names);
        let mut schemas = Vec::with_capacity(decls.schemas.len());
        let mut by_name: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for decl in &decls.schemas {
            let schema = extract_schema(decl, &ctx)?;
            by_name
                .entry(schema.name.clone())
                .or_default()
                .push(schemas.len());
            schemas.push(schema);
        }

        debug!(
            schemas = schemas.len(),
            enums = decls.enums.len(),
            "Registered schema declarations"
        );
        Ok(Self { schemas, by_name })
    }

    /// Returns the first registration of `name`.
    pub fn get(&self, name: &str) -> Option<&Schema> {
        self.by_name
            .get(name)
            .and_then(|indices| indices.first())
            .map(|&i| &self.schemas[i])
    }

    /// Returns every registration, in registration order.
    pub fn schemas(&self) -> &[Schema] {
        &self.schemas
    }

    /// Returns `true` if `name` is registered at least once.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Returns the number of registrations (duplicates included).
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Returns one [`ResolutionError::DuplicateReference`] per schema name
    /// registered more than once.
    pub fn duplicate_registrations(&self) -> Vec<ResolutionError> {
        self.by_name
            .iter()
            .filter(|(_, indices)| indices.len() > 1)
            .map(|(name, _)| ResolutionError::DuplicateReference {
                schema: name.clone(),
                field: None,
                reference: name.clone(),
            })
            .collect()
    }
}
