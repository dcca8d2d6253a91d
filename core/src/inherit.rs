//! Inheritance resolution: own field specs to effective field specs.
//!
//! A schema's effective fields are computed by walking its parent chain from
//! the root down. A descendant field with an ancestor's name replaces the
//! ancestor spec entirely but keeps its position; new fields are appended.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::error::ResolutionError;
use crate::registry::Registry;
use crate::types::{FieldSpec, Schema};

/// A schema with its inherited fields merged in.
///
/// # Examples
///
/// ```
/// use confgraph_core::{Declarations, FieldDecl, Registry, SchemaDecl, resolve_inheritance};
///
/// let decls = Declarations::new()
///     .with_schema(SchemaDecl::new("OptimizerConfig")
///         .with_field(FieldDecl::new("lr", "float").with_default(0.01)))
///     .with_schema(SchemaDecl::new("SGDConfig")
///         .with_parent("OptimizerConfig")
///         .with_field(FieldDecl::new("momentum", "float")));
/// let registry = Registry::build(&decls).unwrap();
/// let effective = resolve_inheritance(&registry).unwrap();
///
/// let sgd = &effective[1];
/// assert_eq!(sgd.field_names(), vec!["lr", "momentum"]);
/// assert!(sgd.is_kind_of("OptimizerConfig"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveSchema {
    /// Schema name.
    pub name: String,
    /// Ancestors from the root down, ending with this schema.
    pub lineage: Vec<String>,
    /// Whether several instances may be defined.
    pub repeatable: bool,
    /// Description.
    pub description: Option<String>,
    /// Effective field specs, ancestor-first.
    pub fields: Vec<FieldSpec>,
}

impl EffectiveSchema {
    /// Finds an effective field by name.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns the effective field names in order.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Returns `true` if this schema is `ancestor` or descends from it.
    pub fn is_kind_of(&self, ancestor: &str) -> bool {
        self.lineage.iter().any(|name| name == ancestor)
    }
}

/// Computes effective schemas for every registration, parallel to
/// [`Registry::schemas`].
///
/// # Errors
///
/// Returns [`ResolutionError::CyclicInheritance`] if a parent chain revisits
/// a schema.
pub fn resolve_inheritance(registry: &Registry) -> Result<Vec<EffectiveSchema>, ResolutionError> {
    let mut resolver = InheritanceResolver {
        registry,
        cache: HashMap::new(),
    };

    let mut effective = Vec::with_capacity(registry.len());
    for schema in registry.schemas() {
        let is_primary = registry
            .get(&schema.name)
            .is_some_and(|first| std::ptr::eq(first, schema));
        let resolved = if is_primary {
            resolver.effective_by_name(&schema.name, &mut Vec::new())?
        } else {
            resolver.overlay(schema, &mut vec![schema.name.clone()])?
        };
        effective.push(resolved);
    }

    debug!(schemas = effective.len(), "Resolved inheritance chains");
    Ok(effective)
}

struct InheritanceResolver<'r> {
    registry: &'r Registry,
    cache: HashMap<String, EffectiveSchema>,
}

impl InheritanceResolver<'_> {
    fn effective_by_name(
        &mut self,
        name: &str,
        visiting: &mut Vec<String>,
    ) -> Result<EffectiveSchema, ResolutionError> {
        if let Some(hit) = self.cache.get(name) {
            return Ok(hit.clone());
        }
        if let Some(start) = visiting.iter().position(|v| v == name) {
            let mut chain = visiting[start..].to_vec();
            chain.push(name.to_string());
            return Err(ResolutionError::CyclicInheritance { chain });
        }

        let registry = self.registry;
        let schema = registry
            .get(name)
            .ok_or_else(|| ResolutionError::SchemaDeclaration {
                schema: name.to_string(),
                message: "schema is not registered".to_string(),
            })?;

        visiting.push(name.to_string());
        let resolved = self.overlay(schema, visiting)?;
        visiting.pop();

        self.cache.insert(name.to_string(), resolved.clone());
        Ok(resolved)
    }

    fn overlay(
        &mut self,
        schema: &Schema,
        visiting: &mut Vec<String>,
    ) -> Result<EffectiveSchema, ResolutionError> {
        let (mut lineage, mut fields) = match &schema.parent {
            Some(parent) => {
                let base = self.effective_by_name(parent, visiting)?;
                (base.lineage, base.fields)
            }
            None => (Vec::new(), Vec::new()),
        };

        lineage.push(schema.name.clone());
        for own in &schema.fields {
            match fields.iter_mut().find(|f| f.name == own.name) {
                Some(slot) => *slot = own.clone(),
                None => fields.push(own.clone()),
            }
        }

        Ok(EffectiveSchema {
            name: schema.name.clone(),
            lineage,
            repeatable: schema.repeatable,
            description: schema.description.clone(),
            fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::{DeclaredType, Declarations, FieldDecl, ScalarKind, SchemaDecl};

    fn build(decls: Declarations) -> Result<Vec<EffectiveSchema>, ResolutionError> {
        let registry = Registry::build(&decls)?;
        resolve_inheritance(&registry)
    }

    #[test]
    fn test_child_override_keeps_position_and_wins_entirely() {
        let effective = build(
            Declarations::new()
                .with_schema(
                    SchemaDecl::new("Base")
                        .with_field(FieldDecl::new("a", "int").with_default(1))
                        .with_field(FieldDecl::new("b", "int")),
                )
                .with_schema(
                    SchemaDecl::new("Mid")
                        .with_parent("Base")
                        .with_field(FieldDecl::new("c", "bool")),
                )
                .with_schema(
                    SchemaDecl::new("Leaf")
                        .with_parent("Mid")
                        .with_field(FieldDecl::new("a", "str").with_default("x")),
                ),
        )
        .unwrap();

        let leaf = &effective[2];
        assert_eq!(leaf.field_names(), vec!["a", "b", "c"]);
        let a = leaf.field("a").unwrap();
        assert_eq!(a.ty, DeclaredType::Scalar(ScalarKind::Str));
        assert_eq!(a.default, Some(json!("x")));
        assert_eq!(a.declared_in, "Leaf");
        assert_eq!(leaf.lineage, vec!["Base", "Mid", "Leaf"]);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let err = build(
            Declarations::new()
                .with_schema(SchemaDecl::new("A").with_parent("B"))
                .with_schema(SchemaDecl::new("B").with_parent("A")),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ResolutionError::CyclicInheritance {
                chain: vec!["A".into(), "B".into(), "A".into()]
            }
        );
    }

    #[test]
    fn test_self_parent_is_a_cycle() {
        let err = build(Declarations::new().with_schema(SchemaDecl::new("A").with_parent("A")))
            .unwrap_err();
        assert!(matches!(err, ResolutionError::CyclicInheritance { .. }));
    }

    #[test]
    fn test_duplicate_registration_resolves_independently() {
        let effective = build(
            Declarations::new()
                .with_schema(SchemaDecl::new("Child").with_field(FieldDecl::new("x", "int")))
                .with_schema(SchemaDecl::new("Child").with_field(FieldDecl::new("y", "int"))),
        )
        .unwrap();
        assert_eq!(effective[0].field_names(), vec!["x"]);
        assert_eq!(effective[1].field_names(), vec!["y"]);
    }
}
