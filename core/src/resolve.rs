//! The resolution entry point.
//!
//! [`Resolver`] runs the whole pipeline:
//!
//! 1. register and extract declarations ([`Registry`]);
//! 2. resolve inheritance ([`resolve_inheritance`]);
//! 3. merge ranked sources ([`merge_sources`]);
//! 4. plan instances and resolve references;
//! 5. coerce every field;
//! 6. build the [`ConfigGraph`].
//!
//! Declaration errors, cyclic inheritance and a missing source list stop the
//! run at once. Everything after that accumulates, and the graph is only
//! built when nothing went wrong.

use tracing::{debug, warn};

use crate::coerce::coerce_instance;
use crate::error::{ResolutionError, ResolutionReport, Result};
use crate::graph::{ConfigGraph, ResolvedInstance};
use crate::inherit::resolve_inheritance;
use crate::merge::{RawTree, merge_sources};
use crate::reference::{plan_instances, resolve_references};
use crate::registry::Registry;
use crate::types::{DeclareSchema, Declarations, EnumDecl, SchemaDecl};

/// Options for one resolution run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Fail with [`ResolutionError::NoSources`] when no source and no
    /// non-empty override tree was given.
    pub require_at_least_one_source: bool,
}

/// Builder for one resolution run.
///
/// # Examples
///
/// ```
/// use confgraph_core::{FieldDecl, Resolver, SchemaDecl, TypedValue};
/// use serde_json::json;
///
/// let overrides = json!({"OptimizerConfig": {"lr": "0.05"}});
/// let graph = Resolver::new()
///     .with_schema(SchemaDecl::new("OptimizerConfig")
///         .with_field(FieldDecl::new("lr", "float").with_default(0.01)))
///     .with_overrides(overrides.as_object().unwrap().clone())
///     .resolve()
///     .unwrap();
///
/// let lr = graph.get("OptimizerConfig").unwrap().get("lr");
/// assert_eq!(lr, Some(&TypedValue::Float(0.05)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    declarations: Declarations,
    sources: Vec<RawTree>,
    overrides: Option<RawTree>,
    options: ResolveOptions,
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one schema declaration.
    pub fn with_schema(mut self, schema: SchemaDecl) -> Self {
        self.declarations.schemas.push(schema);
        self
    }

    /// Registers several schema declarations.
    pub fn with_schemas(mut self, schemas: impl IntoIterator<Item = SchemaDecl>) -> Self {
        self.declarations.schemas.extend(schemas);
        self
    }

    /// Registers named enums.
    pub fn with_enums(mut self, enums: impl IntoIterator<Item = EnumDecl>) -> Self {
        self.declarations.enums.extend(enums);
        self
    }

    /// Adds a whole declaration set (for example one loaded from a file).
    pub fn with_declarations(mut self, declarations: Declarations) -> Self {
        self.declarations.extend(declarations);
        self
    }

    /// Registers a type implementing [`DeclareSchema`] and its enums.
    pub fn register<T: DeclareSchema>(mut self) -> Self {
        self.declarations.enums.extend(T::enums());
        self.declarations.schemas.push(T::declare());
        self
    }

    /// Appends a source above every source added so far.
    pub fn with_source(mut self, source: RawTree) -> Self {
        self.sources.push(source);
        self
    }

    /// Appends sources in ascending precedence.
    pub fn with_sources(mut self, sources: impl IntoIterator<Item = RawTree>) -> Self {
        self.sources.extend(sources);
        self
    }

    /// Sets the highest-precedence override tree.
    pub fn with_overrides(mut self, overrides: RawTree) -> Self {
        self.overrides = Some(overrides);
        self
    }

    pub fn require_at_least_one_source(mut self, required: bool) -> Self {
        self.options.require_at_least_one_source = required;
        self
    }

    pub fn with_options(mut self, options: ResolveOptions) -> Self {
        self.options = options;
        self
    }

    /// Runs the resolution.
    ///
    /// # Errors
    ///
    /// Returns a [`ResolutionReport`] listing every problem found. No partial
    /// graph is ever returned.
    pub fn resolve(&self) -> Result<ConfigGraph> {
        run(
            &self.declarations,
            &self.sources,
            self.overrides.as_ref(),
            self.options,
        )
    }
}

/// Resolves `schemas` against `sources` (ascending precedence) and
/// `overrides` (highest precedence) with default options.
///
/// # Errors
///
/// See [`Resolver::resolve`].
pub fn resolve(schemas: &[SchemaDecl], sources: &[RawTree], overrides: Option<&RawTree>) -> Result<ConfigGraph> {
    let declarations = Declarations {
        enums: Vec::new(),
        schemas: schemas.to_vec(),
    };
    run(&declarations, sources, overrides, ResolveOptions::default())
}

fn run(
    declarations: &Declarations,
    sources: &[RawTree],
    overrides: Option<&RawTree>,
    options: ResolveOptions,
) -> Result<ConfigGraph> {
    let registry = Registry::build(declarations)?;
    let schemas = resolve_inheritance(&registry)?;

    let has_overrides = overrides.is_some_and(|o| !o.is_empty());
    if options.require_at_least_one_source && sources.is_empty() && !has_overrides {
        warn!("No configuration source was given");
        return Err(ResolutionError::NoSources.into());
    }

    let mut errors = registry.duplicate_registrations();
    let merged = merge_sources(&schemas, sources, overrides, &mut errors);
    let plans = plan_instances(&schemas, &merged);
    let references = resolve_references(&schemas, &plans, &mut errors);

    let instances: Vec<ResolvedInstance> = plans
        .iter()
        .map(|plan| {
            let schema = &schemas[plan.registration];
            let values = coerce_instance(schema, plan, &references, &mut errors);
            ResolvedInstance::new(plan.id, plan.name.clone(), schema.name.clone(), values)
        })
        .collect();

    debug!(
        schemas = schemas.len(),
        sources = merged.source_count(),
        instances = instances.len(),
        errors = errors.len(),
        "Finished resolution"
    );

    match ResolutionReport::from_errors(errors) {
        Some(report) => Err(report),
        None => Ok(ConfigGraph::new(instances, &schemas)),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::ErrorKind;
    use crate::types::FieldDecl;

    fn tree(value: serde_json::Value) -> RawTree {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_no_sources_when_required() {
        let report = Resolver::new()
            .with_schema(SchemaDecl::new("A").with_field(FieldDecl::new("x", "int").with_default(1)))
            .require_at_least_one_source(true)
            .resolve()
            .unwrap_err();
        assert_eq!(report.errors(), &[ResolutionError::NoSources]);
    }

    #[test]
    fn test_defaults_only_run_is_allowed_by_default() {
        let graph = Resolver::new()
            .with_schema(SchemaDecl::new("A").with_field(FieldDecl::new("x", "int").with_default(1)))
            .resolve()
            .unwrap();
        assert_eq!(graph.get("A").unwrap().get("x").and_then(|v| v.as_int()), Some(1));
    }

    #[test]
    fn test_errors_accumulate_across_schemas() {
        let schemas = vec![
            SchemaDecl::new("A").with_field(FieldDecl::new("x", "int")),
            SchemaDecl::new("B").with_field(FieldDecl::new("y", "bool")),
        ];
        let report = resolve(&schemas, &[tree(json!({"B": {"y": "maybe"}}))], None).unwrap_err();
        assert_eq!(report.len(), 2);
        assert_eq!(report.count(ErrorKind::MissingRequiredFieldError), 1);
        assert_eq!(report.count(ErrorKind::InvalidTypeError), 1);
    }

    #[test]
    fn test_cyclic_inheritance_fails_immediately() {
        let schemas = vec![
            SchemaDecl::new("A").with_parent("B"),
            SchemaDecl::new("B").with_parent("A"),
        ];
        let report = resolve(&schemas, &[tree(json!({"Unknown": {}}))], None).unwrap_err();
        assert_eq!(report.len(), 1);
        assert_eq!(report.errors()[0].kind(), ErrorKind::CyclicInheritanceError);
    }

    #[test]
    fn test_repeatable_instances_are_named_by_index() {
        let graph = Resolver::new()
            .with_schema(SchemaDecl::new("Layer").repeatable().with_field(FieldDecl::new("width", "int")))
            .with_source(tree(json!({"Layer": [{"width": 8}, {"width": 16}]})))
            .resolve()
            .unwrap();
        assert_eq!(graph.instances_of("Layer").len(), 2);
        assert_eq!(graph.get("Layer[1]").unwrap().get("width").and_then(|v| v.as_int()), Some(16));
    }
}
