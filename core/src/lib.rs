//! Typed configuration schemas and validated config graph resolution.
//!
//! Callers declare configuration *schemas* (named, typed fields with
//! optional defaults and single inheritance), then resolve them against
//! ranked raw sources into an immutable [`ConfigGraph`]:
//!
//! - [`SchemaDecl`] / [`FieldDecl`] / [`DeclareSchema`]: declarations, with
//!   field types written as annotations (`"int"`, `"Optional[List[float]]"`,
//!   `"Tuple[int, int]"`, `"Enum[relu, gelu]"`, schema names).
//! - [`Registry`] and [`resolve_inheritance`]: extraction and inherited
//!   [`EffectiveSchema`]s.
//! - [`merge_sources`]: shallow per-key merge of ranked [`RawTree`]s.
//! - [`coerce_value`]: narrow coercion of raw values into [`TypedValue`]s.
//! - [`Resolver`] / [`resolve`]: the full pipeline, returning a graph or a
//!   [`ResolutionReport`] listing every problem found.
//!
//! The crate performs no I/O; file loading and command-line parsing live in
//! `confgraph-loader`.
//!
//! # Example
//!
//! ```
//! use confgraph_core::*;
//! use serde_json::json;
//!
//! let resolver = Resolver::new()
//!     .with_enums([EnumDecl::new("Activation", ["relu", "gelu", "tanh"])])
//!     .with_schema(SchemaDecl::new("OptimizerConfig")
//!         .with_field(FieldDecl::new("lr", "float").with_default(0.01)))
//!     .with_schema(SchemaDecl::new("SGDConfig")
//!         .with_parent("OptimizerConfig")
//!         .with_field(FieldDecl::new("momentum", "float").with_default(0.9)))
//!     .with_schema(SchemaDecl::new("ModelConfig")
//!         .with_field(FieldDecl::new("activation", "Activation"))
//!         .with_field(FieldDecl::new("optimizer", "OptimizerConfig")));
//!
//! let source = json!({
//!     "ModelConfig": {"activation": "gelu", "optimizer": "SGDConfig"},
//!     "SGDConfig": {"lr": 0.1}
//! });
//! let graph = resolver.with_source(source.as_object().unwrap().clone()).resolve().unwrap();
//!
//! let model = graph.get("ModelConfig").unwrap();
//! assert_eq!(model.get("activation"), Some(&TypedValue::Enum("gelu".into())));
//! let optimizer = graph.follow(model.get("optimizer").unwrap())[0];
//! assert_eq!(optimizer.name(), "SGDConfig");
//! assert_eq!(optimizer.get("lr"), Some(&TypedValue::Float(0.1)));
//!
//! // The swish activation is not declared.
//! let bad = json!({"ModelConfig": {"activation": "swish"}});
//! let report = resolve(&[SchemaDecl::new("ModelConfig")
//!         .with_field(FieldDecl::new("activation", "Enum[relu, gelu, tanh]"))],
//!     &[bad.as_object().unwrap().clone()], None).unwrap_err();
//! assert_eq!(report.count(ErrorKind::InvalidEnumValueError), 1);
//! ```

mod annotation;
mod coerce;
mod error;
mod extract;
mod graph;
mod inherit;
mod merge;
mod reference;
mod registry;
mod resolve;
mod types;

pub use annotation::{AnnotationError, TypeExpr, parse_annotation};
pub use coerce::coerce_value;
pub use error::{ErrorKind, ErrorRecord, ResolutionError, ResolutionReport, Result};
pub use extract::{ExtractContext, extract_schema, is_identifier};
pub use graph::{ConfigGraph, InstanceId, ResolvedInstance, TypedValue};
pub use inherit::{EffectiveSchema, resolve_inheritance};
pub use merge::{MergedSection, MergedSources, RawTree, merge_sources};
pub use reference::ResolvedRef;
pub use registry::Registry;
pub use resolve::{ResolveOptions, Resolver, resolve};
pub use types::*;
