//! Resolution errors and the aggregated failure report.
//!
//! Every problem found while resolving a configuration graph is one
//! [`ResolutionError`]. Structural problems abort the run immediately;
//! field- and reference-level problems are collected and returned together
//! in a [`ResolutionReport`], so callers see every problem in one pass.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Discriminant of a [`ResolutionError`], useful for matching and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// A declaration could not be extracted.
    SchemaDeclarationError,
    /// A parent chain loops.
    CyclicInheritanceError,
    /// A source failed to load.
    SourceLoadError,
    /// No source was given where one is required.
    NoSourcesError,
    /// A source names an unregistered schema.
    UnknownSchemaError,
    /// A source sets a field no schema declares.
    UnknownFieldError,
    /// A required field has no value.
    MissingRequiredFieldError,
    /// A value does not fit its declared type.
    InvalidTypeError,
    /// A tuple has the wrong number of elements.
    ArityError,
    /// A value is not an allowed enum literal.
    InvalidEnumValueError,
    /// A reference names no instance.
    MissingReferenceError,
    /// A reference matches several instances.
    AmbiguousReferenceError,
    /// A reference names an instance of the wrong kind.
    TypeMismatchReferenceError,
    /// An instance is named twice.
    DuplicateReferenceError,
    /// References form a cycle.
    CyclicReferenceError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A single resolution problem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// A declaration could not be mapped onto the declared-type model.
    #[error("invalid declaration for schema '{schema}': {message}")]
    SchemaDeclaration { schema: String, message: String },

    /// A parent chain revisits a schema.
    #[error("cyclic inheritance: {}", .chain.join(" -> "))]
    CyclicInheritance { chain: Vec<String> },

    /// An external source could not be loaded.
    #[error("failed to load source '{source_name}': {message}")]
    SourceLoad { source_name: String, message: String },

    /// At least one source was required but none was given.
    #[error("no configuration sources provided")]
    NoSources,

    /// A source names a schema that was never registered.
    #[error("unknown schema '{schema}' in configuration source")]
    UnknownSchema { schema: String },

    /// A source sets a field the schema does not declare.
    #[error("unknown field '{field}' for schema '{}'", scope_name(.schema))]
    UnknownField { schema: Option<String>, field: String },

    /// A required field received no value and has no default.
    #[error("missing required field '{schema}.{field}'")]
    MissingRequiredField { schema: String, field: String },

    /// A raw value does not agree with the declared type.
    #[error("invalid value for '{schema}.{field}': expected {expected}, found {found}")]
    InvalidType {
        schema: String,
        field: String,
        expected: String,
        found: String,
    },

    /// A tuple value has the wrong number of elements.
    #[error("wrong arity for '{schema}.{field}': expected {expected} elements, found {found}")]
    Arity {
        schema: String,
        field: String,
        expected: usize,
        found: usize,
    },

    /// An enum value is not one of the allowed literals.
    #[error(
        "invalid value '{value}' for '{schema}.{field}': expected one of {{{}}}",
        .allowed.join(", ")
    )]
    InvalidEnumValue {
        schema: String,
        field: String,
        value: String,
        allowed: Vec<String>,
    },

    /// A reference field names nothing that exists, or is required and
    /// absent.
    #[error(
        "missing reference for '{schema}.{field}'{}",
        missing_suffix(.reference)
    )]
    MissingReference {
        schema: String,
        field: String,
        reference: Option<String>,
    },

    /// A reference name resolves to more than one instance.
    #[error(
        "ambiguous reference '{reference}' for '{schema}.{field}': candidates {}",
        .candidates.join(", ")
    )]
    AmbiguousReference {
        schema: String,
        field: String,
        reference: String,
        candidates: Vec<String>,
    },

    /// A reference names an instance of the wrong schema kind.
    #[error(
        "reference '{reference}' for '{schema}.{field}' is a {actual}, expected {expected} or a descendant"
    )]
    TypeMismatchReference {
        schema: String,
        field: String,
        reference: String,
        expected: String,
        actual: String,
    },

    /// A name is registered twice, or repeated within one reference list.
    #[error("duplicate reference '{reference}'{}", duplicate_scope(.schema, .field))]
    DuplicateReference {
        schema: String,
        field: Option<String>,
        reference: String,
    },

    /// Instance references form a cycle.
    #[error("cyclic reference: {}", .chain.join(" -> "))]
    CyclicReference { chain: Vec<String> },
}

fn scope_name(schema: &Option<String>) -> &str {
    schema.as_deref().unwrap_or("<global>")
}

fn missing_suffix(reference: &Option<String>) -> String {
    match reference {
        Some(name) => format!(": no instance named '{name}'"),
        None => String::new(),
    }
}

fn duplicate_scope(schema: &str, field: &Option<String>) -> String {
    match field {
        Some(field) => format!(" in '{schema}.{field}'"),
        None => " registration".to_string(),
    }
}

impl ResolutionError {
    /// Returns the error discriminant.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResolutionError::SchemaDeclaration { .. } => ErrorKind::SchemaDeclarationError,
            ResolutionError::CyclicInheritance { .. } => ErrorKind::CyclicInheritanceError,
            ResolutionError::SourceLoad { .. } => ErrorKind::SourceLoadError,
            ResolutionError::NoSources => ErrorKind::NoSourcesError,
            ResolutionError::UnknownSchema { .. } => ErrorKind::UnknownSchemaError,
            ResolutionError::UnknownField { .. } => ErrorKind::UnknownFieldError,
            ResolutionError::MissingRequiredField { .. } => ErrorKind::MissingRequiredFieldError,
            ResolutionError::InvalidType { .. } => ErrorKind::InvalidTypeError,
            ResolutionError::Arity { .. } => ErrorKind::ArityError,
            ResolutionError::InvalidEnumValue { .. } => ErrorKind::InvalidEnumValueError,
            ResolutionError::MissingReference { .. } => ErrorKind::MissingReferenceError,
            ResolutionError::AmbiguousReference { .. } => ErrorKind::AmbiguousReferenceError,
            ResolutionError::TypeMismatchReference { .. } => {
                ErrorKind::TypeMismatchReferenceError
            }
            ResolutionError::DuplicateReference { .. } => ErrorKind::DuplicateReferenceError,
            ResolutionError::CyclicReference { .. } => ErrorKind::CyclicReferenceError,
        }
    }

    /// Returns the schema (or instance) the error is about, if any.
    pub fn schema(&self) -> Option<&str> {
        match self {
            ResolutionError::SchemaDeclaration { schema, .. }
            | ResolutionError::UnknownSchema { schema }
            | ResolutionError::MissingRequiredField { schema, .. }
            | ResolutionError::InvalidType { schema, .. }
            | ResolutionError::Arity { schema, .. }
            | ResolutionError::InvalidEnumValue { schema, .. }
            | ResolutionError::MissingReference { schema, .. }
            | ResolutionError::AmbiguousReference { schema, .. }
            | ResolutionError::TypeMismatchReference { schema, .. }
            | ResolutionError::DuplicateReference { schema, .. } => Some(schema),
            ResolutionError::UnknownField { schema, .. } => schema.as_deref(),
            ResolutionError::CyclicInheritance { chain }
            | ResolutionError::CyclicReference { chain } => chain.first().map(String::as_str),
            ResolutionError::SourceLoad { .. } | ResolutionError::NoSources => None,
        }
    }

    /// Returns the field the error is about, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            ResolutionError::UnknownField { field, .. }
            | ResolutionError::MissingRequiredField { field, .. }
            | ResolutionError::InvalidType { field, .. }
            | ResolutionError::Arity { field, .. }
            | ResolutionError::InvalidEnumValue { field, .. }
            | ResolutionError::MissingReference { field, .. }
            | ResolutionError::AmbiguousReference { field, .. }
            | ResolutionError::TypeMismatchReference { field, .. } => Some(field),
            ResolutionError::DuplicateReference { field, .. } => field.as_deref(),
            _ => None,
        }
    }

    /// Returns `true` for errors that stop a run before any per-field work.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ResolutionError::SchemaDeclaration { .. }
                | ResolutionError::CyclicInheritance { .. }
                | ResolutionError::SourceLoad { .. }
                | ResolutionError::NoSources
        )
    }

    /// Flattens the error into a reportable record.
    pub fn to_record(&self) -> ErrorRecord {
        ErrorRecord {
            schema: self.schema().map(String::from),
            field: self.field().map(String::from),
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// A `(schema, field, kind, message)` tuple for user-visible reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub schema: Option<String>,
    pub field: Option<String>,
    pub kind: ErrorKind,
    pub message: String,
}

/// Aggregated failure of one resolution run. Never empty.
///
/// # Examples
///
/// ```
/// use confgraph_core::{ErrorKind, ResolutionError, ResolutionReport};
///
/// let report = ResolutionReport::from(ResolutionError::NoSources);
/// assert_eq!(report.len(), 1);
/// assert_eq!(report.count(ErrorKind::NoSourcesError), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("configuration resolution failed with {} error(s):\n{}", .errors.len(), render(.errors))]
pub struct ResolutionReport {
    errors: Vec<ResolutionError>,
}

fn render(errors: &[ResolutionError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - [{}] {e}", e.kind()))
        .collect::<Vec<_>>()
        .join("\n")
}

impl ResolutionReport {
    /// Wraps collected errors; returns `None` when there are none.
    pub fn from_errors(errors: Vec<ResolutionError>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self { errors })
        }
    }

    /// Returns the collected errors in discovery order.
    pub fn errors(&self) -> &[ResolutionError] {
        &self.errors
    }

    /// Returns the number of errors.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Always `false`; a report holds at least one error.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Counts errors of the given kind.
    pub fn count(&self, kind: ErrorKind) -> usize {
        self.errors.iter().filter(|e| e.kind() == kind).count()
    }

    /// Returns every error as a `(schema, field, kind, message)` record.
    pub fn records(&self) -> Vec<ErrorRecord> {
        self.errors.iter().map(ResolutionError::to_record).collect()
    }

    /// Consumes the report, returning the errors.
    pub fn into_errors(self) -> Vec<ResolutionError> {
        self.errors
    }
}

impl From<ResolutionError> for ResolutionReport {
    fn from(error: ResolutionError) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

/// Convenience alias for results of a resolution run.
pub type Result<T> = std::result::Result<T, ResolutionReport>;
