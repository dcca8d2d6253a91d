//! Declaration and field-spec types for configuration schemas.
//!
//! This module defines the data model shared by every resolution stage:
//! declarations as the caller writes them ([`SchemaDecl`], [`FieldDecl`],
//! [`EnumDecl`]) and the closed set of declared types the engine works
//! with once a declaration has been extracted ([`DeclaredType`],
//! [`FieldSpec`], [`Schema`]). All types serialize with [`serde`] so
//! declarations can be read from YAML, JSON or TOML files.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Primitive kind of a scalar field.
///
/// # Examples
///
/// ```
/// use confgraph_core::ScalarKind;
///
/// assert_eq!(ScalarKind::Float.to_string(), "float");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    /// Signed 64-bit integer.
    Int,
    /// 64-bit float.
    Float,
    /// Boolean.
    Bool,
    /// UTF-8 string.
    Str,
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarKind::Int => "int",
            ScalarKind::Float => "float",
            ScalarKind::Bool => "bool",
            ScalarKind::Str => "str",
        };
        f.write_str(name)
    }
}

/// The closed set of type shapes a field may declare.
///
/// Host-language or file annotations are mapped onto this enumeration at
/// registration time; anything that does not fit is rejected there rather
/// than during coercion.
///
/// The `Display` impl renders the annotation syntax accepted by
/// [`parse_annotation`](crate::parse_annotation).
///
/// # Examples
///
/// ```
/// use confgraph_core::{DeclaredType, ScalarKind};
///
/// let ty = DeclaredType::optional(DeclaredType::list(DeclaredType::Scalar(ScalarKind::Float)));
/// assert_eq!(ty.to_string(), "Optional[List[float]]");
/// assert!(!ty.is_reference());
///
/// let child = DeclaredType::SchemaRef("ChildConfig".into());
/// assert!(child.is_reference());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclaredType {
    /// A primitive value.
    Scalar(ScalarKind),
    /// A value that may be absent.
    Optional(Box<DeclaredType>),
    /// A variable-length homogeneous sequence.
    List(Box<DeclaredType>),
    /// A fixed-arity sequence, one type per position.
    Tuple(Vec<DeclaredType>),
    /// One of a fixed set of string literals (case-sensitive).
    Enum {
        /// Enum name (the named enum, or the field name for inline enums).
        name: String,
        /// Allowed literals in declaration order.
        allowed: Vec<String>,
    },
    /// A reference to one instance of the named schema (or a descendant).
    SchemaRef(String),
    /// References to several instances of the named schema (or descendants).
    RepeatedSchemaRef(String),
}

impl DeclaredType {
    /// Wraps `inner` in [`DeclaredType::Optional`].
    pub fn optional(inner: DeclaredType) -> Self {
        DeclaredType::Optional(Box::new(inner))
    }

    /// Wraps `inner` in [`DeclaredType::List`].
    pub fn list(inner: DeclaredType) -> Self {
        DeclaredType::List(Box::new(inner))
    }

    /// Builds an enum type from a name and its allowed literals.
    pub fn enumeration<I, S>(name: &str, allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DeclaredType::Enum {
            name: name.to_string(),
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns `true` for `Optional(_)`.
    pub fn is_optional(&self) -> bool {
        matches!(self, DeclaredType::Optional(_))
    }

    /// Returns `true` if this type is (or wraps, via `Optional`) a schema
    /// reference.
    pub fn is_reference(&self) -> bool {
        self.referenced_schema().is_some()
    }

    /// Returns the referenced schema name for `SchemaRef`,
    /// `RepeatedSchemaRef` and `Optional` wrappers around them.
    pub fn referenced_schema(&self) -> Option<&str> {
        match self {
            DeclaredType::SchemaRef(name) | DeclaredType::RepeatedSchemaRef(name) => Some(name),
            DeclaredType::Optional(inner) => inner.referenced_schema(),
            _ => None,
        }
    }
}

impl fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclaredType::Scalar(kind) => write!(f, "{kind}"),
            DeclaredType::Optional(inner) => write!(f, "Optional[{inner}]"),
            DeclaredType::List(inner) => write!(f, "List[{inner}]"),
            DeclaredType::Tuple(items) => {
                let rendered: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "Tuple[{}]", rendered.join(", "))
            }
            DeclaredType::Enum { allowed, .. } => write!(f, "Enum[{}]", allowed.join(", ")),
            DeclaredType::SchemaRef(name) => f.write_str(name),
            DeclaredType::RepeatedSchemaRef(name) => write!(f, "List[{name}]"),
        }
    }
}

/// How a field's type is given in a declaration.
///
/// Declaration files use annotation strings; Rust callers may hand over an
/// already-built [`DeclaredType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypeSpec {
    /// Annotation text such as `"Tuple[int, int, int]"`.
    Annotation(String),
    /// A pre-built declared type.
    Declared(DeclaredType),
}

impl From<&str> for TypeSpec {
    fn from(value: &str) -> Self {
        TypeSpec::Annotation(value.to_string())
    }
}

impl From<String> for TypeSpec {
    fn from(value: String) -> Self {
        TypeSpec::Annotation(value)
    }
}

impl From<DeclaredType> for TypeSpec {
    fn from(value: DeclaredType) -> Self {
        TypeSpec::Declared(value)
    }
}

/// One member of a schema declaration, as written by the caller.
///
/// # Examples
///
/// ```
/// use confgraph_core::FieldDecl;
/// use serde_json::json;
///
/// let field = FieldDecl::new("hidden_sizes", "Tuple[int, int, int]")
///     .with_default(json!([32, 32, 32]))
///     .with_description("Width of each hidden layer");
/// assert_eq!(field.name, "hidden_sizes");
/// assert!(field.default.is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    /// Field name.
    pub name: String,
    /// Type annotation.
    #[serde(rename = "type")]
    pub ty: TypeSpec,
    /// Default value; `None` marks the field as required unless its type is
    /// `Optional`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldDecl {
    /// Creates a field declaration without a default.
    pub fn new(name: &str, ty: impl Into<TypeSpec>) -> Self {
        Self {
            name: name.to_string(),
            ty: ty.into(),
            default: None,
            description: None,
        }
    }

    /// Sets the default value.
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Adds a description.
    pub fn with_description(mut self, desc: &str) -> Self {
        self.description = Some(desc.to_string());
        self
    }
}

/// A named enumeration that field annotations may refer to by name.
///
/// # Examples
///
/// ```
/// use confgraph_core::EnumDecl;
///
/// let optimizer = EnumDecl::new("Optimizer", ["SGD", "Adam"]);
/// assert_eq!(optimizer.literals, vec!["SGD", "Adam"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumDecl {
    /// Enum name used in annotations.
    pub name: String,
    /// Allowed literals.
    pub literals: Vec<String>,
}

impl EnumDecl {
    /// Creates a named enum.
    pub fn new<I, S>(name: &str, literals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            literals: literals.into_iter().map(Into::into).collect(),
        }
    }
}

/// A schema declaration: the output shape of whatever mechanism lets a
/// caller declare a configuration class.
///
/// # Examples
///
/// ```
/// use confgraph_core::{FieldDecl, SchemaDecl};
///
/// let sgd = SchemaDecl::new("SGDConfig")
///     .with_parent("OptimizerConfig")
///     .with_field(FieldDecl::new("momentum", "float"))
///     .with_field(FieldDecl::new("nesterov", "bool").with_default(false));
///
/// assert_eq!(sgd.parent.as_deref(), Some("OptimizerConfig"));
/// assert_eq!(sgd.fields.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDecl {
    /// Schema name (identity).
    pub name: String,
    /// Parent schema name, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Whether sources may define several instances of this schema.
    #[serde(default)]
    pub repeatable: bool,
    /// Short description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Members in declaration order.
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
}

impl SchemaDecl {
    /// Creates an empty schema declaration with the given name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Sets the parent schema.
    pub fn with_parent(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    /// Marks the schema as repeatable.
    pub fn repeatable(mut self) -> Self {
        self.repeatable = true;
        self
    }

    /// Adds a description.
    pub fn with_description(mut self, desc: &str) -> Self {
        self.description = Some(desc.to_string());
        self
    }

    /// Appends a field declaration.
    pub fn with_field(mut self, field: FieldDecl) -> Self {
        self.fields.push(field);
        self
    }
}

/// A full set of declarations handed to one resolution run.
///
/// This is also the top-level shape of a declaration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Declarations {
    /// Named enums.
    #[serde(default)]
    pub enums: Vec<EnumDecl>,
    /// Schemas, in registration order.
    #[serde(default)]
    pub schemas: Vec<SchemaDecl>,
}

impl Declarations {
    /// Creates an empty declaration set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a schema declaration.
    pub fn with_schema(mut self, schema: SchemaDecl) -> Self {
        self.schemas.push(schema);
        self
    }

    /// Adds a named enum.
    pub fn with_enum(mut self, decl: EnumDecl) -> Self {
        self.enums.push(decl);
        self
    }

    /// Appends every declaration from `other`.
    pub fn extend(&mut self, other: Declarations) {
        self.enums.extend(other.enums);
        self.schemas.extend(other.schemas);
    }
}

/// Types that can describe themselves as a configuration schema.
///
/// This is the Rust-side schema declaration capability: implement it on the
/// struct an instance will later be deserialized into.
///
/// # Examples
///
/// ```
/// use confgraph_core::{DeclareSchema, FieldDecl, SchemaDecl};
///
/// struct DataConfig;
///
/// impl DeclareSchema for DataConfig {
///     fn declare() -> SchemaDecl {
///         SchemaDecl::new("DataConfig")
///             .with_field(FieldDecl::new("batch_size", "int").with_default(2))
///             .with_field(FieldDecl::new("n_samples", "int"))
///     }
/// }
///
/// assert_eq!(DataConfig::declare().fields.len(), 2);
/// ```
pub trait DeclareSchema {
    /// Returns the schema declaration.
    fn declare() -> SchemaDecl;

    /// Returns named enums the declaration refers to.
    fn enums() -> Vec<EnumDecl> {
        Vec::new()
    }
}

/// One extracted field specification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSpec {
    /// Field name.
    pub name: String,
    /// Declared type.
    pub ty: DeclaredType,
    /// Whether a value must come from a source (no default, not optional).
    pub required: bool,
    /// Default value, if declared.
    pub default: Option<Value>,
    /// Description from the declaration.
    pub description: Option<String>,
    /// Schema whose declaration introduced this spec.
    pub declared_in: String,
}

/// An extracted schema: the declaration with every annotation mapped onto
/// a [`DeclaredType`]. Holds only the schema's own fields; see
/// [`EffectiveSchema`](crate::EffectiveSchema) for the inherited view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    /// Schema name.
    pub name: String,
    /// Parent schema name.
    pub parent: Option<String>,
    /// Whether several instances may be defined.
    pub repeatable: bool,
    /// Description.
    pub description: Option<String>,
    /// Own field specs in declaration order.
    pub fields: Vec<FieldSpec>,
}

impl Schema {
    /// Finds one of the schema's own fields by name.
    pub fn find_field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}
