//! Field spec extraction: declarations to [`Schema`] values.
//!
//! Maps every member annotation of a [`SchemaDecl`] onto the closed
//! [`DeclaredType`] set. Identifiers resolve against the named enums and
//! schema names registered for the run. Anything that does not fit fails
//! with a [`ResolutionError::SchemaDeclaration`] naming the schema and the
//! offending member.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::annotation::{TypeExpr, parse_annotation};
use crate::error::ResolutionError;
use crate::types::{DeclaredType, FieldDecl, FieldSpec, ScalarKind, Schema, SchemaDecl, TypeSpec};

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex must compile")
});

/// Returns `true` if `name` is usable as a schema, enum or field name.
///
/// # Examples
///
/// ```
/// use confgraph_core::is_identifier;
///
/// assert!(is_identifier("n_samples"));
/// assert!(!is_identifier("2fast"));
/// assert!(!is_identifier("with-dash"));
/// ```
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Names visible to annotations during extraction.
#[derive(Debug, Default)]
pub struct ExtractContext {
    enums: BTreeMap<String, Vec<String>>,
    schemas: BTreeSet<String>,
}

impl ExtractContext {
    /// Creates a context from named enums and registered schema names.
    pub fn new(enums: BTreeMap<String, Vec<String>>, schemas: BTreeSet<String>) -> Self {
        Self { enums, schemas }
    }

    fn is_schema(&self, name: &str) -> bool {
        self.schemas.contains(name)
    }
}

/// Where a type appears, which limits what it may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Field,
    InOptional,
    InCollection,
}

/// Extracts the field specs of one declaration.
///
/// # Errors
///
/// Returns [`ResolutionError::SchemaDeclaration`] for invalid names,
/// duplicate members, unknown or malformed annotations, and references to
/// unregistered schemas or parents.
///
/// # Examples
///
/// ```
/// use std::collections::{BTreeMap, BTreeSet};
/// use confgraph_core::{DeclaredType, ExtractContext, FieldDecl, SchemaDecl, extract_schema};
///
/// let ctx = ExtractContext::new(BTreeMap::new(), BTreeSet::from(["DataConfig".to_string()]));
/// let decl = SchemaDecl::new("DataConfig")
///     .with_field(FieldDecl::new("batch_size", "int").with_default(2))
///     .with_field(FieldDecl::new("cache_path", "Optional[str]"));
///
/// let schema = extract_schema(&decl, &ctx).unwrap();
/// assert!(!schema.fields[0].required);
/// assert!(schema.fields[1].ty.is_optional());
/// ```
pub fn extract_schema(decl: &SchemaDecl, ctx: &ExtractContext) -> Result<Schema, ResolutionError> {
    let fail = |message: String| ResolutionError::SchemaDeclaration {
        schema: decl.name.clone(),
        message,
    };

    if !is_identifier(&decl.name) {
        return Err(fail(format!("'{}' is not a valid schema name", decl.name)));
    }
    if let Some(parent) = &decl.parent {
        if !ctx.is_schema(parent) {
            return Err(fail(format!("parent '{parent}' is not a registered schema")));
        }
    }

    let mut seen = HashSet::new();
    let mut fields = Vec::with_capacity(decl.fields.len());
    for field in &decl.fields {
        if !is_identifier(&field.name) {
            return Err(fail(format!("'{}' is not a valid field name", field.name)));
        }
        if !seen.insert(field.name.as_str()) {
            return Err(fail(format!("field '{}' is declared twice", field.name)));
        }
        let spec = extract_field(&decl.name, field, ctx)
            .map_err(|message| fail(format!("field '{}': {message}", field.name)))?;
        fields.push(spec);
    }

    Ok(Schema {
        name: decl.name.clone(),
        parent: decl.parent.clone(),
        repeatable: decl.repeatable,
        description: decl.description.clone(),
        fields,
    })
}

fn extract_field(schema: &str, field: &FieldDecl, ctx: &ExtractContext) -> Result<FieldSpec, String> {
    let ty = match &field.ty {
        TypeSpec::Annotation(text) => {
            let expr = parse_annotation(text).map_err(|e| format!("cannot parse '{text}': {e}"))?;
            map_type(&expr, &field.name, ctx, Position::Field)?
        }
        TypeSpec::Declared(ty) => {
            check_declared(ty, ctx, Position::Field)?;
            ty.clone()
        }
    };

    let required = field.default.is_none() && !ty.is_optional();
    Ok(FieldSpec {
        name: field.name.clone(),
        ty,
        required,
        default: field.default.clone(),
        description: field.description.clone(),
        declared_in: schema.to_string(),
    })
}

fn scalar(name: &str) -> Option<ScalarKind> {
    match name {
        "int" => Some(ScalarKind::Int),
        "float" => Some(ScalarKind::Float),
        "bool" => Some(ScalarKind::Bool),
        "str" | "string" => Some(ScalarKind::Str),
        _ => None,
    }
}

fn check_literals(literals: &[String]) -> Result<(), String> {
    if literals.is_empty() {
        return Err("enum must declare at least one literal".to_string());
    }
    let mut seen = HashSet::new();
    for literal in literals {
        if !seen.insert(literal.as_str()) {
            return Err(format!("enum literal '{literal}' is repeated"));
        }
    }
    Ok(())
}

fn map_type(
    expr: &TypeExpr,
    field: &str,
    ctx: &ExtractContext,
    pos: Position,
) -> Result<DeclaredType, String> {
    match expr {
        TypeExpr::Name(name) => {
            if let Some(kind) = scalar(name) {
                return Ok(DeclaredType::Scalar(kind));
            }
            if let Some(literals) = ctx.enums.get(name) {
                return Ok(DeclaredType::enumeration(name, literals.iter().cloned()));
            }
            if ctx.is_schema(name) {
                if pos == Position::InCollection {
                    return Err(format!(
                        "schema reference '{name}' is only allowed as a field, inside Optional, or as List[{name}]"
                    ));
                }
                return Ok(DeclaredType::SchemaRef(name.clone()));
            }
            Err(format!(
                "unknown type '{name}': not a scalar, a named enum, or a registered schema"
            ))
        }
        TypeExpr::Enum(literals) => {
            check_literals(literals)?;
            Ok(DeclaredType::enumeration(field, literals.iter().cloned()))
        }
        TypeExpr::Generic { head, args } => match head.as_str() {
            "Optional" => {
                let [inner] = args.as_slice() else {
                    return Err("Optional takes exactly one type argument".to_string());
                };
                if pos != Position::Field {
                    return Err("Optional may only wrap a whole field type".to_string());
                }
                Ok(DeclaredType::optional(map_type(inner, field, ctx, Position::InOptional)?))
            }
            "List" => {
                let [inner] = args.as_slice() else {
                    return Err("List takes exactly one type argument".to_string());
                };
                if let TypeExpr::Name(name) = inner {
                    if ctx.is_schema(name) {
                        if pos == Position::InCollection {
                            return Err(format!("List[{name}] cannot be nested in a collection"));
                        }
                        return Ok(DeclaredType::RepeatedSchemaRef(name.clone()));
                    }
                }
                Ok(DeclaredType::list(map_type(inner, field, ctx, Position::InCollection)?))
            }
            "Tuple" => {
                let items = args
                    .iter()
                    .map(|arg| map_type(arg, field, ctx, Position::InCollection))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(DeclaredType::Tuple(items))
            }
            other => Err(format!("unsupported generic type '{other}'")),
        },
    }
}

/// Validates a pre-built declared type with the same rules annotations obey.
fn check_declared(ty: &DeclaredType, ctx: &ExtractContext, pos: Position) -> Result<(), String> {
    match ty {
        DeclaredType::Scalar(_) => Ok(()),
        DeclaredType::Optional(inner) => {
            if pos != Position::Field {
                return Err("Optional may only wrap a whole field type".to_string());
            }
            check_declared(inner, ctx, Position::InOptional)
        }
        DeclaredType::List(inner) => check_declared(inner, ctx, Position::InCollection),
        DeclaredType::Tuple(items) => {
            if items.is_empty() {
                return Err("Tuple must declare at least one element type".to_string());
            }
            items
                .iter()
                .try_for_each(|item| check_declared(item, ctx, Position::InCollection))
        }
        DeclaredType::Enum { allowed, .. } => check_literals(allowed),
        DeclaredType::SchemaRef(name) | DeclaredType::RepeatedSchemaRef(name) => {
            if pos == Position::InCollection {
                return Err(format!("schema reference '{name}' cannot be nested in a collection"));
            }
            if !ctx.is_schema(name) {
                return Err(format!("'{name}' is not a registered schema"));
            }
            Ok(())
        }
    }
}
