//! Type coercion and validation of raw field values.
//!
//! Raw values arrive untyped (YAML, JSON, TOML, or command-line strings).
//! Coercion is deliberately narrow: numeric strings become numbers, a few
//! literal spellings become booleans, and nothing else is guessed.
//!
//! | Declared | Accepted raw values |
//! |----------|---------------------|
//! | `int` | integers, floats with zero fraction, integer strings |
//! | `float` | numbers (integers up to 2^53), numeric strings |
//! | `bool` | booleans, `true`/`True`/`TRUE`/`false`/`False`/`FALSE` |
//! | `str` | strings |
//! | `Optional[T]` | null, `none`/`None`/`null`, or a `T` |
//! | `List[T]` | sequences of `T` |
//! | `Tuple[..]` | sequences of exactly the declared arity |
//! | enum | one of the allowed literals, case-sensitive |

use serde_json::Value;

use crate::error::ResolutionError;
use crate::graph::TypedValue;
use crate::inherit::EffectiveSchema;
use crate::merge::describe_value;
use crate::reference::{InstancePlan, ReferenceTable, ResolvedRef, is_none_marker};
use crate::types::{DeclaredType, ScalarKind};

/// Largest integer magnitude an `f64` represents exactly.
const MAX_EXACT_FLOAT_INT: u64 = 1 << 53;

/// Coerces one raw value to `ty`.
///
/// `schema` and `field` only label errors; element errors are reported on
/// `field[i]`. Reference types are resolved by name elsewhere and are
/// rejected here.
///
/// # Examples
///
/// ```
/// use confgraph_core::{DeclaredType, ScalarKind, TypedValue, coerce_value};
/// use serde_json::json;
///
/// let float = DeclaredType::Scalar(ScalarKind::Float);
/// assert_eq!(coerce_value("OptimizerConfig", "lr", &float, &json!("0.05")).unwrap(),
///     TypedValue::Float(0.05));
///
/// let sizes = DeclaredType::list(DeclaredType::Scalar(ScalarKind::Int));
/// assert!(coerce_value("ModelConfig", "hidden_sizes", &sizes, &json!([32, "x"])).is_err());
/// ```
pub fn coerce_value(
    schema: &str,
    field: &str,
    ty: &DeclaredType,
    raw: &Value,
) -> Result<TypedValue, ResolutionError> {
    Coercer { schema }.coerce(field, ty, raw)
}

struct Coercer<'a> {
    schema: &'a str,
}

impl Coercer<'_> {
    fn invalid(&self, path: &str, expected: impl ToString, raw: &Value) -> ResolutionError {
        ResolutionError::InvalidType {
            schema: self.schema.to_string(),
            field: path.to_string(),
            expected: expected.to_string(),
            found: describe_value(raw),
        }
    }

    fn coerce(&self, path: &str, ty: &DeclaredType, raw: &Value) -> Result<TypedValue, ResolutionError> {
        match ty {
            DeclaredType::Optional(inner) => {
                if is_none_marker(raw) {
                    Ok(TypedValue::None)
                } else {
                    self.coerce(path, inner, raw)
                }
            }
            _ if raw.is_null() => Err(self.invalid(path, ty, raw)),
            DeclaredType::Scalar(kind) => self.scalar(path, *kind, raw),
            DeclaredType::List(inner) => {
                let Value::Array(items) = raw else {
                    return Err(self.invalid(path, ty, raw));
                };
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| self.coerce(&format!("{path}[{i}]"), inner, item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(TypedValue::List)
            }
            DeclaredType::Tuple(items) => {
                let Value::Array(values) = raw else {
                    return Err(self.invalid(path, ty, raw));
                };
                if values.len() != items.len() {
                    return Err(ResolutionError::Arity {
                        schema: self.schema.to_string(),
                        field: path.to_string(),
                        expected: items.len(),
                        found: values.len(),
                    });
                }
                items
                    .iter()
                    .zip(values)
                    .enumerate()
                    .map(|(i, (item_ty, value))| self.coerce(&format!("{path}[{i}]"), item_ty, value))
                    .collect::<Result<Vec<_>, _>>()
                    .map(TypedValue::Tuple)
            }
            DeclaredType::Enum { allowed, .. } => match raw {
                Value::String(literal) if allowed.contains(literal) => {
                    Ok(TypedValue::Enum(literal.clone()))
                }
                Value::String(literal) => Err(ResolutionError::InvalidEnumValue {
                    schema: self.schema.to_string(),
                    field: path.to_string(),
                    value: literal.clone(),
                    allowed: allowed.clone(),
                }),
                other => Err(self.invalid(path, ty, other)),
            },
            DeclaredType::SchemaRef(_) | DeclaredType::RepeatedSchemaRef(_) => {
                Err(self.invalid(path, "a resolved instance reference", raw))
            }
        }
    }

    fn scalar(&self, path: &str, kind: ScalarKind, raw: &Value) -> Result<TypedValue, ResolutionError> {
        let coerced = match kind {
            ScalarKind::Int => to_int(raw).map(TypedValue::Int),
            ScalarKind::Float => to_float(raw).map(TypedValue::Float),
            ScalarKind::Bool => to_bool(raw).map(TypedValue::Bool),
            ScalarKind::Str => raw.as_str().map(|s| TypedValue::Str(s.to_string())),
        };
        coerced.ok_or_else(|| self.invalid(path, kind, raw))
    }
}

fn to_int(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn to_float(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(n) => match n.as_i64() {
            Some(i) if i.unsigned_abs() > MAX_EXACT_FLOAT_INT => None,
            Some(i) => Some(i as f64),
            None if n.is_u64() => None,
            None => n.as_f64(),
        },
        // "inf", "nan" and overflowing literals have no JSON form.
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn to_bool(raw: &Value) -> Option<bool> {
    match raw {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.as_str() {
            "true" | "True" | "TRUE" => Some(true),
            "false" | "False" | "FALSE" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Coerces every effective field of one planned instance.
///
/// Reference fields are taken from `references`; a reference field missing
/// from the table already produced an error and is skipped. Errors are
/// pushed onto `errors` and the affected field is left out.
pub(crate) fn coerce_instance(
    schema: &EffectiveSchema,
    plan: &InstancePlan,
    references: &ReferenceTable,
    errors: &mut Vec<ResolutionError>,
) -> Vec<(String, TypedValue)> {
    for key in plan.raw.keys() {
        if schema.field(key).is_none() {
            errors.push(ResolutionError::UnknownField {
                schema: Some(plan.name.clone()),
                field: key.clone(),
            });
        }
    }

    let coercer = Coercer { schema: &plan.name };
    let mut values = Vec::with_capacity(schema.fields.len());

    for spec in &schema.fields {
        if spec.ty.is_reference() {
            let value = match references.get(plan.id, &spec.name) {
                Some(ResolvedRef::One(id)) => TypedValue::Ref(*id),
                Some(ResolvedRef::Many(ids)) => TypedValue::Refs(ids.clone()),
                Some(ResolvedRef::Empty) => TypedValue::None,
                None => continue,
            };
            values.push((spec.name.clone(), value));
            continue;
        }

        let raw = plan.raw.get(&spec.name).or(spec.default.as_ref());
        let result = match raw {
            Some(raw) => coercer.coerce(&spec.name, &spec.ty, raw),
            None if spec.ty.is_optional() => Ok(TypedValue::None),
            None => Err(ResolutionError::MissingRequiredField {
                schema: plan.name.clone(),
                field: spec.name.clone(),
            }),
        };
        match result {
            Ok(value) => values.push((spec.name.clone(), value)),
            Err(error) => errors.push(error),
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn coerce(ty: DeclaredType, raw: Value) -> Result<TypedValue, ResolutionError> {
        coerce_value("S", "f", &ty, &raw)
    }

    fn int() -> DeclaredType {
        DeclaredType::Scalar(ScalarKind::Int)
    }

    fn float() -> DeclaredType {
        DeclaredType::Scalar(ScalarKind::Float)
    }

    #[test]
    fn test_int_coercion() {
        assert_eq!(coerce(int(), json!(3)).unwrap(), TypedValue::Int(3));
        assert_eq!(coerce(int(), json!(4.0)).unwrap(), TypedValue::Int(4));
        assert_eq!(coerce(int(), json!("12")).unwrap(), TypedValue::Int(12));
        assert!(coerce(int(), json!(4.5)).is_err());
        assert!(coerce(int(), json!("abc")).is_err());
        assert!(coerce(int(), json!(true)).is_err());
    }

    #[test]
    fn test_float_coercion() {
        assert_eq!(coerce(float(), json!(2)).unwrap(), TypedValue::Float(2.0));
        assert_eq!(coerce(float(), json!("1e-3")).unwrap(), TypedValue::Float(0.001));
        assert!(coerce(float(), json!(9_007_199_254_740_993_i64)).is_err());
        assert!(coerce(float(), json!([1.0])).is_err());
    }

    #[test]
    fn test_non_finite_float_strings_are_rejected() {
        for raw in ["1e999", "-1e999", "inf", "NaN"] {
            assert!(
                matches!(coerce(float(), json!(raw)), Err(ResolutionError::InvalidType { .. })),
                "{raw} should be rejected"
            );
        }
        assert_eq!(
            coerce(float(), json!("1.7976931348623157e308")).unwrap(),
            TypedValue::Float(f64::MAX)
        );
    }

    #[test]
    fn test_bool_literals_only() {
        let ty = DeclaredType::Scalar(ScalarKind::Bool);
        assert_eq!(coerce(ty.clone(), json!("True")).unwrap(), TypedValue::Bool(true));
        assert_eq!(coerce(ty.clone(), json!(false)).unwrap(), TypedValue::Bool(false));
        assert!(coerce(ty.clone(), json!("yes")).is_err());
        assert!(coerce(ty, json!(1)).is_err());
    }

    #[test]
    fn test_string_is_not_coerced_from_numbers() {
        let ty = DeclaredType::Scalar(ScalarKind::Str);
        assert!(coerce(ty.clone(), json!(5)).is_err());
        assert_eq!(coerce(ty, json!("5")).unwrap(), TypedValue::Str("5".into()));
    }

    #[test]
    fn test_optional_none_markers() {
        let ty = DeclaredType::optional(int());
        assert_eq!(coerce(ty.clone(), Value::Null).unwrap(), TypedValue::None);
        assert_eq!(coerce(ty.clone(), json!("None")).unwrap(), TypedValue::None);
        assert_eq!(coerce(ty, json!(7)).unwrap(), TypedValue::Int(7));
    }

    #[test]
    fn test_explicit_null_for_required_is_invalid() {
        assert!(matches!(
            coerce(int(), Value::Null),
            Err(ResolutionError::InvalidType { found, .. }) if found == "null"
        ));
    }

    #[test]
    fn test_list_element_error_names_index() {
        let err = coerce(DeclaredType::list(int()), json!([1, 2, "x"])).unwrap_err();
        assert!(matches!(err, ResolutionError::InvalidType { field, .. } if field == "f[2]"));
    }

    #[test]
    fn test_tuple_arity() {
        let ty = DeclaredType::Tuple(vec![int(), float()]);
        assert_eq!(
            coerce(ty.clone(), json!([1, 2.5])).unwrap(),
            TypedValue::Tuple(vec![TypedValue::Int(1), TypedValue::Float(2.5)])
        );
        assert_eq!(
            coerce(ty, json!([1, 2, 3])).unwrap_err(),
            ResolutionError::Arity {
                schema: "S".into(),
                field: "f".into(),
                expected: 2,
                found: 3
            }
        );
    }

    #[test]
    fn test_enum_is_case_sensitive() {
        let ty = DeclaredType::enumeration("Activation", ["relu", "gelu", "tanh"]);
        assert_eq!(coerce(ty.clone(), json!("gelu")).unwrap(), TypedValue::Enum("gelu".into()));
        let err = coerce(ty, json!("ReLU")).unwrap_err();
        assert!(matches!(err, ResolutionError::InvalidEnumValue { value, .. } if value == "ReLU"));
    }
}
