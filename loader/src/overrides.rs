//! Command-line override parsing.
//!
//! Overrides form the highest-precedence source. Accepted shapes:
//!
//! - `--Schema.field=value` or `Schema.field=value`: scoped to one schema;
//! - `--field=value`: a global parameter for every schema declaring `field`;
//! - `--Schema.field value`: the value as the next argument.
//!
//! Values are kept as strings for the coercer, except that values starting
//! with `[` or `{` are read as YAML flow collections (`[32, 32, 16]`).

use confgraph_core::{RawTree, is_identifier};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{LoadError, Result};

/// Parses override arguments into one raw tree.
///
/// # Errors
///
/// Returns [`LoadError::InvalidOverride`] for a malformed key, a missing
/// value, an unparsable collection, or a key that is both a schema section
/// and a global parameter.
///
/// # Examples
///
/// ```
/// use confgraph_loader::parse_overrides;
/// use serde_json::json;
///
/// let tree = parse_overrides([
///     "--OptimizerConfig.lr=0.05",
///     "ModelConfig.hidden_sizes=[64, 64, 32]",
///     "--cache_path",
///     "/tmp/cache",
/// ]).unwrap();
///
/// assert_eq!(tree["OptimizerConfig"]["lr"], json!("0.05"));
/// assert_eq!(tree["ModelConfig"]["hidden_sizes"], json!([64, 64, 32]));
/// assert_eq!(tree["cache_path"], json!("/tmp/cache"));
/// ```
pub fn parse_overrides<I, S>(args: I) -> Result<RawTree>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let args: Vec<String> = args.into_iter().map(|a| a.as_ref().to_string()).collect();
    let mut tree = RawTree::new();
    let mut iter = args.iter().peekable();

    while let Some(arg) = iter.next() {
        let body = arg.strip_prefix("--").unwrap_or(arg);
        let (key, raw) = match body.split_once('=') {
            Some((key, raw)) => (key, raw.to_string()),
            None => match iter.next_if(|next| !next.starts_with("--")) {
                Some(next) => (body, next.clone()),
                None => return Err(invalid(arg, "missing '=value'")),
            },
        };

        let value = parse_value(&raw).map_err(|reason| invalid(arg, &reason))?;
        insert(&mut tree, key, value).map_err(|reason| invalid(arg, &reason))?;
    }

    debug!(arguments = args.len(), keys = tree.len(), "Parsed command-line overrides");
    Ok(tree)
}

fn invalid(arg: &str, reason: &str) -> LoadError {
    LoadError::InvalidOverride {
        arg: arg.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_value(raw: &str) -> std::result::Result<Value, String> {
    let trimmed = raw.trim_start();
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        serde_yaml::from_str(trimmed).map_err(|e| format!("cannot parse collection: {e}"))
    } else {
        Ok(Value::String(raw.to_string()))
    }
}

fn insert(tree: &mut RawTree, key: &str, value: Value) -> std::result::Result<(), String> {
    let parts: Vec<&str> = key.split('.').collect();
    if let Some(bad) = parts.iter().find(|p| !is_identifier(p)) {
        return Err(format!("'{bad}' is not a valid name"));
    }

    match parts.as_slice() {
        [field] => {
            if tree.get(*field).is_some_and(Value::is_object) {
                return Err(format!("'{field}' is already used as a schema section"));
            }
            tree.insert(field.to_string(), value);
        }
        [schema, field] => {
            let section = tree
                .entry(schema.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            let Value::Object(fields) = section else {
                return Err(format!("'{schema}' is already used as a global parameter"));
            };
            fields.insert(field.to_string(), value);
        }
        _ => return Err("expected 'field' or 'Schema.field'".to_string()),
    }
    Ok(())
}
