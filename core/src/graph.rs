//! The immutable configuration graph.
//!
//! A [`ConfigGraph`] is an arena of [`ResolvedInstance`]s plus a name-keyed
//! index. References between instances are stored as [`InstanceId`]s, so the
//! graph can be walked without any name lookups and never dangles. Nothing
//! in this module exposes mutation; a graph is built once by
//! [`resolve`](crate::resolve) and only read afterwards.

use std::collections::BTreeMap;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::inherit::EffectiveSchema;
use crate::types::FieldSpec;

/// Arena index of a resolved instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct InstanceId(pub(crate) usize);

impl InstanceId {
    /// Returns the arena position.
    pub fn index(self) -> usize {
        self.0
    }
}

/// A coerced field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TypedValue {
    /// Absent optional value.
    None,
    /// A boolean.
    Bool(bool),
    /// An integer.
    Int(i64),
    /// A finite float.
    Float(f64),
    /// A string.
    Str(String),
    /// An allowed enum literal.
    Enum(String),
    /// A homogeneous list.
    List(Vec<TypedValue>),
    /// A fixed-length tuple.
    Tuple(Vec<TypedValue>),
    /// Reference to one instance.
    Ref(InstanceId),
    /// References to several instances, in declaration order.
    Refs(Vec<InstanceId>),
}

impl TypedValue {
    /// Returns the value of an `Int`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            TypedValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value of a `Float`.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            TypedValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value of a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TypedValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the text of a `Str` or `Enum` value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TypedValue::Str(v) | TypedValue::Enum(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the elements of a `List` or `Tuple` value.
    pub fn as_slice(&self) -> Option<&[TypedValue]> {
        match self {
            TypedValue::List(items) | TypedValue::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// Returns `true` for an absent optional value.
    pub fn is_none(&self) -> bool {
        matches!(self, TypedValue::None)
    }

    /// Converts to plain JSON; references are rendered by `reference`.
    fn to_json_with(&self, reference: &dyn Fn(InstanceId) -> Value) -> Value {
        match self {
            TypedValue::None => Value::Null,
            TypedValue::Bool(v) => Value::Bool(*v),
            TypedValue::Int(v) => Value::from(*v),
            TypedValue::Float(v) => Value::from(*v),
            TypedValue::Str(v) | TypedValue::Enum(v) => Value::String(v.clone()),
            TypedValue::List(items) | TypedValue::Tuple(items) => {
                Value::Array(items.iter().map(|i| i.to_json_with(reference)).collect())
            }
            TypedValue::Ref(id) => reference(*id),
            TypedValue::Refs(ids) => Value::Array(ids.iter().map(|id| reference(*id)).collect()),
        }
    }
}

/// One immutable schema instance with its typed field values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedInstance {
    id: InstanceId,
    name: String,
    schema: String,
    values: Vec<(String, TypedValue)>,
}

impl ResolvedInstance {
    pub(crate) fn new(id: InstanceId, name: String, schema: String, values: Vec<(String, TypedValue)>) -> Self {
        Self {
            id,
            name,
            schema,
            values,
        }
    }

    /// Arena id, usable with [`ConfigGraph::get_by_id`].
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Instance name: the schema name, or `Schema[i]` for repeatable schemas.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the schema this instance was resolved from.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Returns the typed value of `field`.
    pub fn get(&self, field: &str) -> Option<&TypedValue> {
        self.values.iter().find(|(name, _)| name == field).map(|(_, v)| v)
    }

    /// Iterates fields in effective declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &TypedValue)> {
        self.values.iter().map(|(name, v)| (name.as_str(), v))
    }
}

/// The resolved, validated and immutable configuration.
///
/// # Examples
///
/// ```
/// use confgraph_core::{FieldDecl, SchemaDecl, TypedValue, resolve};
/// use serde_json::json;
///
/// let schemas = vec![
///     SchemaDecl::new("OptimizerConfig").with_field(FieldDecl::new("lr", "float")),
///     SchemaDecl::new("TrainConfig").with_field(FieldDecl::new("optimizer", "OptimizerConfig")),
/// ];
/// let source = json!({"OptimizerConfig": {"lr": 0.1}});
/// let graph = resolve(&schemas, &[source.as_object().unwrap().clone()], None).unwrap();
///
/// let train = graph.get("TrainConfig").unwrap();
/// let optimizer = &graph.follow(train.get("optimizer").unwrap())[0];
/// assert_eq!(optimizer.get("lr"), Some(&TypedValue::Float(0.1)));
/// assert_eq!(graph.flatten()["TrainConfig"]["optimizer"], json!("OptimizerConfig"));
/// ```
#[derive(Debug, Clone)]
pub struct ConfigGraph {
    instances: Vec<ResolvedInstance>,
    index: BTreeMap<String, InstanceId>,
    schemas: BTreeMap<String, EffectiveSchema>,
}

impl ConfigGraph {
    pub(crate) fn new(instances: Vec<ResolvedInstance>, schemas: &[EffectiveSchema]) -> Self {
        let index = instances
            .iter()
            .map(|i| (i.name.clone(), i.id))
            .collect();
        let schemas = schemas
            .iter()
            .map(|s| (s.name.clone(), s.clone()))
            .collect();
        Self {
            instances,
            index,
            schemas,
        }
    }

    /// Looks up an instance by name (`"ModelConfig"`, `"Layer[0]"`).
    pub fn get(&self, name: &str) -> Option<&ResolvedInstance> {
        self.index.get(name).map(|id| &self.instances[id.0])
    }

    /// Looks up an instance by arena id.
    pub fn get_by_id(&self, id: InstanceId) -> Option<&ResolvedInstance> {
        self.instances.get(id.0)
    }

    /// Returns every instance of exactly `schema`, in instance order.
    pub fn instances_of(&self, schema: &str) -> Vec<&ResolvedInstance> {
        self.instances.iter().filter(|i| i.schema == schema).collect()
    }

    /// Iterates instances in resolution order.
    pub fn iter(&self) -> impl Iterator<Item = &ResolvedInstance> {
        self.instances.iter()
    }

    /// Number of instances.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Returns `true` if no schema produced an instance.
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Resolves a `Ref` or `Refs` value to the instances it points at.
    /// Any other value yields an empty list.
    pub fn follow(&self, value: &TypedValue) -> Vec<&ResolvedInstance> {
        match value {
            TypedValue::Ref(id) => self.get_by_id(*id).into_iter().collect(),
            TypedValue::Refs(ids) => ids.iter().filter_map(|id| self.get_by_id(*id)).collect(),
            _ => Vec::new(),
        }
    }

    /// Returns the effective schema an instance was resolved from.
    pub fn schema(&self, name: &str) -> Option<&EffectiveSchema> {
        self.schemas.get(name)
    }

    /// Returns the effective spec of `field` on the named instance.
    pub fn field_spec(&self, instance: &str, field: &str) -> Option<&FieldSpec> {
        let instance = self.get(instance)?;
        self.schemas.get(&instance.schema)?.field(field)
    }

    /// Exports every instance as plain JSON values, references rendered as
    /// instance names.
    pub fn flatten(&self) -> BTreeMap<String, BTreeMap<String, Value>> {
        let by_name = |id: InstanceId| {
            self.get_by_id(id)
                .map_or(Value::Null, |i| Value::String(i.name.clone()))
        };
        self.instances
            .iter()
            .map(|instance| {
                let fields = instance
                    .values
                    .iter()
                    .map(|(name, v)| (name.clone(), v.to_json_with(&by_name)))
                    .collect();
                (instance.name.clone(), fields)
            })
            .collect()
    }

    /// Returns the flattened view as one JSON object.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.flatten()
                .into_iter()
                .map(|(name, fields)| (name, Value::Object(fields.into_iter().collect())))
                .collect(),
        )
    }

    /// SHA-256 hex digest of the canonical flattened view.
    ///
    /// Two graphs resolved from the same inputs have the same fingerprint.
    pub fn fingerprint(&self) -> String {
        let canonical = self.to_json().to_string();
        format!("{:x}", Sha256::digest(canonical.as_bytes()))
    }

    /// Renders one instance as JSON with nested references inlined.
    pub fn instance_json(&self, name: &str) -> Option<Value> {
        self.get(name).map(|instance| self.inline(instance))
    }

    fn inline(&self, instance: &ResolvedInstance) -> Value {
        let nested = |id: InstanceId| {
            self.get_by_id(id)
                .map_or(Value::Null, |target| self.inline(target))
        };
        let fields: Map<String, Value> = instance
            .values
            .iter()
            .map(|(name, v)| (name.clone(), v.to_json_with(&nested)))
            .collect();
        Value::Object(fields)
    }

    /// Deserializes one instance (references inlined) into a caller type.
    ///
    /// # Errors
    ///
    /// Fails if no instance has that name or the shape does not fit `T`.
    pub fn deserialize<T: DeserializeOwned>(&self, name: &str) -> Result<T, serde_json::Error> {
        let value = self.instance_json(name).ok_or_else(|| {
            <serde_json::Error as serde::de::Error>::custom(format!("no instance named '{name}'"))
        })?;
        serde_json::from_value(value)
    }
}
