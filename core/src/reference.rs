//! Instance planning and reference resolution.
//!
//! Before any scalar is coerced, every schema registration is expanded into
//! its instances (one, or one per list element for repeatable schemas) and
//! each instance receives a stable [`InstanceId`]. Reference fields are then
//! resolved from instance *names* to ids in one fixed pass, so the coercion
//! stage only ever sees identities.
//!
//! Name lookup is through a name-keyed index:
//!
//! - `"Schema"` → the single instance of `Schema`, or every instance of a
//!   repeatable `Schema`;
//! - `"Schema[i]"` → the `i`-th instance of a repeatable `Schema`.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ResolutionError;
use crate::graph::InstanceId;
use crate::inherit::EffectiveSchema;
use crate::merge::{MergedSection, MergedSources, describe_value};
use crate::types::{DeclaredType, FieldSpec};

/// One instance to be resolved: its name, its registration and raw input.
#[derive(Debug, Clone, PartialEq)]
pub struct InstancePlan {
    /// Arena id.
    pub id: InstanceId,
    /// Instance name (`"ModelConfig"`, `"Layer[1]"`).
    pub name: String,
    /// Index into the effective schema list.
    pub registration: usize,
    /// Merged raw field values.
    pub raw: Map<String, Value>,
}

/// Expands every registration into instance plans, in registration order.
pub fn plan_instances(schemas: &[EffectiveSchema], merged: &MergedSources) -> Vec<InstancePlan> {
    let mut plans = Vec::new();
    for (registration, schema) in schemas.iter().enumerate() {
        match merged.section(&schema.name) {
            Some(MergedSection::Repeated(items)) => {
                for (index, raw) in items.iter().enumerate() {
                    plans.push(InstancePlan {
                        id: InstanceId(plans.len()),
                        name: format!("{}[{index}]", schema.name),
                        registration,
                        raw: raw.clone(),
                    });
                }
            }
            Some(MergedSection::Single(raw)) => plans.push(InstancePlan {
                id: InstanceId(plans.len()),
                name: schema.name.clone(),
                registration,
                raw: raw.clone(),
            }),
            None => plans.push(InstancePlan {
                id: InstanceId(plans.len()),
                name: schema.name.clone(),
                registration,
                raw: Map::new(),
            }),
        }
    }
    plans
}

/// A reference field after resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedRef {
    /// Optional reference left empty.
    Empty,
    /// `SchemaRef` target.
    One(InstanceId),
    /// `RepeatedSchemaRef` targets, in order.
    Many(Vec<InstanceId>),
}

/// Resolved reference fields, keyed by instance id then field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceTable {
    resolved: BTreeMap<InstanceId, BTreeMap<String, ResolvedRef>>,
}

impl ReferenceTable {
    /// Looks up the resolution of `field` on `instance`.
    pub fn get(&self, instance: InstanceId, field: &str) -> Option<&ResolvedRef> {
        self.resolved.get(&instance).and_then(|fields| fields.get(field))
    }

    fn insert(&mut self, instance: InstanceId, field: &str, value: ResolvedRef) {
        self.resolved
            .entry(instance)
            .or_default()
            .insert(field.to_string(), value);
    }

    fn edges(&self) -> BTreeMap<InstanceId, Vec<InstanceId>> {
        self.resolved
            .iter()
            .map(|(from, fields)| {
                let targets = fields
                    .values()
                    .flat_map(|r| match r {
                        ResolvedRef::Empty => Vec::new(),
                        ResolvedRef::One(id) => vec![*id],
                        ResolvedRef::Many(ids) => ids.clone(),
                    })
                    .collect();
                (*from, targets)
            })
            .collect()
    }
}

/// Resolves every reference field of every planned instance.
///
/// Problems are pushed onto `errors`; a field that fails is left out of the
/// returned table.
pub fn resolve_references(
    schemas: &[EffectiveSchema],
    plans: &[InstancePlan],
    errors: &mut Vec<ResolutionError>,
) -> ReferenceTable {
    let resolver = NameIndex::new(schemas, plans);
    let mut table = ReferenceTable::default();

    for plan in plans {
        let schema = &schemas[plan.registration];
        for spec in schema.fields.iter().filter(|f| f.ty.is_reference()) {
            let ctx = FieldCtx {
                instance: &plan.name,
                spec,
            };
            match resolver.resolve_field(&ctx, plan.raw.get(&spec.name)) {
                Ok(resolved) => table.insert(plan.id, &spec.name, resolved),
                Err(mut field_errors) => errors.append(&mut field_errors),
            }
        }
    }

    errors.extend(find_cycles(&table, plans));
    debug!(
        instances = plans.len(),
        errors = errors.len(),
        "Resolved schema references"
    );
    table
}

struct FieldCtx<'a> {
    instance: &'a str,
    spec: &'a FieldSpec,
}

impl FieldCtx<'_> {
    fn missing(&self, reference: Option<&str>) -> ResolutionError {
        ResolutionError::MissingReference {
            schema: self.instance.to_string(),
            field: self.spec.name.clone(),
            reference: reference.map(String::from),
        }
    }

    fn invalid(&self, expected: &str, found: &Value) -> ResolutionError {
        ResolutionError::InvalidType {
            schema: self.instance.to_string(),
            field: self.spec.name.clone(),
            expected: expected.to_string(),
            found: describe_value(found),
        }
    }
}

struct NameIndex<'a> {
    schemas: &'a [EffectiveSchema],
    plans: &'a [InstancePlan],
    names: BTreeMap<String, Vec<InstanceId>>,
}

impl<'a> NameIndex<'a> {
    fn new(schemas: &'a [EffectiveSchema], plans: &'a [InstancePlan]) -> Self {
        let mut names: BTreeMap<String, Vec<InstanceId>> = BTreeMap::new();
        for plan in plans {
            let schema_name = &schemas[plan.registration].name;
            names.entry(schema_name.clone()).or_default().push(plan.id);
            if plan.name != *schema_name {
                names.entry(plan.name.clone()).or_default().push(plan.id);
            }
        }
        Self {
            schemas,
            plans,
            names,
        }
    }

    fn plan(&self, id: InstanceId) -> &InstancePlan {
        &self.plans[id.0]
    }

    fn schema_of(&self, id: InstanceId) -> &EffectiveSchema {
        &self.schemas[self.plan(id).registration]
    }

    /// `true` when every candidate comes from one repeatable registration,
    /// so a bare name legitimately stands for all of them.
    fn is_repeated_group(&self, candidates: &[InstanceId]) -> bool {
        let Some(first) = candidates.first() else {
            return false;
        };
        let registration = self.plan(*first).registration;
        self.schemas[registration].repeatable
            && candidates
                .iter()
                .all(|c| self.plan(*c).registration == registration)
    }

    fn check_kind(&self, ctx: &FieldCtx<'_>, target: &str, name: &str, id: InstanceId) -> Result<(), ResolutionError> {
        let actual = self.schema_of(id);
        if actual.is_kind_of(target) {
            Ok(())
        } else {
            Err(ResolutionError::TypeMismatchReference {
                schema: ctx.instance.to_string(),
                field: ctx.spec.name.clone(),
                reference: name.to_string(),
                expected: target.to_string(),
                actual: actual.name.clone(),
            })
        }
    }

    fn ambiguous(&self, ctx: &FieldCtx<'_>, name: &str, candidates: &[InstanceId]) -> ResolutionError {
        ResolutionError::AmbiguousReference {
            schema: ctx.instance.to_string(),
            field: ctx.spec.name.clone(),
            reference: name.to_string(),
            candidates: candidates
                .iter()
                .map(|c| {
                    let plan = self.plan(*c);
                    format!("{} (#{})", plan.name, plan.registration)
                })
                .collect(),
        }
    }

    fn resolve_field(&self, ctx: &FieldCtx<'_>, raw: Option<&Value>) -> Result<ResolvedRef, Vec<ResolutionError>> {
        let (optional, inner) = match &ctx.spec.ty {
            DeclaredType::Optional(inner) => (true, inner.as_ref()),
            other => (false, other),
        };

        let value = raw.or(ctx.spec.default.as_ref());
        if optional && value.is_none_or(is_none_marker) {
            return Ok(ResolvedRef::Empty);
        }

        match inner {
            DeclaredType::SchemaRef(target) => self
                .resolve_one(ctx, target, value)
                .map(ResolvedRef::One)
                .map_err(|e| vec![e]),
            DeclaredType::RepeatedSchemaRef(target) => self
                .resolve_many(ctx, target, value)
                .map(ResolvedRef::Many),
            _ => Ok(ResolvedRef::Empty),
        }
    }

    fn resolve_one(
        &self,
        ctx: &FieldCtx<'_>,
        target: &str,
        value: Option<&Value>,
    ) -> Result<InstanceId, ResolutionError> {
        let name = match value {
            Some(Value::String(name)) => name.as_str(),
            Some(other) => return Err(ctx.invalid("an instance name", other)),
            None => {
                // No value anywhere: the field refers to its declared schema.
                return match self.names.get(target).map(Vec::as_slice) {
                    None | Some([]) => Err(ctx.missing(None)),
                    Some([id]) => {
                        self.check_kind(ctx, target, target, *id)?;
                        Ok(*id)
                    }
                    Some(candidates) => Err(self.ambiguous(ctx, target, candidates)),
                };
            }
        };

        match self.names.get(name).map(Vec::as_slice) {
            None | Some([]) => Err(ctx.missing(Some(name))),
            Some([id]) => {
                self.check_kind(ctx, target, name, *id)?;
                Ok(*id)
            }
            Some(candidates) => Err(self.ambiguous(ctx, name, candidates)),
        }
    }

    fn resolve_many(
        &self,
        ctx: &FieldCtx<'_>,
        target: &str,
        value: Option<&Value>,
    ) -> Result<Vec<InstanceId>, Vec<ResolutionError>> {
        let items = match value {
            Some(Value::Array(items)) => items,
            Some(other) => return Err(vec![ctx.invalid("a list of instance names", other)]),
            None => {
                // No value anywhere: every instance of the declared schema.
                return match self.names.get(target) {
                    Some(ids) if ids.len() == 1 || self.is_repeated_group(ids) => {
                        ids.iter()
                            .try_for_each(|id| self.check_kind(ctx, target, target, *id))
                            .map_err(|e| vec![e])?;
                        Ok(ids.clone())
                    }
                    Some(ids) if !ids.is_empty() => Err(vec![self.ambiguous(ctx, target, ids)]),
                    _ => Err(vec![ctx.missing(None)]),
                };
            }
        };

        let mut errors = Vec::new();
        let mut seen_names = BTreeSet::new();
        let mut seen_ids = BTreeSet::new();
        let mut resolved = Vec::with_capacity(items.len());

        for item in items {
            let Value::String(name) = item else {
                errors.push(ctx.invalid("an instance name", item));
                continue;
            };
            if !seen_names.insert(name.as_str()) {
                errors.push(ResolutionError::DuplicateReference {
                    schema: ctx.instance.to_string(),
                    field: Some(ctx.spec.name.clone()),
                    reference: name.clone(),
                });
                continue;
            }

            let candidates = match self.names.get(name.as_str()) {
                Some(ids) if !ids.is_empty() => ids,
                _ => {
                    errors.push(ctx.missing(Some(name)));
                    continue;
                }
            };
            if candidates.len() > 1 && !self.is_repeated_group(candidates) {
                errors.push(self.ambiguous(ctx, name, candidates));
                continue;
            }

            for id in candidates {
                if let Err(error) = self.check_kind(ctx, target, name, *id) {
                    errors.push(error);
                    break;
                }
                if !seen_ids.insert(*id) {
                    errors.push(ResolutionError::DuplicateReference {
                        schema: ctx.instance.to_string(),
                        field: Some(ctx.spec.name.clone()),
                        reference: self.plan(*id).name.clone(),
                    });
                    continue;
                }
                resolved.push(*id);
            }
        }

        if errors.is_empty() {
            Ok(resolved)
        } else {
            Err(errors)
        }
    }
}

/// `true` for explicit "no value" markers: JSON null or `none`/`None`/`null`.
pub(crate) fn is_none_marker(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => matches!(s.as_str(), "none" | "None" | "null"),
        _ => false,
    }
}

/// Reports each reference cycle once, as the chain of instance names.
fn find_cycles(table: &ReferenceTable, plans: &[InstancePlan]) -> Vec<ResolutionError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        OnStack,
        Done,
    }

    fn visit(
        node: InstanceId,
        edges: &BTreeMap<InstanceId, Vec<InstanceId>>,
        marks: &mut [Mark],
        stack: &mut Vec<InstanceId>,
        cycles: &mut Vec<Vec<InstanceId>>,
    ) {
        marks[node.0] = Mark::OnStack;
        stack.push(node);
        for next in edges.get(&node).into_iter().flatten() {
            match marks[next.0] {
                Mark::Unvisited => visit(*next, edges, marks, stack, cycles),
                Mark::OnStack => {
                    let start = stack.iter().position(|n| n == next).unwrap_or(0);
                    let mut cycle = stack[start..].to_vec();
                    cycle.push(*next);
                    cycles.push(cycle);
                }
                Mark::Done => {}
            }
        }
        stack.pop();
        marks[node.0] = Mark::Done;
    }

    let edges = table.edges();
    let mut marks = vec![Mark::Unvisited; plans.len()];
    let mut cycles = Vec::new();
    for plan in plans {
        if marks[plan.id.0] == Mark::Unvisited {
            visit(plan.id, &edges, &mut marks, &mut Vec::new(), &mut cycles);
        }
    }

    cycles
        .into_iter()
        .map(|cycle| ResolutionError::CyclicReference {
            chain: cycle.iter().map(|id| plans[id.0].name.clone()).collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::inherit::resolve_inheritance;
    use crate::merge::{RawTree, merge_sources};
    use crate::registry::Registry;
    use crate::types::{Declarations, FieldDecl, SchemaDecl};

    fn run(decls: Declarations, source: Value) -> (Vec<InstancePlan>, ReferenceTable, Vec<ResolutionError>) {
        let registry = Registry::build(&decls).unwrap();
        let schemas = resolve_inheritance(&registry).unwrap();
        let sources: Vec<RawTree> = vec![source.as_object().unwrap().clone()];
        let mut errors = Vec::new();
        let merged = merge_sources(&schemas, &sources, None, &mut errors);
        let plans = plan_instances(&schemas, &merged);
        let table = resolve_references(&schemas, &plans, &mut errors);
        (plans, table, errors)
    }

    fn optimizer_decls() -> Declarations {
        Declarations::new()
            .with_schema(SchemaDecl::new("OptimizerConfig").with_field(FieldDecl::new("lr", "float")))
            .with_schema(SchemaDecl::new("SGDConfig").with_parent("OptimizerConfig"))
            .with_schema(SchemaDecl::new("DataConfig"))
            .with_schema(
                SchemaDecl::new("TrainConfig")
                    .with_field(FieldDecl::new("optimizer", "OptimizerConfig")),
            )
    }

    #[test]
    fn test_descendant_satisfies_reference() {
        let (plans, table, errors) =
            run(optimizer_decls(), json!({"TrainConfig": {"optimizer": "SGDConfig"}}));
        assert!(errors.is_empty(), "{errors:?}");
        let train = plans.iter().find(|p| p.name == "TrainConfig").unwrap();
        let sgd = plans.iter().find(|p| p.name == "SGDConfig").unwrap();
        assert_eq!(table.get(train.id, "optimizer"), Some(&ResolvedRef::One(sgd.id)));
    }

    #[test]
    fn test_absent_reference_defaults_to_declared_schema() {
        let (plans, table, errors) = run(optimizer_decls(), json!({}));
        assert!(errors.is_empty());
        let train = plans.iter().find(|p| p.name == "TrainConfig").unwrap();
        assert_eq!(table.get(train.id, "optimizer"), Some(&ResolvedRef::One(InstanceId(0))));
    }

    #[test]
    fn test_wrong_kind_is_type_mismatch() {
        let (_, _, errors) = run(optimizer_decls(), json!({"TrainConfig": {"optimizer": "DataConfig"}}));
        assert!(matches!(
            errors.as_slice(),
            [ResolutionError::TypeMismatchReference { reference, .. }] if reference == "DataConfig"
        ));
    }

    #[test]
    fn test_unknown_name_is_missing() {
        let (_, _, errors) = run(optimizer_decls(), json!({"TrainConfig": {"optimizer": "AdamConfig"}}));
        assert!(matches!(
            errors.as_slice(),
            [ResolutionError::MissingReference { reference: Some(r), .. }] if r == "AdamConfig"
        ));
    }

    #[test]
    fn test_duplicate_names_in_repeated_reference() {
        let decls = Declarations::new()
            .with_schema(SchemaDecl::new("Layer").repeatable().with_field(FieldDecl::new("w", "int")))
            .with_schema(SchemaDecl::new("Net").with_field(FieldDecl::new("layers", "List[Layer]")));
        let (_, _, errors) = run(
            decls,
            json!({
                "Layer": [{"w": 1}, {"w": 2}],
                "Net": {"layers": ["Layer[0]", "Layer[1]", "Layer[0]"]}
            }),
        );
        assert!(matches!(
            errors.as_slice(),
            [ResolutionError::DuplicateReference { field: Some(_), reference, .. }] if reference == "Layer[0]"
        ));
    }

    #[test]
    fn test_repeated_reference_expands_bare_name() {
        let decls = Declarations::new()
            .with_schema(SchemaDecl::new("Layer").repeatable().with_field(FieldDecl::new("w", "int")))
            .with_schema(SchemaDecl::new("Net").with_field(FieldDecl::new("layers", "List[Layer]")));
        let (plans, table, errors) = run(decls, json!({"Layer": [{"w": 1}, {"w": 2}]}));
        assert!(errors.is_empty());
        let net = plans.iter().find(|p| p.name == "Net").unwrap();
        assert_eq!(
            table.get(net.id, "layers"),
            Some(&ResolvedRef::Many(vec![InstanceId(0), InstanceId(1)]))
        );
    }

    #[test]
    fn test_bare_repeatable_name_is_ambiguous_for_single_reference() {
        let decls = Declarations::new()
            .with_schema(SchemaDecl::new("Layer").repeatable())
            .with_schema(SchemaDecl::new("Head").with_field(FieldDecl::new("layer", "Layer")));
        let (_, _, errors) = run(decls, json!({"Layer": [{}, {}], "Head": {"layer": "Layer"}}));
        assert!(matches!(errors.as_slice(), [ResolutionError::AmbiguousReference { .. }]));
    }

    #[test]
    fn test_reference_cycle_is_reported() {
        let decls = Declarations::new()
            .with_schema(SchemaDecl::new("A").with_field(FieldDecl::new("b", "B")))
            .with_schema(SchemaDecl::new("B").with_field(FieldDecl::new("a", "Optional[A]")));
        let (_, _, errors) = run(decls, json!({"B": {"a": "A"}}));
        assert_eq!(
            errors,
            vec![ResolutionError::CyclicReference {
                chain: vec!["A".into(), "B".into(), "A".into()]
            }]
        );
    }

    #[test]
    fn test_optional_reference_accepts_none_marker() {
        let decls = Declarations::new()
            .with_schema(SchemaDecl::new("A").with_field(FieldDecl::new("b", "Optional[B]")))
            .with_schema(SchemaDecl::new("B"));
        let (plans, table, errors) = run(decls, json!({"A": {"b": "None"}}));
        assert!(errors.is_empty());
        assert_eq!(table.get(plans[0].id, "b"), Some(&ResolvedRef::Empty));
    }

    #[test]
    fn test_absent_optional_reference_is_empty() {
        let decls = Declarations::new()
            .with_schema(SchemaDecl::new("A").with_field(FieldDecl::new("b", "Optional[B]")))
            .with_schema(SchemaDecl::new("B"));
        let (plans, table, errors) = run(decls, json!({"A": {}}));
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(table.get(plans[0].id, "b"), Some(&ResolvedRef::Empty));
    }
}
