use confgraph_core::{
    ConfigGraph, EnumDecl, ErrorKind, FieldDecl, RawTree, ResolutionError, ResolutionReport,
    Resolver, SchemaDecl, TypedValue, coerce_value, resolve,
};
use serde_json::{Value, json};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn tree(value: Value) -> RawTree {
    value.as_object().expect("test tree must be a mapping").clone()
}

fn tutorial_resolver() -> Resolver {
    Resolver::new()
        .with_enums([
            EnumDecl::new("Activation", ["relu", "gelu", "tanh"]),
            EnumDecl::new("Optimizer", ["SGD", "Adam"]),
        ])
        .with_schema(
            SchemaDecl::new("ModelConfig")
                .with_field(FieldDecl::new("save_path", "Optional[str]"))
                .with_field(FieldDecl::new("n_features", "int").with_default(64))
                .with_field(FieldDecl::new("dropout", "Optional[List[float]]"))
                .with_field(
                    FieldDecl::new("hidden_sizes", "Tuple[int, int, int]").with_default(json!([32, 32, 32])),
                )
                .with_field(FieldDecl::new("activation", "Activation").with_default("relu"))
                .with_field(FieldDecl::new("optimizer", "Optimizer"))
                .with_field(FieldDecl::new("cache_path", "Optional[str]")),
        )
        .with_schema(
            SchemaDecl::new("DataConfig")
                .with_field(FieldDecl::new("batch_size", "int").with_default(2))
                .with_field(FieldDecl::new("n_samples", "int"))
                .with_field(FieldDecl::new("cache_path", "Optional[str]")),
        )
        .with_schema(
            SchemaDecl::new("OptimizerConfig")
                .with_field(FieldDecl::new("lr", "float").with_default(0.01))
                .with_field(FieldDecl::new("n_epochs", "int").with_default(2))
                .with_field(FieldDecl::new("grad_clip", "Optional[float]")),
        )
        .with_schema(
            SchemaDecl::new("SGDConfig")
                .with_parent("OptimizerConfig")
                .with_field(FieldDecl::new("weight_decay", "float"))
                .with_field(FieldDecl::new("momentum", "float"))
                .with_field(FieldDecl::new("nesterov", "bool")),
        )
}

fn tutorial_source() -> RawTree {
    tree(json!({
        "cache_path": "/tmp/cache",
        "ModelConfig": {
            "n_features": 64,
            "dropout": [0.2, 0.1],
            "hidden_sizes": [32, 32, 16],
            "activation": "relu",
            "optimizer": "SGD"
        },
        "DataConfig": {"batch_size": 2, "n_samples": 8},
        "OptimizerConfig": {"lr": 0.01, "n_epochs": 2, "grad_clip": 5.0},
        "SGDConfig": {"weight_decay": 0.0001, "momentum": 0.9, "nesterov": true}
    }))
}

fn value<'g>(graph: &'g ConfigGraph, instance: &str, field: &str) -> &'g TypedValue {
    graph
        .get(instance)
        .and_then(|i| i.get(field))
        .unwrap_or_else(|| panic!("{instance}.{field} should be resolved"))
}

fn only_error(report: &ResolutionReport) -> &ResolutionError {
    assert_eq!(report.len(), 1, "expected exactly one error, got: {report}");
    &report.errors()[0]
}

// ---------------------------------------------------------------------------
// Precedence
// ---------------------------------------------------------------------------

#[test]
fn test_highest_precedence_source_wins_per_field() {
    let schemas = [SchemaDecl::new("DataConfig")
        .with_field(FieldDecl::new("batch_size", "int").with_default(2))
        .with_field(FieldDecl::new("n_samples", "int"))];

    let defaults_only = resolve(&schemas, &[tree(json!({"DataConfig": {"n_samples": 1}}))], None).unwrap();
    assert_eq!(value(&defaults_only, "DataConfig", "batch_size"), &TypedValue::Int(2));

    let low = tree(json!({"DataConfig": {"batch_size": 4, "n_samples": 1}}));
    let high = tree(json!({"DataConfig": {"batch_size": 8}}));
    let from_files = resolve(&schemas, &[low.clone(), high.clone()], None).unwrap();
    assert_eq!(value(&from_files, "DataConfig", "batch_size"), &TypedValue::Int(8));
    assert_eq!(value(&from_files, "DataConfig", "n_samples"), &TypedValue::Int(1));

    let overrides = tree(json!({"DataConfig": {"batch_size": "16"}}));
    let overridden = resolve(&schemas, &[low, high], Some(&overrides)).unwrap();
    assert_eq!(value(&overridden, "DataConfig", "batch_size"), &TypedValue::Int(16));
}

#[test]
fn test_global_parameter_reaches_every_declaring_schema() {
    let graph = tutorial_resolver().with_source(tutorial_source()).resolve().unwrap();
    let expected = TypedValue::Str("/tmp/cache".into());
    assert_eq!(value(&graph, "ModelConfig", "cache_path"), &expected);
    assert_eq!(value(&graph, "DataConfig", "cache_path"), &expected);
}

// ---------------------------------------------------------------------------
// Inheritance
// ---------------------------------------------------------------------------

#[test]
fn test_inheritance_override_at_depth_two() {
    let schemas = [
        SchemaDecl::new("Base")
            .with_field(FieldDecl::new("a", "int").with_default(1))
            .with_field(FieldDecl::new("b", "str").with_default("base")),
        SchemaDecl::new("Mid")
            .with_parent("Base")
            .with_field(FieldDecl::new("c", "bool").with_default(false)),
        SchemaDecl::new("Leaf")
            .with_parent("Mid")
            .with_field(FieldDecl::new("a", "float").with_default(5.5)),
    ];
    let graph = resolve(&schemas, &[], None).unwrap();

    assert_eq!(value(&graph, "Base", "a"), &TypedValue::Int(1));
    assert_eq!(value(&graph, "Leaf", "a"), &TypedValue::Float(5.5));
    assert_eq!(value(&graph, "Leaf", "b"), &TypedValue::Str("base".into()));
    assert_eq!(value(&graph, "Leaf", "c"), &TypedValue::Bool(false));

    let spec = graph.field_spec("Leaf", "a").unwrap();
    assert_eq!(spec.declared_in, "Leaf");
    assert_eq!(graph.schema("Leaf").unwrap().lineage, vec!["Base", "Mid", "Leaf"]);
}

#[test]
fn test_cyclic_inheritance_is_structural() {
    let schemas = [
        SchemaDecl::new("A").with_parent("C"),
        SchemaDecl::new("B").with_parent("A"),
        SchemaDecl::new("C").with_parent("B"),
    ];
    let report = resolve(&schemas, &[], None).unwrap_err();
    let error = only_error(&report);
    assert_eq!(error.kind(), ErrorKind::CyclicInheritanceError);
    assert!(error.is_structural());
}

// ---------------------------------------------------------------------------
// Idempotence and round trip
// ---------------------------------------------------------------------------

#[test]
fn test_resolution_is_idempotent() {
    let first = tutorial_resolver().with_source(tutorial_source()).resolve().unwrap();
    let second = tutorial_resolver().with_source(tutorial_source()).resolve().unwrap();
    assert_eq!(first.flatten(), second.flatten());
    assert_eq!(first.fingerprint(), second.fingerprint());
}

#[test]
fn test_flattened_values_coerce_back_to_the_same_typed_values() {
    let mut source = tutorial_source();
    source["OptimizerConfig"]["grad_clip"] = json!("1.7976931348623157e308");
    source["SGDConfig"]["weight_decay"] = json!("5e-324");
    let graph = tutorial_resolver().with_source(source).resolve().unwrap();
    assert_eq!(value(&graph, "OptimizerConfig", "grad_clip"), &TypedValue::Float(f64::MAX));
    let flat = graph.flatten();

    for instance in graph.iter() {
        for (field, typed) in instance.fields() {
            let spec = graph.field_spec(instance.name(), field).unwrap();
            if spec.ty.is_reference() {
                continue;
            }
            let raw = &flat[instance.name()][field];
            let again = coerce_value(instance.name(), field, &spec.ty, raw).unwrap();
            assert_eq!(&again, typed, "{}.{field}", instance.name());
        }
    }
}

// ---------------------------------------------------------------------------
// Validation errors
// ---------------------------------------------------------------------------

#[test]
fn test_overflowing_float_is_an_invalid_type() {
    let mut source = tutorial_source();
    source["OptimizerConfig"]["lr"] = json!("1e999");

    let report = tutorial_resolver().with_source(source).resolve().unwrap_err();
    assert!(matches!(
        only_error(&report),
        ResolutionError::InvalidType { schema, field, .. }
            if schema == "OptimizerConfig" && field == "lr"
    ));
}

#[test]
fn test_missing_required_field_is_reported_once() {
    let mut source = tutorial_source();
    source.insert("DataConfig".into(), json!({"batch_size": 2}));

    let report = tutorial_resolver().with_source(source).resolve().unwrap_err();
    assert_eq!(
        only_error(&report),
        &ResolutionError::MissingRequiredField {
            schema: "DataConfig".into(),
            field: "n_samples".into()
        }
    );
}

#[test]
fn test_enum_value_outside_allowed_set() {
    let mut source = tutorial_source();
    source["ModelConfig"]["activation"] = json!("swish");

    let report = tutorial_resolver().with_source(source).resolve().unwrap_err();
    let error = only_error(&report);
    assert_eq!(error.kind(), ErrorKind::InvalidEnumValueError);
    assert_eq!(error.schema(), Some("ModelConfig"));
    assert_eq!(error.field(), Some("activation"));
    assert_eq!(
        error.to_string(),
        "invalid value 'swish' for 'ModelConfig.activation': expected one of {relu, gelu, tanh}"
    );
}

#[test]
fn test_tuple_arity_is_checked() {
    let mut source = tutorial_source();
    source["ModelConfig"]["hidden_sizes"] = json!([32, 32]);

    let report = tutorial_resolver().with_source(source).resolve().unwrap_err();
    assert!(matches!(
        only_error(&report),
        ResolutionError::Arity { expected: 3, found: 2, .. }
    ));
}

#[test]
fn test_unknown_field_does_not_block_other_schemas() {
    let mut source = tutorial_source();
    source["ModelConfig"]["n_layers"] = json!(3);
    source["DataConfig"]["batch_size"] = json!("many");

    let report = tutorial_resolver().with_source(source).resolve().unwrap_err();
    assert_eq!(report.len(), 2);
    assert_eq!(report.count(ErrorKind::UnknownFieldError), 1);
    assert_eq!(report.count(ErrorKind::InvalidTypeError), 1);

    let records = report.records();
    assert!(records.iter().any(|r| r.schema.as_deref() == Some("ModelConfig")
        && r.field.as_deref() == Some("n_layers")));
}

#[test]
fn test_unknown_schema_section_is_reported() {
    let mut source = tutorial_source();
    source.insert("AdamConfig".into(), json!({"lr": 0.1}));
    let report = tutorial_resolver().with_source(source).resolve().unwrap_err();
    assert_eq!(
        only_error(&report),
        &ResolutionError::UnknownSchema {
            schema: "AdamConfig".into()
        }
    );
}

// ---------------------------------------------------------------------------
// References
// ---------------------------------------------------------------------------

#[test]
fn test_duplicate_schema_registration() {
    let schemas = [
        SchemaDecl::new("Child").with_field(FieldDecl::new("x", "int").with_default(1)),
        SchemaDecl::new("Child").with_field(FieldDecl::new("y", "int").with_default(2)),
        SchemaDecl::new("Parent").with_field(FieldDecl::new("child", "Child")),
    ];
    let report = resolve(&schemas, &[tree(json!({"Parent": {"child": "Child"}}))], None).unwrap_err();
    assert_eq!(report.count(ErrorKind::DuplicateReferenceError), 1);
    assert!(report.errors().contains(&ResolutionError::DuplicateReference {
        schema: "Child".into(),
        field: None,
        reference: "Child".into()
    }));
}

#[test]
fn test_missing_reference() {
    let schemas = [
        SchemaDecl::new("Child").with_field(FieldDecl::new("x", "int").with_default(1)),
        SchemaDecl::new("Parent").with_field(FieldDecl::new("child", "Child")),
    ];
    let report = resolve(&schemas, &[tree(json!({"Parent": {"child": "Orphan"}}))], None).unwrap_err();
    assert_eq!(
        only_error(&report),
        &ResolutionError::MissingReference {
            schema: "Parent".into(),
            field: "child".into(),
            reference: Some("Orphan".into())
        }
    );
}

#[test]
fn test_repeated_references_follow_list_order() {
    let graph = Resolver::new()
        .with_schema(SchemaDecl::new("Stage").repeatable().with_field(FieldDecl::new("name", "str")))
        .with_schema(SchemaDecl::new("Pipeline").with_field(FieldDecl::new("stages", "List[Stage]")))
        .with_source(tree(json!({
            "Stage": [{"name": "load"}, {"name": "train"}, {"name": "eval"}],
            "Pipeline": {"stages": ["Stage[2]", "Stage[0]"]}
        })))
        .resolve()
        .unwrap();

    let pipeline = graph.get("Pipeline").unwrap();
    let stages = graph.follow(pipeline.get("stages").unwrap());
    let names: Vec<&str> = stages
        .iter()
        .filter_map(|stage| stage.get("name").and_then(TypedValue::as_str))
        .collect();
    assert_eq!(names, vec!["eval", "load"]);
    assert_eq!(graph.flatten()["Pipeline"]["stages"], json!(["Stage[2]", "Stage[0]"]));
}

// ---------------------------------------------------------------------------
// End to end
// ---------------------------------------------------------------------------

#[test]
fn test_end_to_end_with_override() {
    let overrides = tree(json!({"OptimizerConfig": {"lr": "0.05"}}));
    let graph = tutorial_resolver()
        .with_source(tutorial_source())
        .with_overrides(overrides)
        .require_at_least_one_source(true)
        .resolve()
        .unwrap();

    assert_eq!(value(&graph, "OptimizerConfig", "lr"), &TypedValue::Float(0.05));
    assert_eq!(value(&graph, "SGDConfig", "lr"), &TypedValue::Float(0.01));
    assert_eq!(value(&graph, "SGDConfig", "momentum"), &TypedValue::Float(0.9));
    assert_eq!(value(&graph, "SGDConfig", "nesterov"), &TypedValue::Bool(true));
    assert_eq!(value(&graph, "ModelConfig", "optimizer"), &TypedValue::Enum("SGD".into()));
    assert_eq!(
        value(&graph, "ModelConfig", "hidden_sizes"),
        &TypedValue::Tuple(vec![TypedValue::Int(32), TypedValue::Int(32), TypedValue::Int(16)])
    );
    assert_eq!(value(&graph, "ModelConfig", "save_path"), &TypedValue::None);
    assert_eq!(graph.len(), 4);
}
