//! Schemas shared by the confgraph demos.
//!
//! A small training setup: a model, its data, and an optimizer family with
//! an `SGDConfig` child. Every struct declares its schema through
//! [`DeclareSchema`] and is read back out of a resolved graph with
//! [`ConfigGraph::deserialize`](confgraph_core::ConfigGraph::deserialize).

use confgraph_core::{DeclareSchema, EnumDecl, FieldDecl, Resolver, SchemaDecl};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    Gelu,
    Tanh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Optimizer {
    #[serde(rename = "SGD")]
    Sgd,
    Adam,
}

fn activation_enum() -> EnumDecl {
    EnumDecl::new("Activation", ["relu", "gelu", "tanh"])
}

fn optimizer_enum() -> EnumDecl {
    EnumDecl::new("Optimizer", ["SGD", "Adam"])
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelConfig {
    pub save_path: Option<String>,
    pub n_features: i64,
    pub dropout: Option<Vec<f64>>,
    pub hidden_sizes: (i64, i64, i64),
    pub activation: Activation,
    pub optimizer: Optimizer,
    pub cache_path: Option<String>,
}

impl DeclareSchema for ModelConfig {
    fn declare() -> SchemaDecl {
        SchemaDecl::new("ModelConfig")
            .with_description("Network shape and the optimizer family to train it with")
            .with_field(FieldDecl::new("save_path", "Optional[str]"))
            .with_field(FieldDecl::new("n_features", "int"))
            .with_field(FieldDecl::new("dropout", "Optional[List[float]]"))
            .with_field(
                FieldDecl::new("hidden_sizes", "Tuple[int, int, int]")
                    .with_default(json!([32, 32, 32])),
            )
            .with_field(FieldDecl::new("activation", "Activation").with_default("relu"))
            .with_field(FieldDecl::new("optimizer", "Optimizer").with_default("SGD"))
            .with_field(FieldDecl::new("cache_path", "Optional[str]"))
    }

    fn enums() -> Vec<EnumDecl> {
        vec![activation_enum(), optimizer_enum()]
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DataConfig {
    pub batch_size: i64,
    pub n_samples: i64,
    pub cache_path: Option<String>,
}

impl DeclareSchema for DataConfig {
    fn declare() -> SchemaDecl {
        SchemaDecl::new("DataConfig")
            .with_field(FieldDecl::new("batch_size", "int").with_default(2))
            .with_field(
                FieldDecl::new("n_samples", "int").with_description("Number of synthetic samples"),
            )
            .with_field(FieldDecl::new("cache_path", "Optional[str]"))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OptimizerConfig {
    pub lr: f64,
    pub n_epochs: i64,
    pub grad_clip: Option<f64>,
}

impl DeclareSchema for OptimizerConfig {
    fn declare() -> SchemaDecl {
        SchemaDecl::new("OptimizerConfig")
            .with_field(FieldDecl::new("lr", "float").with_default(0.01))
            .with_field(FieldDecl::new("n_epochs", "int").with_default(2))
            .with_field(FieldDecl::new("grad_clip", "Optional[float]"))
    }
}

/// `OptimizerConfig` plus the SGD-specific knobs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SGDConfig {
    pub lr: f64,
    pub n_epochs: i64,
    pub grad_clip: Option<f64>,
    pub weight_decay: f64,
    pub momentum: f64,
    pub nesterov: bool,
}

impl DeclareSchema for SGDConfig {
    fn declare() -> SchemaDecl {
        SchemaDecl::new("SGDConfig")
            .with_parent("OptimizerConfig")
            .with_field(FieldDecl::new("weight_decay", "float"))
            .with_field(FieldDecl::new("momentum", "float"))
            .with_field(FieldDecl::new("nesterov", "bool").with_default(false))
    }
}

/// Ties the run together by reference.
///
/// `optimizer` accepts any `OptimizerConfig` kind, so a source may point
/// it at `SGDConfig`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunConfig {
    pub name: String,
    pub data: DataConfig,
    pub optimizer: OptimizerConfig,
}

impl DeclareSchema for RunConfig {
    fn declare() -> SchemaDecl {
        SchemaDecl::new("RunConfig")
            .with_field(FieldDecl::new("name", "str").with_default("tutorial"))
            .with_field(FieldDecl::new("data", "DataConfig"))
            .with_field(FieldDecl::new("optimizer", "OptimizerConfig"))
    }
}

/// A resolver with every tutorial schema registered.
pub fn tutorial_resolver() -> Resolver {
    Resolver::new()
        .register::<ModelConfig>()
        .register::<DataConfig>()
        .register::<OptimizerConfig>()
        .register::<SGDConfig>()
        .register::<RunConfig>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use confgraph_core::RawTree;

    fn source(value: serde_json::Value) -> RawTree {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("expected an object, got {other}"),
        }
    }

    #[test]
    fn test_tutorial_round_trip_into_structs() {
        let graph = tutorial_resolver()
            .with_source(source(json!({
                "cache_path": "/tmp/cache",
                "ModelConfig": {"n_features": 64, "activation": "gelu"},
                "DataConfig": {"n_samples": 8},
                "SGDConfig": {"weight_decay": 0.0001, "momentum": 0.9},
                "RunConfig": {"optimizer": "SGDConfig"}
            })))
            .resolve()
            .unwrap();

        let model: ModelConfig = graph.deserialize("ModelConfig").unwrap();
        assert_eq!(model.activation, Activation::Gelu);
        assert_eq!(model.hidden_sizes, (32, 32, 32));
        assert_eq!(model.cache_path.as_deref(), Some("/tmp/cache"));
        assert_eq!(model.dropout, None);

        let run: RunConfig = graph.deserialize("RunConfig").unwrap();
        assert_eq!(run.name, "tutorial");
        assert_eq!(run.data.n_samples, 8);
        assert_eq!(run.optimizer.lr, 0.01);

        let sgd: SGDConfig = graph.deserialize("SGDConfig").unwrap();
        assert!(!sgd.nesterov);
        assert_eq!(sgd.momentum, 0.9);
    }
}
