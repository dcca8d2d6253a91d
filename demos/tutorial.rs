//! Tutorial example.
//!
//! Resolves the tutorial schemas against `demos/tutorial.yaml` plus any
//! command-line overrides, prints the resolved graph, and reads the
//! instances back into plain Rust structs.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p confgraph-demos --example tutorial
//! cargo run -p confgraph-demos --example tutorial -- --OptimizerConfig.lr=0.05
//! ```
//!
//! A second run with the same arguments prints the same fingerprint.

use confgraph_demos::{ModelConfig, RunConfig, SGDConfig, tutorial_resolver};
use confgraph_loader::{SourceFormat, SourceLoader, parse_overrides};

const TUTORIAL_YAML: &str = include_str!("tutorial.yaml");

fn main() {
    let source = SourceLoader::new()
        .load_str(TUTORIAL_YAML, SourceFormat::Yaml)
        .unwrap();
    let overrides = parse_overrides(std::env::args().skip(1)).unwrap();

    let graph = match tutorial_resolver()
        .with_source(source)
        .with_overrides(overrides)
        .resolve()
    {
        Ok(graph) => graph,
        Err(report) => {
            eprintln!("Configuration is invalid:");
            for record in report.records() {
                eprintln!("  [{}] {}", record.kind, record.message);
            }
            std::process::exit(1);
        }
    };

    println!("=== Resolved instances ===");
    for (name, fields) in graph.flatten() {
        println!("{name}");
        for (field, value) in fields {
            println!("  {field} = {value}");
        }
    }

    println!("\n=== Typed access ===");
    let model: ModelConfig = graph.deserialize("ModelConfig").unwrap();
    println!(
        "ModelConfig: {} features, hidden {:?}, {:?} activation, {:?} optimizer",
        model.n_features, model.hidden_sizes, model.activation, model.optimizer
    );

    let run: RunConfig = graph.deserialize("RunConfig").unwrap();
    println!(
        "RunConfig '{}': batch {} over {} samples, lr {} for {} epochs",
        run.name, run.data.batch_size, run.data.n_samples, run.optimizer.lr, run.optimizer.n_epochs
    );

    let sgd: SGDConfig = graph.deserialize("SGDConfig").unwrap();
    println!(
        "SGDConfig: momentum {} (nesterov: {}), weight decay {}",
        sgd.momentum, sgd.nesterov, sgd.weight_decay
    );

    println!("\n=== Following references ===");
    if let Some(run_instance) = graph.get("RunConfig") {
        for (field, value) in run_instance.fields() {
            for target in graph.follow(value) {
                println!("  {field} -> {}", target.name());
            }
        }
    }

    println!("\nfingerprint: {}", graph.fingerprint());
}
