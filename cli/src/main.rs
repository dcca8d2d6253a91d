use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use confgraph_core::{
    ConfigGraph, Declarations, EffectiveSchema, Registry, ResolutionError, ResolutionReport,
    Resolver, resolve_inheritance,
};
use confgraph_loader::{LoadError, SourceLoader, load_all_declarations, parse_overrides};
use tracing::debug;

/// Output format for resolved graphs and schema descriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum CliOutputFormat {
    Json,
    Yaml,
    Table,
}

#[derive(Debug, Parser)]
#[command(name = "confgraph")]
#[command(about = "Resolve typed configuration schemas against ranked config sources")]
#[command(version)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Resolve configuration files and overrides into a validated graph.
    Resolve(ResolveArgs),
    /// Check schema declaration files without resolving any configuration.
    Check(CheckArgs),
    /// Print the effective fields of every declared schema.
    Describe(DescribeArgs),
}

#[derive(Debug, Args)]
struct ResolveArgs {
    /// Schema declaration files (YAML, JSON or TOML).
    #[arg(long, required = true, num_args = 1..)]
    schemas: Vec<PathBuf>,
    /// Configuration files, lowest precedence first.
    #[arg(long = "config", short = 'c', num_args = 1..)]
    configs: Vec<PathBuf>,
    /// Output format.
    #[arg(long, default_value = "json")]
    format: CliOutputFormat,
    /// Directory to write the resolved configuration to as YAML.
    #[arg(long)]
    save_dir: Option<PathBuf>,
    /// Allow resolving from defaults and overrides alone.
    #[arg(long)]
    allow_defaults: bool,
    /// Overrides such as `--OptimizerConfig.lr=0.05`, given after `--`.
    #[arg(last = true)]
    overrides: Vec<String>,
}

#[derive(Debug, Args)]
struct CheckArgs {
    /// Schema declaration files (YAML, JSON or TOML).
    #[arg(long, required = true, num_args = 1..)]
    schemas: Vec<PathBuf>,
}

#[derive(Debug, Args)]
struct DescribeArgs {
    /// Schema declaration files (YAML, JSON or TOML).
    #[arg(long, required = true, num_args = 1..)]
    schemas: Vec<PathBuf>,
    /// Output format.
    #[arg(long, default_value = "table")]
    format: CliOutputFormat,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Command::Resolve(args) => run_resolve(args),
        Command::Check(args) => run_check(args),
        Command::Describe(args) => run_describe(args),
    };

    if let Err(err) = result {
        for line in err.lines() {
            eprintln!("error: {line}");
        }
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose {
        "confgraph=debug,confgraph_core=debug,confgraph_loader=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run_resolve(args: ResolveArgs) -> Result<(), String> {
    let declarations = load_schemas(&args.schemas)?;
    let sources = SourceLoader::new().load_all(&args.configs).map_err(load_error)?;
    let overrides = parse_overrides(&args.overrides).map_err(load_error)?;

    debug!(
        files = args.configs.len(),
        sources = sources.len(),
        overrides = overrides.len(),
        "Resolving configuration"
    );

    let graph = Resolver::new()
        .with_declarations(declarations)
        .with_sources(sources)
        .with_overrides(overrides)
        .require_at_least_one_source(!args.allow_defaults)
        .resolve()
        .map_err(|report| report_lines(&report))?;

    println!("{}", format_graph(&graph, args.format)?);

    if let Some(dir) = &args.save_dir {
        let path = save_graph(&graph, dir)?;
        eprintln!("Saved resolved configuration to '{}'.", path.display());
    }
    Ok(())
}

fn run_check(args: CheckArgs) -> Result<(), String> {
    let declarations = load_schemas(&args.schemas)?;
    let schemas = effective_schemas(&declarations)?;
    println!(
        "Checked {} schema(s) and {} enum(s) from {} file(s).",
        schemas.len(),
        declarations.enums.len(),
        args.schemas.len()
    );
    Ok(())
}

fn run_describe(args: DescribeArgs) -> Result<(), String> {
    let declarations = load_schemas(&args.schemas)?;
    let schemas = effective_schemas(&declarations)?;

    let rendered = match args.format {
        CliOutputFormat::Json => serde_json::to_string_pretty(&schemas)
            .map_err(|e| format!("JSON serialization failed: {e}"))?,
        CliOutputFormat::Yaml => {
            serde_yaml::to_string(&schemas).map_err(|e| format!("YAML serialization failed: {e}"))?
        }
        CliOutputFormat::Table => schemas.iter().map(schema_to_table).collect::<Vec<_>>().join("\n"),
    };
    println!("{rendered}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_schemas(paths: &[PathBuf]) -> Result<Declarations, String> {
    load_all_declarations(paths).map_err(load_error)
}

/// Registers declarations and resolves inheritance, reporting duplicates.
fn effective_schemas(declarations: &Declarations) -> Result<Vec<EffectiveSchema>, String> {
    let registry =
        Registry::build(declarations).map_err(|err| report_lines(&ResolutionReport::from(err)))?;
    if let Some(report) = ResolutionReport::from_errors(registry.duplicate_registrations()) {
        return Err(report_lines(&report));
    }
    resolve_inheritance(&registry).map_err(|err| report_lines(&ResolutionReport::from(err)))
}

fn load_error(err: LoadError) -> String {
    report_lines(&ResolutionReport::from(ResolutionError::from(err)))
}

/// One line per error: `[Kind] message`.
fn report_lines(report: &ResolutionReport) -> String {
    report
        .records()
        .iter()
        .map(|record| format!("[{}] {}", record.kind, record.message))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_graph(graph: &ConfigGraph, format: CliOutputFormat) -> Result<String, String> {
    match format {
        CliOutputFormat::Json => serde_json::to_string_pretty(&graph.to_json())
            .map_err(|e| format!("JSON serialization failed: {e}")),
        CliOutputFormat::Yaml => serde_yaml::to_string(&graph.flatten())
            .map_err(|e| format!("YAML serialization failed: {e}")),
        CliOutputFormat::Table => Ok(graph_to_table(graph)),
    }
}

fn graph_to_table(graph: &ConfigGraph) -> String {
    let mut out = String::new();
    for (name, fields) in graph.flatten() {
        out.push_str(&format!("{name}\n"));
        let width = fields.keys().map(String::len).max().unwrap_or(4);
        for (field, value) in &fields {
            out.push_str(&format!("  {field:<width$}  {value}\n"));
        }
    }
    out.push_str(&format!("\nfingerprint: {}", graph.fingerprint()));
    out
}

fn schema_to_table(schema: &EffectiveSchema) -> String {
    let mut out = String::new();
    out.push_str(&schema.lineage.join(" -> "));
    if schema.repeatable {
        out.push_str("  (repeatable)");
    }
    out.push('\n');
    if let Some(ref desc) = schema.description {
        out.push_str(&format!("  {desc}\n"));
    }

    let width = schema.fields.iter().map(|f| f.name.len()).max().unwrap_or(4);
    let type_width = schema
        .fields
        .iter()
        .map(|f| f.ty.to_string().len())
        .max()
        .unwrap_or(4);
    for field in &schema.fields {
        let status = match (&field.default, field.required) {
            (Some(default), _) => format!("default {default}"),
            (None, true) => "required".to_string(),
            (None, false) => "optional".to_string(),
        };
        out.push_str(&format!(
            "  {:<width$}  {:<type_width$}  {status}",
            field.name,
            field.ty.to_string()
        ));
        if let Some(ref desc) = field.description {
            out.push_str(&format!("  {desc}"));
        }
        out.push('\n');
    }
    out
}

/// Writes the flattened graph to `<dir>/<timestamp>.confgraph.yaml`.
fn save_graph(graph: &ConfigGraph, dir: &Path) -> Result<PathBuf, String> {
    fs::create_dir_all(dir)
        .map_err(|err| format!("Failed to create output directory '{}': {err}", dir.display()))?;

    let stamp = Utc::now().format("%Y%m%d-%H%M%S%.3f");
    let path = dir.join(format!("{stamp}.confgraph.yaml"));
    let raw = serde_yaml::to_string(&graph.flatten())
        .map_err(|err| format!("Failed to serialize configuration: {err}"))?;
    fs::write(&path, raw).map_err(|err| format!("Failed to write '{}': {err}", path.display()))?;
    Ok(path)
}
