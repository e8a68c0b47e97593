//! Hologram Graph CLI
//!
//! Command-line interface for inspecting, patching and running graph models
//! stored as JSON documents.

use anyhow::Context;
use clap::{Parser, Subcommand};
use hologram_graph::{
    BuilderConfig, EditSession, ExecutionProvider, GraphPatch, Materializer, ModelDocument, ReferenceSession,
    TensorData, TensorMap,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process;
use tracing::{debug, info};

/// Hologram Graph - build, patch and run tensor-model graphs
#[derive(Parser, Debug)]
#[command(name = "hologram-graph")]
#[command(author = "Hologram Team")]
#[command(version)]
#[command(about = "Build, patch and run tensor-model graphs", long_about = None)]
struct Cli {
    /// Path to config file (JSON)
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write the built-in Gemm demo model
    Demo(DemoArgs),

    /// Print statistics and interface of a model
    Inspect(InspectArgs),

    /// Merge a patch into a model
    ///
    /// The patch is a JSON GraphPatch: a fragment plus the interface edits
    /// (removed and kept inputs/outputs, removed nodes) needed to splice it in.
    /// Several patches are applied in the order given.
    Merge(MergeArgs),

    /// Execute a model on the reference session
    Run(RunArgs),
}

#[derive(Parser, Debug)]
struct DemoArgs {
    /// Output path for the model document
    #[arg(short, long)]
    output: PathBuf,
}

#[derive(Parser, Debug)]
struct InspectArgs {
    /// Model document to inspect
    #[arg(short, long)]
    model: PathBuf,

    /// Print the graph in DOT format instead
    #[arg(long)]
    dot: bool,
}

#[derive(Parser, Debug)]
struct MergeArgs {
    /// Base model document
    #[arg(short, long)]
    model: PathBuf,

    /// Patch file(s), applied in order
    #[arg(short, long = "patch", required = true)]
    patches: Vec<PathBuf>,

    /// Output path for the merged document
    #[arg(short, long)]
    output: PathBuf,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Model document to execute
    #[arg(short, long)]
    model: PathBuf,

    /// JSON object mapping input names to tensors
    #[arg(short, long)]
    inputs: PathBuf,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    let result = load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Demo(args) => run_demo(args),
        Commands::Inspect(args) => run_inspect(args, config),
        Commands::Merge(args) => run_merge(args, config),
        Commands::Run(args) => run_model(args, config),
    });

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<BuilderConfig> {
    match path {
        Some(path) => {
            let config = BuilderConfig::from_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?;
            debug!(path = %path.display(), "loaded config");
            Ok(config)
        }
        None => Ok(BuilderConfig::default()),
    }
}

fn load_model(path: &Path, config: &BuilderConfig) -> anyhow::Result<ModelDocument> {
    let mut doc = ModelDocument::load(path).with_context(|| format!("Failed to load model {}", path.display()))?;
    if doc.opsets().is_empty() {
        let defaults = config.default_registry()?;
        let added = doc.merge_opsets(defaults.iter())?;
        debug!(added, "document names no opsets, using configured defaults");
    }
    Ok(doc)
}

fn run_demo(args: DemoArgs) -> anyhow::Result<()> {
    let doc = hologram_graph::demo_document()?;
    doc.save(&args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    println!("✓ Wrote demo model to {}", args.output.display());
    Ok(())
}

fn run_inspect(args: InspectArgs, config: BuilderConfig) -> anyhow::Result<()> {
    let doc = load_model(&args.model, &config)?;
    let model = Materializer::new().materialize(doc)?;

    if args.dot {
        print!("{}", model.graph().to_dot());
        return Ok(());
    }

    let metadata = model.metadata();
    println!("Model: {}", args.model.display());
    println!("  Producer: {} {}", metadata.producer_name, metadata.producer_version);
    if !metadata.doc_string.is_empty() {
        println!("  Description: {}", metadata.doc_string);
    }
    println!("  Opsets:");
    for (domain, version) in model.opsets().iter() {
        let domain = if domain.is_empty() { "ai.onnx" } else { domain };
        println!("    {}: {}", domain, version);
    }
    println!("  Inputs:");
    for input in model.graph().inputs() {
        println!("    {}", input);
    }
    println!("  Outputs:");
    for output in model.graph().outputs() {
        println!("    {}", output);
    }
    if !metadata.lineage.is_empty() {
        println!("  Lineage:");
        for entry in &metadata.lineage {
            println!(
                "    #{} {} (+{} nodes, -{} nodes, +{} initializers)",
                entry.sequence, entry.label, entry.nodes_added, entry.nodes_removed, entry.initializers_added
            );
        }
    }
    println!();
    print!("{}", model.statistics());
    Ok(())
}

fn run_merge(args: MergeArgs, config: BuilderConfig) -> anyhow::Result<()> {
    let doc = load_model(&args.model, &config)?;
    let mut session = EditSession::load_document(doc, config)?;

    for path in &args.patches {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read patch {}", path.display()))?;
        let patch: GraphPatch =
            serde_json::from_str(&content).with_context(|| format!("Failed to parse patch {}", path.display()))?;
        session
            .apply(patch)
            .with_context(|| format!("Failed to merge patch {}", path.display()))?;
        info!(patch = %path.display(), "applied patch");
    }

    let applied = session.applied();
    let merged = session.into_model().into_document()?;
    merged
        .save(&args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    println!("✓ Merged {} patch(es) into {}", applied, args.output.display());
    Ok(())
}

fn run_model(args: RunArgs, config: BuilderConfig) -> anyhow::Result<()> {
    let doc = load_model(&args.model, &config)?;
    let model = Materializer::new().materialize(doc)?;
    let session = ReferenceSession::new(model, config.session);

    let content = std::fs::read_to_string(&args.inputs)
        .with_context(|| format!("Failed to read inputs {}", args.inputs.display()))?;
    let raw: BTreeMap<String, TensorData> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse inputs {}", args.inputs.display()))?;

    let mut inputs = TensorMap::new();
    for (name, tensor) in raw {
        // Re-check dims against the data, deserialization does not
        let tensor = TensorData::new(tensor.dims().to_vec(), tensor.values().clone())
            .with_context(|| format!("Invalid tensor for input '{}'", name))?;
        inputs.insert(name, tensor);
    }

    let outputs = session.run(&inputs)?;
    let outputs: BTreeMap<String, TensorData> = outputs.into_iter().collect();
    println!("{}", serde_json::to_string_pretty(&outputs)?);
    Ok(())
}
