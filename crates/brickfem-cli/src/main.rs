//! brickfem CLI - batch front end for brick assembly models
//!
//! Validates assembly inputs, writes the built brick parts and runs the
//! clamping and load jobs through the configured external solver.

use anyhow::{bail, Context, Result};
use brickfem::{build_model, make_model, CommandSolver, LoadOutcome, ModelInput, ModelSpec, RunSettings};
use brickfem_ir::{ModelDocument, Procedure};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "brickfem")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Finite-element models of snap-fit brick assemblies", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check an assembly input without building anything
    Validate {
        /// Assembly input (.json)
        input: PathBuf,
    },
    /// Build the brick parts of an assembly and write them as JSON
    Parts {
        /// Assembly input (.json)
        input: PathBuf,
        /// Output directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
    /// Build the model, clamp it and run the load case(s)
    Run {
        /// Assembly input (.json)
        input: PathBuf,
        /// Run settings (.toml)
        #[arg(short, long)]
        settings: Option<PathBuf>,
        /// Reuse the stored clamped state (explicit inputs only)
        #[arg(long)]
        reuse: bool,
        /// Directory the working area is created in
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
    /// Display information about a model document
    Info {
        /// Model document (.model.json)
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => bail!("unknown log level: {other}"),
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Validate { input } => validate(&input),
        Commands::Parts { input, out } => write_parts(&input, &out),
        Commands::Run {
            input,
            settings,
            reuse,
            root,
        } => run(&input, settings.as_deref(), reuse, &root),
        Commands::Info { file } => show_info(&file),
    }
}

fn read_spec(input: &Path) -> Result<ModelSpec> {
    let json = fs::read_to_string(input)
        .with_context(|| format!("cannot read {}", input.display()))?;
    let raw = ModelInput::from_json(&json)
        .with_context(|| format!("malformed assembly input {}", input.display()))?;
    let spec = raw
        .validate()
        .with_context(|| format!("invalid assembly input {}", input.display()))?;
    Ok(spec)
}

fn read_settings(path: Option<&Path>) -> Result<RunSettings> {
    let Some(path) = path else {
        return Ok(RunSettings::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("invalid run settings {}", path.display()))
}

fn validate(input: &Path) -> Result<()> {
    let spec = read_spec(input)?;
    let a = &spec.assembly;
    println!("{}: ok", input.display());
    println!("  Assembly: {}", a.name);
    println!("  Brick types: {}", a.bricks.len());
    println!("  Parts: {}", a.parts.len());
    println!("  Fixities: {}", a.bc.len());
    println!("  Reference point loads: {}", a.loads_rp.len());
    println!("  Mesh size: {} mm, friction: {}", a.mesh_size, a.mu);
    println!(
        "  Mode: {}",
        if spec.load.is_explicit() { "explicit" } else { "implicit" }
    );
    Ok(())
}

fn write_parts(input: &Path, out: &Path) -> Result<()> {
    let spec = read_spec(input)?;
    let model = build_model(&spec)?;
    fs::create_dir_all(out).with_context(|| format!("cannot create {}", out.display()))?;
    for part in model.parts.values() {
        let path = out.join(format!("{}.part.json", part.name));
        fs::write(&path, serde_json::to_string_pretty(part)?)
            .with_context(|| format!("cannot write {}", path.display()))?;
        println!("Wrote {}", path.display());
    }
    Ok(())
}

fn run(input: &Path, settings: Option<&Path>, reuse: bool, root: &Path) -> Result<()> {
    let mut spec = read_spec(input)?;
    if reuse {
        if !spec.load.is_explicit() {
            bail!("--reuse needs an explicit input (explicit_par)");
        }
        spec.reuse = true;
    }
    let settings = read_settings(settings)?;
    let mut solver = CommandSolver::new(settings.solver.clone());
    let summary = make_model(&spec, &settings, &mut solver, root)?;

    println!("Working area: {}", summary.workdir.display());
    println!(
        "Clamped state: {} (step {}){}",
        summary.clamped.job,
        summary.clamped.step,
        if summary.reused { ", reused" } else { "" }
    );
    for case in &summary.load_cases {
        match &case.outcome {
            LoadOutcome::Completed => println!("  {}: completed", case.job),
            LoadOutcome::Stopped {
                reason,
                time_reached,
                ..
            } => println!("  {}: stopped at t = {time_reached} ({reason})", case.job),
        }
    }
    Ok(())
}

fn show_info(file: &Path) -> Result<()> {
    let json = fs::read_to_string(file)
        .with_context(|| format!("cannot read {}", file.display()))?;
    let doc = ModelDocument::from_json(&json)
        .with_context(|| format!("malformed model document {}", file.display()))?;

    println!("brickfem model: {}", file.display());
    println!("  Version: {}", doc.version);
    println!("  Job: {} ({:?})", doc.name, doc.kind);
    println!("  Parts: {}", doc.parts.len());
    println!("  Instances: {}", doc.instances.len());
    println!("  Rigid bodies: {}", doc.rigid_bodies.len());
    println!("  Boundary conditions: {}", doc.boundary_conditions.len());
    println!("  Interactions: {}", doc.interactions.len());
    if let Some(state) = &doc.initial_state {
        println!("  Initial state: {} / {}", state.job, state.step);
    }

    if !doc.steps.is_empty() {
        println!("\nSteps:");
        for step in &doc.steps {
            let procedure = match &step.procedure {
                Procedure::Static { .. } => "static".to_string(),
                Procedure::ExplicitDynamic { time_period, .. } => {
                    format!("explicit, {time_period} s")
                }
            };
            println!("  {} after {} ({procedure})", step.name, step.previous);
        }
    }

    let dangling = doc.dangling_references();
    if !dangling.is_empty() {
        println!("\nDangling references:");
        for r in &dangling {
            println!("  {r}");
        }
    }
    Ok(())
}
