use clap::{Parser, Subcommand};
use pf_core::in_years;
use pf_graph::{CompartmentKind, Graph};
use pf_project::{ProjectError, compile_model, load_model};
use pf_sim::{SimError, SimRecord, run_sim};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "pf-cli")]
#[command(about = "popflow CLI - compartmental population model runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a model file and report its duration groups
    Validate {
        /// Path to the model file (YAML, or JSON by extension)
        model_path: PathBuf,
    },
    /// Run a model and export compartment sizes as CSV
    Run {
        /// Path to the model file (YAML, or JSON by extension)
        model_path: PathBuf,
        /// Override the end year from the model settings
        #[arg(long)]
        t_end: Option<f64>,
        /// Output CSV file path (optional, defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error(transparent)]
    Sim(#[from] SimError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

type CliResult<T> = Result<T, CliError>;

fn main() -> CliResult<()> {
    // Initialize tracing (honours RUST_LOG)
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { model_path } => cmd_validate(&model_path),
        Commands::Run {
            model_path,
            t_end,
            output,
        } => cmd_run(&model_path, t_end, output.as_deref()),
    }
}

fn cmd_validate(model_path: &Path) -> CliResult<()> {
    println!("Validating model: {}", model_path.display());
    let model = load_model(model_path)?;
    let compiled = compile_model(&model)?;
    let graph = &compiled.graph;
    println!("✓ Model is valid");
    println!(
        "  {} parameters, {} compartments, {} links (dt = {} years)",
        graph.parameters().len(),
        graph.compartments().len(),
        graph.links().len(),
        in_years(graph.dt())
    );

    for group in graph.groups() {
        let names = |ids: &[pf_core::CompartmentId]| {
            ids.iter()
                .filter_map(|&id| graph.compartment(id))
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let flush = graph
            .parameter(group.flush_parameter)
            .map_or("?", |p| p.name.as_str());
        println!(
            "  group {} ({}, {} bins): {}",
            group.id,
            flush,
            group.bin_count,
            names(&group.compartments)
        );
        if !group.junctions.is_empty() {
            println!("    attached junctions: {}", names(&group.junctions));
        }
    }
    Ok(())
}

fn cmd_run(model_path: &Path, t_end: Option<f64>, output: Option<&Path>) -> CliResult<()> {
    let model = load_model(model_path)?;
    tracing::debug!(model = %model.name, path = %model_path.display(), "loaded model");
    let mut compiled = compile_model(&model)?;
    if let Some(t_end) = t_end {
        compiled.options.t_end = t_end;
    }

    let record = run_sim(&compiled.graph, &compiled.parameters, &compiled.options)?;
    let csv = sizes_csv(&compiled.graph, &record);

    if let Some(path) = output {
        std::fs::write(path, csv)?;
        println!(
            "✓ Exported {} time points to {}",
            record.len(),
            path.display()
        );
    } else {
        print!("{}", csv);
    }
    Ok(())
}

/// One row per time point, one column per storing compartment.
fn sizes_csv(graph: &Graph, record: &SimRecord) -> String {
    let columns: Vec<_> = graph
        .compartments()
        .iter()
        .filter(|c| !matches!(c.kind, CompartmentKind::Source | CompartmentKind::Junction))
        .collect();

    let mut csv = String::from("t");
    for c in &columns {
        csv.push(',');
        csv.push_str(&c.name);
    }
    csv.push('\n');

    for (ti, t) in record.t.iter().enumerate() {
        let _ = write!(csv, "{}", t);
        for c in &columns {
            let _ = write!(csv, ",{}", record.size(c.id, ti).unwrap_or(0.0));
        }
        csv.push('\n');
    }
    csv
}
