use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use reldag_core::{BuildConfig, MemoryCatalog, RelAlgDagBuilder, tree_string};
use reldag_error::{Result, internal};
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Pretty,
    Json,
}

#[derive(Parser)]
#[clap(name = "reldag")]
struct Arguments {
    /// Path to the serialized plan.
    plan: PathBuf,

    /// Path to a json file describing the tables the plan references.
    #[clap(long, short, env = "RELDAG_CATALOG")]
    catalog: PathBuf,

    /// Build config as json. Missing fields use their defaults.
    #[clap(long)]
    config: Option<String>,

    /// Insert pre-projections for window functions.
    #[clap(long)]
    cluster_mode: bool,

    /// Skip rewrites and print the plan as deserialized.
    #[clap(long)]
    unoptimized: bool,

    /// Include expressions and field names in the printed tree.
    #[clap(long)]
    verbose_explain: bool,

    /// Log format.
    #[clap(long, value_enum, default_value_t = OutputFormat::Pretty)]
    log_format: OutputFormat,

    /// Log verbosity, repeat for more.
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Builds a plan and prints the resulting DAG.
fn main() {
    let args = Arguments::parse();
    let format = match args.log_format {
        OutputFormat::Pretty => logutil::LogFormat::Pretty,
        OutputFormat::Json => logutil::LogFormat::Json,
    };
    logutil::init(args.verbose, format);

    if let Err(e) = run(args) {
        eprintln!("ERROR: {e}");
        std::process::exit(1);
    }
}

fn run(args: Arguments) -> Result<()> {
    let catalog = std::fs::read_to_string(&args.catalog)
        .map_err(|e| internal!("Failed to read catalog: {e}"))?;
    let catalog: MemoryCatalog = serde_json::from_str(&catalog)?;

    let plan = std::fs::read_to_string(&args.plan)
        .map_err(|e| internal!("Failed to read plan: {e}"))?;

    let mut config: BuildConfig = match &args.config {
        Some(config) => serde_json::from_str(config)?,
        None => BuildConfig::default(),
    };
    config.cluster_mode |= args.cluster_mode;

    let builder = RelAlgDagBuilder::new(&catalog).with_config(config);
    let dag = if args.unoptimized {
        builder.build_unoptimized(&plan)?
    } else {
        builder.build(&plan)?
    };
    info!(nodes = dag.len(), subqueries = dag.subqueries().len(), "built dag");

    print!("{}", tree_string(&dag, args.verbose_explain));
    Ok(())
}
