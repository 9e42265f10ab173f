//! Command-line entry point for the kbstore hierarchy store.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use kbstore::db::ensure_schema;
use kbstore::{
    load_config, load_manifest, telemetry, Database, HierarchyBuilder, KbError, PathOperator,
    QueryEngine, StoreConfig,
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Hierarchical knowledge-base store")]
struct Cli {
    /// Default log filter when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a construction pass from a manifest and reconcile every field table.
    Apply(ApplyArgs),
    /// List node paths matching the given filters.
    Query(QueryArgs),
}

#[derive(Debug, Args)]
struct StoreArgs {
    /// Store configuration file (YAML or JSON).
    #[arg(long)]
    config: Option<PathBuf>,
    /// SQLite database file; overrides the configuration.
    #[arg(long)]
    database: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ApplyArgs {
    /// Manifest describing knowledge bases and nodes.
    manifest: PathBuf,
    #[command(flatten)]
    store: StoreArgs,
}

#[derive(Debug, Args)]
struct QueryArgs {
    #[command(flatten)]
    store: StoreArgs,
    #[arg(long)]
    kb: Option<String>,
    #[arg(long)]
    label: Option<String>,
    #[arg(long)]
    name: Option<String>,
    /// Path pattern, e.g. `kb1.*.KB_JOB_QUEUE.*{1}`.
    #[arg(long)]
    path_match: Option<String>,
    /// Restrict to this path and its descendants.
    #[arg(long)]
    starting_path: Option<String>,
    /// Print descriptions next to paths.
    #[arg(long)]
    describe: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    telemetry::init_logging(&cli.log_level);

    let result = match cli.command {
        Command::Apply(args) => apply(args),
        Command::Query(args) => query(args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn open_store(args: &StoreArgs) -> kbstore::Result<(Database, StoreConfig)> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => StoreConfig::default(),
    };
    if let Some(db_path) = &args.database {
        config.database_path = Some(db_path.clone());
    }
    let path = config
        .resolved_database_path()
        .ok_or_else(|| KbError::Validation("no database path and no home directory".to_string()))?;
    Ok((Database::open(&path)?, config))
}

fn apply(args: ApplyArgs) -> kbstore::Result<()> {
    let manifest = load_manifest(&args.manifest)?;
    let (db, config) = open_store(&args.store)?;

    let mut builder = HierarchyBuilder::new(db, &config)?;
    manifest.apply(&mut builder)?;
    for report in builder.check_installation()? {
        println!("{}", report);
    }
    Ok(())
}

fn query(args: QueryArgs) -> kbstore::Result<()> {
    let (db, config) = open_store(&args.store)?;
    config.validate()?;
    let tables = db.with_conn(|conn| ensure_schema(conn, &config.schema))?;

    let mut engine = QueryEngine::new(&db, &tables)?;
    if let Some(kb) = &args.kb {
        engine.search_kb(kb);
    }
    if let Some(label) = &args.label {
        engine.search_label(label);
    }
    if let Some(name) = &args.name {
        engine.search_name(name);
    }
    if let Some(path) = &args.starting_path {
        engine.search_starting_path(path)?;
    }
    if let Some(pattern) = &args.path_match {
        engine.search_path(PathOperator::Match, pattern)?;
    }

    if args.describe {
        for (path, description) in engine.find_descriptions() {
            println!("{}\t{}", path, description);
        }
    } else {
        for path in engine.paths() {
            println!("{}", path);
        }
    }
    Ok(())
}
