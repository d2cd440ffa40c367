//! varq CLI: generate variants into the queue and dispatch them.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use secrecy::{ExposeSecret, SecretString};
use tracing::info;
use varq::config::{Config, ServiceIdentity};
use varq::db::Db;
use varq::dispatch::{DispatchConfig, DispatchReport, Dispatcher};
use varq::generator::{DEFAULT_COMMIT_EVERY, VariantGenerator};
use varq::model::AttributeOptions;
use varq::schema;
use varq::sender::HttpSender;
use varq::telemetry::{TelemetryConfig, init_telemetry};

#[derive(Parser)]
#[command(name = "varq", about = "Generate and dispatch configurator variants")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate variants from option schemas into the queue
    Generate(GenerateArgs),
    /// Drain the queue through the configurator
    Dispatch(DispatchArgs),
    /// Generate, then dispatch
    Run {
        #[command(flatten)]
        generate: GenerateArgs,
        #[command(flatten)]
        dispatch: DispatchArgs,
    },
    /// Show queue and finished totals
    Stats,
}

#[derive(Args)]
struct GenerateArgs {
    /// Option schema JSON files, processed in order
    #[arg(long = "schema", num_args = 1.., required_unless_present = "schema_dir")]
    schemas: Vec<PathBuf>,
    /// Directory of schema JSON files, processed by file name after any --schema files
    #[arg(long)]
    schema_dir: Option<PathBuf>,
    /// Variants drawn per schema
    #[arg(long, default_value_t = 1000)]
    count: u64,
    /// Random seed
    #[arg(long, default_value_t = 1)]
    seed: u64,
    /// Appends per transaction
    #[arg(long, default_value_t = DEFAULT_COMMIT_EVERY)]
    commit_every: u64,
}

#[derive(Args)]
struct DispatchArgs {
    /// Service identity TOML file
    #[arg(long)]
    service: PathBuf,
    /// Concurrent workers
    #[arg(long, default_value_t = 10)]
    workers: usize,
    /// Per-request timeout in milliseconds
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,
    /// Finished records per write transaction
    #[arg(long, default_value_t = 10)]
    flush_every: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let guard = init_telemetry(TelemetryConfig::from(&config))?;

    let db = Db::open(&config.database_path).await?;
    db.migrate().await?;

    let result = match cli.command {
        Command::Generate(args) => {
            let result = cmd_generate(&db, &args).await;
            db.close().await;
            result
        }
        Command::Dispatch(args) => cmd_dispatch(&config, db, &args).await,
        Command::Run { generate, dispatch } => match cmd_generate(&db, &generate).await {
            Ok(()) => cmd_dispatch(&config, db, &dispatch).await,
            Err(e) => {
                db.close().await;
                Err(e)
            }
        },
        Command::Stats => {
            let result = cmd_stats(&db).await;
            db.close().await;
            result
        }
    };

    guard.flush();
    result
}

async fn cmd_generate(db: &Db, args: &GenerateArgs) -> anyhow::Result<()> {
    let mut paths = args.schemas.clone();
    if let Some(ref dir) = args.schema_dir {
        paths.extend(schema::schema_files(dir)?);
    }
    if paths.is_empty() {
        anyhow::bail!("no schema files to generate from");
    }

    let schemas = paths
        .iter()
        .map(|path| load_schema(path))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut generator = VariantGenerator::new(args.seed).with_commit_every(args.commit_every);
    let appended = generator.generate_many(db, &schemas, args.count).await?;

    println!(
        "Appended {appended} variant(s) from {} schema(s); queue holds {}",
        schemas.len(),
        db.queue_len().await?
    );
    Ok(())
}

fn load_schema(path: &Path) -> anyhow::Result<AttributeOptions> {
    let options = AttributeOptions::from_schema_file(path)?;
    info!(
        path = %path.display(),
        attributes = options.len(),
        combinations = options.combinations(),
        "schema loaded"
    );
    if options.is_empty() {
        anyhow::bail!("schema {} has no usable attributes", path.display());
    }
    Ok(options)
}

async fn cmd_dispatch(config: &Config, db: Db, args: &DispatchArgs) -> anyhow::Result<()> {
    let identity = ServiceIdentity::load(&args.service)?;
    let mut sender = HttpSender::with_timeout(
        config.require_endpoint()?,
        identity,
        Duration::from_millis(args.timeout_ms),
    )?;
    if let Some(ref key) = config.api_key {
        sender = sender.api_key(SecretString::from(key.expose_secret()));
    }

    let dispatcher = Dispatcher::new(
        db,
        Arc::new(sender),
        DispatchConfig {
            workers: args.workers,
            flush_every: args.flush_every,
            ..DispatchConfig::default()
        },
    );

    let report = dispatcher.run().await?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &DispatchReport) {
    println!("Claimed:    {}", report.claimed);
    println!("Sent:       {}", report.sent);
    println!("Recorded:   {}", report.recorded);
    println!("Succeeded:  {}", report.succeeded);
    println!("Failed:     {}", report.failed);
    println!("Timed out:  {}", report.timed_out);
}

async fn cmd_stats(db: &Db) -> anyhow::Result<()> {
    let queued = db.queue_len().await?;
    let summary = db.finished_summary().await?;

    println!("Queued:     {queued}");
    println!("Finished:   {}", summary.total());
    println!("  success:  {}", summary.succeeded);
    println!("  failure:  {}", summary.failed);
    println!("  timeout:  {}", summary.timed_out);
    Ok(())
}
