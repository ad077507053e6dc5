//! Audit event generator binary

use audit_eventgen::xml::{record_to_xml, xml_to_text};
use audit_eventgen::{
    Config, EventClock, EventGenError, GenerationPlan, HttpSink, PacedEmitter, Result,
    load_samples,
};
use clap::{Parser, Subcommand, ValueEnum};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "eventgen")]
#[command(about = "Paced synthetic audit event generator", long_about = None)]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Emit paced events to the configured webhook
    Generate {
        #[arg(short, long, env = "EVENTGEN_CONFIG", default_value = "config.json")]
        config: PathBuf,
        /// Override the configured output format (json or xml)
        #[arg(long)]
        format: Option<String>,
        /// Fixed seed for sample selection
        #[arg(long)]
        seed: Option<u64>,
        /// Print the generation plan and exit
        #[arg(long)]
        dry_run: bool,
    },
    /// Dump parsed sample records as JSON
    Parse {
        #[arg(short, long)]
        samples: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print one random sample record as XML
    Render {
        #[arg(short, long)]
        samples: PathBuf,
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    initialize_tracing(cli.log_format);

    info!("Starting audit event generator v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(cli.command).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Generate {
            config,
            format,
            seed,
            dry_run,
        } => generate(config, format, seed, dry_run).await,
        Commands::Parse { samples, output } => {
            let samples = load_samples(&samples).await?;
            let json = samples.to_pretty_json()?;

            match output {
                Some(path) => {
                    tokio::fs::write(&path, json).await?;
                    info!("Wrote {} records to {}", samples.len(), path.display());
                }
                None => println!("{}", json),
            }
            Ok(())
        }
        Commands::Render { samples, seed } => {
            let samples = load_samples(&samples).await?;
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };

            let record = samples
                .choose(&mut rng)
                .ok_or(EventGenError::EmptySampleSet)?;
            print!("{}", xml_to_text(&record_to_xml(record)));
            Ok(())
        }
    }
}

async fn generate(
    config_path: PathBuf,
    format: Option<String>,
    seed: Option<u64>,
    dry_run: bool,
) -> Result<()> {
    let mut config = Config::load(&config_path)?;
    if let Some(format) = format {
        config.format = format.parse()?;
    }
    config.validate()?;

    info!(
        "Generator configuration - Format: {}, Samples: {}, Size: {}, Range: {}, Webhook: {}",
        config.format, config.samples, config.output_size, config.time_range, config.webhook_url
    );

    let samples = load_samples(&config.samples).await?;
    let plan = GenerationPlan::for_samples(&samples, config.byte_budget()?, config.time_budget()?);

    if dry_run {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    if config.auth_token.is_empty() {
        warn!("AUTH_TOKEN is not set, requests will carry an empty bearer token");
    }

    let sink = HttpSink::from_config(&config)?;
    let mut emitter = PacedEmitter::new(sink, config.format, EventClock::new(config.tz()?));
    if let Some(seed) = seed {
        emitter = emitter.with_seed(seed);
    }

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received, stopping generation");
            shutdown.cancel();
        }
    });

    let summary = emitter.run(&samples, &plan, &cancel).await?;
    info!(
        "Sent {} events, {} bytes in {} minute(s).",
        summary.event_count,
        summary.total_bytes_emitted,
        summary.elapsed.as_secs() / 60
    );

    Ok(())
}

/// Initialize structured logging
fn initialize_tracing(format: LogFormat) {
    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr);

    let registry = tracing_subscriber::registry().with(filter_layer);

    match format {
        LogFormat::Json => registry.with(fmt_layer.json()).init(),
        LogFormat::Text => registry.with(fmt_layer).init(),
    }
}
