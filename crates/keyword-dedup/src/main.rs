use std::fs::{self, File};
use std::io::BufWriter;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{Level, info, warn};
use tracing_subscriber::EnvFilter;

use keyword_dedup::handlers::DEFAULT_MAX_RECORDS;
use keyword_dedup::records::{self, InputFormat};
use keyword_dedup::{AppState, Engine, EngineSettings, router};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_OUTPUT: &str = "output.csv";

#[derive(Parser)]
#[command(name = "keyword-dedup")]
#[command(about = "Merge near-duplicate bibliometric keywords")]
struct Cli {
    #[command(flatten)]
    engine: EngineArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct EngineArgs {
    /// Synonym table of `alias = canonical` lines.
    #[arg(long, global = true, env = "KEYWORD_SYNONYMS")]
    synonyms: Option<PathBuf>,
    /// Extra morphology exceptions, one `surface lemma` pair per line.
    #[arg(long, global = true, env = "KEYWORD_MORPH_EXCEPTIONS")]
    morph_exceptions: Option<PathBuf>,
    /// JSON file overriding matching thresholds.
    #[arg(long, global = true, env = "KEYWORD_ENGINE_CONFIG")]
    engine_config: Option<PathBuf>,
}

impl From<EngineArgs> for EngineSettings {
    fn from(args: EngineArgs) -> Self {
        EngineSettings {
            synonyms: args.synonyms,
            morph_exceptions: args.morph_exceptions,
            engine_config: args.engine_config,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Deduplicate a keyword file.
    Dedup {
        input: PathBuf,
        #[arg(long, default_value_t = InputFormat::Csv)]
        input_format: InputFormat,
        #[arg(short, long, default_value = DEFAULT_OUTPUT)]
        output: PathBuf,
        /// Also write the result as a JSON array of `{k, t}`.
        #[arg(long)]
        json: Option<PathBuf>,
        /// Write the merged clusters and the links that joined them.
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Convert a tab-separated map export into the two-column CSV.
    Format {
        input: PathBuf,
        #[arg(short, long, default_value = DEFAULT_OUTPUT)]
        output: PathBuf,
    },
    /// Serve the HTTP API.
    Serve {
        #[arg(long, env = "HOST", default_value = DEFAULT_HOST)]
        host: String,
        #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
        port: u16,
        #[arg(long, env = "MAX_RECORDS", default_value_t = DEFAULT_MAX_RECORDS)]
        max_records: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let settings = EngineSettings::from(cli.engine);

    match cli.command {
        Commands::Dedup {
            input,
            input_format,
            output,
            json,
            report,
        } => {
            let engine = load_engine(&settings)?;
            dedup_file(
                &engine,
                &input,
                input_format,
                &output,
                json.as_deref(),
                report.as_deref(),
            )
        }
        Commands::Format { input, output } => format_file(&input, &output),
        Commands::Serve {
            host,
            port,
            max_records,
        } => {
            let engine = load_engine(&settings)?;
            serve(engine, &host, port, max_records).await
        }
    }
}

fn load_engine(settings: &EngineSettings) -> Result<Engine> {
    let start = Instant::now();
    let engine = Engine::from_settings(settings).context("load engine configuration")?;
    info!("engine ready in {} ms", start.elapsed().as_millis());
    Ok(engine)
}

fn dedup_file(
    engine: &Engine,
    input: &Path,
    format: InputFormat,
    output: &Path,
    json: Option<&Path>,
    report: Option<&Path>,
) -> Result<()> {
    let text =
        fs::read_to_string(input).with_context(|| format!("read {}", input.display()))?;
    let parsed = records::parse_records(&text, format);
    if !parsed.rejected.is_empty() {
        warn!(
            "{} rows in {} were skipped",
            parsed.rejected.len(),
            input.display()
        );
    }

    let start = Instant::now();
    let dedup = engine.run(&parsed.records);
    info!(
        "{} keywords reduced to {} in {} ms",
        parsed.records.len(),
        dedup.clusters.len(),
        start.elapsed().as_millis()
    );

    let file = create(output)?;
    records::write_csv(BufWriter::new(file), dedup.representatives())
        .with_context(|| format!("write {}", output.display()))?;
    info!("wrote {}", output.display());

    if let Some(path) = json {
        records::write_json(BufWriter::new(create(path)?), &dedup.outputs())
            .with_context(|| format!("write {}", path.display()))?;
        info!("wrote {}", path.display());
    }
    if let Some(path) = report {
        serde_json::to_writer_pretty(BufWriter::new(create(path)?), &dedup.report())
            .with_context(|| format!("write {}", path.display()))?;
        info!("wrote cluster report to {}", path.display());
    }
    Ok(())
}

fn format_file(input: &Path, output: &Path) -> Result<()> {
    let text =
        fs::read_to_string(input).with_context(|| format!("read {}", input.display()))?;
    let (csv, rejected) = records::export_to_csv(&text);
    if !rejected.is_empty() {
        warn!("{} rows in {} were skipped", rejected.len(), input.display());
    }
    fs::write(output, csv).with_context(|| format!("write {}", output.display()))?;
    info!("wrote {}", output.display());
    Ok(())
}

fn create(path: &Path) -> Result<File> {
    File::create(path).with_context(|| format!("create {}", path.display()))
}

async fn serve(engine: Engine, host: &str, port: u16, max_records: usize) -> Result<()> {
    info!("binding to {host}:{port}");
    info!("accepting up to {max_records} records per request");
    let state = AppState {
        engine: Arc::new(engine),
        max_records,
    };
    let app = router(state).layer(TraceLayer::new_for_http());
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))?;
    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let max_level = env_filter
        .max_level_hint()
        .and_then(|hint| hint.into_level())
        .unwrap_or(Level::INFO);
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(true)
        .with_max_level(max_level)
        .with_writer(std::io::stderr)
        .init();
}
