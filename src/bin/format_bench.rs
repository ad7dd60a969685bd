use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use format_bench::client::{BenchResults, BenchmarkClient, DEFAULT_BASE_URL};
use format_bench::dataset::{GenerateConfig, REFERENCE_COUNT};
use format_bench::report::render_text;
use format_bench::schema::BenchReport;
use format_bench::server::{BenchServer, ServerConfig};
use format_bench::Format;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum Emit {
    /// Human-readable report.
    #[default]
    Text,
    /// JSON report.
    Json,
}

#[derive(ClapArgs, Debug)]
struct DatasetArgs {
    /// Number of records to generate.
    #[arg(long, short = 'n')]
    count: Option<u64>,

    /// Seed for price/quantity generation.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Protobuf schema checked at startup.
    #[arg(long, value_name = "FILE", default_value = "proto/item.proto")]
    schema: PathBuf,
}

#[derive(ClapArgs, Debug)]
struct OutputArgs {
    /// Formats to benchmark, in order. The first one is the baseline.
    #[arg(long, value_enum, value_delimiter = ',', default_values_t = Format::ALL.to_vec())]
    formats: Vec<Format>,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,

    /// Report written to stdout.
    #[arg(long, value_enum, default_value_t = Emit::Text)]
    emit: Emit,

    /// Also write the JSON report to this file.
    #[arg(long, value_name = "FILE")]
    out: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the dataset in every format.
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: IpAddr,

        #[arg(long, short, default_value_t = 3000)]
        port: u16,

        #[command(flatten)]
        dataset: DatasetArgs,
    },

    /// Benchmark a running server.
    Run {
        #[arg(long, default_value = DEFAULT_BASE_URL)]
        base_url: String,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Start a server on an ephemeral port, benchmark it, and stop it.
    Local {
        #[command(flatten)]
        dataset: DatasetArgs,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Parser, Debug)]
#[command(name = "format-bench")]
#[command(about = "JSON vs MessagePack vs Protobuf vs PSON transfer/decode benchmark")]
struct Args {
    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    cmd: Command,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn emit(base_url: &str, results: &BenchResults, output: &OutputArgs) -> anyhow::Result<()> {
    let report = BenchReport::new(base_url, results);
    if let Some(path) = &output.out {
        fs::write(path, report.to_json()?)
            .with_context(|| format!("writing report to {}", path.display()))?;
        info!("wrote {}", path.display());
    }
    match output.emit {
        Emit::Text => print!("{}", render_text(results)),
        Emit::Json => println!("{}", report.to_json()?),
    }
    Ok(())
}

async fn run_client(base_url: &str, output: &OutputArgs, wait: bool) -> format_bench::Result<BenchResults> {
    let client = BenchmarkClient::new(base_url, Duration::from_secs(output.timeout_secs))?;
    if wait {
        client.wait_ready(Duration::from_secs(30)).await?;
    }
    info!("starting performance test against {}", client.base_url());
    client.run(&output.formats).await.map_err(|e| {
        if let Some((format, phase)) = e.location() {
            error!(%format, %phase, "benchmark aborted");
        }
        e
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    match args.cmd {
        Command::Serve {
            host,
            port,
            dataset,
        } => {
            let config = ServerConfig {
                addr: SocketAddr::new(host, port),
                dataset: GenerateConfig {
                    count: dataset.count.unwrap_or(REFERENCE_COUNT),
                    seed: dataset.seed,
                },
                schema: dataset.schema,
            };
            let server = BenchServer::new(config).start().await?;
            server
                .run_until(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await?;
        }
        Command::Run { base_url, output } => {
            let results = run_client(&base_url, &output, false).await?;
            emit(&base_url, &results, &output)?;
        }
        Command::Local { dataset, output } => {
            let config = ServerConfig {
                addr: SocketAddr::from(([127, 0, 0, 1], 0)),
                dataset: GenerateConfig {
                    count: dataset.count.unwrap_or(1_000),
                    seed: dataset.seed,
                },
                schema: dataset.schema,
            };
            let server = BenchServer::new(config).start().await?;
            let base_url = server.base_url();
            let outcome = run_client(&base_url, &output, true).await;
            let results = server.finish(outcome).await?;
            emit(&base_url, &results, &output)?;
        }
    }

    Ok(())
}
