use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use consentrelay_core::{AppConfig, ConsentMapper};
use consentrelay_registry::GicsClient;
use consentrelay_stream::{
    KafkaSink, KafkaSourceFactory, Pipeline, PipelineConfig, Shutdown, ShutdownReason,
};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "consentrelay", version, about)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "CONSENTRELAY_CONFIG", default_value = "app.toml")]
    config: PathBuf,

    /// Log filter, overrides `app.log-level` (e.g. `debug`, `consentrelay_stream=trace`)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = AppConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    let level = args.log_level.as_deref().unwrap_or(&config.app.log_level);
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(
        name = %config.app.name,
        input = %config.kafka.input_topic,
        output = %config.kafka.output_topic,
        "consentrelay v{}",
        env!("CARGO_PKG_VERSION")
    );

    let registry = GicsClient::new(&config.gics);
    info!(url = registry.request_url(), "using gICS registry");
    let mapper = ConsentMapper::new(Arc::new(registry), config.app.mapper.clone());

    let sink = KafkaSink::new(&config).context("creating Kafka producer")?;
    let sources = KafkaSourceFactory::new(config.clone());
    let shutdown = Shutdown::new();

    let signal_shutdown = shutdown.clone();
    let mut sigterm = signal(SignalKind::terminate()).context("registering SIGTERM")?;
    let mut sigint = signal(SignalKind::interrupt()).context("registering SIGINT")?;
    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
            _ = signal_shutdown.cancelled() => return,
        };
        info!("received {name}");
        signal_shutdown.trigger(ShutdownReason::Signal(name));
    });

    let pipeline = Pipeline::new(
        PipelineConfig::from(&config.kafka),
        Arc::new(mapper),
        Arc::new(sink),
        Arc::new(sources),
        shutdown,
    );
    let report = pipeline.run().await;

    let totals = report.totals();
    match &report.reason {
        Some(ShutdownReason::DeliveryFailed { worker }) => {
            error!(worker, "stopped after delivery failure")
        }
        Some(reason) => info!(%reason, "stopped"),
        None => warn!("stopped without a recorded reason"),
    }
    info!(
        received = totals.received,
        committed = totals.committed,
        dropped = totals.dropped,
        undelivered = report.undelivered,
        "shutdown complete"
    );
    Ok(())
}
