//! ratings-enricher — binary entrypoint.
//! Scans a saved listing page, enriches every item with remote ratings and
//! prints the table as results arrive.
//!
//! While running, type `p` + Enter to pause/resume and `q` + Enter to stop.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ratings_enricher::metrics::Metrics;
use ratings_enricher::present::TerminalSink;
use ratings_enricher::sink::LogSink;
use ratings_enricher::{
    extract, spawn_control, ControlCommand, EnrichConfig, GoodreadsFetcher, Pipeline,
    RemoteFetcher, RenderSink,
};

#[derive(Debug, Parser)]
#[command(name = "ratings-enricher", version, about = "Add book ratings to a saved deals page")]
struct Args {
    /// Saved listing page (HTML).
    page: PathBuf,

    /// Print the final records as JSON instead of live tables.
    #[arg(long)]
    json: bool,

    /// Serve book pages from a directory of `{id}.html` files instead of the network.
    #[arg(long)]
    fixtures: Option<PathBuf>,

    /// Expose Prometheus metrics on this address.
    #[arg(long, env = "ENRICH_METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,

    /// Config file (TOML or JSON). Defaults to $ENRICH_CONFIG_PATH, then config/enrich.{toml,json}.
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Compact logs on stderr so stdout stays clean for tables/JSON.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("enrich=info,ratings_enricher=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .init();
}

/// Reads control words from stdin on a plain thread; a blocking stdin read
/// inside the runtime would hold up shutdown.
fn spawn_stdin_reader(ctl: mpsc::Sender<ControlCommand>, quit: mpsc::Sender<()>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if line.trim().eq_ignore_ascii_case("q") {
                let _ = quit.blocking_send(());
                return;
            }
            match ControlCommand::parse(&line) {
                Some(cmd) => {
                    if ctl.blocking_send(cmd).is_err() {
                        return;
                    }
                }
                None => tracing::warn!(
                    target: "enrich",
                    input = %line.trim(),
                    "unknown command (p = pause/resume, q = quit)"
                ),
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();
    let args = Args::parse();

    let cfg = match &args.config {
        Some(p) => EnrichConfig::load_from(p)?,
        None => EnrichConfig::load_default()?,
    };
    tracing::info!(
        target: "enrich",
        base_url = %cfg.base_url,
        delay_ms = cfg.request_delay_ms,
        "config loaded"
    );

    if let Some(addr) = args.metrics_addr {
        let metrics = Metrics::init()?;
        tokio::spawn(async move {
            if let Err(e) = metrics.serve(addr).await {
                tracing::warn!(target: "enrich", error = ?e, "metrics server stopped");
            }
        });
    }

    let fetcher: Arc<dyn RemoteFetcher> = match &args.fixtures {
        Some(dir) => Arc::new(GoodreadsFetcher::from_fixture_dir(dir, &cfg)?),
        None => Arc::new(GoodreadsFetcher::from_config(&cfg)?),
    };
    let sink: Arc<dyn RenderSink> = if args.json {
        Arc::new(LogSink)
    } else {
        Arc::new(TerminalSink::new(cfg.highlights.clone()))
    };
    let pipeline = Pipeline::new(fetcher, sink);

    let page = std::fs::read_to_string(&args.page)
        .with_context(|| format!("reading listing page {}", args.page.display()))?;
    let batches = extract::extract_sections(&page);
    if batches.is_empty() {
        tracing::warn!(target: "enrich", page = %args.page.display(), "no product links found");
        return Ok(());
    }
    for batch in batches {
        pipeline.enqueue(batch);
    }

    let (ctl_tx, ctl_rx) = mpsc::channel(8);
    let _control = spawn_control(pipeline.clone(), ctl_rx);
    let (quit_tx, mut quit_rx) = mpsc::channel::<()>(1);
    spawn_stdin_reader(ctl_tx, quit_tx);

    let stop_reason = tokio::select! {
        _ = pipeline.wait_done() => None,
        _ = quit_rx.recv() => Some("stopping on request"),
        _ = tokio::signal::ctrl_c() => Some("interrupted"),
    };
    let records = match stop_reason {
        None => pipeline.records(),
        Some(reason) => {
            tracing::info!(target: "enrich", reason, "waiting for in-flight fetch");
            pipeline.halt().await
        }
    };

    if args.json {
        let out = serde_json::to_string_pretty(&records).context("encoding records")?;
        println!("{out}");
    }
    Ok(())
}
