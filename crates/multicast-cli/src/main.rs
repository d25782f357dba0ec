use std::path::PathBuf;

use clap::Parser;
use multicast_core::config::MulticastConfig;
use multicast_pipe::{pump, BroadcastPipe};
use tracing::{info, warn};

mod sink;

use sink::Sink;

/// Copy standard input to standard output and any number of files, each
/// written by an independent subscriber of one broadcast pipe.
#[derive(Debug, Parser)]
#[command(name = "multicast-tee", version)]
struct Args {
    /// Config file (default: ~/.multicast/multicast.toml, or $MULTICAST_CONFIG).
    #[arg(long)]
    config: Option<String>,

    /// Override the per-subscriber buffer size in bytes.
    #[arg(long)]
    buffer_size: Option<usize>,

    /// Do not echo to standard output.
    #[arg(long)]
    no_stdout: bool,

    /// Files to write; truncated if they exist.
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries data, so logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "multicast_cli=info,multicast_pipe=info".into()),
        )
        .init();

    let args = Args::parse();

    let config_path = args
        .config
        .clone()
        .or_else(|| std::env::var("MULTICAST_CONFIG").ok());
    let mut config = MulticastConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        MulticastConfig::default()
    });
    if let Some(size) = args.buffer_size {
        config.pipe.buffer_size = size;
    }

    let pipe = BroadcastPipe::from_config(&config.pipe);
    let mut sinks = Vec::new();

    if !args.no_stdout {
        sinks.push(Sink::spawn("stdout", pipe.subscribe()?, tokio::io::stdout()));
    }
    for path in &args.files {
        match tokio::fs::File::create(path).await {
            Ok(file) => {
                sinks.push(Sink::spawn(path.display().to_string(), pipe.subscribe()?, file));
            }
            Err(e) => warn!(path = %path.display(), error = %e, "cannot open output, skipping"),
        }
    }
    info!(
        sinks = sinks.len(),
        buffer_size = pipe.buffer_size(),
        "multicast-tee started"
    );

    let copied = pump(tokio::io::stdin(), &pipe).await?;

    let mut failed = 0usize;
    for sink in sinks {
        if sink.finish().await.is_none() {
            failed += 1;
        }
    }

    let stats = pipe.stats();
    info!(
        bytes = copied,
        detached = stats.detached_total,
        failed_sinks = failed,
        "multicast-tee finished"
    );
    Ok(())
}
