//! stego-worker: newline-delimited JSON commands on stdin, replies and job
//! events on stdout, logs on stderr.
//!
//! Usage: `stego-worker [config.json]`

use std::path::PathBuf;

use anyhow::Context;
use log::info;

use stego_service::{ServiceConfig, Worker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = ServiceConfig::load(config_path.as_deref())
        .with_context(|| format!("loading configuration from {:?}", config_path))?;
    info!("[WORKER] blob root {}", config.blob_root.display());

    let worker = Worker::start(&config).context("starting worker")?;
    worker.serve(tokio::io::stdin(), tokio::io::stdout()).await.context("serving")?;
    Ok(())
}
