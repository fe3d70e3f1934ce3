use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use cubesync::prelude::*;
use cubesync::{ConfigError, logging};
use cubesync_tick::FrameConfig;

/// Authoritative cubesync server.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Address to listen on, overrides the config file
    #[arg(short, long)]
    bind: Option<String>,
    /// Snapshot broadcast interval in milliseconds
    #[arg(long)]
    broadcast_ms: Option<u64>,
    /// Frame loop rate in Hz
    #[arg(long)]
    frame_rate: Option<u32>,
}

impl Args {
    fn server_config(&self) -> Result<ServerConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };
        if let Some(bind) = &self.bind {
            config.bind_addr = bind.clone();
        }
        if let Some(ms) = self.broadcast_ms {
            config.broadcast_interval = Duration::from_millis(ms);
        }
        if let Some(rate) = self.frame_rate {
            config.frame_rate_hz = rate;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init("info");
    let args = Args::parse();

    let config = match args.server_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    let frame_rate = config.frame_rate_hz;

    let mut server = match Server::builder().config(config).build().await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "failed to start server");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(addr = %server.transport().local_addr(), "listening");

    let mut frames = FrameScheduler::new(FrameConfig::with_rate(frame_rate));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received");
                break;
            }
            frame = frames.wait_for_frame() => {
                server.update(frame.now);
                frames.record_frame_end();
            }
        }
    }

    server.shutdown();
    ExitCode::SUCCESS
}
