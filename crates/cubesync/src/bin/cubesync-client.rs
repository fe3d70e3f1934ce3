use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use cubesync::prelude::*;
use cubesync::{ConfigError, logging};
use cubesync_tick::FrameConfig;
use rand::Rng;

/// Headless cubesync client. Mirrors every player in memory and logs
/// arrivals and departures.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Server URL, overrides the config file
    #[arg(short, long)]
    url: Option<String>,
    /// Keep the initial color instead of re-rolling it
    #[arg(long)]
    no_recolor: bool,
    /// Wander around by taking a small random step every frame
    #[arg(long)]
    walk: bool,
}

impl Args {
    fn client_config(&self) -> Result<ClientConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::load(path)?,
            None => ClientConfig::default(),
        };
        if let Some(url) = &self.url {
            config.server_url = url.clone();
        }
        if self.no_recolor {
            config.recolor_interval = None;
        }
        Ok(config)
    }
}

const STEP: f32 = 0.1;

fn random_step(rng: &mut impl Rng) -> Vec3 {
    let mut axis = || rng.random_range(-STEP..=STEP);
    Vec3::new(axis(), 0.0, axis())
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init("info");
    let args = Args::parse();

    let config = match args.client_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(url = %config.server_url, "connecting");

    let mut client = Client::connect(&config, HeadlessRenderer::new());
    let mut frames = FrameScheduler::new(FrameConfig::with_rate(config.frame_rate_hz));
    let mut rng = rand::rng();
    let mut was_connected = false;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received");
                client.disconnect();
                break;
            }
            frame = frames.wait_for_frame() => {
                client.update(frame.now);
                if args.walk {
                    client.translate_local(random_step(&mut rng));
                }
                frames.record_frame_end();
            }
        }

        if client.is_connected() {
            was_connected = true;
        } else if was_connected || !client.transport().is_alive() {
            break;
        }
    }

    tracing::info!(players = client.registry().len(), "client stopped");
    if was_connected {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
