// Tilegram dedicated server: loads the word list, then serves games over UDP
// until interrupted, starting a fresh game whenever one finishes.

mod config;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use tilegram_core::{Dictionary, ServerControl, Status};

use crate::config::Config;

/// Tilegram dedicated server.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Dictionary file
    #[arg(long)]
    dict: Option<PathBuf>,
    /// UDP listening port
    #[arg(long)]
    port: Option<u16>,
    /// Bunch multiplier (0.5 or a positive integer)
    #[arg(long)]
    bunch: Option<String>,
    /// Player limit
    #[arg(long)]
    limit: Option<usize>,
    /// Config file, instead of the default locations
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn apply(self, c: &mut Config) {
        if let Some(d) = self.dict {
            c.dictionary = Some(d);
        }
        if let Some(p) = self.port {
            c.port = p;
        }
        if let Some(b) = self.bunch {
            c.bunch = b;
        }
        if let Some(l) = self.limit {
            c.player_limit = Some(l);
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut cfg = config::load(cli.config.as_deref())?;
    cli.apply(&mut cfg);
    let settings = cfg.resolve()?;

    let dictionary = Dictionary::load_from_file(&settings.dictionary)
        .with_context(|| format!("loading dictionary {}", settings.dictionary.display()))?;
    info!("loaded {} words", dictionary.len());
    let dictionary = Arc::new(dictionary);

    let control = Arc::new(ServerControl::new());
    let rt = tokio::runtime::Runtime::new().context("starting runtime")?;
    rt.block_on(async {
        let signal_control = control.clone();
        tokio::spawn(async move {
            match shutdown_signal().await {
                Ok(()) => signal_control.request_shutdown(),
                Err(e) => warn!("signal handler: {}", e),
            }
        });

        while !control.shutdown_requested() {
            match server::run(&settings, dictionary.clone(), &control).await? {
                Status::Done => info!("restarting server"),
                Status::Aborted => break,
                status => anyhow::bail!("server loop stopped while {:?}", status),
            }
        }
        Ok(())
    })
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
