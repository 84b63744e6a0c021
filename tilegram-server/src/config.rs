//! Load config from file, environment and command line.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context};
use log::warn;
use serde::Deserialize;
use tilegram_core::{Multiplier, Timing, DEFAULT_PORT};

/// Server configuration. File: ~/.config/tilegram/config.toml or /etc/tilegram/config.toml.
/// Env overrides: TILEGRAM_PORT, TILEGRAM_DICTIONARY, TILEGRAM_BUNCH, TILEGRAM_PLAYER_LIMIT.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// UDP listening port (default 57198).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Word list, one word per line with an optional definition.
    #[serde(default)]
    pub dictionary: Option<PathBuf>,
    /// Bunch multiplier: "0.5" or a positive integer.
    #[serde(default = "default_bunch")]
    pub bunch: String,
    #[serde(default)]
    pub player_limit: Option<usize>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
    /// Pause when no datagram is waiting.
    #[serde(default = "default_idle_sleep_ms")]
    pub idle_sleep_ms: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bunch() -> String {
    "1".to_string()
}
fn default_poll_interval_ms() -> u64 {
    500
}
fn default_ack_timeout_ms() -> u64 {
    5000
}
fn default_idle_sleep_ms() -> u64 {
    2
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            dictionary: None,
            bunch: default_bunch(),
            player_limit: None,
            poll_interval_ms: default_poll_interval_ms(),
            ack_timeout_ms: default_ack_timeout_ms(),
            idle_sleep_ms: default_idle_sleep_ms(),
        }
    }
}

/// Everything the server loop needs, validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub port: u16,
    pub dictionary: PathBuf,
    pub multiplier: Multiplier,
    pub player_limit: usize,
    pub timing: Timing,
    pub idle_sleep: Duration,
}

impl Config {
    /// Apply `TILEGRAM_*` overrides read through `var`. Unparseable values are ignored.
    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(p) = var("TILEGRAM_PORT").and_then(|s| s.parse().ok()) {
            self.port = p;
        }
        if let Some(d) = var("TILEGRAM_DICTIONARY") {
            self.dictionary = Some(PathBuf::from(d));
        }
        if let Some(b) = var("TILEGRAM_BUNCH") {
            self.bunch = b;
        }
        if let Some(l) = var("TILEGRAM_PLAYER_LIMIT").and_then(|s| s.parse().ok()) {
            self.player_limit = Some(l);
        }
    }

    /// Validate and fill in derived values.
    pub fn resolve(&self) -> anyhow::Result<Settings> {
        let multiplier: Multiplier = self.bunch.parse()?;
        let dictionary = self
            .dictionary
            .clone()
            .ok_or_else(|| anyhow!("no dictionary given (use --dict or TILEGRAM_DICTIONARY)"))?;
        Ok(Settings {
            port: self.port,
            dictionary,
            multiplier,
            player_limit: player_limit(multiplier, self.player_limit),
            timing: Timing {
                poll_interval: Duration::from_millis(self.poll_interval_ms),
                ack_timeout: Duration::from_millis(self.ack_timeout_ms),
            },
            idle_sleep: Duration::from_millis(self.idle_sleep_ms),
        })
    }
}

/// Requested limit, or the bunch's maximum when the request is out of range.
pub fn player_limit(multiplier: Multiplier, requested: Option<usize>) -> usize {
    let max = multiplier.max_players();
    match requested {
        Some(limit) if limit > max => {
            warn!("max player limit is {} for this bunch size", max);
            max
        }
        Some(limit) if limit < 2 => {
            warn!("min player limit is 2");
            max
        }
        Some(limit) => limit,
        None => max,
    }
}

/// Load config: defaults, then the explicit file or the first default path
/// that exists, then env vars.
pub fn load(explicit: Option<&Path>) -> anyhow::Result<Config> {
    let mut c = match explicit {
        Some(path) => read_file(path)?,
        None => load_file().unwrap_or_default(),
    };
    c.apply_env(|k| std::env::var(k).ok());
    Ok(c)
}

fn read_file(path: &Path) -> anyhow::Result<Config> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    toml::from_str(&s).with_context(|| format!("parsing config {}", path.display()))
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/tilegram/config.toml"));
    }
    out.push(PathBuf::from("/etc/tilegram/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    let path = config_paths().into_iter().find(|p| p.exists())?;
    match read_file(&path) {
        Ok(c) => Some(c),
        Err(e) => {
            warn!("ignoring config: {:#}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn file_fields_and_defaults() {
        let c: Config = toml::from_str("port = 4000\ndictionary = \"words.txt\"\n").unwrap();
        assert_eq!(c.port, 4000);
        assert_eq!(c.dictionary, Some(PathBuf::from("words.txt")));
        assert_eq!(c.bunch, "1");
        assert_eq!(c.poll_interval_ms, 500);
        assert_eq!(c.ack_timeout_ms, 5000);

        let empty: Config = toml::from_str("").unwrap();
        assert_eq!(empty, Config::default());
        assert_eq!(empty.port, 57198);
    }

    #[test]
    fn unknown_fields_rejected() {
        assert!(toml::from_str::<Config>("proxy_port = 1").is_err());
    }

    #[test]
    fn env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("TILEGRAM_PORT", "5000"),
            ("TILEGRAM_BUNCH", "0.5"),
            ("TILEGRAM_PLAYER_LIMIT", "many"),
        ]
        .into_iter()
        .collect();
        let mut c = Config::default();
        c.apply_env(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(c.port, 5000);
        assert_eq!(c.bunch, "0.5");
        assert_eq!(c.player_limit, None);
        assert_eq!(c.dictionary, None);
    }

    #[test]
    fn resolve_validates() {
        let mut c = Config::default();
        assert!(c.resolve().is_err());

        c.dictionary = Some(PathBuf::from("words.txt"));
        c.bunch = "0.5".into();
        let s = c.resolve().unwrap();
        assert_eq!(s.multiplier, Multiplier::HALF);
        assert_eq!(s.player_limit, 4);
        assert_eq!(s.timing, Timing::default());
        assert_eq!(s.idle_sleep, Duration::from_millis(2));

        c.bunch = "1.5".into();
        assert!(c.resolve().is_err());
    }

    #[test]
    fn limit_clamping() {
        assert_eq!(player_limit(Multiplier::FULL, None), 8);
        assert_eq!(player_limit(Multiplier::FULL, Some(3)), 3);
        assert_eq!(player_limit(Multiplier::FULL, Some(20)), 8);
        assert_eq!(player_limit(Multiplier::FULL, Some(1)), 8);
        assert_eq!(player_limit(Multiplier::new(2, 1), Some(12)), 12);
    }
}
