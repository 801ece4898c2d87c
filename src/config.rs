use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

pub const UPSTREAM_ENV: &str = "ANTHROPIC_BASE_URL";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_upstream")]
    pub upstream: String,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Custom TOML ruleset. `None` uses the bundled rules.
    #[serde(default)]
    pub rules: Option<PathBuf>,
    #[serde(default)]
    pub mode: LeakAction,
    #[serde(default)]
    pub scan_mode: ScanMode,
    #[serde(default)]
    pub on_serialize_error: FailurePolicy,
    #[serde(default = "default_debug_path")]
    pub debug_path: String,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// What to do with a request that carries secrets.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LeakAction {
    #[default]
    Redact,
    Reject,
}

/// How the live request path scans bodies.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Schema-aware walk, raw scan only as a fallback.
    #[default]
    Structured,
    /// Always scan the raw body and replace body-wide.
    Raw,
}

/// Behaviour when a rewritten payload cannot be serialized again.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Reject the request.
    #[default]
    FailClosed,
    /// Forward the original body and log a warning.
    FailOpen,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutConfig {
    /// Deadline for reading a request head and body.
    #[serde(default = "default_read_secs")]
    pub read_secs: u64,
    /// Deadline for the whole upstream exchange, response body included.
    #[serde(default = "default_upstream_secs")]
    pub upstream_secs: u64,
    /// Grace period for in-flight requests on shutdown.
    #[serde(default = "default_shutdown_secs")]
    pub shutdown_secs: u64,
}

impl TimeoutConfig {
    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }

    pub fn upstream(&self) -> Duration {
        Duration::from_secs(self.upstream_secs)
    }

    pub fn shutdown(&self) -> Duration {
        Duration::from_secs(self.shutdown_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        TimeoutConfig {
            read_secs: default_read_secs(),
            upstream_secs: default_upstream_secs(),
            shutdown_secs: default_shutdown_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            upstream: default_upstream(),
            bind: default_bind(),
            port: default_port(),
            rules: None,
            mode: LeakAction::default(),
            scan_mode: ScanMode::default(),
            on_serialize_error: FailurePolicy::default(),
            debug_path: default_debug_path(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

fn default_upstream() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_debug_path() -> String {
    "/scan".to_string()
}
fn default_read_secs() -> u64 {
    30
}
fn default_upstream_secs() -> u64 {
    90
}
fn default_shutdown_secs() -> u64 {
    10
}

impl Config {
    /// Load from `path`, or from the first default location that exists.
    /// A file that exists but does not parse is an error; no file at all
    /// means defaults.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let candidates = match path {
            Some(p) => vec![PathBuf::from(p)],
            None => vec![
                PathBuf::from("leakguard.yaml"),
                PathBuf::from("leakguard.yml"),
                dirs_next::home_dir()
                    .map(|h| h.join(".config").join("leakguard").join("leakguard.yaml"))
                    .unwrap_or_default(),
            ],
        };

        for candidate in &candidates {
            if candidate.as_os_str().is_empty() || !candidate.exists() {
                continue;
            }
            let config = Config::from_file(candidate)?;
            tracing::info!("Loaded config from {}", candidate.display());
            return Ok(config);
        }

        if let Some(p) = path {
            return Err(Error::ReadFile {
                path: PathBuf::from(p),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "config file not found"),
            });
        }

        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| Error::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&contents).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `ANTHROPIC_BASE_URL` overrides the configured upstream.
    pub fn apply_env(&mut self) {
        if let Ok(upstream) = std::env::var(UPSTREAM_ENV) {
            if !upstream.trim().is_empty() {
                self.upstream = upstream;
            }
        }
    }

    pub fn reject_on_leak(&self) -> bool {
        self.mode == LeakAction::Reject
    }
}
