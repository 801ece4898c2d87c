use std::path::PathBuf;

use thiserror::Error;

/// Startup and configuration failures. Per-request failures never surface
/// here; the proxy turns those into HTTP responses.
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Config parse error in {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Ruleset parse error: {0}")]
    RulesetParse(#[from] toml::de::Error),

    #[error("Invalid regex in rule '{rule}': {source}")]
    RuleRegex { rule: String, source: regex::Error },

    #[error("Invalid keywords in rule '{rule}': {source}")]
    Keywords {
        rule: String,
        source: aho_corasick::BuildError,
    },

    #[error("Invalid upstream URL '{url}': {reason}")]
    Upstream { url: String, reason: String },

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Invalid bind address: {0}")]
    Bind(#[from] std::net::AddrParseError),
}

pub type Result<T> = std::result::Result<T, Error>;
