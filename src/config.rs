use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_CONFIG_FILE: &str = "docchat.toml";

/// Which resolved response may overwrite the displayed answer.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum AnswerPolicy {
    /// Whichever response arrives last wins, even if it was sent earlier.
    #[default]
    LastResolved,
    /// Responses older than the displayed one are dropped.
    LatestSent,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    /// None leaves the transport defaults in place.
    pub timeout_seconds: Option<u64>,
    /// Keep the backend's chat-session cookie between requests.
    pub keep_session: bool,
    pub answer_policy: AnswerPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_seconds: None,
            keep_session: true,
            answer_policy: AnswerPolicy::LastResolved,
        }
    }
}

impl ClientConfig {
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("invalid configuration TOML")
    }

    /// Loads `path` if given, else `docchat.toml` from the working
    /// directory, else the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            tracing::info!("Loading config from: {}", path.display());
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read config {}", path.display()))?;
            return Self::from_toml(&contents);
        }

        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.exists() {
            tracing::info!("Loading config from: {}", local.display());
            let contents = std::fs::read_to_string(local)
                .with_context(|| format!("cannot read config {}", local.display()))?;
            return Self::from_toml(&contents);
        }

        tracing::info!("Using default configuration");
        Ok(Self::default())
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}
