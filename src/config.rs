//! Client configuration
//!
//! Layered as: built-in defaults, then an optional TOML file, then
//! `USER_DESK_*` environment variables (a `.env` file is honoured), then
//! whatever the CLI overrides last.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ReconnectPolicy;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const USERS_TOPIC: &str = "/topic/manager/users";
pub const WS_PATH: &str = "/ws";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// REST base, e.g. `http://localhost:8080`
    pub base_url: String,

    /// Push channel endpoint; derived from `base_url` when unset
    pub ws_url: Option<String>,

    /// Topic carrying user change events
    pub users_topic: String,

    #[serde(with = "millis", rename = "request_timeout_ms")]
    pub request_timeout: Duration,

    #[serde(with = "millis", rename = "connect_timeout_ms")]
    pub connect_timeout: Duration,

    pub reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            ws_url: None,
            users_topic: USERS_TOPIC.to_string(),
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Defaults, then `path` if given, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, None)
    }

    /// Like [`ClientConfig::load`], with a `--base-url` override applied last.
    pub fn load_with(path: Option<&Path>, base_url: Option<&str>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        dotenvy::dotenv().ok();
        config.layer(|key| std::env::var(key).ok(), base_url)
    }

    /// Apply the environment, then the base url override, then validate.
    pub fn layer<F>(mut self, lookup: F, base_url: Option<&str>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.apply_env(lookup)?;
        if let Some(base_url) = base_url {
            self.base_url = base_url.to_string();
        }
        self.validate()?;
        Ok(self)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Apply `USER_DESK_*` overrides using `lookup` to read variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base_url) = lookup("USER_DESK_BASE_URL") {
            self.base_url = base_url;
        }
        if let Some(ws_url) = lookup("USER_DESK_WS_URL") {
            self.ws_url = Some(ws_url);
        }
        if let Some(topic) = lookup("USER_DESK_TOPIC") {
            self.users_topic = topic;
        }
        if let Some(attempts) = lookup("USER_DESK_CONNECT_ATTEMPTS") {
            self.reconnect.max_attempts = attempts
                .trim()
                .parse()
                .with_context(|| format!("invalid USER_DESK_CONNECT_ATTEMPTS `{}`", attempts))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let base = self.base()?;
        if !matches!(base.scheme(), "http" | "https") {
            bail!("invalid base_url `{}`: expected http or https", self.base_url);
        }
        let ws = self.ws_endpoint()?;
        if !matches!(ws.scheme(), "ws" | "wss") {
            bail!("invalid ws_url `{}`: expected ws or wss", ws);
        }
        if !self.users_topic.starts_with('/') {
            bail!("invalid users_topic `{}`: must start with '/'", self.users_topic);
        }
        if self.reconnect.max_attempts == 0 {
            bail!("invalid reconnect.max_attempts: must be at least 1");
        }
        Ok(())
    }

    pub fn base(&self) -> Result<Url> {
        Url::parse(&self.base_url).with_context(|| format!("invalid base_url `{}`", self.base_url))
    }

    /// The push endpoint, without the per-client `username` parameter.
    pub fn ws_endpoint(&self) -> Result<Url> {
        if let Some(ws_url) = &self.ws_url {
            return Url::parse(ws_url).with_context(|| format!("invalid ws_url `{}`", ws_url));
        }

        let mut url = self.base()?;
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        if url.set_scheme(scheme).is_err() {
            bail!("invalid base_url `{}`: cannot derive a websocket url", self.base_url);
        }
        url.set_path(WS_PATH);
        url.set_query(None);
        url.set_fragment(None);
        Ok(url)
    }
}

/// `Duration` as integer milliseconds.
pub(crate) mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
