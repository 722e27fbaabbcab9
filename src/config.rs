//! Configuration for the relay server and the chat client.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::chat::error::{ChatError, ChatResult};
use crate::chat::history::HistoryPolicy;

/// Environment variable overriding the Ollama base URL.
pub const OLLAMA_URL_ENV: &str = "OLLAMA_RELAY_OLLAMA_URL";
/// Environment variable overriding the listen port.
pub const PORT_ENV: &str = "OLLAMA_RELAY_PORT";
/// Environment variable overriding the history length cap.
pub const HISTORY_MAX_ENV: &str = "OLLAMA_RELAY_HISTORY_MAX";
/// Environment variable pointing the client at a relay server.
pub const SERVER_URL_ENV: &str = "OLLAMA_RELAY_SERVER_URL";
/// Environment variable choosing the client wire mode (`true` = envelope).
pub const ENVELOPE_ENV: &str = "OLLAMA_RELAY_ENVELOPE";

/// Default Ollama API base URL.
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
/// Default relay server port.
pub const DEFAULT_PORT: u16 = 3000;
/// Default relay server URL used by the client.
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";

/// Settings for reaching an HTTP backend.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the backend.
    pub base_url: String,
    /// Connection timeout.
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,
    /// Timeout for non-streaming calls such as model listing.
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl BackendConfig {
    /// Parse and validate the base URL.
    ///
    /// # Errors
    /// Returns an error if the URL is malformed or not http(s).
    pub fn parsed_url(&self) -> ChatResult<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ChatError::InvalidConfig(format!("base_url: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ChatError::InvalidConfig(format!(
                "base_url must be http or https, got {}",
                url.scheme()
            )));
        }
        // Relative joins must append to a path prefix, not replace its last segment.
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }
}

/// Top-level configuration for the relay server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Ollama connection settings.
    pub ollama: BackendConfig,
    /// Listen port.
    pub port: u16,
    /// Server-side history trim policy.
    pub history: HistoryPolicy,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            ollama: BackendConfig::default(),
            port: DEFAULT_PORT,
            history: HistoryPolicy::default(),
        }
    }
}

impl RelayConfig {
    /// Create a new config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `OLLAMA_RELAY_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var(OLLAMA_URL_ENV) {
            config.ollama.base_url = url;
        }
        if let Some(port) = env_parse(PORT_ENV) {
            config.port = port;
        }
        if let Some(max) = env_parse(HISTORY_MAX_ENV) {
            config.history.max_messages = max;
        }
        config
    }

    /// Set the Ollama base URL.
    #[must_use]
    pub fn with_ollama_url(mut self, url: impl Into<String>) -> Self {
        self.ollama.base_url = url.into();
        self
    }

    /// Set the listen port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the history trim policy.
    #[must_use]
    pub const fn with_history(mut self, history: HistoryPolicy) -> Self {
        self.history = history;
        self
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any value is out of range.
    pub fn validate(&self) -> ChatResult<()> {
        self.ollama.parsed_url()?;
        self.history.validate()
    }
}

/// Configuration for the terminal chat client.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Relay server connection settings.
    pub server: BackendConfig,
    /// Use the server-side history envelope endpoint (`true`) or send the
    /// full local history as raw pass-through (`false`).
    pub envelope: bool,
    /// Local history trim policy.
    pub history: HistoryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: BackendConfig {
                base_url: DEFAULT_SERVER_URL.to_string(),
                ..BackendConfig::default()
            },
            envelope: true,
            history: HistoryPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `OLLAMA_RELAY_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var(SERVER_URL_ENV) {
            config.server.base_url = url;
        }
        if let Some(envelope) = env_parse(ENVELOPE_ENV) {
            config.envelope = envelope;
        }
        if let Some(max) = env_parse(HISTORY_MAX_ENV) {
            config.history.max_messages = max;
        }
        config
    }

    /// Point the client at another relay server.
    #[must_use]
    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server.base_url = url.into();
        self
    }

    /// Choose the wire mode.
    #[must_use]
    pub const fn with_envelope(mut self, envelope: bool) -> Self {
        self.envelope = envelope;
        self
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any value is out of range.
    pub fn validate(&self) -> ChatResult<()> {
        self.server.parsed_url()?;
        self.history.validate()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let value = std::env::var(key).ok()?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!("Ignoring unparsable {key}={value}");
            None
        }
    }
}

/// Serde module for Duration serialization.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
