use serde::Deserialize;
use std::time::Duration;

use crate::token_reader::ReaderConfig;

/// Connection settings of a [`CouchDbClient`](crate::CouchDbClient).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server root, e.g. `http://127.0.0.1:5984/`.
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub connect_timeout_ms: u64,
    /// Bound for a whole non-streaming request; streaming requests only use it for the headers.
    pub request_timeout_ms: u64,
    /// Bound for every read of a streamed body. Zero disables it.
    pub read_timeout_ms: u64,
    pub max_retry_attempts: usize,
    pub retry_on_io_error: bool,
    pub retry_base_delay_ms: u64,
    pub buffer_size: usize,
    pub max_buffer_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let reader = ReaderConfig::default();
        Self {
            url: "http://127.0.0.1:5984/".to_owned(),
            username: None,
            password: None,
            connect_timeout_ms: 10_000,
            request_timeout_ms: 30_000,
            read_timeout_ms: 60_000,
            max_retry_attempts: 3,
            retry_on_io_error: false,
            retry_base_delay_ms: 100,
            buffer_size: reader.buffer_size,
            max_buffer_size: reader.max_buffer_size,
        }
    }
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Token reader settings for streamed responses.
    pub fn reader_config(&self) -> ReaderConfig {
        ReaderConfig {
            buffer_size: self.buffer_size,
            timeout: (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms)),
            max_buffer_size: self.max_buffer_size,
        }
    }
}

/// Loads a [`ClientConfig`] from `path` (any format the `config` crate knows), then
/// applies `COUCH_*` environment overrides such as `COUCH_URL`.
#[cfg(feature = "configs")]
pub fn load_config(path: &str) -> Result<ClientConfig, config::ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name(path))
        .add_source(config::Environment::with_prefix("COUCH"))
        .build()?;

    settings.try_deserialize()
}
