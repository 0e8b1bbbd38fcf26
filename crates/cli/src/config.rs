//! Configuration loading from tiller.toml.

use std::path::{Path, PathBuf};
use std::time::Duration;

use runtime::providers::{DEFAULT_MAX_TOKENS, DEFAULT_MODEL};
use runtime::{
    AnthropicFactory, CommandRebuild, Credential, DEFAULT_CONNECT_RETRIES, StdioLauncher,
    SupervisorConfig,
};
use serde::Deserialize;
use tracing::debug;

/// Environment variable consulted when `backend.api_key` is unset.
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

/// Model provider configuration.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
    pub model: String,
    pub max_tokens: u32,

    /// Anthropic API key (sk-ant-api03-...). Falls back to `ANTHROPIC_API_KEY`.
    pub api_key: Option<String>,

    /// Override of the API origin.
    pub base_url: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            api_key: None,
            base_url: None,
        }
    }
}

/// Tool-server artifact and how to run or rebuild it.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub artifact: PathBuf,
    pub interpreter: Option<String>,
    pub args: Vec<String>,
    /// e.g. `["pnpm", "build:mcp-server"]`
    pub rebuild_command: Vec<String>,
    pub rebuild_timeout_secs: u64,
    /// Run `rebuild_command` when the artifact is missing at startup.
    pub rebuild_on_missing: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            artifact: PathBuf::from("build/server.js"),
            interpreter: None,
            args: Vec::new(),
            rebuild_command: Vec::new(),
            rebuild_timeout_secs: 30,
            rebuild_on_missing: false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub connect_retries: u32,
    pub retry_delay_ms: u64,
    pub handshake_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_retries: DEFAULT_CONNECT_RETRIES,
            retry_delay_ms: 1000,
            handshake_timeout_secs: 10,
            request_timeout_secs: 15,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Load `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            debug!(path = %path.display(), "loading config");
            Self::load(path)
        } else {
            debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// The configured key, else the environment's.
    pub fn credential(&self) -> Option<Credential> {
        self.credential_with(|name| std::env::var(name).ok())
    }

    fn credential_with(&self, env: impl Fn(&str) -> Option<String>) -> Option<Credential> {
        self.backend
            .api_key
            .clone()
            .and_then(Credential::new)
            .or_else(|| env(API_KEY_ENV).and_then(Credential::new))
    }

    pub fn supervisor(&self) -> SupervisorConfig {
        SupervisorConfig {
            connect_retries: self.session.connect_retries,
            retry_delay: Duration::from_millis(self.session.retry_delay_ms),
            handshake_timeout: Duration::from_secs(self.session.handshake_timeout_secs),
            ..SupervisorConfig::new(&self.server.artifact).with_credential(self.credential())
        }
    }

    pub fn launcher(&self) -> StdioLauncher {
        let launcher = StdioLauncher::new()
            .args(self.server.args.iter().cloned())
            .request_timeout(Duration::from_secs(self.session.request_timeout_secs));
        match &self.server.interpreter {
            Some(program) => launcher.interpreter(program),
            None => launcher,
        }
    }

    pub fn gateway_factory(&self) -> AnthropicFactory {
        AnthropicFactory {
            model: self.backend.model.clone(),
            max_tokens: self.backend.max_tokens,
            base_url: self.backend.base_url.clone(),
            timeout: None,
        }
    }

    /// `None` when no rebuild command is configured.
    pub fn rebuild(&self) -> Option<CommandRebuild> {
        if self.server.rebuild_command.is_empty() {
            return None;
        }
        Some(
            CommandRebuild::new(self.server.rebuild_command.iter().cloned())
                .with_timeout(Duration::from_secs(self.server.rebuild_timeout_secs)),
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),
}
