use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AgnoError, Result};

/// Environment variable naming the runtime environment.
pub const RUNTIME_ENV_VAR: &str = "RUNTIME_ENV";

/// Named runtime environment an app is deployed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnv {
    #[default]
    Dev,
    Stg,
    Prd,
}

impl RuntimeEnv {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeEnv::Dev => "dev",
            RuntimeEnv::Stg => "stg",
            RuntimeEnv::Prd => "prd",
        }
    }

    /// Reads `RUNTIME_ENV`, falling back to `dev` when it is unset.
    pub fn from_env() -> Result<Self> {
        match env::var(RUNTIME_ENV_VAR) {
            Ok(raw) => raw.parse(),
            Err(env::VarError::NotPresent) => Ok(RuntimeEnv::default()),
            Err(err) => Err(AgnoError::Config(format!("{RUNTIME_ENV_VAR}: {err}"))),
        }
    }

    pub fn is_dev(&self) -> bool {
        matches!(self, RuntimeEnv::Dev)
    }
}

impl fmt::Display for RuntimeEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuntimeEnv {
    type Err = AgnoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dev" => Ok(RuntimeEnv::Dev),
            "stg" => Ok(RuntimeEnv::Stg),
            "prd" => Ok(RuntimeEnv::Prd),
            other => Err(AgnoError::unknown_variant("runtime environment", other)),
        }
    }
}

/// Chat-completions backends reachable through the OpenAI wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    OpenAI,
    Groq,
    Ollama,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAI => "openai",
            Provider::Groq => "groq",
            Provider::Ollama => "ollama",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::OpenAI => "https://api.openai.com/v1",
            Provider::Groq => "https://api.groq.com/openai/v1",
            Provider::Ollama => "http://localhost:11434/v1",
        }
    }

    /// Environment variable holding the API key; Ollama runs unauthenticated.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Provider::OpenAI => Some("OPENAI_API_KEY"),
            Provider::Groq => Some("GROQ_API_KEY"),
            Provider::Ollama => None,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::OpenAI => "gpt-4o",
            Provider::Groq => "llama-3.3-70b-versatile",
            Provider::Ollama => "llama3.1:8b",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = AgnoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAI),
            "groq" => Ok(Provider::Groq),
            "ollama" => Ok(Provider::Ollama),
            _ => Err(AgnoError::unknown_variant("model provider", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            api_prefix: default_api_prefix(),
        }
    }
}

fn default_api_prefix() -> String {
    "/v1".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: Provider,
    pub id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl ModelConfig {
    pub fn for_provider(provider: Provider) -> Self {
        Self {
            provider,
            id: provider.default_model().into(),
            api_key: None,
            base_url: None,
            temperature: None,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::for_provider(Provider::default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub runtime_env: RuntimeEnv,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let cfg: Self = toml::from_str(&raw)
            .map_err(|err| AgnoError::Config(format!("Failed to parse configuration: {err}")))?;
        Ok(cfg)
    }

    pub fn from_env_or_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut cfg = Self::from_file(path)?;
        cfg.apply_env()?;
        Ok(cfg)
    }

    /// Defaults overlaid with the environment, for scripts that ship no config file.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env()?;
        Ok(cfg)
    }

    fn apply_env(&mut self) -> Result<()> {
        if env::var_os(RUNTIME_ENV_VAR).is_some() {
            self.runtime_env = RuntimeEnv::from_env()?;
        }
        if let Ok(host) = env::var("AGNO_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = env::var("AGNO_PORT") {
            self.server.port = port
                .parse::<u16>()
                .map_err(|err| AgnoError::Config(format!("AGNO_PORT `{port}`: {err}")))?;
        }
        if let Ok(provider) = env::var("AGNO_MODEL_PROVIDER") {
            self.model.provider = provider.parse()?;
        }
        if let Ok(id) = env::var("AGNO_MODEL_ID") {
            self.model.id = id;
        }
        if let Ok(url) = env::var("AGNO_MODEL_BASE_URL") {
            self.model.base_url = Some(url);
        }
        if let Ok(key) = env::var("AGNO_API_KEY") {
            self.model.api_key = Some(key);
        }
        if let Ok(level) = env::var("AGNO_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(json) = env::var("AGNO_LOG_JSON") {
            self.logging.json = json
                .parse()
                .map_err(|err| AgnoError::Config(format!("AGNO_LOG_JSON `{json}`: {err}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Tests in this module mutate process-wide environment variables.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn loads_and_overrides() {
        let _guard = ENV_LOCK.lock().unwrap();
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\nhost='127.0.0.1'\nport=9000\n[model]\nprovider='groq'\nid='llama3-70b-8192'"
        )
        .unwrap();

        env::set_var("AGNO_PORT", "9100");
        let cfg = AppConfig::from_env_or_file(file.path());
        env::remove_var("AGNO_PORT");
        let cfg = cfg.unwrap();

        assert_eq!(cfg.server.port, 9100);
        assert_eq!(cfg.server.host, "127.0.0.1");
        assert_eq!(cfg.server.api_prefix, "/v1");
        assert_eq!(cfg.model.provider, Provider::Groq);
        assert_eq!(cfg.model.id, "llama3-70b-8192");
    }

    #[test]
    fn runtime_env_defaults_to_dev() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var(RUNTIME_ENV_VAR);
        assert_eq!(RuntimeEnv::from_env().unwrap(), RuntimeEnv::Dev);
        assert!(RuntimeEnv::Dev.is_dev());
        assert!(!RuntimeEnv::Stg.is_dev());

        env::set_var(RUNTIME_ENV_VAR, "prd");
        let parsed = RuntimeEnv::from_env();
        env::remove_var(RUNTIME_ENV_VAR);
        assert_eq!(parsed.unwrap(), RuntimeEnv::Prd);
    }

    #[test]
    fn unknown_runtime_env_is_rejected() {
        let err = "production".parse::<RuntimeEnv>().unwrap_err();
        assert!(matches!(err, AgnoError::UnknownVariant { value, .. } if value == "production"));
        for env in [RuntimeEnv::Dev, RuntimeEnv::Stg, RuntimeEnv::Prd] {
            assert_eq!(env.to_string().parse::<RuntimeEnv>().unwrap(), env);
        }
    }

    #[test]
    fn invalid_port_is_a_config_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("AGNO_PORT", "not-a-port");
        let cfg = AppConfig::from_env();
        env::remove_var("AGNO_PORT");
        assert!(matches!(cfg, Err(AgnoError::Config(_))));
    }

    #[test]
    fn invalid_log_json_is_a_config_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("AGNO_LOG_JSON", "yes");
        let cfg = AppConfig::from_env();
        env::set_var("AGNO_LOG_JSON", "true");
        let enabled = AppConfig::from_env();
        env::remove_var("AGNO_LOG_JSON");
        assert!(matches!(cfg, Err(AgnoError::Config(ref msg)) if msg.contains("AGNO_LOG_JSON")));
        assert!(enabled.unwrap().logging.json);
    }

    #[test]
    fn empty_file_uses_defaults() {
        let file = NamedTempFile::new().unwrap();
        let cfg = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.model.id, "gpt-4o");
    }
}
