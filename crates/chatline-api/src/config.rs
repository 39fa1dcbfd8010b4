use chatline_core::persona::Persona;
use chatline_core::{CacheSettings, PipelineConfig};
use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const DEFAULT_DATABASE_URL: &str = "sqlite://chatline.db";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub chat: ChatConfig,
    pub personas: Vec<Persona>,
    pub titles: TitleConfig,
    pub logging: LoggingConfig,

    // Secrets (from ENV only)
    #[serde(skip)]
    pub database_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound for any single request, streaming included
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub enabled: bool,
    pub origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            acquire_timeout_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Redis URL; without one the cache lives in process memory
    pub url: Option<String>,
    pub session_ttl_secs: u64,
    pub stream_ttl_secs: u64,
    pub model_ttl_secs: u64,
    pub save_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: None,
            session_ttl_secs: 3600,
            stream_ttl_secs: 600,
            model_ttl_secs: 86_400,
            save_retries: 3,
            retry_backoff_ms: 100,
        }
    }
}

impl CacheConfig {
    pub fn settings(&self) -> CacheSettings {
        CacheSettings {
            session_ttl: Duration::from_secs(self.session_ttl_secs),
            stream_ttl: Duration::from_secs(self.stream_ttl_secs),
            model_ttl: Duration::from_secs(self.model_ttl_secs),
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// User/assistant pairs kept in the upstream context
    pub max_history: usize,
    pub stream_timeout_secs: u64,
    pub heartbeat_interval_secs: u64,
    pub default_persona: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_history: 10,
            stream_timeout_secs: 120,
            heartbeat_interval_secs: 5,
            default_persona: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TitleConfig {
    pub workers: usize,
    pub queue_size: usize,
}

impl Default for TitleConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_size: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from TOML files and environment variables
    ///
    /// Hierarchy (weakest to strongest):
    /// 1. config/default.toml
    /// 2. config/{ENV}.toml (if ENV is set)
    /// 3. `CHATLINE_`-prefixed environment variables, `__` between section and key
    ///    (e.g. `CHATLINE_SERVER__PORT`, `CHATLINE_CACHE__ENABLED`)
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("ENV").unwrap_or_else(|_| "dev".to_string());

        let builder = ConfigLoader::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                Environment::with_prefix("CHATLINE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("cors.origins"),
            );

        let mut cfg: Config = builder.build()?.try_deserialize()?;
        cfg.database_url = database_url_from_env();
        Ok(cfg)
    }

    /// Load config from a specific path (useful for testing)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut cfg: Config = ConfigLoader::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()?;
        cfg.database_url = database_url_from_env();
        Ok(cfg)
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            stream_timeout: Duration::from_secs(self.chat.stream_timeout_secs),
            heartbeat_interval: Duration::from_secs(self.chat.heartbeat_interval_secs.max(1)),
            save_retries: self.cache.save_retries.max(1),
        }
    }
}

fn database_url_from_env() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_structure() {
        let toml = r#"
            [server]
            host = "127.0.0.1"
            port = 3000

            [cors]
            enabled = true
            origins = ["http://localhost:3000"]

            [cache]
            enabled = false
            url = "redis://cache:6379/0"
            stream_ttl_secs = 60

            [chat]
            max_history = 4
            default_persona = "pirate"

            [[personas]]
            name = "pirate"
            content = "Answer like a pirate."

            [logging]
            level = "debug"
            format = "json"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 3000);
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.url.as_deref(), Some("redis://cache:6379/0"));
        assert_eq!(config.cache.settings().stream_ttl, Duration::from_secs(60));
        assert_eq!(config.cache.save_retries, 3);
        assert_eq!(config.chat.max_history, 4);
        assert_eq!(config.personas[0].name, "pirate");
        assert_eq!(config.titles.workers, 2);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.url, None);
        assert_eq!(config.pipeline().stream_timeout, Duration::from_secs(120));
        assert_eq!(config.pipeline().heartbeat_interval, Duration::from_secs(5));
    }
}
