use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration for TraceMap
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TraceMapConfig {
    /// AI endpoint used for explanations
    #[serde(default)]
    pub ai: AiConfig,

    /// Stack sampling settings
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Source lookup limits
    #[serde(default)]
    pub locator: LocatorConfig,

    /// Knowledge base location
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// AI endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Bearer credential for the endpoint (empty = no Authorization header)
    #[serde(default)]
    pub api_key: String,

    /// Full chat-completions URL
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Model identifier sent with every request
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-request HTTP timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Minimum gap between the end of one request and the start of the next
    #[serde(default = "default_min_request_interval_ms")]
    pub min_request_interval_ms: u64,

    /// Retries granted to a rate-limited (HTTP 429) request
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff delay; doubles on every retry
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_url: default_api_url(),
            model: default_model(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            min_request_interval_ms: default_min_request_interval_ms(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
        }
    }
}

/// Stack capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Sampling cadence while recording
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// How long an enumerated thread list may be reused
    #[serde(default = "default_thread_cache_ttl_ms")]
    pub thread_cache_ttl_ms: u64,

    /// Frames requested per thread
    #[serde(default = "default_max_frames")]
    pub max_frames: u32,

    /// Path segments identifying the user's project tree (e.g. "website/")
    #[serde(default)]
    pub project_markers: Vec<String>,

    /// Path fragments that always mark library or runtime code
    #[serde(default = "default_exclude_markers")]
    pub exclude_markers: Vec<String>,

    /// Extensions treated as source files when no project marker matches
    #[serde(default = "default_source_extensions")]
    pub source_extensions: Vec<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            thread_cache_ttl_ms: default_thread_cache_ttl_ms(),
            max_frames: default_max_frames(),
            project_markers: vec![],
            exclude_markers: default_exclude_markers(),
            source_extensions: default_source_extensions(),
        }
    }
}

/// Source locator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocatorConfig {
    /// Lines returned starting at the matched definition
    #[serde(default = "default_snippet_lines")]
    pub snippet_lines: usize,

    /// File cap per language category during the workspace fallback
    #[serde(default = "default_files_per_category")]
    pub files_per_category: usize,

    /// Total file cap during the workspace fallback
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// Directory names never descended into
    #[serde(default = "default_exclude_dirs")]
    pub exclude_dirs: Vec<String>,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            snippet_lines: default_snippet_lines(),
            files_per_category: default_files_per_category(),
            max_files: default_max_files(),
            exclude_dirs: default_exclude_dirs(),
        }
    }
}

/// Knowledge base configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KnowledgeConfig {
    /// JSON file holding overview, explanations and traces
    /// (defaults to ~/.tracemap/knowledge.json)
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl KnowledgeConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".tracemap")
                .join("knowledge.json")
        })
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "pretty", "json", "compact"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_api_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_min_request_interval_ms() -> u64 {
    1000
}
fn default_max_retries() -> u32 {
    5
}
fn default_initial_backoff_ms() -> u64 {
    2000
}
fn default_tick_interval_ms() -> u64 {
    100
}
fn default_thread_cache_ttl_ms() -> u64 {
    1000
}
fn default_max_frames() -> u32 {
    30
}
fn default_exclude_markers() -> Vec<String> {
    vec![
        "/site-packages/".to_string(),
        "/dist-packages/".to_string(),
        "/node_modules/".to_string(),
        "/.venv/".to_string(),
        "/venv/".to_string(),
        "/lib/python".to_string(),
        "<frozen ".to_string(),
        "<string>".to_string(),
        "node:internal".to_string(),
    ]
}
fn default_source_extensions() -> Vec<String> {
    ["py", "js", "jsx", "ts", "tsx", "java", "cs", "cpp", "c", "h", "hpp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_snippet_lines() -> usize {
    50
}
fn default_files_per_category() -> usize {
    100
}
fn default_max_files() -> usize {
    200
}
fn default_exclude_dirs() -> Vec<String> {
    [
        "node_modules",
        ".git",
        "__pycache__",
        "venv",
        ".venv",
        "env",
        "site-packages",
        "dist",
        "out",
        "build",
        "target",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_log_level() -> String {
    "warn".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

/// Configuration manager with env, file and default layering
pub struct ConfigManager {
    config: TraceMapConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with the following precedence:
    /// 1. Environment variables (.env file)
    /// 2. Config file (.tracemap.toml)
    /// 3. Sensible defaults
    pub fn load() -> Result<Self, ConfigError> {
        info!("Loading TraceMap configuration...");

        Self::load_dotenv();

        let (config, config_path) = Self::load_config_file()?;
        Self::finish(config, config_path)
    }

    /// Load from an explicit file, still honouring environment overrides
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        Self::load_dotenv();
        let config = Self::read_toml_file(path)?;
        Self::finish(config, Some(path.to_path_buf()))
    }

    fn finish(
        config: TraceMapConfig,
        config_path: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let config = Self::apply_env_overrides(config);
        Self::validate_config(&config)?;

        info!("Configuration loaded successfully");
        if let Some(ref path) = config_path {
            info!("   Config file: {}", path.display());
        } else {
            info!("   Config file: NONE (using defaults)");
        }
        info!("   AI endpoint: {}", config.ai.api_url);
        info!("   Model: {}", config.ai.model);
        info!(
            "   API key: {}",
            if config.ai.api_key.is_empty() {
                "not set"
            } else {
                "set"
            }
        );

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Load .env file if it exists
    fn load_dotenv() {
        if Path::new(".env").exists() {
            if let Err(e) = dotenv::from_filename(".env") {
                warn!("Failed to load .env file: {}", e);
            } else {
                info!("Loaded .env file from current directory");
            }
            return;
        }

        if let Some(home) = dirs::home_dir() {
            let home_env = home.join(".tracemap.env");
            if home_env.exists() {
                if let Err(e) = dotenv::from_path(&home_env) {
                    warn!("Failed to load .tracemap.env: {}", e);
                } else {
                    info!("Loaded .tracemap.env from home directory");
                }
            }
        }
    }

    /// Find and load config file
    /// Search order:
    /// 1. ./.tracemap.toml (current directory)
    /// 2. ~/.tracemap/config.toml (user config)
    /// 3. Use defaults
    fn load_config_file() -> Result<(TraceMapConfig, Option<PathBuf>), ConfigError> {
        let local_config = Path::new(".tracemap.toml");
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".tracemap").join("config.toml");
            if user_config.exists() {
                let config = Self::read_toml_file(&user_config)?;
                return Ok((config, Some(user_config)));
            }
        }

        info!("No config file found, using defaults");
        Ok((TraceMapConfig::default(), None))
    }

    /// Read TOML config file
    fn read_toml_file(path: &Path) -> Result<TraceMapConfig, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(mut config: TraceMapConfig) -> TraceMapConfig {
        if let Ok(key) =
            std::env::var("TRACEMAP_API_KEY").or_else(|_| std::env::var("OPENAI_API_KEY"))
        {
            config.ai.api_key = key;
        }
        if let Ok(url) = std::env::var("TRACEMAP_API_URL") {
            config.ai.api_url = url;
        }
        if let Ok(model) = std::env::var("TRACEMAP_MODEL") {
            config.ai.model = model;
        }
        if let Ok(path) = std::env::var("TRACEMAP_KNOWLEDGE_PATH") {
            config.knowledge.path = Some(PathBuf::from(path));
        }
        if let Ok(level) = std::env::var("RUST_LOG") {
            config.logging.level = level;
        }

        config
    }

    /// Validate configuration
    fn validate_config(config: &TraceMapConfig) -> Result<(), ConfigError> {
        match config.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            // RUST_LOG directives such as "tracemap_capture=debug" are passed through
            other if other.contains('=') => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    other
                )))
            }
        }

        match config.logging.format.as_str() {
            "pretty" | "json" | "compact" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {}. Must be one of: pretty, json, compact",
                    other
                )))
            }
        }

        if config.capture.tick_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "capture.tick_interval_ms must be greater than zero".to_string(),
            ));
        }
        if config.capture.max_frames == 0 {
            return Err(ConfigError::ValidationError(
                "capture.max_frames must be greater than zero".to_string(),
            ));
        }
        if config.locator.snippet_lines == 0 {
            return Err(ConfigError::ValidationError(
                "locator.snippet_lines must be greater than zero".to_string(),
            ));
        }
        if config.ai.api_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "ai.api_url must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &TraceMapConfig {
        &self.config
    }

    /// Get the path to the config file that was loaded, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Create a default config file
    pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        let config = TraceMapConfig::default();
        let toml_str =
            toml::to_string_pretty(&config).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::ReadError(e.to_string()))?;
        }

        std::fs::write(path, toml_str).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TraceMapConfig::default();
        assert_eq!(config.ai.api_url, "https://api.openai.com/v1/chat/completions");
        assert_eq!(config.ai.model, "gpt-3.5-turbo");
        assert!(config.ai.api_key.is_empty());
        assert_eq!(config.ai.min_request_interval_ms, 1000);
        assert_eq!(config.ai.max_retries, 5);
        assert_eq!(config.ai.initial_backoff_ms, 2000);
        assert_eq!(config.capture.tick_interval_ms, 100);
        assert_eq!(config.capture.thread_cache_ttl_ms, 1000);
        assert_eq!(config.capture.max_frames, 30);
        assert_eq!(config.locator.snippet_lines, 50);
        assert_eq!(config.locator.max_files, 200);
    }

    #[test]
    fn test_config_validation() {
        let config = TraceMapConfig::default();
        assert!(ConfigManager::validate_config(&config).is_ok());

        let mut bad_config = config.clone();
        bad_config.logging.format = "xml".to_string();
        assert!(ConfigManager::validate_config(&bad_config).is_err());

        let mut bad_config = config.clone();
        bad_config.capture.tick_interval_ms = 0;
        assert!(ConfigManager::validate_config(&bad_config).is_err());

        let mut directive = config;
        directive.logging.level = "tracemap_capture=debug".to_string();
        assert!(ConfigManager::validate_config(&directive).is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: TraceMapConfig = toml::from_str(
            r#"
            [ai]
            model = "gpt-4o-mini"

            [capture]
            project_markers = ["website/"]
            "#,
        )
        .unwrap();

        assert_eq!(config.ai.model, "gpt-4o-mini");
        assert_eq!(config.ai.max_retries, 5);
        assert_eq!(config.capture.project_markers, vec!["website/".to_string()]);
        assert!(config
            .capture
            .exclude_markers
            .contains(&"/site-packages/".to_string()));
    }

    #[test]
    fn test_create_default_config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        ConfigManager::create_default_config(&path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let parsed: TraceMapConfig = toml::from_str(&written).unwrap();
        assert_eq!(parsed.capture.max_frames, 30);
        assert_eq!(parsed.logging.format, "pretty");
    }
}
