use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::RUN_INVOKER_ROLE;

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

/// Main configuration for cloudrun-iamviz
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IamVizConfig {
    /// Target project
    #[serde(default)]
    pub project: ProjectConfig,

    /// Cloud Run API endpoints and query settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Graph rendering and output artifact
    #[serde(default)]
    pub render: RenderConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProjectConfig {
    /// Project id; inferred from the gcloud CLI when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Global endpoint serving locations and IAM policies
    #[serde(default = "default_api_base")]
    pub base_url: String,

    /// Regional endpoint template serving Knative services, `{region}` is substituted
    #[serde(default = "default_regional_endpoint")]
    pub regional_endpoint: String,

    /// Role whose members are treated as invokers
    #[serde(default = "default_invoker_role")]
    pub invoker_role: String,

    /// Maximum concurrent getIamPolicy requests
    #[serde(default = "default_permission_concurrency")]
    pub permission_concurrency: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base(),
            regional_endpoint: default_regional_endpoint(),
            invoker_role: default_invoker_role(),
            permission_concurrency: default_permission_concurrency(),
        }
    }
}

impl ApiConfig {
    /// Base URL of the regional endpoint for `region`.
    pub fn regional_url(&self, region: &str) -> String {
        self.regional_endpoint.replace("{region}", region)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Graphviz layout program
    #[serde(default = "default_renderer")]
    pub program: String,

    /// Output format: "svg", "png", "pdf"
    #[serde(default = "default_format")]
    pub format: String,

    /// Directory for rendered artifacts (defaults to the system temp dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,

    /// Open the artifact in the platform viewer once written
    #[serde(default = "default_open")]
    pub open: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            program: default_renderer(),
            format: default_format(),
            output_dir: None,
            open: default_open(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive: a level ("off", "info", ...) or targets like "iamviz_core=debug,info"
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
fn default_api_base() -> String {
    "https://run.googleapis.com".to_string()
}
fn default_regional_endpoint() -> String {
    "https://{region}-run.googleapis.com".to_string()
}
fn default_invoker_role() -> String {
    RUN_INVOKER_ROLE.to_string()
}
fn default_permission_concurrency() -> usize {
    8
}
fn default_renderer() -> String {
    "dot".to_string()
}
fn default_format() -> String {
    "svg".to_string()
}
fn default_open() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "compact".to_string()
}

pub const SUPPORTED_FORMATS: &[&str] = &["svg", "png", "pdf"];

/// Configuration manager: file, environment, defaults
pub struct ConfigManager {
    config: IamVizConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with the following precedence:
    /// 1. Environment variables (.env file)
    /// 2. Config file (.iamviz.toml)
    /// 3. Sensible defaults
    pub fn load() -> Result<Self, ConfigError> {
        debug!("Loading iamviz configuration");

        Self::load_dotenv();

        let (config, config_path) = Self::load_config_file()?;
        let config = Self::apply_env_overrides(config, |key| std::env::var(key).ok())?;

        Self::validate_config(&config)?;

        match config_path {
            Some(ref path) => info!("Config file: {}", path.display()),
            None => debug!("Config file: NONE (using defaults)"),
        }

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Load an explicit config file, still honouring environment overrides.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        debug!("Loading iamviz configuration from {}", path.display());
        Self::load_dotenv();
        let config = Self::read_toml_file(path)?;
        let config = Self::apply_env_overrides(config, |key| std::env::var(key).ok())?;
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            config_path: Some(path.to_path_buf()),
        })
    }

    /// Wrap an already-built configuration.
    pub fn with_config(config: IamVizConfig) -> Result<Self, ConfigError> {
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            config_path: None,
        })
    }

    /// Load .env file if it exists
    fn load_dotenv() {
        if Path::new(".env").exists() {
            if let Err(e) = dotenv::from_filename(".env") {
                warn!("Failed to load .env file: {}", e);
            } else {
                debug!("Loaded .env file from current directory");
            }
            return;
        }

        if let Some(home) = dirs::home_dir() {
            let home_env = home.join(".iamviz.env");
            if home_env.exists() {
                if let Err(e) = dotenv::from_path(&home_env) {
                    warn!("Failed to load .iamviz.env: {}", e);
                } else {
                    debug!("Loaded .iamviz.env from home directory");
                }
            }
        }
    }

    /// Find and load config file
    /// Search order:
    /// 1. ./.iamviz.toml (current directory)
    /// 2. ~/.iamviz/config.toml (user config)
    /// 3. Use defaults
    fn load_config_file() -> Result<(IamVizConfig, Option<PathBuf>), ConfigError> {
        let local_config = Path::new(".iamviz.toml");
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }

        if let Some(user_config) = Self::user_config_path() {
            if user_config.exists() {
                let config = Self::read_toml_file(&user_config)?;
                return Ok((config, Some(user_config)));
            }
        }

        Ok((IamVizConfig::default(), None))
    }

    /// `~/.iamviz/config.toml`
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".iamviz").join("config.toml"))
    }

    /// Read TOML config file
    fn read_toml_file(path: &Path) -> Result<IamVizConfig, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        let config: IamVizConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides<F>(mut config: IamVizConfig, var: F) -> Result<IamVizConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(project) = var("GOOGLE_CLOUD_PROJECT").filter(|p| !p.is_empty()) {
            config.project.id = Some(project);
        }

        // API
        if let Some(base) = var("IAMVIZ_API_BASE") {
            config.api.base_url = base;
        }
        if let Some(endpoint) = var("IAMVIZ_REGIONAL_ENDPOINT") {
            config.api.regional_endpoint = endpoint;
        }
        if let Some(role) = var("IAMVIZ_INVOKER_ROLE") {
            config.api.invoker_role = role;
        }
        if let Some(concurrency) = var("IAMVIZ_PERMISSION_CONCURRENCY") {
            config.api.permission_concurrency = concurrency.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "IAMVIZ_PERMISSION_CONCURRENCY must be a positive integer, got {:?}",
                    concurrency
                ))
            })?;
        }

        // Rendering
        if let Some(program) = var("IAMVIZ_RENDERER") {
            config.render.program = program;
        }
        if let Some(format) = var("IAMVIZ_FORMAT") {
            config.render.format = format.to_lowercase();
        }
        if let Some(dir) = var("IAMVIZ_OUTPUT_DIR") {
            config.render.output_dir = Some(PathBuf::from(dir));
        }

        // Logging; RUST_LOG is read by the subscriber itself
        if let Some(level) = var("IAMVIZ_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(format) = var("IAMVIZ_LOG_FORMAT") {
            config.logging.format = format;
        }

        Ok(config)
    }

    /// Validate configuration
    pub fn validate_config(config: &IamVizConfig) -> Result<(), ConfigError> {
        if !SUPPORTED_FORMATS.contains(&config.render.format.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid output format: {}. Must be one of: {}",
                config.render.format,
                SUPPORTED_FORMATS.join(", ")
            )));
        }

        if config.render.program.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Renderer program must not be empty".to_string(),
            ));
        }

        if !config.api.regional_endpoint.contains("{region}") {
            return Err(ConfigError::ValidationError(format!(
                "Regional endpoint must contain a {{region}} placeholder: {}",
                config.api.regional_endpoint
            )));
        }

        if config.api.permission_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "permission_concurrency must be at least 1".to_string(),
            ));
        }

        if let Err(e) = EnvFilter::try_new(&config.logging.level) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level {:?}: {}",
                config.logging.level, e
            )));
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

        Ok(())
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &IamVizConfig {
        &self.config
    }

    /// Mutable access for command-line overrides; call `validate` afterwards.
    pub fn config_mut(&mut self) -> &mut IamVizConfig {
        &mut self.config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::validate_config(&self.config)
    }

    /// Get the path to the config file that was loaded, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Create a default config file
    pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        let config = IamVizConfig::default();
        let toml_str =
            toml::to_string_pretty(&config).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::ReadError(e.to_string()))?;
        }

        std::fs::write(path, toml_str).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        Ok(())
    }
}
