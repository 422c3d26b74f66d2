use serde::Deserialize;
use std::path::PathBuf;

const PLACEHOLDER_SECRET_KEY: &str = "dev-secret-key-change-in-production";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    pub upload: UploadConfig,
    pub model: ModelConfig,
    pub security: SecurityConfig,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Appends error details to rendered error pages.
    #[serde(default)]
    pub debug: bool,
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    #[serde(default = "default_upload_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("static/uploads")
}

fn default_max_bytes() -> usize {
    16 * 1024 * 1024
}

fn default_allowed_extensions() -> Vec<String> {
    ["png", "jpg", "jpeg", "gif", "bmp", "webp"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: default_upload_dir(),
            max_bytes: default_max_bytes(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    pub model_dir: PathBuf,
    pub onnx_file: String,
    #[serde(default = "default_model_instances")]
    pub num_instances: usize,
    #[serde(default = "default_output_name")]
    pub output_name: String,
    #[serde(default = "default_class_labels")]
    pub class_labels: Vec<String>,
    /// Training data root whose class folders must sort into the label order.
    #[serde(default)]
    pub dataset_dir: Option<PathBuf>,
    /// Abort start-up instead of serving without a model.
    #[serde(default)]
    pub required: bool,
}

fn default_model_instances() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_output_name() -> String {
    "output".to_string()
}

fn default_class_labels() -> Vec<String> {
    vec!["NORMAL".to_string(), "PNEUMONIA".to_string()]
}

impl ModelConfig {
    pub fn get_path(&self) -> PathBuf {
        self.model_dir.join(&self.onnx_file)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.get_path().exists() {
            return Err(format!("Model file not found: {:?}", self.get_path()));
        }
        if self.num_instances == 0 {
            return Err("model.num_instances must be at least 1".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SecurityConfig {
    #[serde(default = "default_secret_key")]
    pub secret_key: String,
}

fn default_secret_key() -> String {
    PLACEHOLDER_SECRET_KEY.to_string()
}

impl SecurityConfig {
    pub fn validate(&self, environment: &Environment) -> Result<(), String> {
        if self.secret_key.trim().is_empty() {
            return Err("security.secret_key must not be empty".to_string());
        }
        if matches!(environment, Environment::Production)
            && self.secret_key == PLACEHOLDER_SECRET_KEY
        {
            tracing::warn!("Running in production with the placeholder secret key, set SECRET_KEY");
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub enum Environment {
    Development,
    Testing,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Testing => "testing",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "development" => Ok(Self::Development),
            "testing" => Ok(Self::Testing),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `development`, `testing` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            other => Err(format!(
                "{} is not a supported minimum log level. Use either `debug`, `info` or `warn`.",
                other
            )),
        }
    }
}

/// `FLASK_ENV` selects the preset, `APP_ENVIRONMENT` is accepted when it is unset.
/// Unknown values fall back to production.
pub fn select_environment(flask_env: Option<String>, app_env: Option<String>) -> Environment {
    let Some(value) = flask_env.or(app_env) else {
        return Environment::Production;
    };

    match Environment::try_from(value) {
        Ok(environment) => environment,
        Err(e) => {
            tracing::warn!("{} Falling back to `production`.", e);
            Environment::Production
        }
    }
}

pub fn get_environment() -> Environment {
    select_environment(
        std::env::var("FLASK_ENV").ok(),
        std::env::var("APP_ENVIRONMENT").ok(),
    )
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("No current directory: {}", e)))?;
    let configuration_directory = base_path.join("configuration");
    let environment = get_environment();

    let config = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(config::File::from(
            configuration_directory.join(format!("{}.yaml", environment.as_str())),
        ))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .set_override_option("server.port", std::env::var("PORT").ok())?
        .set_override_option("security.secret_key", std::env::var("SECRET_KEY").ok())?
        .build()?;

    let config: Config = config.try_deserialize::<Config>()?;
    config
        .security
        .validate(&environment)
        .map_err(config::ConfigError::Message)?;

    Ok(config)
}
