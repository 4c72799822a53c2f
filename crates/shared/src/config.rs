use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::config_env::{
    optional_trimmed_env, parse_bool_env, parse_f32_env, parse_list_env, parse_u32_env,
    parse_u64_env,
};
use crate::timezone::{DEFAULT_ORGANIZATION_TIME_ZONE, normalize_time_zone};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8001";
const DEFAULT_DATABASE_URL: &str = "sqlite://users.db";
const DEFAULT_CORS_ALLOWED_ORIGINS: &[&str] = &["http://localhost:3000", "http://localhost:3001"];
const DEFAULT_ALLOWED_SQL_OPERATIONS: &[&str] = &["SELECT", "WITH"];

pub const DEFAULT_HISTORY_LIMIT: usize = 8;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_url: String,
    pub database_max_connections: u32,
    pub migrations_dir: PathBuf,
    pub run_migrations: bool,
    pub storage_timeout_ms: u64,
    pub cors_allowed_origins: Vec<String>,
    pub organization_time_zone: String,
    pub ai_provider: AiProvider,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiProvider {
    Groq,
}

impl AiProvider {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Groq => "groq",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub history_limit: usize,
    pub max_output_tokens: u32,
    pub temperature: f32,
    /// Static override; when absent the prompt is rebuilt per request with the current date.
    pub system_prompt: Option<String>,
    pub allowed_sql_operations: Vec<String>,
    pub model_timeout_ms: u64,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            max_output_tokens: 600,
            temperature: 0.1,
            system_prompt: None,
            allowed_sql_operations: DEFAULT_ALLOWED_SQL_OPERATIONS
                .iter()
                .map(|op| (*op).to_string())
                .collect(),
            model_timeout_ms: 30_000,
        }
    }
}

impl ChatSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let history_limit = parse_u32_env("AI_HISTORY_LIMIT", defaults.history_limit as u32)?;
        let allowed_sql_operations = parse_list_env(
            "AI_ALLOWED_SQL_OPERATIONS",
            DEFAULT_ALLOWED_SQL_OPERATIONS,
        )
        .into_iter()
        .map(|op| op.to_ascii_uppercase())
        .collect::<Vec<_>>();
        if allowed_sql_operations.is_empty() {
            return Err(ConfigError::InvalidConfiguration(
                "AI_ALLOWED_SQL_OPERATIONS must list at least one operation".to_string(),
            ));
        }

        Ok(Self {
            history_limit: history_limit as usize,
            max_output_tokens: parse_u32_env("AI_MAX_OUTPUT_TOKENS", defaults.max_output_tokens)?,
            temperature: parse_f32_env("AI_TEMPERATURE", defaults.temperature)?,
            system_prompt: optional_trimmed_env("AI_SYSTEM_PROMPT"),
            allowed_sql_operations,
            model_timeout_ms: parse_u64_env("AI_MODEL_TIMEOUT_MS", defaults.model_timeout_ms)?,
        })
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_millis(self.model_timeout_ms)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    MissingVar(String),
    #[error("invalid integer in env var {0}")]
    ParseInt(String),
    #[error("invalid number in env var {0}")]
    ParseFloat(String),
    #[error("invalid boolean in env var {0}")]
    ParseBool(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("failed to load .env file: {0}")]
    Dotenv(String),
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let ai_provider = match optional_trimmed_env("AI_PROVIDER")
            .map(|value| value.to_ascii_lowercase())
            .as_deref()
        {
            None | Some("groq") => AiProvider::Groq,
            Some(other) => {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "AI_PROVIDER '{other}' is not supported"
                )));
            }
        };

        let time_zone_raw = optional_trimmed_env("ORGANIZATION_TIME_ZONE")
            .unwrap_or_else(|| DEFAULT_ORGANIZATION_TIME_ZONE.to_string());
        let organization_time_zone = normalize_time_zone(&time_zone_raw).ok_or_else(|| {
            ConfigError::InvalidConfiguration(format!(
                "ORGANIZATION_TIME_ZONE '{time_zone_raw}' is not a known time zone"
            ))
        })?;

        Ok(Self {
            bind_addr: optional_trimmed_env("API_BIND_ADDR")
                .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            database_url: optional_trimmed_env("DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            database_max_connections: parse_u32_env("DATABASE_MAX_CONNECTIONS", 5)?,
            migrations_dir: optional_trimmed_env("MIGRATIONS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| {
                    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../db/migrations")
                }),
            run_migrations: parse_bool_env("RUN_MIGRATIONS", true)?,
            storage_timeout_ms: parse_u64_env("STORAGE_TIMEOUT_MS", 5_000)?,
            cors_allowed_origins: parse_list_env("CORS_ALLOWED_ORIGINS", DEFAULT_CORS_ALLOWED_ORIGINS),
            organization_time_zone,
            ai_provider,
        })
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }
}

/// Loads `.env` from the working directory; a missing file is fine.
pub fn load_dotenv() -> Result<(), ConfigError> {
    match dotenvy::dotenv() {
        Ok(_) => Ok(()),
        Err(err) if err.not_found() => Ok(()),
        Err(err) => Err(ConfigError::Dotenv(err.to_string())),
    }
}
