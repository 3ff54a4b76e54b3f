use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::MigrateError;
use crate::metadata::FieldRules;

pub const DEFAULT_CONFIG_FILE: &str = "biomed-migrate.json";
pub const DAEMON_TOKEN_ENV: &str = "BIOMED_DAEMON_TOKEN";
pub const SUPPORTED_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    pub legacy_db: Option<String>,
    pub target_db: Option<String>,
    #[serde(default)]
    pub daemon: Option<DaemonEntry>,
    #[serde(default)]
    pub field_rules: Option<FieldRules>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DaemonEntry {
    pub base_url: String,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DaemonSettings {
    pub base_url: String,
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub legacy_db: Option<PathBuf>,
    pub target_db: PathBuf,
    pub daemon: Option<DaemonSettings>,
    pub field_rules: FieldRules,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, MigrateError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(MigrateError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| MigrateError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| MigrateError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, MigrateError> {
        let schema_version = config.schema_version.unwrap_or(SUPPORTED_SCHEMA_VERSION);
        if schema_version != SUPPORTED_SCHEMA_VERSION {
            return Err(MigrateError::UnsupportedSchemaVersion {
                found: schema_version,
                supported: SUPPORTED_SCHEMA_VERSION,
            });
        }
        let target_db = config
            .target_db
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| MigrateError::ConfigMissingValue("target_db".to_string()))?;
        let legacy_db = config
            .legacy_db
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        let daemon = config.daemon.map(|entry| DaemonSettings {
            base_url: entry.base_url.trim_end_matches('/').to_string(),
            token: entry.token.or_else(token_from_env),
        });

        Ok(ResolvedConfig {
            schema_version,
            legacy_db,
            target_db,
            daemon,
            field_rules: config.field_rules.unwrap_or_default(),
        })
    }
}

fn token_from_env() -> Option<String> {
    std::env::var(DAEMON_TOKEN_ENV)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
