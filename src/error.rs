use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum MigrateError {
    #[error("invalid sample code: {0}")]
    InvalidSampleCode(String),

    #[error("unsupported config schema_version {found} (expected {supported})")]
    UnsupportedSchemaVersion { found: u32, supported: u32 },

    #[error("cannot parse {field} from {raw:?}: {message}")]
    Parse {
        field: String,
        raw: String,
        message: String,
    },

    #[error("missing config file biomed-migrate.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("config value missing: {0}")]
    ConfigMissingValue(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("input not found: {0}")]
    InputNotFound(String),

    #[error("workbook error: {0}")]
    Workbook(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("daemon request failed: {0}")]
    DaemonHttp(String),

    #[error("daemon returned status {status}: {message}")]
    DaemonStatus { status: u16, message: String },
}

impl MigrateError {
    pub fn parse(field: &str, raw: &str, message: impl Into<String>) -> Self {
        MigrateError::Parse {
            field: field.to_string(),
            raw: raw.to_string(),
            message: message.into(),
        }
    }
}
