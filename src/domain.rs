use std::fmt;
use std::path::Path;
use std::str::FromStr;

use calamine::Data;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::MigrateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MigrationKind {
    Projects,
    Subjects,
    Cgh,
    Vcf,
}

impl MigrationKind {
    /// File extensions picked up when the kind is driven by a directory scan.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            MigrationKind::Cgh => &[".xlsx"],
            MigrationKind::Vcf => &[".vcf", ".vcf.gz"],
            MigrationKind::Projects | MigrationKind::Subjects => &[],
        }
    }
}

impl fmt::Display for MigrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationKind::Projects => write!(f, "projects"),
            MigrationKind::Subjects => write!(f, "subjects"),
            MigrationKind::Cgh => write!(f, "cgh"),
            MigrationKind::Vcf => write!(f, "vcf"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Initializing,
    Running,
    Error,
    Success,
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessStatus::Initializing => write!(f, "initializing"),
            ProcessStatus::Running => write!(f, "running"),
            ProcessStatus::Error => write!(f, "error"),
            ProcessStatus::Success => write!(f, "success"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SampleCode(String);

impl SampleCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derives the sample code from a file name with its input extension
    /// removed, so `S01.xlsx` and `S01.vcf.gz` both give `S01`. Names without
    /// a known extension lose only their last one.
    pub fn from_path(path: &Path) -> Result<Self, MigrateError> {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| MigrateError::InvalidSampleCode(path.display().to_string()))?;
        let stem = [MigrationKind::Cgh, MigrationKind::Vcf]
            .iter()
            .flat_map(|kind| kind.extensions())
            .filter_map(|ext| name.strip_suffix(ext))
            .min_by_key(|stem| stem.len())
            .or_else(|| path.file_stem().and_then(|stem| stem.to_str()))
            .unwrap_or(name);
        stem.parse()
    }
}

impl fmt::Display for SampleCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SampleCode {
    type Err = MigrateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        if normalized.is_empty() {
            return Err(MigrateError::InvalidSampleCode(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

/// A spreadsheet cell reduced to the shapes the composers care about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Empty,
    Text(String),
    Integer(i64),
    Number(f64),
    Bool(bool),
}

impl CellValue {
    pub fn text(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Absent, empty text, zero or `false`.
    pub fn is_falsy(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(value) => value.is_empty(),
            CellValue::Integer(value) => *value == 0,
            CellValue::Number(value) => *value == 0.0,
            CellValue::Bool(value) => !value,
        }
    }

    /// Display form of the cell; integral floats print without a fraction.
    pub fn to_text(&self) -> Option<String> {
        match self {
            CellValue::Empty => None,
            CellValue::Text(value) => Some(value.clone()),
            CellValue::Integer(value) => Some(value.to_string()),
            CellValue::Number(value) => {
                if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
                    Some((*value as i64).to_string())
                } else {
                    Some(value.to_string())
                }
            }
            CellValue::Bool(value) => Some(value.to_string()),
        }
    }
}

impl From<&Data> for CellValue {
    fn from(value: &Data) -> Self {
        match value {
            Data::Empty | Data::Error(_) => CellValue::Empty,
            Data::String(text) => CellValue::Text(text.clone()),
            Data::Int(number) => CellValue::Integer(*number),
            Data::Float(number) => CellValue::Number(*number),
            Data::Bool(flag) => CellValue::Bool(*flag),
            Data::DateTime(_) | Data::DateTimeIso(_) | Data::DurationIso(_) => {
                CellValue::Text(value.to_string())
            }
        }
    }
}
