use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::MigrateError;
use crate::naming::normalize_field_name;

/// A coerced scalar from a processed-metadata cell or a CNV column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

/// Exactly one of `value` or `values` is present on a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldData {
    Value(MetadataValue),
    Values(Vec<MetadataValue>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataField {
    pub name: String,
    #[serde(flatten)]
    pub data: FieldData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl MetadataField {
    pub fn value(name: impl Into<String>, value: MetadataValue) -> Self {
        Self {
            name: name.into(),
            data: FieldData::Value(value),
            unit: None,
        }
    }

    pub fn values(name: impl Into<String>, values: Vec<MetadataValue>) -> Self {
        Self {
            name: name.into(),
            data: FieldData::Values(values),
            unit: None,
        }
    }

    pub fn with_unit(mut self, unit: Option<String>) -> Self {
        self.unit = unit;
        self
    }

    pub fn scalar(&self) -> Option<&MetadataValue> {
        match &self.data {
            FieldData::Value(value) => Some(value),
            FieldData::Values(_) => None,
        }
    }
}

/// Processed metadata in sheet order. Keys are normalized field names and are
/// unique; inserting an existing key replaces the field where it stands.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessedMetadata {
    fields: Vec<MetadataField>,
}

impl ProcessedMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: MetadataField) {
        match self.fields.iter_mut().find(|entry| entry.name == field.name) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
    }

    pub fn get(&self, name: &str) -> Option<&MetadataField> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetadataField> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Label sets that decide how a processed-metadata value is coerced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRules {
    #[serde(default = "default_window_size_label")]
    pub window_size_label: String,
    #[serde(default = "default_float_fields")]
    pub float_fields: Vec<String>,
    #[serde(default = "default_integer_fields")]
    pub integer_fields: Vec<String>,
    #[serde(default = "default_boolean_fields")]
    pub boolean_fields: Vec<String>,
    #[serde(default = "default_boolean_true")]
    pub boolean_true: String,
}

impl Default for FieldRules {
    fn default() -> Self {
        Self {
            window_size_label: default_window_size_label(),
            float_fields: default_float_fields(),
            integer_fields: default_integer_fields(),
            boolean_fields: default_boolean_fields(),
            boolean_true: default_boolean_true(),
        }
    }
}

impl FieldRules {
    pub fn coercion_for(&self, label: &str) -> Coercion {
        let has = |set: &[String]| set.iter().any(|entry| entry == label);
        if label == self.window_size_label {
            Coercion::WindowSize
        } else if has(&self.float_fields) {
            Coercion::Float
        } else if has(&self.integer_fields) {
            Coercion::Integer
        } else if has(&self.boolean_fields) {
            Coercion::Boolean
        } else {
            Coercion::Text
        }
    }

    /// Every label that has a non-text coercion.
    pub fn typed_labels(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.window_size_label.as_str())
            .chain(self.float_fields.iter().map(String::as_str))
            .chain(self.integer_fields.iter().map(String::as_str))
            .chain(self.boolean_fields.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    WindowSize,
    Float,
    Integer,
    Boolean,
    Text,
}

pub fn default_window_size_label() -> String {
    "Window Size".to_string()
}

pub fn default_float_fields() -> Vec<String> {
    [
        "Threshold",
        "Centralization Threshold",
        "Minimum Absolute Average Log Ratio",
        "Aberration Filter Threshold",
        "Percent Penetrance",
    ]
    .iter()
    .map(|label| label.to_string())
    .collect()
}

pub fn default_integer_fields() -> Vec<String> {
    [
        "Centralization Bin Size",
        "Minimum Number of Probes in Region",
        "Maximum Number of Aberrations",
        "Number of Probes",
    ]
    .iter()
    .map(|label| label.to_string())
    .collect()
}

pub fn default_boolean_fields() -> Vec<String> {
    [
        "Centralization",
        "Fuzzy Zero",
        "GC Correction",
        "Diploid Peak Centralization",
        "Combine Replicates (Intra Array)",
        "Combine Replicates (Inter Array)",
    ]
    .iter()
    .map(|label| label.to_string())
    .collect()
}

pub fn default_boolean_true() -> String {
    "ON".to_string()
}

/// Builds processed metadata from `(label, raw value)` pairs in sheet order.
///
/// Fails on the first value that cannot be coerced to the type its label
/// demands; a partially valid header is never returned.
pub fn compose_processed_metadata(
    pairs: &[(String, String)],
    rules: &FieldRules,
) -> Result<ProcessedMetadata, MigrateError> {
    let mut metadata = ProcessedMetadata::new();
    for (label, raw) in pairs {
        let field = compose_field(label, raw, rules)?;
        tracing::debug!(field = %field.name, label = %label, "processed field");
        metadata.insert(field);
    }
    Ok(metadata)
}

pub fn compose_field(
    label: &str,
    raw: &str,
    rules: &FieldRules,
) -> Result<MetadataField, MigrateError> {
    let name = normalize_field_name(label);
    let field = match rules.coercion_for(label) {
        Coercion::WindowSize => {
            let (value, unit) = parse_window_size(raw)?;
            MetadataField::value(name, MetadataValue::Float(value)).with_unit(unit)
        }
        Coercion::Float => MetadataField::value(name, MetadataValue::Float(parse_float(label, raw)?)),
        Coercion::Integer => {
            MetadataField::value(name, MetadataValue::Integer(parse_integer(label, raw)?))
        }
        Coercion::Boolean => {
            MetadataField::value(name, MetadataValue::Boolean(raw == rules.boolean_true))
        }
        Coercion::Text => MetadataField::value(name, MetadataValue::Text(raw.to_string())),
    };
    Ok(field)
}

fn digit_run() -> &'static Regex {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    DIGITS.get_or_init(|| Regex::new(r"[0-9]+").expect("static pattern"))
}

/// Splits `"250 bp"` into `(250.0, Some("bp"))`.
///
/// The value is the first run of digits; the unit is whatever remains once
/// every digit is removed, trimmed and lower-cased.
pub fn parse_window_size(raw: &str) -> Result<(f64, Option<String>), MigrateError> {
    let digits = digit_run()
        .find(raw)
        .ok_or_else(|| MigrateError::parse("window size", raw, "no digits found"))?;
    let value = digits
        .as_str()
        .parse::<f64>()
        .map_err(|err| MigrateError::parse("window size", raw, err.to_string()))?;
    let unit = raw
        .chars()
        .filter(|ch| !ch.is_ascii_digit())
        .collect::<String>()
        .trim()
        .to_lowercase();
    Ok((value, (!unit.is_empty()).then_some(unit)))
}

/// Parses a float, accepting a comma as decimal separator.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    raw.trim().replace(',', ".").parse::<f64>().ok()
}

fn parse_float(label: &str, raw: &str) -> Result<f64, MigrateError> {
    parse_decimal(raw).ok_or_else(|| MigrateError::parse(label, raw, "expected number"))
}

fn parse_integer(label: &str, raw: &str) -> Result<i64, MigrateError> {
    let trimmed = raw.trim();
    if let Ok(value) = trimmed.parse::<i64>() {
        return Ok(value);
    }
    match parse_decimal(trimmed) {
        Some(value) if !fits_i64(value) => {
            Err(MigrateError::parse(label, raw, "integer out of range"))
        }
        Some(value) if value.fract() == 0.0 => Ok(value as i64),
        Some(_) => Err(MigrateError::parse(
            label,
            raw,
            "expected integer (got non-integer number)",
        )),
        None => Err(MigrateError::parse(label, raw, "expected integer")),
    }
}

fn fits_i64(value: f64) -> bool {
    value.is_finite() && value >= i64::MIN as f64 && value < i64::MAX as f64
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(label, value)| (label.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn window_size_with_spaced_unit() {
        assert_eq!(
            parse_window_size("250 bp").unwrap(),
            (250.0, Some("bp".to_string()))
        );
    }

    #[test]
    fn window_size_with_glued_unit() {
        assert_eq!(
            parse_window_size("2500KB").unwrap(),
            (2500.0, Some("kb".to_string()))
        );
    }

    #[test]
    fn window_size_takes_first_digit_run() {
        let (value, unit) = parse_window_size("1.000").unwrap();
        assert_eq!(value, 1.0);
        assert_eq!(unit.as_deref(), Some("."));
    }

    #[test]
    fn window_size_needs_ascii_digits() {
        let err = parse_window_size("\u{0662}\u{0665}\u{0660} bp").unwrap_err();
        assert_matches!(err, MigrateError::Parse { message, .. } if message == "no digits found");
    }

    #[test]
    fn window_size_without_digits_fails() {
        let err = parse_window_size("N/A").unwrap_err();
        assert_matches!(err, MigrateError::Parse { .. });
    }

    #[test]
    fn boolean_is_exact_on_sentinel() {
        let rules = FieldRules::default();
        for label in &rules.boolean_fields {
            for (raw, expected) in [
                ("ON", true),
                ("OFF", false),
                ("on", false),
                (" ON", false),
                ("", false),
            ] {
                let field = compose_field(label, raw, &rules).unwrap();
                assert_eq!(
                    field.scalar(),
                    Some(&MetadataValue::Boolean(expected)),
                    "{label}: {raw:?}"
                );
            }
        }
    }

    #[test]
    fn compose_applies_rules_in_order() {
        let rules = FieldRules::default();
        let metadata = compose_processed_metadata(
            &pairs(&[
                ("Window Size", "2 Mb"),
                ("Threshold", "6,5"),
                ("Centralization Bin Size", "10.0"),
                ("Centralization", "ON"),
                ("Genome", "hg19"),
            ]),
            &rules,
        )
        .unwrap();

        let names: Vec<_> = metadata.iter().map(|field| field.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "window_size",
                "threshold",
                "centralization_bin_size",
                "centralization",
                "genome"
            ]
        );
        let window = metadata.get("window_size").unwrap();
        assert_eq!(window.scalar(), Some(&MetadataValue::Float(2.0)));
        assert_eq!(window.unit.as_deref(), Some("mb"));
        assert_eq!(
            metadata.get("threshold").unwrap().scalar(),
            Some(&MetadataValue::Float(6.5))
        );
        assert_eq!(
            metadata.get("centralization_bin_size").unwrap().scalar(),
            Some(&MetadataValue::Integer(10))
        );
        assert_eq!(
            metadata.get("genome").unwrap().scalar(),
            Some(&MetadataValue::Text("hg19".to_string()))
        );
    }

    #[test]
    fn repeated_label_replaces_in_place() {
        let rules = FieldRules::default();
        let metadata = compose_processed_metadata(
            &pairs(&[("Genome", "hg18"), ("Array", "A1"), ("Genome", "hg19")]),
            &rules,
        )
        .unwrap();
        assert_eq!(metadata.len(), 2);
        assert_eq!(metadata.iter().next().unwrap().name, "genome");
        assert_eq!(
            metadata.get("genome").unwrap().scalar(),
            Some(&MetadataValue::Text("hg19".to_string()))
        );
    }

    #[test]
    fn malformed_float_is_fatal() {
        let rules = FieldRules::default();
        let err = compose_processed_metadata(&pairs(&[("Threshold", "high")]), &rules).unwrap_err();
        assert_matches!(err, MigrateError::Parse { field, .. } if field == "Threshold");
    }

    #[test]
    fn fractional_integer_is_fatal() {
        let rules = FieldRules::default();
        let err = compose_field("Centralization Bin Size", "2.5", &rules).unwrap_err();
        assert_matches!(err, MigrateError::Parse { .. });
    }

    #[test]
    fn oversized_integer_is_fatal() {
        let rules = FieldRules::default();
        let err = compose_field("Number of Probes", "1e30", &rules).unwrap_err();
        assert_matches!(err, MigrateError::Parse { field, .. } if field == "Number of Probes");
        let err = compose_field("Number of Probes", "NaN", &rules).unwrap_err();
        assert_matches!(err, MigrateError::Parse { .. });
    }

    #[test]
    fn typed_labels_normalize_to_safe_names() {
        let rules = FieldRules::default();
        for label in rules.typed_labels() {
            let name = normalize_field_name(&normalize_field_name(label));
            assert!(
                name.chars().all(crate::naming::is_identifier_char),
                "{label} -> {name}"
            );
        }
    }

    #[test]
    fn field_serializes_with_value_or_values() {
        let single = MetadataField::value("window_size", MetadataValue::Float(250.0))
            .with_unit(Some("bp".to_string()));
        let json = serde_json::to_value(&single).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "window_size", "value": 250.0, "unit": "bp"})
        );

        let list = MetadataField::values(
            "gene_name",
            vec![MetadataValue::Text("TP53".to_string())],
        );
        let json = serde_json::to_value(&list).unwrap();
        assert_eq!(json, serde_json::json!({"name": "gene_name", "values": ["TP53"]}));
    }
}
