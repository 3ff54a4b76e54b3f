use serde::{Deserialize, Serialize};

use crate::domain::CellValue;
use crate::metadata::parse_decimal;

/// Columns of one aberration row, in sheet order.
pub const CNV_COLUMNS: usize = 12;

const COL_CHROMOSOME: usize = 1;
const COL_CYTOBAND: usize = 2;
const COL_START: usize = 3;
const COL_STOP: usize = 4;
const COL_PROBES: usize = 5;
const COL_AMPLIFICATION: usize = 6;
const COL_DELETION: usize = 7;
const COL_P_VALUE: usize = 8;
const COL_GENES: usize = 9;
const COL_MIRNA: usize = 11;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CnvRecord {
    pub chromosome: String,
    pub cytoband_start: Option<String>,
    pub cytoband_stop: Option<String>,
    pub start: CellValue,
    pub stop: CellValue,
    pub probes: CellValue,
    pub amplification: Option<f64>,
    pub is_amplification: bool,
    pub deletion: Option<f64>,
    pub is_deletion: bool,
    pub p_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gene_names: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirnas: Option<Vec<String>>,
}

/// Why a row produced no record. Skips never abort an extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    TooFewColumns(usize),
    MissingChromosome,
    InvalidNumber { column: usize, raw: String },
}

/// Builds a CNV record from a positional row. Column 0 (aberration number)
/// and column 10 are not read.
pub fn compose_cnv_row(row: &[CellValue]) -> Result<CnvRecord, SkipReason> {
    if row.len() < CNV_COLUMNS {
        return Err(SkipReason::TooFewColumns(row.len()));
    }
    if row[COL_CHROMOSOME].is_falsy() {
        return Err(SkipReason::MissingChromosome);
    }
    let chromosome = row[COL_CHROMOSOME]
        .to_text()
        .ok_or(SkipReason::MissingChromosome)?;

    let (cytoband_start, cytoband_stop) = split_cytoband(&row[COL_CYTOBAND]);

    let amplification = score(row, COL_AMPLIFICATION)?;
    let deletion = score(row, COL_DELETION)?;
    let p_value = score(row, COL_P_VALUE)?;

    Ok(CnvRecord {
        chromosome,
        cytoband_start,
        cytoband_stop,
        start: row[COL_START].clone(),
        stop: row[COL_STOP].clone(),
        probes: row[COL_PROBES].clone(),
        amplification,
        is_amplification: amplification.is_some_and(|value| value > 0.0),
        deletion,
        is_deletion: deletion.is_some_and(|value| value < 0.0),
        p_value,
        gene_names: split_names(&row[COL_GENES]),
        mirnas: split_names(&row[COL_MIRNA]),
    })
}

/// `"10-20"` gives `("10", "20")`; a single band is used for both ends.
fn split_cytoband(cell: &CellValue) -> (Option<String>, Option<String>) {
    let Some(text) = cell.to_text().filter(|text| !text.trim().is_empty()) else {
        return (None, None);
    };
    let mut parts = text.splitn(2, '-').map(str::trim);
    let start = parts.next().unwrap_or_default().to_string();
    let stop = parts
        .next()
        .map(str::to_string)
        .unwrap_or_else(|| start.clone());
    (Some(start), Some(stop))
}

fn score(row: &[CellValue], column: usize) -> Result<Option<f64>, SkipReason> {
    match &row[column] {
        CellValue::Empty => Ok(None),
        CellValue::Number(value) => Ok(Some(*value)),
        CellValue::Integer(value) => Ok(Some(*value as f64)),
        CellValue::Text(text) if text.trim().is_empty() => Ok(None),
        CellValue::Text(text) => parse_decimal(text)
            .map(Some)
            .ok_or_else(|| SkipReason::InvalidNumber {
                column,
                raw: text.clone(),
            }),
        CellValue::Bool(flag) => Err(SkipReason::InvalidNumber {
            column,
            raw: flag.to_string(),
        }),
    }
}

fn split_names(cell: &CellValue) -> Option<Vec<String>> {
    let text = cell.to_text()?;
    if text.trim().is_empty() {
        return None;
    }
    Some(
        text.split(',')
            .map(|name| name.trim().to_string())
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn row(cells: &[&str]) -> Vec<CellValue> {
        cells
            .iter()
            .map(|cell| {
                if cell.is_empty() {
                    CellValue::Empty
                } else {
                    CellValue::text(cell)
                }
            })
            .collect()
    }

    #[test]
    fn full_row() {
        let record = compose_cnv_row(&row(&[
            "1",
            "chr2",
            "10-20",
            "100",
            "200",
            "5",
            "1.2",
            "-3.4",
            "0.01",
            "BRCA1, TP53",
            "",
            "mir21",
        ]))
        .unwrap();

        assert_eq!(record.chromosome, "chr2");
        assert_eq!(record.cytoband_start.as_deref(), Some("10"));
        assert_eq!(record.cytoband_stop.as_deref(), Some("20"));
        assert_eq!(record.start, CellValue::text("100"));
        assert_eq!(record.probes, CellValue::text("5"));
        assert_eq!(record.amplification, Some(1.2));
        assert!(record.is_amplification);
        assert_eq!(record.deletion, Some(-3.4));
        assert!(record.is_deletion);
        assert_eq!(record.p_value, Some(0.01));
        assert_eq!(
            record.gene_names,
            Some(vec!["BRCA1".to_string(), "TP53".to_string()])
        );
        assert_eq!(record.mirnas, Some(vec!["mir21".to_string()]));
    }

    #[test]
    fn empty_mirna_is_absent() {
        let record = compose_cnv_row(&row(&[
            "1", "chr2", "10-20", "100", "200", "5", "1.2", "-3.4", "0.01", "BRCA1, TP53", "mir21",
            "",
        ]))
        .unwrap();
        assert_eq!(record.mirnas, None);
        assert!(record.gene_names.is_some());
    }

    #[test]
    fn single_band_fills_both_ends() {
        let record = compose_cnv_row(&row(&[
            "3", "chr7", "15", "1", "2", "3", "0", "0", "1", "", "", "",
        ]))
        .unwrap();
        assert_eq!(record.cytoband_start.as_deref(), Some("15"));
        assert_eq!(record.cytoband_stop.as_deref(), Some("15"));
        assert!(!record.is_amplification);
        assert!(!record.is_deletion);
        assert_eq!(record.gene_names, None);
    }

    #[test]
    fn comma_decimals() {
        let record = compose_cnv_row(&row(&[
            "1", "chrX", "p11", "1", "2", "3", "0,75", "", "0,002", "", "", "",
        ]))
        .unwrap();
        assert_eq!(record.amplification, Some(0.75));
        assert_eq!(record.deletion, None);
        assert_eq!(record.p_value, Some(0.002));
    }

    #[test]
    fn short_row_is_skipped() {
        let cells = row(&["1", "chr2", "10-20", "100", "200", "5", "1.2", "-3.4", "0.01", "", ""]);
        assert_eq!(compose_cnv_row(&cells), Err(SkipReason::TooFewColumns(11)));
    }

    #[test]
    fn missing_chromosome_is_skipped() {
        let cells = row(&["1", "", "10-20", "100", "200", "5", "1.2", "-3.4", "0.01", "", "", ""]);
        assert_eq!(compose_cnv_row(&cells), Err(SkipReason::MissingChromosome));
    }

    #[test]
    fn garbage_score_is_skipped() {
        let cells = row(&["1", "chr1", "q21", "1", "2", "3", "n/a", "", "", "", "", ""]);
        assert_matches!(
            compose_cnv_row(&cells),
            Err(SkipReason::InvalidNumber { column: 6, .. })
        );
    }

    #[test]
    fn numeric_cells_are_used_directly() {
        let mut cells = row(&["1", "", "q21", "", "", "", "", "", "", "", "", ""]);
        cells[1] = CellValue::Number(2.0);
        cells[6] = CellValue::Number(0.4);
        cells[7] = CellValue::Integer(-1);
        let record = compose_cnv_row(&cells).unwrap();
        assert_eq!(record.chromosome, "2");
        assert!(record.is_amplification);
        assert!(record.is_deletion);
    }
}
