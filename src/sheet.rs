use std::path::Path;

use calamine::{Data, Range, Reader, open_workbook_auto};
use serde::Serialize;

use crate::cnv::{CnvRecord, compose_cnv_row};
use crate::domain::{CellValue, SampleCode};
use crate::error::MigrateError;
use crate::metadata::{FieldRules, ProcessedMetadata, compose_processed_metadata};

/// First-column text that separates the processed header from CNV rows.
pub const HEADER_MARKER: &str = "AberrationNo";
/// Separator between label and value in a header cell.
pub const LABEL_DELIMITER: char = ':';

#[derive(Debug, Clone, Serialize)]
pub struct SheetExtractionResult {
    pub sample_code: SampleCode,
    pub processed_metadata: ProcessedMetadata,
    pub cnv_records: Vec<CnvRecord>,
    pub skipped_rows: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Header,
    Body,
}

/// Reads the first worksheet of an aberration report and extracts its
/// processed metadata and CNV rows. The sample code is the file stem.
pub fn extract_workbook(path: &Path, rules: &FieldRules) -> Result<SheetExtractionResult, MigrateError> {
    let sample_code = SampleCode::from_path(path)?;
    let mut workbook = open_workbook_auto(path)
        .map_err(|err| MigrateError::Workbook(format!("open {}: {err}", path.display())))?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| MigrateError::Workbook(format!("{} has no sheets", path.display())))?;
    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|err| MigrateError::Workbook(format!("sheet '{sheet}': {err}")))?;
    tracing::debug!(
        sample = %sample_code,
        sheet = %sheet,
        rows = range.height(),
        columns = range.width(),
        "read worksheet"
    );
    extract_range(sample_code, &range, rules)
}

pub fn extract_range(
    sample_code: SampleCode,
    range: &Range<Data>,
    rules: &FieldRules,
) -> Result<SheetExtractionResult, MigrateError> {
    let rows = range
        .rows()
        .map(|row| row.iter().map(CellValue::from).collect::<Vec<_>>());
    extract_rows(sample_code, rows, rules)
}

/// Runs the header/body scan over already-converted rows.
///
/// Header rows before [`HEADER_MARKER`] feed the processed metadata; every
/// row after it is handed to the CNV composer with its full width kept.
/// A bad processed value fails the whole extraction; a bad CNV row is only
/// counted in `skipped_rows`.
pub fn extract_rows<I>(
    sample_code: SampleCode,
    rows: I,
    rules: &FieldRules,
) -> Result<SheetExtractionResult, MigrateError>
where
    I: IntoIterator<Item = Vec<CellValue>>,
{
    let mut state = ScanState::Header;
    let mut header_pairs = Vec::new();
    let mut cnv_records = Vec::new();
    let mut skipped_rows = 0usize;

    for (index, row) in rows.into_iter().enumerate() {
        match state {
            ScanState::Header => {
                let Some(text) = row.first().and_then(CellValue::as_text) else {
                    continue;
                };
                if text.trim() == HEADER_MARKER {
                    state = ScanState::Body;
                    continue;
                }
                match text.split_once(LABEL_DELIMITER) {
                    Some((label, value)) => {
                        header_pairs.push((label.trim().to_string(), value.trim().to_string()));
                    }
                    None => tracing::debug!(row = index + 1, text, "header cell without label"),
                }
            }
            ScanState::Body => match compose_cnv_row(&row) {
                Ok(record) => cnv_records.push(record),
                Err(reason) => {
                    skipped_rows += 1;
                    tracing::debug!(row = index + 1, ?reason, "skipped CNV row");
                }
            },
        }
    }

    if state == ScanState::Header {
        tracing::warn!(
            sample = %sample_code,
            "no {} row found; sheet has no CNV data",
            HEADER_MARKER
        );
    }

    let processed_metadata = compose_processed_metadata(&header_pairs, rules)?;
    tracing::info!(
        sample = %sample_code,
        fields = processed_metadata.len(),
        records = cnv_records.len(),
        skipped = skipped_rows,
        "extracted sheet"
    );

    Ok(SheetExtractionResult {
        sample_code,
        processed_metadata,
        cnv_records,
        skipped_rows,
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::metadata::MetadataValue;

    fn text_row(cells: &[&str]) -> Vec<CellValue> {
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

    fn sample() -> SampleCode {
        "S01".parse().unwrap()
    }

    #[test]
    fn header_then_body() {
        let rows = vec![
            text_row(&["Window Size: 250 bp", "", ""]),
            vec![CellValue::Number(3.0), CellValue::Empty],
            text_row(&["Report for array 42"]),
            text_row(&["Fuzzy Zero: ON"]),
            text_row(&["AberrationNo", "Chr", "Cytoband"]),
            text_row(&[
                "1", "chr1", "p36.33-p36.32", "1", "2", "3", "0.5", "", "0.1", "A,B", "", "",
            ]),
            text_row(&["2", "", "", "", "", "", "", "", "", "", "", ""]),
            text_row(&["3", "chr4"]),
        ];

        let result = extract_rows(sample(), rows, &FieldRules::default()).unwrap();
        assert_eq!(result.processed_metadata.len(), 2);
        assert_eq!(
            result
                .processed_metadata
                .get("fuzzy_zero")
                .and_then(|field| field.scalar()),
            Some(&MetadataValue::Boolean(true))
        );
        assert_eq!(result.cnv_records.len(), 1);
        assert_eq!(result.cnv_records[0].chromosome, "chr1");
        assert_eq!(result.skipped_rows, 2);
    }

    #[test]
    fn value_keeps_later_delimiters() {
        let rows = vec![text_row(&["Analysis Date: 2011-03-04 10:15"])];
        let result = extract_rows(sample(), rows, &FieldRules::default()).unwrap();
        assert_eq!(
            result
                .processed_metadata
                .get("analysis_date")
                .and_then(|field| field.scalar()),
            Some(&MetadataValue::Text("2011-03-04 10:15".to_string()))
        );
    }

    #[test]
    fn bad_window_size_aborts() {
        let rows = vec![
            text_row(&["Window Size: N/A"]),
            text_row(&["AberrationNo"]),
        ];
        let err = extract_rows(sample(), rows, &FieldRules::default()).unwrap_err();
        assert_matches!(err, MigrateError::Parse { .. });
    }

    #[test]
    fn marker_row_is_not_metadata() {
        let rows = vec![text_row(&["AberrationNo"]), text_row(&["Genome: hg19"])];
        let result = extract_rows(sample(), rows, &FieldRules::default()).unwrap();
        assert!(result.processed_metadata.is_empty());
        assert_eq!(result.skipped_rows, 1);
    }
}
