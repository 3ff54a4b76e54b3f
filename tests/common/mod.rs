use std::path::Path;

use rust_xlsxwriter::Workbook;

/// Writes a small aberration report: seven header rows, the column header
/// and three aberration rows, the second of which has no chromosome.
pub fn write_aberration_report(path: &Path, window_size: &str) {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();

    sheet.write_string(0, 0, "Aberration Report").unwrap();
    sheet.write_string(1, 0, format!("Window Size: {window_size}")).unwrap();
    sheet.write_string(2, 0, "Threshold: 6,0").unwrap();
    sheet.write_string(3, 0, "Fuzzy Zero: OFF").unwrap();
    sheet.write_string(4, 0, "GC Correction: ON").unwrap();
    sheet.write_number(5, 0, 42.0).unwrap();
    sheet.write_string(6, 0, "Genome: hg19").unwrap();

    let header = [
        "AberrationNo",
        "Chr",
        "Cytoband",
        "Start",
        "Stop",
        "#Probes",
        "Amplification",
        "Deletion",
        "pval",
        "Gene Names",
        "Count",
        "miRNA",
    ];
    for (col, title) in header.iter().enumerate() {
        sheet.write_string(7, col as u16, *title).unwrap();
    }

    // row 1: full record, both scores present
    sheet.write_number(8, 0, 1.0).unwrap();
    sheet.write_string(8, 1, "chr2").unwrap();
    sheet.write_string(8, 2, "p25.3 - p25.1").unwrap();
    sheet.write_number(8, 3, 10_000.0).unwrap();
    sheet.write_number(8, 4, 250_000.0).unwrap();
    sheet.write_number(8, 5, 12.0).unwrap();
    sheet.write_number(8, 6, 0.62).unwrap();
    sheet.write_string(8, 7, "-0,41").unwrap();
    sheet.write_string(8, 8, "1,2E-5").unwrap();
    sheet.write_string(8, 9, "MYCN, DDX1").unwrap();
    sheet.write_string(8, 11, "mir-4262").unwrap();

    // row 2: no chromosome, dropped
    sheet.write_number(9, 0, 2.0).unwrap();
    sheet.write_string(9, 2, "q11").unwrap();
    sheet.write_number(9, 6, 1.0).unwrap();
    sheet.write_string(9, 11, "x").unwrap();

    // row 3: single band, deletion only, no genes
    sheet.write_number(10, 0, 3.0).unwrap();
    sheet.write_string(10, 1, "chr17").unwrap();
    sheet.write_string(10, 2, "q21.31").unwrap();
    sheet.write_number(10, 3, 41_196_312.0).unwrap();
    sheet.write_number(10, 4, 41_277_500.0).unwrap();
    sheet.write_number(10, 5, 4.0).unwrap();
    sheet.write_number(10, 7, -1.3).unwrap();
    sheet.write_number(10, 8, 0.003).unwrap();

    workbook.save(path).unwrap();
}
