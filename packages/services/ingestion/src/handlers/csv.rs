use csv::{ReaderBuilder, WriterBuilder};
use std::io::Write;
use std::path::Path;

use crate::models::*;

/// Tokens read as missing data, matching what the dashboard's reader treats as NA.
pub const MISSING_MARKERS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Uploads are tried as legacy single-byte text first, then UTF-8.
pub const UPLOAD_ENCODINGS: &[TextEncoding] = &[TextEncoding::Latin1, TextEncoding::Utf8];

/// The active file is written as UTF-8; a hand-placed file may still be ISO-8859-1.
pub const ACTIVE_ENCODINGS: &[TextEncoding] = &[TextEncoding::Utf8, TextEncoding::Latin1];

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

pub fn is_missing(raw: &str) -> bool {
    MISSING_MARKERS.contains(&raw)
}

/// Every encoding that was tried, with the error it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeFailure {
    pub attempts: Vec<(TextEncoding, String)>,
}

impl DecodeFailure {
    pub fn message(&self) -> String {
        let tried: Vec<&str> = self.attempts.iter().map(|(enc, _)| enc.label()).collect();
        format!("Error reading CSV file. Tried {} encoding.", tried.join(" and "))
    }

    pub fn diagnostics(&self) -> Vec<String> {
        self.attempts
            .iter()
            .map(|(enc, err)| format!("{} error: {}", enc, err))
            .collect()
    }
}

impl std::fmt::Display for DecodeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.message(), self.diagnostics().join("; "))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CsvHandler {
    delimiter: u8,
}

impl Default for CsvHandler {
    fn default() -> Self { Self::new() }
}

impl CsvHandler {
    pub fn new() -> Self { Self { delimiter: b',' } }

    pub fn with_delimiter(delimiter: char) -> Self {
        let delimiter = if delimiter.is_ascii() { delimiter as u8 } else { b',' };
        Self { delimiter }
    }

    /// Decodes and parses `bytes`, trying each encoding in order. A decode or parse error
    /// moves on to the next encoding; the first success wins.
    pub fn decode(
        &self,
        bytes: &[u8],
        encodings: &[TextEncoding],
    ) -> std::result::Result<(Table, TextEncoding), DecodeFailure> {
        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        let mut attempts = Vec::with_capacity(encodings.len());

        for &encoding in encodings {
            let attempt = decode_text(bytes, encoding).and_then(|text| self.parse_text(&text));
            match attempt {
                Ok(table) => {
                    tracing::debug!(
                        encoding = %encoding,
                        rows = table.row_count(),
                        columns = table.column_count(),
                        "Parsed CSV data"
                    );
                    return Ok((table, encoding));
                }
                Err(e) => {
                    tracing::debug!(encoding = %encoding, error = %e, "CSV decode attempt failed");
                    attempts.push((encoding, e.to_string()));
                }
            }
        }

        Err(DecodeFailure { attempts })
    }

    pub fn parse_text(&self, text: &str) -> Result<Table> {
        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());

        let columns: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
        if columns.is_empty() || (columns.len() == 1 && columns[0].is_empty()) {
            return Err(IngestionError::Decode("No columns to parse from file".to_string()));
        }
        let width = columns.len();

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            if record.len() > width {
                let line = record.position().map(|p| p.line()).unwrap_or(0);
                return Err(IngestionError::Decode(format!(
                    "Expected {} fields in line {}, saw {}",
                    width,
                    line,
                    record.len()
                )));
            }
            // Short rows are padded with missing cells
            let row = (0..width)
                .map(|i| record.get(i).filter(|v| !is_missing(v)).map(str::to_string))
                .collect();
            rows.push(row);
        }

        Ok(Table::new(columns, rows))
    }

    /// Serializes `table` as CSV. Missing cells are written empty.
    pub fn write_table<W: Write>(&self, table: &Table, out: W) -> Result<()> {
        let mut writer = WriterBuilder::new().delimiter(self.delimiter).from_writer(out);
        writer.write_record(&table.columns)?;
        for row in &table.rows {
            writer.write_record(row.iter().map(|cell| cell.as_deref().unwrap_or("")))?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn read_path(&self, path: &Path, encodings: &[TextEncoding]) -> Result<(Table, TextEncoding)> {
        let bytes = std::fs::read(path)?;
        self.decode(&bytes, encodings)
            .map_err(|failure| IngestionError::Decode(failure.to_string()))
    }
}

fn decode_text(bytes: &[u8], encoding: TextEncoding) -> Result<String> {
    match encoding {
        // Every byte maps to the code point of the same value
        TextEncoding::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
        TextEncoding::Utf8 => std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|e| IngestionError::Decode(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin1_is_tried_first_for_uploads() {
        let bytes = b"Area,Year,Value\nC\xf4te d'Ivoire,2020,3.5\n";
        let (table, encoding) = CsvHandler::new().decode(bytes, UPLOAD_ENCODINGS).unwrap();
        assert_eq!(encoding, TextEncoding::Latin1);
        assert_eq!(table.rows[0][0].as_deref(), Some("Côte d'Ivoire"));
    }

    #[test]
    fn invalid_utf8_falls_back_to_latin1_for_active_file() {
        let bytes = b"Area,Value\nR\xe9union,1\n";
        let (table, encoding) = CsvHandler::new().decode(bytes, ACTIVE_ENCODINGS).unwrap();
        assert_eq!(encoding, TextEncoding::Latin1);
        assert_eq!(table.rows[0][0].as_deref(), Some("Réunion"));
    }

    #[test]
    fn utf8_file_reads_as_utf8_when_preferred() {
        let text = "Area,Value\nRéunion,1\n";
        let (table, encoding) = CsvHandler::new().decode(text.as_bytes(), ACTIVE_ENCODINGS).unwrap();
        assert_eq!(encoding, TextEncoding::Utf8);
        assert_eq!(table.rows[0][0].as_deref(), Some("Réunion"));
    }

    #[test]
    fn both_attempts_are_reported_on_failure() {
        let failure = CsvHandler::new().decode(b"", UPLOAD_ENCODINGS).unwrap_err();
        assert_eq!(failure.attempts.len(), 2);
        let diags = failure.diagnostics();
        assert!(diags[0].starts_with("ISO-8859-1 error:"), "{:?}", diags);
        assert!(diags[1].starts_with("UTF-8 error:"), "{:?}", diags);
        assert!(failure.message().contains("ISO-8859-1 and UTF-8"));
    }

    #[test]
    fn missing_markers_and_short_rows() {
        let text = "Area,Year,Value\nKenya,2020,NA\nChad,2021\n";
        let table = CsvHandler::new().parse_text(text).unwrap();
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.rows[0][2], None);
        assert_eq!(table.rows[1], vec![Some("Chad".into()), Some("2021".into()), None]);
    }

    #[test]
    fn long_rows_name_the_line() {
        let text = "Area,Value\nKenya,1\nChad,2,extra\n";
        let err = CsvHandler::new().parse_text(text).unwrap_err();
        assert!(err.to_string().contains("Expected 2 fields in line 3, saw 3"), "{}", err);
    }

    #[test]
    fn bom_is_stripped() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(b"Area,Value\nKenya,1\n");
        let (table, _) = CsvHandler::new().decode(&bytes, UPLOAD_ENCODINGS).unwrap();
        assert_eq!(table.columns[0], "Area");
    }

    #[test]
    fn written_table_reads_back_identically() {
        let handler = CsvHandler::new();
        let table = Table::new(
            vec!["Area".into(), "Item Code".into(), "Value".into()],
            vec![
                vec![Some("Türkiye".into()), Some("00210011".into()), None],
                vec![Some("Chad, Republic of".into()), Some("21010".into()), Some("4.2".into())],
            ],
        );
        let mut buf = Vec::new();
        handler.write_table(&table, &mut buf).unwrap();
        let (back, encoding) = handler.decode(&buf, ACTIVE_ENCODINGS).unwrap();
        assert_eq!(encoding, TextEncoding::Utf8);
        assert_eq!(back, table);
    }
}
