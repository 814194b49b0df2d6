//! Bounded previews of uploaded datasets.
//!
//! Dispatch is by file-name suffix only. Previews hold at most
//! [`PREVIEW_ROWS`] sample rows; counts describe the whole file.

use std::{fmt, sync::Arc};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::error::ParseError;

/// Maximum number of sample rows kept in a preview.
pub const PREVIEW_ROWS: usize = 5;

/// One preview row: header → cell value, in header order.
pub type PreviewRow = IndexMap<String, Value>;

/// Supported upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileKind {
    /// Comma separated values.
    #[serde(rename = "CSV")]
    Csv,
    /// JSON array of records or a single record.
    #[serde(rename = "JSON")]
    Json,
}

impl FileKind {
    /// Resolves the kind from a file name suffix.
    pub fn from_file_name(file_name: &str) -> Result<Self, ParseError> {
        if file_name.ends_with(".csv") {
            Ok(Self::Csv)
        } else if file_name.ends_with(".json") {
            Ok(Self::Json)
        } else {
            Err(ParseError::UnsupportedType {
                file_name: file_name.to_string(),
            })
        }
    }

    /// Display label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Csv => "CSV",
            Self::Json => "JSON",
        }
    }
}

/// An uploaded file held in memory for the session.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadedFile {
    name: String,
    bytes: Arc<[u8]>,
}

impl UploadedFile {
    /// Wraps raw bytes under the given file name.
    #[must_use]
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: Arc::from(bytes.into()),
        }
    }

    /// File name as selected by the user.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw content.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True when the file has no content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for UploadedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedFile")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Bounded preview of an uploaded dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetPreview {
    /// Detected format.
    #[serde(rename = "type")]
    pub kind: FileKind,
    /// Column names in file order, not deduplicated.
    pub headers: Vec<String>,
    /// Up to five sample rows.
    pub rows: Vec<PreviewRow>,
    /// Total data rows in the file.
    pub row_count: usize,
    /// Number of columns.
    pub column_count: usize,
}

impl DatasetPreview {
    /// True when `column` is one of the headers.
    #[must_use]
    pub fn has_column(&self, column: &str) -> bool {
        self.headers.iter().any(|header| header == column)
    }

    /// "Showing first N rows of M" style caption.
    #[must_use]
    pub fn caption(&self) -> String {
        format!(
            "{} rows × {} columns ({})",
            self.row_count,
            self.column_count,
            self.kind.label()
        )
    }
}

/// Dispatches on the file name and parses the upload.
pub fn preview_upload(file: &UploadedFile) -> Result<DatasetPreview, ParseError> {
    let kind = FileKind::from_file_name(file.name())?;
    let text = std::str::from_utf8(file.bytes()).map_err(|_| ParseError::NotText)?;
    parse_preview(kind, text)
}

/// Parses raw content of a declared kind into a preview.
pub fn parse_preview(kind: FileKind, content: &str) -> Result<DatasetPreview, ParseError> {
    match kind {
        FileKind::Csv => parse_csv(content),
        FileKind::Json => parse_json(content),
    }
}

fn parse_csv(content: &str) -> Result<DatasetPreview, ParseError> {
    let lines: Vec<&str> = content
        .split('\n')
        .filter(|line| !line.trim().is_empty())
        .collect();
    let (header_line, data_lines) = lines.split_first().ok_or(ParseError::EmptyCsv)?;
    let headers: Vec<String> = header_line
        .split(',')
        .map(|header| header.trim().to_string())
        .collect();
    let rows = data_lines
        .iter()
        .take(PREVIEW_ROWS)
        .map(|line| {
            let cells: Vec<&str> = line.split(',').map(str::trim).collect();
            let mut row = PreviewRow::with_capacity(headers.len());
            for (idx, header) in headers.iter().enumerate() {
                let value = cells.get(idx).map_or(Value::Null, |cell| coerce_cell(cell));
                row.insert(header.clone(), value);
            }
            row
        })
        .collect();
    Ok(DatasetPreview {
        kind: FileKind::Csv,
        column_count: headers.len(),
        headers,
        rows,
        row_count: data_lines.len(),
    })
}

/// Numeric-looking cells become JSON numbers; everything else stays text.
fn coerce_cell(cell: &str) -> Value {
    if cell.is_empty() {
        return Value::String(String::new());
    }
    if let Ok(int) = cell.parse::<i64>() {
        return Value::Number(int.into());
    }
    match cell.parse::<f64>() {
        Ok(float) if float.is_finite() => {
            Number::from_f64(float).map_or_else(|| Value::String(cell.to_string()), Value::Number)
        }
        _ => Value::String(cell.to_string()),
    }
}

fn parse_json(content: &str) -> Result<DatasetPreview, ParseError> {
    let value: Value =
        serde_json::from_str(content).map_err(|err| ParseError::InvalidJson(err.to_string()))?;
    let (records, row_count) = match value {
        Value::Array(items) => {
            let total = items.len();
            (items.into_iter().take(PREVIEW_ROWS).collect::<Vec<_>>(), total)
        }
        other => (vec![other], 1),
    };
    let rows = records
        .into_iter()
        .enumerate()
        .map(|(index, record)| match record {
            Value::Object(map) => Ok(map.into_iter().collect::<PreviewRow>()),
            _ => Err(ParseError::NotARecord { index }),
        })
        .collect::<Result<Vec<_>, _>>()?;
    let headers: Vec<String> = rows
        .first()
        .map(|row| row.keys().cloned().collect())
        .unwrap_or_default();
    Ok(DatasetPreview {
        kind: FileKind::Json,
        column_count: headers.len(),
        headers,
        rows,
        row_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn csv_with(rows: usize) -> String {
        let mut text = String::from("A,B\n");
        for idx in 0..rows {
            text.push_str(&format!("{idx},label-{idx}\n"));
        }
        text
    }

    #[test]
    fn csv_counts_follow_line_totals() {
        for rows in [0, 1, 5, 6, 12] {
            let preview = parse_preview(FileKind::Csv, &csv_with(rows)).unwrap();
            assert_eq!(preview.column_count, 2);
            assert_eq!(preview.row_count, rows);
            assert_eq!(preview.rows.len(), rows.min(PREVIEW_ROWS));
        }
    }

    #[test]
    fn csv_coerces_numbers_and_trims() {
        let preview =
            parse_preview(FileKind::Csv, "age , name,score\r\n 42, Ada ,3.5\n\n7,Bob\n").unwrap();
        assert_eq!(preview.headers, vec!["age", "name", "score"]);
        assert_eq!(preview.row_count, 2);
        assert_eq!(preview.rows[0]["age"], json!(42));
        assert_eq!(preview.rows[0]["name"], json!("Ada"));
        assert_eq!(preview.rows[0]["score"], json!(3.5));
        assert_eq!(preview.rows[1]["score"], Value::Null);
    }

    #[test]
    fn csv_without_lines_fails() {
        assert_eq!(
            parse_preview(FileKind::Csv, "\n  \n").unwrap_err(),
            ParseError::EmptyCsv
        );
    }

    #[test]
    fn json_array_takes_first_five_rows() {
        let items: Vec<Value> = (0..8).map(|idx| json!({ "x": idx, "y": "v" })).collect();
        let preview = parse_preview(FileKind::Json, &Value::Array(items).to_string()).unwrap();
        assert_eq!(preview.row_count, 8);
        assert_eq!(preview.rows.len(), 5);
        assert_eq!(preview.headers, vec!["x", "y"]);
        assert_eq!(preview.column_count, 2);
    }

    #[test]
    fn json_object_is_single_row() {
        let preview = parse_preview(FileKind::Json, r#"{"zeta": 1, "alpha": 2}"#).unwrap();
        assert_eq!(preview.row_count, 1);
        assert_eq!(preview.headers, vec!["zeta", "alpha"]);
    }

    #[test]
    fn empty_json_array_has_no_rows_or_columns() {
        let preview = parse_preview(FileKind::Json, "[]").unwrap();
        assert_eq!(preview.row_count, 0);
        assert_eq!(preview.column_count, 0);
        assert!(preview.headers.is_empty());
        assert!(preview.rows.is_empty());
    }

    #[test]
    fn empty_json_object_is_one_row_without_columns() {
        let preview = parse_preview(FileKind::Json, "{}").unwrap();
        assert_eq!(preview.row_count, 1);
        assert_eq!(preview.column_count, 0);
        assert_eq!(preview.rows.len(), 1);
        assert!(preview.headers.is_empty());
    }

    #[test]
    fn json_failures_are_parse_errors() {
        assert!(matches!(
            parse_preview(FileKind::Json, "{not json"),
            Err(ParseError::InvalidJson(_))
        ));
        assert_eq!(
            parse_preview(FileKind::Json, "[1, 2]").unwrap_err(),
            ParseError::NotARecord { index: 0 }
        );
    }

    #[test]
    fn dispatch_rejects_unknown_suffix_before_parsing() {
        let file = UploadedFile::new("data.txt", b"A,B\n1,2\n".to_vec());
        let err = preview_upload(&file).unwrap_err();
        assert!(err.is_rejected_upfront());
        assert_eq!(err.user_message(), "Please upload a CSV or JSON file");
    }

    #[test]
    fn preview_serializes_with_wire_names() {
        let preview = parse_preview(FileKind::Csv, "A\n1\n").unwrap();
        let value = serde_json::to_value(&preview).unwrap();
        assert_eq!(value["type"], "CSV");
        assert_eq!(value["rowCount"], 1);
        assert_eq!(value["columnCount"], 1);
    }
}
