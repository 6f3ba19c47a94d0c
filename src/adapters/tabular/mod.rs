//! Tabular adapter: Loads record sets from delimited text files.
//!
//! `.csv` files are comma separated, `.tsv` files tab separated. Any other
//! extension is rejected. The first line holds the column names.
//!
//! Column types are inferred: a column whose every non-missing cell parses
//! as a number is numeric, anything else is categorical. Empty cells and the
//! usual NA spellings become missing values.

use std::io::Read;
use std::path::Path;

use csv::ReaderBuilder;

use crate::domain::{Column, ColumnKind, RecordSet, Value};
use crate::RoiError;

const MISSING_TOKENS: &[&str] = &[
    "", "NA", "N/A", "n/a", "NaN", "nan", "null", "NULL", "None", "#N/A",
];

/// Field separator of a supported file type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Comma,
    Tab,
}

impl Delimiter {
    /// Pick the delimiter from a file extension.
    ///
    /// # Errors
    /// Returns `RoiError::InvalidInput` for anything but `csv` or `tsv`.
    pub fn from_path(path: &Path) -> Result<Self, RoiError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("csv") => Ok(Self::Comma),
            Some("tsv") => Ok(Self::Tab),
            _ => Err(RoiError::InvalidInput(format!(
                "unsupported file type {path:?}: expected .csv or .tsv"
            ))),
        }
    }

    fn byte(self) -> u8 {
        match self {
            Self::Comma => b',',
            Self::Tab => b'\t',
        }
    }
}

/// Load a CSV/TSV file into a record set.
///
/// # Errors
/// Returns error if the extension is unsupported, the file cannot be read, or
/// the content is not a rectangular table with unique column names.
pub fn load_records<P: AsRef<Path>>(path: P) -> Result<RecordSet, RoiError> {
    let path = path.as_ref();
    let delimiter = Delimiter::from_path(path)?;
    let file = std::fs::File::open(path)?;
    let records = read_records(file, delimiter)?;
    tracing::info!(
        "Loaded {} rows x {} columns from {:?}",
        records.len(),
        records.columns().len(),
        path
    );
    Ok(records)
}

/// Parse delimited text into a record set.
///
/// # Errors
/// Returns `RoiError::InvalidInput` on malformed input.
pub fn read_records<R: Read>(reader: R, delimiter: Delimiter) -> Result<RecordSet, RoiError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter.byte())
        .from_reader(reader);

    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if headers.is_empty() || headers.iter().all(String::is_empty) {
        return Err(RoiError::InvalidInput("missing header row".into()));
    }

    let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for (line, result) in reader.records().enumerate() {
        let record = result.map_err(csv_error)?;
        if record.len() != headers.len() {
            return Err(RoiError::InvalidInput(format!(
                "row {} has {} fields, expected {}",
                line + 1,
                record.len(),
                headers.len()
            )));
        }
        for (column, field) in cells.iter_mut().zip(record.iter()) {
            column.push(field.trim().to_string());
        }
    }

    let columns = headers
        .into_iter()
        .zip(cells)
        .map(|(name, raw)| infer_column(name, raw))
        .collect::<Result<Vec<_>, _>>()?;

    RecordSet::new(columns)
}

fn is_missing(cell: &str) -> bool {
    MISSING_TOKENS.contains(&cell)
}

fn infer_column(name: String, raw: Vec<String>) -> Result<Column, RoiError> {
    let numeric = raw
        .iter()
        .filter(|c| !is_missing(c))
        .all(|c| c.parse::<f64>().is_ok());

    if numeric {
        let values = raw
            .iter()
            .map(|c| c.parse::<f64>().map_or(Value::Missing, Value::from))
            .collect();
        Column::new(name, ColumnKind::Numeric, values)
    } else {
        let values = raw
            .into_iter()
            .map(|c| if is_missing(&c) { Value::Missing } else { Value::Text(c) })
            .collect();
        Column::new(name, ColumnKind::Categorical, values)
    }
}

fn csv_error(e: csv::Error) -> RoiError {
    RoiError::InvalidInput(format!("malformed table: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_infers_column_kinds() {
        let data = "age,plan,churned\n30,gold,yes\n,basic,no\n45.5,NA,yes\n";
        let rs = read_records(data.as_bytes(), Delimiter::Comma).expect("parse");

        assert_eq!(rs.len(), 3);
        let age = rs.column("age").expect("age");
        assert!(age.is_numeric());
        assert_eq!(age.values()[1], Value::Missing);
        assert_eq!(age.values()[2].as_f64(), Some(45.5));

        let plan = rs.column("plan").expect("plan");
        assert_eq!(plan.kind(), ColumnKind::Categorical);
        assert_eq!(plan.values()[2], Value::Missing);
    }

    #[test]
    fn test_tab_separated() {
        let data = "x\ty\n1\ta\n2\tb\n";
        let rs = read_records(data.as_bytes(), Delimiter::Tab).expect("parse");
        assert_eq!(rs.column_names(), vec!["x", "y"]);
    }

    #[test]
    fn test_ragged_row_rejected() {
        let data = "x,y\n1,2\n3\n";
        assert!(read_records(data.as_bytes(), Delimiter::Comma).is_err());
    }

    #[test]
    fn test_extension_dispatch() {
        assert_eq!(Delimiter::from_path(Path::new("a.CSV")).ok(), Some(Delimiter::Comma));
        assert_eq!(Delimiter::from_path(Path::new("a.tsv")).ok(), Some(Delimiter::Tab));
        assert!(matches!(
            Delimiter::from_path(Path::new("a.xlsx")),
            Err(RoiError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("data.tsv");
        std::fs::write(&path, "a\tb\n1\t2\n").expect("write");
        let rs = load_records(&path).expect("load");
        assert_eq!(rs.len(), 1);
    }
}
