//! Tabular record sets.
//!
//! A record set is stored column-wise: every column carries its name, its
//! inferred kind and one value per row. All columns have the same length.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::RoiError;

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Finite numeric value
    Number(f64),
    /// Categorical value
    Text(String),
    /// Empty cell
    Missing,
}

impl Value {
    /// Numeric payload, if any.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(x) => Some(*x),
            _ => None,
        }
    }

    /// Text payload, if any.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Hashable identity used for value counting. `None` for missing cells.
    pub(crate) fn key(&self) -> Option<ValueKey<'_>> {
        match self {
            // -0.0 and 0.0 count as the same value.
            Self::Number(x) => Some(ValueKey::Number((x + 0.0).to_bits())),
            Self::Text(s) => Some(ValueKey::Text(s)),
            Self::Missing => None,
        }
    }

    /// Whether this value belongs in a column of the given kind.
    fn fits(&self, kind: ColumnKind) -> bool {
        match (self, kind) {
            (Self::Missing, _) => true,
            (Self::Number(x), ColumnKind::Numeric) => x.is_finite(),
            (Self::Text(_), ColumnKind::Categorical) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(x) => write!(f, "{x}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::Missing => write!(f, "NA"),
        }
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        if x.is_finite() {
            Self::Number(x)
        } else {
            Self::Missing
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ValueKey<'a> {
    Number(u64),
    Text(&'a str),
}

/// Column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    kind: ColumnKind,
    values: Vec<Value>,
}

impl Column {
    /// Build a column, checking every value against the declared kind.
    ///
    /// # Errors
    /// Returns `RoiError::InvalidInput` if a value does not fit the kind.
    pub fn new(name: impl Into<String>, kind: ColumnKind, values: Vec<Value>) -> Result<Self, RoiError> {
        let name = name.into();
        if let Some(bad) = values.iter().position(|v| !v.fits(kind)) {
            return Err(RoiError::InvalidInput(format!(
                "column '{name}' is {kind:?} but row {bad} holds {}",
                values[bad]
            )));
        }
        Ok(Self { name, kind, values })
    }

    /// Numeric column from raw floats (non-finite values become missing).
    #[must_use]
    pub fn numeric(name: impl Into<String>, values: impl IntoIterator<Item = f64>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Numeric,
            values: values.into_iter().map(Value::from).collect(),
        }
    }

    /// Categorical column from string-like values.
    #[must_use]
    pub fn categorical<S: AsRef<str>>(name: impl Into<String>, values: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Categorical,
            values: values.into_iter().map(|s| Value::from(s.as_ref())).collect(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> ColumnKind {
        self.kind
    }

    #[must_use]
    pub fn is_numeric(&self) -> bool {
        self.kind == ColumnKind::Numeric
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn gather(&self, rows: &[usize]) -> Self {
        Self {
            name: self.name.clone(),
            kind: self.kind,
            values: rows.iter().map(|&i| self.values[i].clone()).collect(),
        }
    }
}

/// An ordered collection of rows sharing one schema.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSet {
    columns: Vec<Column>,
    index: HashMap<String, usize>,
    len: usize,
}

impl RecordSet {
    /// Assemble a record set from columns.
    ///
    /// # Errors
    /// Returns `RoiError::InvalidInput` on duplicate names or ragged columns.
    pub fn new(columns: Vec<Column>) -> Result<Self, RoiError> {
        let len = columns.first().map_or(0, Column::len);
        let mut index = HashMap::with_capacity(columns.len());

        for (i, column) in columns.iter().enumerate() {
            if column.len() != len {
                return Err(RoiError::InvalidInput(format!(
                    "column '{}' has {} rows, expected {len}",
                    column.name,
                    column.len()
                )));
            }
            if index.insert(column.name.clone(), i).is_some() {
                return Err(RoiError::InvalidInput(format!(
                    "duplicate column '{}'",
                    column.name
                )));
            }
        }

        Ok(Self { columns, index, len })
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.index.get(name).map(|&i| &self.columns[i])
    }

    /// Look up a column that must exist.
    ///
    /// # Errors
    /// Returns `RoiError::InvalidInput` naming the missing column.
    pub fn require(&self, name: &str) -> Result<&Column, RoiError> {
        self.column(name)
            .ok_or_else(|| RoiError::InvalidInput(format!("missing required column '{name}'")))
    }

    /// Check that all listed columns are present.
    ///
    /// # Errors
    /// Returns `RoiError::InvalidInput` listing every absent column.
    pub fn require_all(&self, names: &[&str]) -> Result<(), RoiError> {
        let missing: Vec<&str> = names
            .iter()
            .copied()
            .filter(|n| !self.index.contains_key(*n))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(RoiError::InvalidInput(format!(
                "missing required columns: {}",
                missing.join(", ")
            )))
        }
    }

    /// New record set holding the given rows, in the given order.
    ///
    /// Indices must be in bounds.
    #[must_use]
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            columns: self.columns.iter().map(|c| c.gather(rows)).collect(),
            index: self.index.clone(),
            len: rows.len(),
        }
    }

    /// Concatenate copies of this record set, one per entry of `overrides`,
    /// with the named columns overwritten by that entry's values.
    ///
    /// Every entry must list one value per name in `names`.
    ///
    /// # Errors
    /// Returns `RoiError::InvalidInput` if a name is missing or a value does not
    /// fit its column.
    pub fn expand_with_overrides(&self, names: &[&str], overrides: &[Vec<Value>]) -> Result<Self, RoiError> {
        let targets: Vec<usize> = names
            .iter()
            .map(|n| {
                self.index
                    .get(*n)
                    .copied()
                    .ok_or_else(|| RoiError::InvalidInput(format!("missing required column '{n}'")))
            })
            .collect::<Result<_, _>>()?;

        let total = self.len * overrides.len();
        let mut columns = Vec::with_capacity(self.columns.len());

        for (ci, column) in self.columns.iter().enumerate() {
            let slot = targets.iter().position(|&t| t == ci);
            let mut values = Vec::with_capacity(total);

            for entry in overrides {
                match slot {
                    Some(k) => {
                        let v = entry.get(k).ok_or_else(|| {
                            RoiError::InvalidInput(format!(
                                "override for '{}' is missing",
                                column.name
                            ))
                        })?;
                        values.extend(std::iter::repeat(v.clone()).take(self.len));
                    }
                    None => values.extend_from_slice(&column.values),
                }
            }

            columns.push(Column::new(column.name.clone(), column.kind, values)?);
        }

        Ok(Self {
            columns,
            index: self.index.clone(),
            len: total,
        })
    }

    /// Values of one row keyed by column name.
    #[must_use]
    pub fn row(&self, i: usize) -> Option<Vec<(&str, &Value)>> {
        (i < self.len).then(|| {
            self.columns
                .iter()
                .map(|c| (c.name.as_str(), &c.values[i]))
                .collect()
        })
    }
}
