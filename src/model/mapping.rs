use crate::model::SystemField;
use serde::de::Error as SerdeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// A reason why a mapping cannot be used to parse a file.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum MappingProblem {
    MissingDate,
    MissingDescription,
    MissingAmount,
    DuplicateColumn {
        column: usize,
        fields: Vec<SystemField>,
    },
    ColumnOutOfRange {
        field: SystemField,
        column: usize,
        columns: usize,
    },
}

impl Display for MappingProblem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MappingProblem::MissingDate => f.write_str("a date column must be mapped"),
            MappingProblem::MissingDescription => {
                f.write_str("a narration or merchant column must be mapped")
            }
            MappingProblem::MissingAmount => {
                f.write_str("an amount, withdrawal or deposit column must be mapped")
            }
            MappingProblem::DuplicateColumn { column, fields } => {
                let names: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
                write!(
                    f,
                    "column {column} is mapped to more than one field ({})",
                    names.join(", ")
                )
            }
            MappingProblem::ColumnOutOfRange {
                field,
                column,
                columns,
            } => write!(
                f,
                "{field} is mapped to column {column} but the file only has {columns} columns"
            ),
        }
    }
}

/// Returned when a mapping does not satisfy the minimum requirements for parsing.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct MappingError(Vec<MappingProblem>);

impl MappingError {
    pub fn problems(&self) -> &[MappingProblem] {
        &self.0
    }
}

impl Display for MappingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let problems: Vec<String> = self.0.iter().map(|p| p.to_string()).collect();
        write!(f, "Invalid field mapping: {}", problems.join("; "))
    }
}

impl StdError for MappingError {}

/// A column position, written as `col_N` when serialized.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ColumnSource(usize);

impl ColumnSource {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl Display for ColumnSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "col_{}", self.0)
    }
}

impl FromStr for ColumnSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().strip_prefix("col_").unwrap_or(s.trim());
        digits
            .parse::<usize>()
            .map(ColumnSource)
            .map_err(|_| format!("'{s}' is not a column reference, expected e.g. 'col_3' or '3'"))
    }
}

impl Serialize for ColumnSource {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ColumnSource {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ColumnSource::from_str(&s).map_err(D::Error::custom)
    }
}

/// Where a system field comes from: a column and, for date fields, an optional date format.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct FieldSource {
    pub source: ColumnSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl FieldSource {
    pub fn column(index: usize) -> Self {
        Self {
            source: ColumnSource(index),
            format: None,
        }
    }

    pub fn with_format(index: usize, format: impl Into<String>) -> Self {
        Self {
            source: ColumnSource(index),
            format: Some(format.into()),
        }
    }

    pub fn index(&self) -> usize {
        self.source.index()
    }
}

/// Maps system fields to the columns of a particular file layout.
///
/// Serializes as a JSON object keyed by field name, e.g.
/// `{"date": {"source": "col_0", "format": "DD/MM/YYYY"}, "narration": {"source": "col_1"}}`.
#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMapping(BTreeMap<SystemField, FieldSource>);

impl FieldMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: SystemField) -> Option<&FieldSource> {
        self.0.get(&field)
    }

    pub fn contains(&self, field: SystemField) -> bool {
        self.0.contains_key(&field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SystemField, &FieldSource)> {
        self.0.iter().map(|(k, v)| (*k, v))
    }

    /// Sets `field` without regard for other fields that use the same column.
    pub fn insert(&mut self, field: SystemField, source: FieldSource) -> Option<FieldSource> {
        self.0.insert(field, source)
    }

    /// Assigns `field` to the column in `source`, removing any other field that was mapped to that
    /// column so that a column is never claimed by two fields.
    pub fn assign(&mut self, field: SystemField, source: FieldSource) {
        let column = source.index();
        self.0.retain(|f, s| *f == field || s.index() != column);
        self.0.insert(field, source);
    }

    pub fn remove(&mut self, field: SystemField) -> Option<FieldSource> {
        self.0.remove(&field)
    }

    /// The field currently mapped to `column`, if any.
    pub fn field_for_column(&self, column: usize) -> Option<SystemField> {
        self.iter()
            .find(|(_, s)| s.index() == column)
            .map(|(f, _)| f)
    }

    /// Checks that the mapping can produce usable transactions: a date, a description and at
    /// least one amount-bearing field, with no column used twice. When `columns` is given, every
    /// mapped column must also exist.
    pub fn validate(&self, columns: Option<usize>) -> Result<(), MappingError> {
        let mut problems = Vec::new();
        if !self.contains(SystemField::Date) {
            problems.push(MappingProblem::MissingDate);
        }
        if !self.contains(SystemField::Narration) && !self.contains(SystemField::Merchant) {
            problems.push(MappingProblem::MissingDescription);
        }
        if !self.contains(SystemField::Amount)
            && !self.contains(SystemField::Withdrawal)
            && !self.contains(SystemField::Deposit)
        {
            problems.push(MappingProblem::MissingAmount);
        }

        let mut by_column: BTreeMap<usize, Vec<SystemField>> = BTreeMap::new();
        for (field, source) in self.iter() {
            by_column.entry(source.index()).or_default().push(field);
            if let Some(count) = columns {
                if source.index() >= count {
                    problems.push(MappingProblem::ColumnOutOfRange {
                        field,
                        column: source.index(),
                        columns: count,
                    });
                }
            }
        }
        for (column, fields) in by_column {
            if fields.len() > 1 {
                problems.push(MappingProblem::DuplicateColumn { column, fields });
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(MappingError(problems))
        }
    }
}

impl FromIterator<(SystemField, FieldSource)> for FieldMapping {
    fn from_iter<T: IntoIterator<Item = (SystemField, FieldSource)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
