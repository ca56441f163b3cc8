//! Core data model types for ingestion.
//!
//! A [`Layout`] (a list of typed [`Column`]s) describes the target table of a file family. The
//! row decoder turns each line of a file into a [`DecodedRow`] of [`Value`]s in layout order.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Semantic type of a layout column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ColumnType {
    /// Base-10 integer. Unparseable input decodes to [`Value::Null`].
    Integer,
    /// Free text, trimmed of surrounding whitespace.
    Text,
    /// Fixed-width code (state abbreviation, postal code). Trimmed, otherwise unmodified.
    Code {
        /// Declared width, used for the `CHAR(width)` column definition.
        width: u8,
    },
}

impl ColumnType {
    /// SQL type used when the store creates the table.
    pub fn sql_type(&self) -> String {
        match self {
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::Text => "TEXT".to_string(),
            ColumnType::Code { width } => format!("CHAR({width})"),
        }
    }
}

/// A single named, typed column in a [`Layout`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name in the target table.
    pub name: String,
    /// Column semantic type.
    #[serde(flatten)]
    pub column_type: ColumnType,
}

impl Column {
    /// Create a new column.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Integer)
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Text)
    }

    pub fn code(name: impl Into<String>, width: u8) -> Self {
        Self::new(name, ColumnType::Code { width })
    }
}

/// Ordered column list of a target table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Layout {
    /// Ordered list of columns.
    pub columns: Vec<Column>,
}

impl Layout {
    /// Create a new layout from columns.
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// Number of columns a decoded row must have.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Iterate column names in order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Returns the index of a column by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Returns the first column name that appears more than once.
    pub fn duplicate_column(&self) -> Option<&str> {
        self.columns.iter().enumerate().find_map(|(i, c)| {
            self.columns[..i]
                .iter()
                .any(|prev| prev.name == c.name)
                .then_some(c.name.as_str())
        })
    }
}

/// A single typed value in a [`DecodedRow`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Missing, empty or uncoercible value.
    Null,
    /// 64-bit signed integer.
    Int(i64),
    /// Text or code value.
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// One decoded line, with exactly one value per layout column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRow {
    /// Values in layout column order.
    pub values: Vec<Value>,
}

impl DecodedRow {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }
}

/// Single-byte field delimiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Delimiter(u8);

impl Delimiter {
    pub const COMMA: Delimiter = Delimiter(b',');
    pub const SEMICOLON: Delimiter = Delimiter(b';');
    pub const PIPE: Delimiter = Delimiter(b'|');
    pub const TAB: Delimiter = Delimiter(b'\t');
    pub const AT: Delimiter = Delimiter(b'@');

    /// Create a delimiter from an ASCII byte. Returns `None` for non-ASCII bytes, line
    /// terminators and NUL.
    pub fn new(byte: u8) -> Option<Self> {
        match byte {
            0 | b'\n' | b'\r' => None,
            b if b.is_ascii() => Some(Self(b)),
            _ => None,
        }
    }

    /// Parse a delimiter from its CLI form: a single ASCII character, or `\t` / `tab`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "\\t" | "tab" | "TAB" => Some(Self::TAB),
            _ => {
                let bytes = s.as_bytes();
                if bytes.len() == 1 {
                    Self::new(bytes[0])
                } else {
                    None
                }
            }
        }
    }

    pub fn as_byte(self) -> u8 {
        self.0
    }

    pub fn as_char(self) -> char {
        char::from(self.0)
    }
}

impl fmt::Display for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            b'\t' => f.write_str("\\t"),
            b => write!(f, "{}", char::from(b)),
        }
    }
}

impl Serialize for Delimiter {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Line terminator of the source files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineTerminator {
    /// `\n`. A stray `\r` before it stays part of the last field for strict loaders.
    #[default]
    Lf,
    /// `\r\n`.
    CrLf,
}

impl LineTerminator {
    pub fn as_str(self) -> &'static str {
        match self {
            LineTerminator::Lf => "\n",
            LineTerminator::CrLf => "\r\n",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimiter_parse_accepts_tab_aliases() {
        assert_eq!(Delimiter::parse("\\t"), Some(Delimiter::TAB));
        assert_eq!(Delimiter::parse("tab"), Some(Delimiter::TAB));
        assert_eq!(Delimiter::parse(";"), Some(Delimiter::SEMICOLON));
        assert_eq!(Delimiter::parse(";;"), None);
        assert_eq!(Delimiter::parse("\n"), None);
        assert_eq!(Delimiter::TAB.to_string(), "\\t");
    }

    #[test]
    fn layout_reports_duplicates() {
        let layout = Layout::new(vec![
            Column::integer("LOC_NU"),
            Column::code("UFE_SG", 2),
            Column::text("LOC_NU"),
        ]);
        assert_eq!(layout.duplicate_column(), Some("LOC_NU"));
        assert_eq!(layout.index_of("UFE_SG"), Some(1));
    }

    #[test]
    fn column_type_serde_shape() {
        let col: Column = serde_json::from_str(r#"{"name":"CEP","type":"code","width":8}"#).unwrap();
        assert_eq!(col, Column::code("CEP", 8));
        assert_eq!(col.column_type.sql_type(), "CHAR(8)");
    }
}
