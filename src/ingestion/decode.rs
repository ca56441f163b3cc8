//! Tolerant row decoding for the row-by-row path.
//!
//! Unlike a store's bulk loader, the decoder accepts ragged rows and garbage in numeric fields:
//! short rows are padded with nulls, extra fields are dropped, and anything that does not parse
//! as a 32-bit integer becomes null. Lines that cannot be decoded as text, or that would not fit
//! their fixed-width code columns, are rejected one by one.

use thiserror::Error;

use crate::encoding::SourceEncoding;
use crate::store::Overrides;
use crate::types::{ColumnType, DecodedRow, Delimiter, Layout, Value};

/// Why a single line was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    /// The bytes are not valid in the source encoding.
    #[error("line is not valid {encoding}")]
    Encoding { encoding: String },

    /// The line contains a NUL or another control character.
    #[error("control character U+{code:04X} at byte {position}")]
    ControlCharacter { position: usize, code: u32 },

    /// A code field is longer than its column width, typically after a delimiter collision
    /// shifted the fields.
    #[error("value of {column} has {length} characters, column holds {width}")]
    CodeTooLong {
        column: String,
        width: u8,
        length: usize,
    },
}

/// An override names a column the layout does not have, or its literal does not fit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid override for column '{column}': {message}")]
pub struct InvalidOverride {
    pub column: String,
    pub message: String,
}

/// Decodes raw lines of one file into [`DecodedRow`]s of one layout.
#[derive(Debug, Clone)]
pub struct RowDecoder<'a> {
    layout: &'a Layout,
    delimiter: Delimiter,
    encoding: SourceEncoding,
    /// Layout indexes fed from the file, in field order.
    source_idxs: Vec<usize>,
    /// Layout indexes fed from overrides.
    fixed: Vec<(usize, Value)>,
}

impl<'a> RowDecoder<'a> {
    /// Build a decoder. Override columns are filled with their literal and are not expected in
    /// the file; the remaining columns map positionally onto the file's fields.
    pub fn new(
        layout: &'a Layout,
        overrides: &Overrides,
        delimiter: Delimiter,
        encoding: SourceEncoding,
    ) -> Result<Self, InvalidOverride> {
        let mut fixed = Vec::with_capacity(overrides.len());
        for (column, literal) in overrides {
            let idx = layout.index_of(column).ok_or_else(|| InvalidOverride {
                column: column.clone(),
                message: "not part of the layout".to_string(),
            })?;
            let target = &layout.columns[idx];
            let value = coerce(&target.column_type, literal);
            check_width(&target.column_type, &target.name, &value).map_err(|err| {
                InvalidOverride {
                    column: column.clone(),
                    message: err.to_string(),
                }
            })?;
            fixed.push((idx, value));
        }

        let source_idxs = (0..layout.len())
            .filter(|idx| !fixed.iter().any(|(f, _)| f == idx))
            .collect();

        Ok(Self {
            layout,
            delimiter,
            encoding,
            source_idxs,
            fixed,
        })
    }

    /// Names of the columns the file's fields map to, in order.
    pub fn source_columns(&self) -> Vec<&'a str> {
        let layout = self.layout;
        self.source_idxs
            .iter()
            .map(|&idx| layout.columns[idx].name.as_str())
            .collect()
    }

    /// Decode a raw line (without its `\n`; a trailing `\r` is dropped here).
    pub fn decode_raw(&self, raw: &[u8]) -> Result<DecodedRow, RowError> {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let line = self
            .encoding
            .decode_strict(raw)
            .ok_or_else(|| RowError::Encoding {
                encoding: self.encoding.to_string(),
            })?;
        self.decode_line(&line)
    }

    /// Decode an already decoded text line.
    pub fn decode_line(&self, line: &str) -> Result<DecodedRow, RowError> {
        if let Some((position, c)) = line
            .char_indices()
            .find(|&(_, c)| (c as u32) < 0x20 && c != '\t')
        {
            return Err(RowError::ControlCharacter {
                position,
                code: c as u32,
            });
        }

        let mut values = vec![Value::Null; self.layout.len()];
        let mut fields = line.split(self.delimiter.as_char());
        for &idx in &self.source_idxs {
            match fields.next() {
                Some(raw) => {
                    let column = &self.layout.columns[idx];
                    let value = coerce(&column.column_type, raw);
                    check_width(&column.column_type, &column.name, &value)?;
                    values[idx] = value;
                }
                // Short row: the rest stays null.
                None => break,
            }
        }

        let extra = fields.count();
        if extra > 0 {
            log::trace!("ignoring {extra} extra field(s)");
        }

        for (idx, value) in &self.fixed {
            values[*idx] = value.clone();
        }

        Ok(DecodedRow::new(values))
    }
}

fn check_width(column_type: &ColumnType, name: &str, value: &Value) -> Result<(), RowError> {
    if let (ColumnType::Code { width }, Value::Text(s)) = (column_type, value) {
        let length = s.chars().count();
        if length > usize::from(*width) {
            return Err(RowError::CodeTooLong {
                column: name.to_string(),
                width: *width,
                length,
            });
        }
    }
    Ok(())
}

/// Defensive coercion of one field. Never fails.
///
/// - integers: empty, `NULL`, non-numeric and out-of-range input (the columns are 32-bit)
///   become [`Value::Null`]
/// - text and codes: trimmed
pub fn coerce(column_type: &ColumnType, raw: &str) -> Value {
    let trimmed = raw.trim();
    match column_type {
        ColumnType::Integer => {
            if trimmed.is_empty() || trimmed == "NULL" {
                return Value::Null;
            }
            trimmed
                .parse::<i32>()
                .map(|v| Value::Int(i64::from(v)))
                .unwrap_or(Value::Null)
        }
        ColumnType::Text | ColumnType::Code { .. } => Value::Text(trimmed.to_owned()),
    }
}
