//! Source text encoding of the flat files.

use std::borrow::Cow;
use std::fmt;

use encoding_rs::Encoding;
use serde::Serialize;

/// Legacy single-byte encoding the input files are written in.
///
/// Keeps the label the operator configured (store backends need it to name the encoding on
/// their side) next to the resolved [`encoding_rs`] decoder.
#[derive(Clone, Copy)]
pub struct SourceEncoding {
    label: &'static str,
    encoding: &'static Encoding,
}

impl SourceEncoding {
    /// ISO-8859-1, which DNE exports use. Decoded as windows-1252, as browsers do.
    pub const LATIN1: SourceEncoding = SourceEncoding {
        label: "latin1",
        encoding: encoding_rs::WINDOWS_1252,
    };

    pub const UTF8: SourceEncoding = SourceEncoding {
        label: "utf-8",
        encoding: encoding_rs::UTF_8,
    };

    /// Resolve an encoding label (`latin1`, `iso-8859-1`, `windows-1252`, `utf-8`, ...).
    pub fn for_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_ascii_lowercase();
        let encoding = Encoding::for_label(normalized.as_bytes())?;
        let label = match normalized.as_str() {
            "latin1" | "latin-1" | "iso-8859-1" | "iso8859-1" | "l1" => "latin1",
            _ if encoding == encoding_rs::UTF_8 => "utf-8",
            _ => encoding.name(),
        };
        Some(Self { label, encoding })
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Encoding name understood by Postgres `COPY ... ENCODING`.
    pub fn postgres_name(&self) -> String {
        match self.label {
            "latin1" => "LATIN1".to_string(),
            "UTF-8" | "utf-8" => "UTF8".to_string(),
            other => other
                .strip_prefix("windows-")
                .map(|cp| format!("WIN{cp}"))
                .unwrap_or_else(|| other.replace('-', "").to_ascii_uppercase()),
        }
    }

    /// Decode with replacement characters for malformed sequences.
    pub fn decode_lossy<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        self.encoding.decode_without_bom_handling(bytes).0
    }

    /// Decode strictly. Returns `None` when the input is malformed for this encoding.
    pub fn decode_strict<'a>(&self, bytes: &'a [u8]) -> Option<Cow<'a, str>> {
        self.encoding
            .decode_without_bom_handling_and_without_replacement(bytes)
    }
}

impl Default for SourceEncoding {
    fn default() -> Self {
        Self::LATIN1
    }
}

impl fmt::Debug for SourceEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceEncoding")
            .field("label", &self.label)
            .field("encoding", &self.encoding.name())
            .finish()
    }
}

impl fmt::Display for SourceEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label)
    }
}

impl PartialEq for SourceEncoding {
    fn eq(&self, other: &Self) -> bool {
        self.label == other.label && self.encoding == other.encoding
    }
}

impl Eq for SourceEncoding {}

impl Serialize for SourceEncoding {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin1_labels_resolve_to_latin1() {
        for label in ["latin1", "ISO-8859-1", " l1 "] {
            let enc = SourceEncoding::for_label(label).unwrap();
            assert_eq!(enc, SourceEncoding::LATIN1);
            assert_eq!(enc.postgres_name(), "LATIN1");
        }
        assert_eq!(
            SourceEncoding::for_label("windows-1252").unwrap().postgres_name(),
            "WIN1252"
        );
        assert_eq!(SourceEncoding::for_label("utf8").unwrap().postgres_name(), "UTF8");
        assert!(SourceEncoding::for_label("klingon").is_none());
    }

    #[test]
    fn utf8_aliases_resolve_to_utf8() {
        for label in ["utf-8", "UTF8", " unicode-1-1-utf-8 "] {
            assert_eq!(SourceEncoding::for_label(label).unwrap(), SourceEncoding::UTF8);
        }
    }

    #[test]
    fn latin1_decodes_every_byte() {
        let decoded = SourceEncoding::LATIN1.decode_strict(b"S\xe3o Paulo").unwrap();
        assert_eq!(decoded, "São Paulo");
    }

    #[test]
    fn utf8_strict_rejects_latin1_bytes() {
        assert!(SourceEncoding::UTF8.decode_strict(b"S\xe3o").is_none());
        assert_eq!(SourceEncoding::UTF8.decode_lossy(b"S\xe3o"), "S\u{FFFD}o");
    }
}
