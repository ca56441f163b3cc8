//! Delimiter detection.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::encoding::SourceEncoding;
use crate::types::Delimiter;

/// Candidate delimiters and the fallback used when none of them occurs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnifferConfig {
    /// Candidates in priority order: on equal counts, the earlier one wins.
    pub candidates: Vec<Delimiter>,
    /// Returned when no candidate occurs, the file has no content, or it cannot be read.
    pub default: Delimiter,
}

impl Default for SnifferConfig {
    /// `@`, `;`, `|`, TAB, `,` in that priority order; default `;`.
    fn default() -> Self {
        Self {
            candidates: vec![
                Delimiter::AT,
                Delimiter::SEMICOLON,
                Delimiter::PIPE,
                Delimiter::TAB,
                Delimiter::COMMA,
            ],
            default: Delimiter::SEMICOLON,
        }
    }
}

/// Why the sniffer fell back to the default delimiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionFallback {
    /// The file has no line with non-whitespace content.
    NoContent,
    /// The first non-empty line contains none of the candidates.
    NoCandidate,
    /// The file could not be opened or read.
    Unreadable(String),
}

impl fmt::Display for DetectionFallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionFallback::NoContent => f.write_str("file has no non-empty line"),
            DetectionFallback::NoCandidate => f.write_str("no candidate delimiter in first line"),
            DetectionFallback::Unreadable(cause) => write!(f, "file could not be read: {cause}"),
        }
    }
}

/// Sniffer result: always a delimiter, plus the reason when it is the default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub delimiter: Delimiter,
    pub fallback: Option<DetectionFallback>,
}

impl Detection {
    /// True when reading the file failed; the run treats this as a warning.
    pub fn is_warning(&self) -> bool {
        matches!(self.fallback, Some(DetectionFallback::Unreadable(_)))
    }
}

/// Detect the field delimiter of `path` from its first non-empty line.
///
/// Never fails: read errors produce the default delimiter with
/// [`DetectionFallback::Unreadable`].
pub fn sniff_delimiter(path: impl AsRef<Path>, config: &SnifferConfig, encoding: SourceEncoding) -> Detection {
    let path = path.as_ref();
    match first_content_line(path, encoding) {
        Ok(Some(line)) => detect_in_line(&line, config),
        Ok(None) => Detection {
            delimiter: config.default,
            fallback: Some(DetectionFallback::NoContent),
        },
        Err(err) => {
            log::warn!("cannot sniff delimiter of {}: {err}", path.display());
            Detection {
                delimiter: config.default,
                fallback: Some(DetectionFallback::Unreadable(err.to_string())),
            }
        }
    }
}

/// Pick the candidate with the strictly highest count in `line` (already trimmed).
pub fn detect_in_line(line: &str, config: &SnifferConfig) -> Detection {
    let mut best: Option<(Delimiter, usize)> = None;
    for &candidate in &config.candidates {
        let count = line.bytes().filter(|&b| b == candidate.as_byte()).count();
        // Strictly greater keeps the earlier candidate on ties.
        if count > 0 && best.is_none_or(|(_, top)| count > top) {
            best = Some((candidate, count));
        }
    }

    match best {
        Some((delimiter, _)) => Detection {
            delimiter,
            fallback: None,
        },
        None => Detection {
            delimiter: config.default,
            fallback: Some(DetectionFallback::NoCandidate),
        },
    }
}

fn first_content_line(path: &Path, encoding: SourceEncoding) -> std::io::Result<Option<String>> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut raw = Vec::new();
    loop {
        raw.clear();
        if reader.read_until(b'\n', &mut raw)? == 0 {
            return Ok(None);
        }
        let decoded = encoding.decode_lossy(&raw);
        let trimmed = decoded.trim();
        if !trimmed.is_empty() {
            return Ok(Some(trimmed.to_owned()));
        }
    }
}
