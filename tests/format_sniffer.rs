use std::fs;

use dne_loader::encoding::SourceEncoding;
use dne_loader::ingestion::{DetectionFallback, SnifferConfig, sniff_delimiter};
use dne_loader::types::Delimiter;
use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, bytes).unwrap();
    path
}

#[test]
fn detects_semicolon_in_dne_header() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "LOG_LOCALIDADE.TXT",
        b"LOC_NU;UFE_SG;LOC_NO;CEP\n1;SP;Sao Paulo;01000000\n",
    );

    let detection = sniff_delimiter(&path, &SnifferConfig::default(), SourceEncoding::LATIN1);
    assert_eq!(detection.delimiter, Delimiter::SEMICOLON);
    assert!(detection.fallback.is_none());
}

#[test]
fn skips_leading_blank_lines() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "X.TXT", b"\n   \r\n\ta|b|c\n1;2\n");

    let detection = sniff_delimiter(&path, &SnifferConfig::default(), SourceEncoding::LATIN1);
    assert_eq!(detection.delimiter, Delimiter::PIPE);
}

#[test]
fn tab_is_detected_after_trimming() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "X.TXT", b"a\tb\tc\n");

    let detection = sniff_delimiter(&path, &SnifferConfig::default(), SourceEncoding::LATIN1);
    assert_eq!(detection.delimiter, Delimiter::TAB);
}

#[test]
fn at_sign_beats_other_candidates_on_equal_counts() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "X.TXT", b"a@b@c;d;e|f|g,h,i\n");

    let detection = sniff_delimiter(&path, &SnifferConfig::default(), SourceEncoding::LATIN1);
    assert_eq!(detection.delimiter, Delimiter::AT);
}

#[test]
fn empty_file_falls_back_to_default() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "EMPTY.TXT", b"");

    let detection = sniff_delimiter(&path, &SnifferConfig::default(), SourceEncoding::LATIN1);
    assert_eq!(detection.delimiter, Delimiter::SEMICOLON);
    assert_eq!(detection.fallback, Some(DetectionFallback::NoContent));
    assert!(!detection.is_warning());
}

#[test]
fn configured_default_is_used_when_nothing_matches() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "WORDS.TXT", b"just some words\n");
    let config = SnifferConfig {
        default: Delimiter::PIPE,
        ..SnifferConfig::default()
    };

    let detection = sniff_delimiter(&path, &config, SourceEncoding::LATIN1);
    assert_eq!(detection.delimiter, Delimiter::PIPE);
    assert_eq!(detection.fallback, Some(DetectionFallback::NoCandidate));
}

#[test]
fn unreadable_file_is_a_warning_not_an_error() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("GONE.TXT");

    let detection = sniff_delimiter(&missing, &SnifferConfig::default(), SourceEncoding::LATIN1);
    assert_eq!(detection.delimiter, Delimiter::SEMICOLON);
    assert!(matches!(detection.fallback, Some(DetectionFallback::Unreadable(_))));
    assert!(detection.is_warning());
}

#[test]
fn legacy_bytes_do_not_break_detection() {
    let dir = TempDir::new().unwrap();
    // "São Paulo" in latin1, followed by fields split by '|'.
    let path = write(&dir, "X.TXT", b"S\xe3o Paulo|SP|1\n");

    let detection = sniff_delimiter(&path, &SnifferConfig::default(), SourceEncoding::UTF8);
    assert_eq!(detection.delimiter, Delimiter::PIPE);
}
