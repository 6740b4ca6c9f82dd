//! Line codec for the persisted history file.
//!
//! Each entry is one line, `<timestamp ms>\t<base64 of UTF-8 text>`, so text
//! containing line breaks or tabs survives untouched. Files are written
//! newest-first.

use std::{num::ParseIntError, string::FromUtf8Error};

use base64::{Engine, engine::general_purpose::STANDARD};
use thiserror::Error;

use crate::Entry;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("record has no tab separator")]
    MissingSeparator,
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(#[source] ParseIntError),
    #[error("invalid base64 payload: {0}")]
    InvalidBase64(#[source] base64::DecodeError),
    #[error("payload is not UTF-8: {0}")]
    InvalidUtf8(#[source] FromUtf8Error),
}

pub fn encode_record(entry: &Entry) -> String {
    format!(
        "{}\t{}",
        entry.timestamp_unix_ms,
        STANDARD.encode(entry.text.as_bytes())
    )
}

pub fn decode_record(line: &str) -> Result<Entry, RecordError> {
    let (timestamp, payload) = line.split_once('\t').ok_or(RecordError::MissingSeparator)?;
    if timestamp.is_empty() {
        return Err(RecordError::MissingSeparator);
    }

    let timestamp_unix_ms = timestamp
        .parse::<u64>()
        .map_err(RecordError::InvalidTimestamp)?;
    let bytes = STANDARD
        .decode(payload.trim_end())
        .map_err(RecordError::InvalidBase64)?;
    let text = String::from_utf8(bytes).map_err(RecordError::InvalidUtf8)?;

    Ok(Entry {
        timestamp_unix_ms,
        text,
    })
}

/// Serializes up to `max_entries` of `entries` (already newest-first), one
/// line each, every line terminated by `\n`.
pub fn encode_history(entries: &[Entry], max_entries: usize) -> String {
    let mut out = String::with_capacity(entries.len().min(max_entries) * 64);
    for entry in entries.iter().take(max_entries) {
        out.push_str(&encode_record(entry));
        out.push('\n');
    }
    out
}

/// Parses file contents, skipping blank and malformed lines, and stops after
/// `max_entries` good records. Returns the entries and the number of lines
/// that were rejected.
pub fn decode_history(contents: &str, max_entries: usize) -> (Vec<Entry>, usize) {
    decode_history_bytes(contents.as_bytes(), max_entries)
}

/// Like [`decode_history`], but over raw file bytes. A line that is not
/// UTF-8 is rejected on its own; the rest of the file still loads.
pub fn decode_history_bytes(contents: &[u8], max_entries: usize) -> (Vec<Entry>, usize) {
    let mut entries = Vec::new();
    let mut rejected = 0;

    for raw in contents.split(|b| *b == b'\n') {
        if entries.len() >= max_entries {
            break;
        }
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let Ok(line) = std::str::from_utf8(raw) else {
            rejected += 1;
            continue;
        };
        if line.trim().is_empty() {
            continue;
        }
        match decode_record(line) {
            Ok(entry) => entries.push(entry),
            Err(_) => rejected += 1,
        }
    }

    (entries, rejected)
}
