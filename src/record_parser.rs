//! Parsing of field:value audit log text into sample records

use crate::errors::{EventGenError, Result};
use crate::record::{Record, SampleSet};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info};

/// A line starting a new record: `TIMESTAMP: "<anything>"`.
const RECORD_BOUNDARY: &str = r#"^TIMESTAMP: ".*""#;

fn boundary_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(RECORD_BOUNDARY).expect("record boundary pattern is valid"))
}

/// Splits raw audit text into records and fields.
///
/// Every physical line is handled on its own. A value that wraps onto
/// following lines is not re-joined; continuation lines are read as fields if
/// they contain a colon and dropped otherwise.
#[derive(Debug, Clone)]
pub struct AuditLogParser {
    boundary: Regex,
}

impl Default for AuditLogParser {
    fn default() -> Self {
        Self {
            boundary: boundary_pattern().clone(),
        }
    }
}

impl AuditLogParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a whole log into records, in file order.
    ///
    /// Lines before the first boundary form their own record, and the chunk
    /// pending at end of input is always flushed. Chunks that yield no fields
    /// are not emitted.
    pub fn parse(&self, raw_text: &str) -> SampleSet {
        let mut records = Vec::new();
        let mut current: Vec<&str> = Vec::new();

        for line in raw_text.lines() {
            if self.boundary.is_match(line) && !current.is_empty() {
                Self::flush(&mut records, &current);
                current.clear();
            }
            current.push(line.trim());
        }

        if !current.is_empty() {
            Self::flush(&mut records, &current);
        }

        debug!("Parsed {} records from {} bytes of input", records.len(), raw_text.len());
        SampleSet::new(records)
    }

    fn flush(records: &mut Vec<Record>, lines: &[&str]) {
        let record = parse_record(lines);
        if !record.is_empty() {
            records.push(record);
        }
    }
}

/// Extract fields from the lines of one record.
pub fn parse_record(lines: &[&str]) -> Record {
    let mut record = Record::new();

    for line in lines {
        if let Some((key, value)) = parse_field(line) {
            record.insert(key, value);
        }
    }

    record
}

/// Split a line at its first colon into a normalized key and a cleaned value.
/// Lines without a colon yield nothing.
pub fn parse_field(line: &str) -> Option<(String, String)> {
    let (raw_key, raw_value) = line.split_once(':')?;

    let key = normalize_key(raw_key);
    let value = strip_quotes(raw_value.trim());

    Some((key, value.to_string()))
}

/// `CLIENT TERMINAL` -> `client_terminal`
pub fn normalize_key(raw_key: &str) -> String {
    raw_key.trim().replace(' ', "_").to_lowercase()
}

/// Remove one leading and one trailing quote character, single or double.
fn strip_quotes(value: &str) -> &str {
    let value = value.strip_prefix(['\'', '"']).unwrap_or(value);
    value.strip_suffix(['\'', '"']).unwrap_or(value)
}

/// Read and parse a sample file.
pub async fn load_samples(path: impl AsRef<Path>) -> Result<SampleSet> {
    let path = path.as_ref();

    let raw_text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| EventGenError::SourceUnavailable {
            path: path.display().to_string(),
            source,
        })?;

    let samples = AuditLogParser::new().parse(&raw_text);
    info!("Loaded {} sample records from {}", samples.len(), path.display());

    Ok(samples)
}
