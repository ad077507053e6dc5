//! Synthetic events and their wire representations

use crate::errors::Result;
use crate::record::Record;
use crate::xml::{self, XmlElement};
use chrono::{SecondsFormat, Utc};
use chrono_tz::Tz;

pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Source of event timestamps in a configured zone.
#[derive(Debug, Clone, Copy)]
pub struct EventClock {
    tz: Tz,
}

impl Default for EventClock {
    fn default() -> Self {
        Self { tz: Tz::UTC }
    }
}

impl EventClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Current instant as RFC 3339 with microseconds and a numeric offset,
    /// e.g. `2024-03-01T10:15:00.123456+00:00`.
    pub fn now(&self) -> String {
        Utc::now()
            .with_timezone(&self.tz)
            .fixed_offset()
            .to_rfc3339_opts(SecondsFormat::Micros, false)
    }
}

/// Copy a sample and stamp it with the current instant.
pub fn synthesize_event(sample: &Record, clock: &EventClock) -> Record {
    let mut event = sample.clone();
    event.insert(TIMESTAMP_FIELD, clock.now());
    event
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Json,
    Xml,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Json => "application/json",
            ContentType::Xml => "application/xml",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event in one of the forms it can be handed to a sink.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// In-memory record, sent as JSON
    Structured(Record),
    /// Element tree, sent as pretty XML
    Xml(XmlElement),
    /// Pre-serialized JSON or XML
    Text(String),
}

impl Payload {
    /// Content type for the representation. Raw text is XML when its first
    /// non-whitespace character is `<`, JSON otherwise.
    pub fn content_type(&self) -> ContentType {
        match self {
            Payload::Structured(_) => ContentType::Json,
            Payload::Xml(_) => ContentType::Xml,
            Payload::Text(text) if text.trim_start().starts_with('<') => ContentType::Xml,
            Payload::Text(_) => ContentType::Json,
        }
    }

    /// Body text sent on the wire.
    pub fn body(&self) -> Result<String> {
        match self {
            Payload::Structured(record) => Ok(record.to_json()?),
            Payload::Xml(element) => Ok(xml::xml_to_text(element)),
            Payload::Text(text) => Ok(text.clone()),
        }
    }
}
