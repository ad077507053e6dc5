//! Error types for the event generator

use std::fmt;

pub type Result<T> = std::result::Result<T, EventGenError>;

#[derive(Debug)]
pub enum EventGenError {
    /// IO operation failed
    Io(std::io::Error),

    /// HTTP client could not be built or the request failed in transit
    Http(reqwest::Error),

    /// JSON serialization/deserialization failed
    Json(serde_json::Error),

    /// Configuration error
    Config(String),

    /// Sample input missing or unreadable
    SourceUnavailable {
        path: String,
        source: std::io::Error,
    },

    /// Size string with an unknown unit or no number
    InvalidSizeUnit(String),

    /// Time range string with an unknown unit or no number
    InvalidTimeUnit(String),

    /// A byte budget was requested but there is nothing to sample from
    EmptySampleSet,

    /// JSON text could not be decoded into a record
    MalformedPayload(String),

    /// Output format outside of json/xml
    UnsupportedEventFormat(String),

    /// Sink answered with a non-success status or the request never completed
    Delivery {
        status: Option<u16>,
        message: String,
    },
}

impl EventGenError {
    /// Whether the error should stop a run. Per-event failures are logged and
    /// the loop moves on to the next event.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            EventGenError::Delivery { .. } | EventGenError::MalformedPayload(_)
        )
    }
}

impl fmt::Display for EventGenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventGenError::Io(err) => write!(f, "IO error: {}", err),
            EventGenError::Http(err) => write!(f, "HTTP error: {}", err),
            EventGenError::Json(err) => write!(f, "JSON error: {}", err),
            EventGenError::Config(msg) => write!(f, "Configuration error: {}", msg),
            EventGenError::SourceUnavailable { path, source } => {
                write!(f, "Sample source {} unavailable: {}", path, source)
            }
            EventGenError::InvalidSizeUnit(value) => write!(
                f,
                "Invalid size '{}'. Use a whole number followed by B, KB, MB, GB or PB",
                value
            ),
            EventGenError::InvalidTimeUnit(value) => write!(
                f,
                "Invalid time range '{}'. Use 'm' for minutes, 'h' for hours, or 'd' for days",
                value
            ),
            EventGenError::EmptySampleSet => {
                write!(f, "No sample records available to generate events from")
            }
            EventGenError::MalformedPayload(msg) => write!(f, "Invalid JSON string: {}", msg),
            EventGenError::UnsupportedEventFormat(format) => write!(
                f,
                "Unsupported event format '{}'. Must be json or xml",
                format
            ),
            EventGenError::Delivery {
                status: Some(code),
                message,
            } => write!(f, "Failed to send data. Status code: {}: {}", code, message),
            EventGenError::Delivery {
                status: None,
                message,
            } => write!(f, "Failed to send data: {}", message),
        }
    }
}

impl std::error::Error for EventGenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EventGenError::Io(err) => Some(err),
            EventGenError::Http(err) => Some(err),
            EventGenError::Json(err) => Some(err),
            EventGenError::SourceUnavailable { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<std::io::Error> for EventGenError {
    fn from(err: std::io::Error) -> Self {
        EventGenError::Io(err)
    }
}

impl From<reqwest::Error> for EventGenError {
    fn from(err: reqwest::Error) -> Self {
        EventGenError::Http(err)
    }
}

impl From<serde_json::Error> for EventGenError {
    fn from(err: serde_json::Error) -> Self {
        EventGenError::Json(err)
    }
}
