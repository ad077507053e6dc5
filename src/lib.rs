//! Paced synthetic audit event generator
//!
//! This library parses field:value audit logs into sample records and replays
//! them as freshly timestamped events to a webhook, spreading a byte budget
//! evenly across a time window.

pub mod config;
pub mod emitter;
pub mod errors;
pub mod event;
pub mod pacing;
pub mod record;
pub mod record_parser;
pub mod transport;
pub mod xml;

pub use config::{Config, OutputFormat};
pub use emitter::{EmissionState, PacedEmitter, RunSummary};
pub use errors::{EventGenError, Result};
pub use event::{EventClock, Payload};
pub use pacing::GenerationPlan;
pub use record::{Record, SampleSet};
pub use record_parser::{AuditLogParser, load_samples};
pub use transport::{DeliveryResult, EventSink, HttpSink};
