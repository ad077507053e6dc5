//! Conversion of a byte budget and a time budget into an inter-event delay

use crate::record::SampleSet;
use serde::Serialize;
use std::time::Duration;
use tracing::warn;

/// Pacing parameters computed once per run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationPlan {
    /// Total bytes to emit
    pub byte_budget: u64,
    /// Seconds to spread them across
    pub time_budget: u64,
    /// Mean serialized size of one sample, in bytes
    pub average_sample_size: f64,
    /// `byte_budget / average_sample_size`, rounded down
    pub estimated_event_count: u64,
    /// Seconds to wait after each event
    pub delay_per_event: f64,
}

impl GenerationPlan {
    pub fn new(byte_budget: u64, time_budget: u64, average_sample_size: f64) -> Self {
        let estimated_event_count = if average_sample_size > 0.0 && average_sample_size.is_finite() {
            (byte_budget as f64 / average_sample_size).floor() as u64
        } else {
            0
        };

        let delay_per_event = if estimated_event_count > 0 {
            time_budget as f64 / estimated_event_count as f64
        } else {
            0.0
        };

        Self {
            byte_budget,
            time_budget,
            average_sample_size,
            estimated_event_count,
            delay_per_event,
        }
    }

    /// Plan for a sample pool, measuring samples as compact JSON.
    pub fn for_samples(samples: &SampleSet, byte_budget: u64, time_budget: u64) -> Self {
        Self::new(byte_budget, time_budget, average_sample_size(samples))
    }

    pub fn delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.delay_per_event).unwrap_or(Duration::ZERO)
    }
}

/// Arithmetic mean of each sample's JSON size in bytes; 0 for an empty pool.
pub fn average_sample_size(samples: &SampleSet) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }

    let total: usize = samples
        .records()
        .iter()
        .map(|record| match record.to_json() {
            Ok(text) => text.len(),
            Err(e) => {
                warn!("Could not measure sample size: {}", e);
                0
            }
        })
        .sum();

    total as f64 / samples.len() as f64
}
