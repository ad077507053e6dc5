//! Paced emission loop

use crate::config::OutputFormat;
use crate::errors::{EventGenError, Result};
use crate::event::{EventClock, Payload, synthesize_event};
use crate::pacing::GenerationPlan;
use crate::record::SampleSet;
use crate::transport::EventSink;
use crate::xml;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Minimum spacing between progress reports
pub const REPORT_INTERVAL: Duration = Duration::from_secs(60);

/// Counters for one run. Owned by the loop driving it.
#[derive(Debug, Clone)]
pub struct EmissionState {
    pub total_bytes_emitted: u64,
    pub event_count: u64,
    pub delivered: u64,
    pub failed: u64,
    pub skipped: u64,
    pub reports: u64,
    pub run_start_instant: Instant,
    pub last_report_instant: Instant,
    elapsed_minutes: u64,
}

impl EmissionState {
    pub fn new(now: Instant) -> Self {
        Self {
            total_bytes_emitted: 0,
            event_count: 0,
            delivered: 0,
            failed: 0,
            skipped: 0,
            reports: 0,
            run_start_instant: now,
            last_report_instant: now,
            elapsed_minutes: 0,
        }
    }

    pub fn record_event(&mut self, bytes: usize) {
        self.event_count += 1;
        self.total_bytes_emitted += bytes as u64;
    }

    pub fn budget_reached(&self, byte_budget: u64) -> bool {
        self.total_bytes_emitted >= byte_budget
    }

    /// Elapsed whole minutes if a report is due at `now`, at most once per
    /// `interval`.
    pub fn report_due(&mut self, now: Instant, interval: Duration) -> Option<u64> {
        if now.saturating_duration_since(self.last_report_instant) < interval {
            return None;
        }

        self.last_report_instant = now;
        self.reports += 1;
        self.elapsed_minutes = now.saturating_duration_since(self.run_start_instant).as_secs() / 60;
        Some(self.elapsed_minutes)
    }

    /// Minutes as of the latest report
    pub fn elapsed_minutes(&self) -> u64 {
        self.elapsed_minutes
    }

    pub fn summary(&self, now: Instant, cancelled: bool) -> RunSummary {
        RunSummary {
            event_count: self.event_count,
            total_bytes_emitted: self.total_bytes_emitted,
            delivered: self.delivered,
            failed: self.failed,
            skipped: self.skipped,
            reports: self.reports,
            elapsed: now.saturating_duration_since(self.run_start_instant),
            cancelled,
        }
    }
}

/// Final counters of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub event_count: u64,
    pub total_bytes_emitted: u64,
    pub delivered: u64,
    pub failed: u64,
    pub skipped: u64,
    pub reports: u64,
    pub elapsed: Duration,
    pub cancelled: bool,
}

/// Drives sampling, synthesis, transcoding and dispatch under a plan.
pub struct PacedEmitter<S: EventSink> {
    sink: S,
    format: OutputFormat,
    clock: EventClock,
    rng: StdRng,
    report_interval: Duration,
    run_id: String,
}

impl<S: EventSink> PacedEmitter<S> {
    pub fn new(sink: S, format: OutputFormat, clock: EventClock) -> Self {
        Self {
            sink,
            format,
            clock,
            rng: StdRng::from_os_rng(),
            report_interval: REPORT_INTERVAL,
            run_id: Uuid::new_v4().to_string(),
        }
    }

    /// Deterministic sampling
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Emit events until the byte budget is met or `cancel` fires.
    ///
    /// Sizes are measured on the JSON form before any XML re-encoding. The
    /// final event may overshoot the budget; nothing is trimmed to fit.
    #[instrument(skip_all, fields(run_id = %self.run_id, format = %self.format))]
    pub async fn run(
        &mut self,
        samples: &SampleSet,
        plan: &GenerationPlan,
        cancel: &CancellationToken,
    ) -> Result<RunSummary> {
        if plan.byte_budget > 0 && samples.is_empty() {
            return Err(EventGenError::EmptySampleSet);
        }

        let delay = plan.delay();
        info!(
            "Starting generation: {} bytes over {}s, ~{} events of {:.1} bytes, {:.3}s between events",
            plan.byte_budget,
            plan.time_budget,
            plan.estimated_event_count,
            plan.average_sample_size,
            plan.delay_per_event
        );

        let mut state = EmissionState::new(Instant::now());
        let mut cancelled = false;

        while !state.budget_reached(plan.byte_budget) {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let Some(sample) = samples.choose(&mut self.rng) else {
                return Err(EventGenError::EmptySampleSet);
            };

            let event = synthesize_event(sample, &self.clock);
            let json = event.to_json()?;
            state.record_event(json.len());

            match self.prepare_payload(json) {
                Ok(payload) => self.deliver(&payload, &mut state).await?,
                Err(e) if !e.is_fatal() => {
                    state.skipped += 1;
                    warn!("Skipping event {}: {}", state.event_count, e);
                }
                Err(e) => return Err(e),
            }

            if !delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        cancelled = true;
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            if let Some(minutes) = state.report_due(Instant::now(), self.report_interval) {
                info!(
                    "Progress: {} of {} bytes after {} minute(s), {} delivered, {} failed",
                    state.total_bytes_emitted,
                    plan.byte_budget,
                    minutes,
                    state.delivered,
                    state.failed
                );
            }

            info!(
                "Sent {} events, {} bytes in {} minute(s).",
                state.event_count,
                state.total_bytes_emitted,
                state.elapsed_minutes()
            );
        }

        let summary = state.summary(Instant::now(), cancelled);
        if cancelled {
            info!(
                "Generation cancelled after {} events, {} bytes",
                summary.event_count, summary.total_bytes_emitted
            );
        } else {
            info!(
                "Generation finished: {} events, {} bytes in {:.1}s ({} delivered, {} failed, {} skipped)",
                summary.event_count,
                summary.total_bytes_emitted,
                summary.elapsed.as_secs_f64(),
                summary.delivered,
                summary.failed,
                summary.skipped
            );
        }

        Ok(summary)
    }

    /// Wire representation for the configured format.
    fn prepare_payload(&self, json: String) -> Result<Payload> {
        match self.format {
            OutputFormat::Json => Ok(Payload::Text(json)),
            OutputFormat::Xml => xml::json_text_to_xml(&json).map(Payload::Xml),
        }
    }

    async fn deliver(&self, payload: &Payload, state: &mut EmissionState) -> Result<()> {
        match self.sink.dispatch(payload).await {
            Ok(result) => {
                state.delivered += 1;
                debug!(
                    "Delivered event {} ({} bytes as {}) in {}ms",
                    state.event_count,
                    result.bytes_sent,
                    result.content_type,
                    result.duration.as_millis()
                );
                Ok(())
            }
            Err(e) if !e.is_fatal() => {
                state.failed += 1;
                warn!("{}", e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ContentType;
    use crate::record::Record;
    use crate::transport::DeliveryResult;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        payloads: Mutex<Vec<Payload>>,
        fail_with: Option<u16>,
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn dispatch(&self, payload: &Payload) -> Result<DeliveryResult> {
            self.payloads.lock().await.push(payload.clone());

            if let Some(status) = self.fail_with {
                return Err(EventGenError::Delivery {
                    status: Some(status),
                    message: "rejected".to_string(),
                });
            }

            Ok(DeliveryResult {
                status: 200,
                content_type: payload.content_type(),
                bytes_sent: payload.body()?.len(),
                duration: Duration::ZERO,
            })
        }
    }

    fn samples() -> SampleSet {
        SampleSet::new(vec![
            [("timestamp", "t"), ("a", "1")].into_iter().collect::<Record>(),
        ])
    }

    fn emitter(sink: RecordingSink, format: OutputFormat) -> PacedEmitter<RecordingSink> {
        PacedEmitter::new(sink, format, EventClock::default()).with_seed(42)
    }

    #[test]
    fn test_report_due_at_most_once_per_interval() {
        let start = Instant::now();
        let mut state = EmissionState::new(start);

        assert_eq!(state.report_due(start + Duration::from_secs(59), REPORT_INTERVAL), None);
        assert_eq!(state.report_due(start + Duration::from_secs(61), REPORT_INTERVAL), Some(1));
        assert_eq!(state.report_due(start + Duration::from_secs(100), REPORT_INTERVAL), None);
        assert_eq!(state.report_due(start + Duration::from_secs(125), REPORT_INTERVAL), Some(2));
        assert_eq!(state.elapsed_minutes(), 2);
    }

    #[tokio::test]
    async fn test_zero_budget_emits_nothing() {
        let mut emitter = emitter(RecordingSink::default(), OutputFormat::Json);
        let plan = GenerationPlan::new(0, 60, 10.0);

        let summary = emitter
            .run(&SampleSet::default(), &plan, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.event_count, 0);
        assert!(emitter.sink().payloads.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_sample_set_with_budget_fails() {
        let mut emitter = emitter(RecordingSink::default(), OutputFormat::Json);
        let plan = GenerationPlan::for_samples(&SampleSet::default(), 1024, 60);

        let result = emitter
            .run(&SampleSet::default(), &plan, &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(EventGenError::EmptySampleSet)));
    }

    #[tokio::test]
    async fn test_unthrottled_run_stops_at_budget_with_bounded_overshoot() {
        let samples = samples();
        let mut emitter = emitter(RecordingSink::default(), OutputFormat::Json);
        // Budget smaller than one sample: no pacing, at least one event.
        let plan = GenerationPlan::new(300, 3600, 1000.0);
        assert_eq!(plan.delay_per_event, 0.0);

        let summary = emitter
            .run(&samples, &plan, &CancellationToken::new())
            .await
            .unwrap();

        let payloads = emitter.sink().payloads.lock().await;
        let sizes: Vec<u64> = payloads
            .iter()
            .map(|p| p.body().unwrap().len() as u64)
            .collect();
        let last = *sizes.last().unwrap();

        assert_eq!(summary.event_count as usize, payloads.len());
        assert_eq!(summary.total_bytes_emitted, sizes.iter().sum::<u64>());
        assert!(summary.total_bytes_emitted >= 300);
        assert!(summary.total_bytes_emitted - last < 300);
        assert_eq!(summary.delivered, summary.event_count);
    }

    #[tokio::test]
    async fn test_xml_format_dispatches_trees() {
        let samples = samples();
        let mut emitter = emitter(RecordingSink::default(), OutputFormat::Xml);
        let plan = GenerationPlan::new(1, 60, 0.0);

        let summary = emitter
            .run(&samples, &plan, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.event_count, 1);

        let payloads = emitter.sink().payloads.lock().await;
        match &payloads[0] {
            Payload::Xml(root) => {
                assert_eq!(root.name, xml::ROOT_ELEMENT);
                assert_eq!(root.child("A").and_then(|c| c.text.as_deref()), Some("1"));
                assert!(root.child("Timestamp").is_some());
            }
            other => panic!("expected XML tree, got {:?}", other),
        }
        assert_eq!(payloads[0].content_type(), ContentType::Xml);
    }

    #[tokio::test]
    async fn test_delivery_failures_do_not_stop_the_run() {
        let samples = samples();
        let sink = RecordingSink {
            fail_with: Some(500),
            ..Default::default()
        };
        let mut emitter = emitter(sink, OutputFormat::Json);
        let plan = GenerationPlan::new(200, 60, 0.0);

        let summary = emitter
            .run(&samples, &plan, &CancellationToken::new())
            .await
            .unwrap();

        assert!(summary.event_count > 1);
        assert_eq!(summary.failed, summary.event_count);
        assert_eq!(summary.delivered, 0);
        assert!(summary.total_bytes_emitted >= 200);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paced_run_spreads_events_over_time_budget() {
        let samples = samples();
        let mut emitter = emitter(RecordingSink::default(), OutputFormat::Json);
        let plan = GenerationPlan::new(1000, 100, 100.0);
        assert_eq!(plan.delay(), Duration::from_secs(10));

        let summary = emitter
            .run(&samples, &plan, &CancellationToken::new())
            .await
            .unwrap();

        assert!(summary.elapsed >= Duration::from_secs(10) * summary.event_count as u32);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_sleep_and_keeps_counters() {
        let samples = samples();
        let mut emitter = emitter(RecordingSink::default(), OutputFormat::Json);
        let plan = GenerationPlan::new(1024 * 1024, 86400, 10.0);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let summary = emitter.run(&samples, &plan, &cancel).await.unwrap();

        assert!(summary.cancelled);
        assert!(summary.event_count >= 1);
        assert_eq!(summary.event_count as usize, emitter.sink().payloads.lock().await.len());
        assert!(summary.total_bytes_emitted < plan.byte_budget);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_reported_at_most_once_per_interval() {
        let samples = samples();
        let mut emitter = emitter(RecordingSink::default(), OutputFormat::Json)
            .with_report_interval(Duration::from_secs(25));
        let plan = GenerationPlan::new(1000, 100, 100.0);

        let summary = emitter
            .run(&samples, &plan, &CancellationToken::new())
            .await
            .unwrap();

        // Events are 10s apart, so a run of ~200s crosses the 25s window several times.
        assert!(summary.elapsed >= Duration::from_secs(50));
        assert!(summary.reports >= 1);
        assert!(summary.reports <= summary.elapsed.as_secs() / 25);
        assert!(summary.reports < summary.event_count);
    }

    #[tokio::test]
    async fn test_unthrottled_run_does_not_report_before_interval() {
        let mut emitter = emitter(RecordingSink::default(), OutputFormat::Json);
        let summary = emitter
            .run(&samples(), &GenerationPlan::new(200, 0, 0.0), &CancellationToken::new())
            .await
            .unwrap();

        assert!(summary.event_count > 1);
        assert_eq!(summary.reports, 0);
    }

    #[tokio::test]
    async fn test_already_cancelled_run_emits_nothing() {
        let mut emitter = emitter(RecordingSink::default(), OutputFormat::Json);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = emitter
            .run(&samples(), &GenerationPlan::new(1024, 60, 0.0), &cancel)
            .await
            .unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.event_count, 0);
    }
}
