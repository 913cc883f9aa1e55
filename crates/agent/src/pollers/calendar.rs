//! Calendar poll-and-execute background task.
//!
//! On each tick the monitor fetches upcoming events, extracts transfer
//! intents from their titles, and submits the transfers whose scheduled
//! time falls inside the trailing execution window. Ticks are strictly
//! sequential: the next tick is only scheduled after the previous one
//! completes, so slow collaborators delay ticks but never overlap them.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use shared_types::{parse_intent, CalendarEvent, Schedule};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

use crate::calendar::EventSource;
use crate::services::ApprovalPolicy;
use crate::wallet::{explorer_txn_url, TransferExecutor};

/// Configuration for the calendar monitoring task
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// How often to check the calendar (default: 60 seconds)
    pub poll_interval: Duration,
    /// Width of the trailing execution window, in minutes
    pub window_minutes: i64,
    /// Maximum events to fetch per tick
    pub max_events_per_poll: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            window_minutes: 5,
            max_events_per_poll: 50,
        }
    }
}

impl MonitorConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let poll_interval_secs = std::env::var("CALENDAR_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.poll_interval.as_secs());

        let window_minutes = std::env::var("EXECUTION_WINDOW_MINUTES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.window_minutes);

        let max_events_per_poll = std::env::var("CALENDAR_MAX_EVENTS_PER_POLL")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_events_per_poll);

        Self {
            poll_interval: Duration::from_secs(poll_interval_secs),
            window_minutes,
            max_events_per_poll,
        }
    }
}

/// Outcome of a single poll tick.
#[derive(Debug, Default, Clone, Serialize)]
pub struct TickReport {
    pub total_events: usize,
    pub detected_transactions: usize,
    pub executed_transactions: usize,
    pub pending_approval: usize,
    pub failed_transactions: usize,
    pub skipped_duplicates: usize,
}

/// Lifecycle object owning the polling loop.
///
/// Created once at startup; `start` is idempotent and `stop` lets the
/// process shut the loop down cleanly. All submission bookkeeping lives
/// here (in memory only, by design: a restart forgets processed events).
pub struct CalendarMonitor {
    source: Arc<dyn EventSource>,
    executor: Arc<dyn TransferExecutor>,
    approvals: Arc<dyn ApprovalPolicy>,
    config: MonitorConfig,
    running: AtomicBool,
    shutdown: Notify,
    /// Event ids that already had a submission attempt.
    processed: Mutex<HashSet<String>>,
    handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl CalendarMonitor {
    pub fn new(
        source: Arc<dyn EventSource>,
        executor: Arc<dyn TransferExecutor>,
        approvals: Arc<dyn ApprovalPolicy>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            source,
            executor,
            approvals,
            config,
            running: AtomicBool::new(false),
            shutdown: Notify::new(),
            processed: Mutex::new(HashSet::new()),
            handle: std::sync::Mutex::new(None),
        }
    }

    /// Spawn the polling loop. Returns false when already running.
    pub fn start(self: &Arc<Self>) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            return false;
        }

        let monitor = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tracing::info!(
                "Calendar monitoring started (interval: {:?}, window: {}m)",
                monitor.config.poll_interval,
                monitor.config.window_minutes
            );

            loop {
                if let Err(e) = monitor.run_tick().await {
                    tracing::error!("Calendar poll tick failed: {:#}", e);
                }

                tokio::select! {
                    _ = monitor.shutdown.notified() => break,
                    _ = tokio::time::sleep(monitor.config.poll_interval) => {}
                }
            }

            monitor.running.store(false, Ordering::SeqCst);
            tracing::info!("Calendar monitoring stopped");
        });

        if let Ok(mut slot) = self.handle.lock() {
            *slot = Some(handle);
        }
        true
    }

    /// Request the loop to stop after the current tick. A permit is
    /// stored, so stopping before the loop reaches its select is safe.
    pub fn stop(&self) {
        self.shutdown.notify_one();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Run one poll tick. Also invoked directly by the manual
    /// check-calendar-now route.
    pub async fn run_tick(&self) -> Result<TickReport> {
        let mut report = TickReport::default();

        if !self.source.is_authenticated() {
            tracing::warn!("Calendar authentication missing, skipping poll tick");
            return Ok(report);
        }

        let events = self
            .source
            .upcoming_events(self.config.max_events_per_poll)
            .await
            .context("Failed to fetch calendar events")?;
        report.total_events = events.len();

        let now = Utc::now();
        let window = chrono::Duration::minutes(self.config.window_minutes);

        for event in &events {
            let (title, start) = match (&event.title, event.start) {
                (Some(title), Some(start)) => (title.as_str(), start),
                _ => continue,
            };

            let Some(intent) = parse_intent(title, start, &event.attendees) else {
                continue;
            };
            report.detected_transactions += 1;

            match Schedule::classify(intent.execute_at, now, window) {
                Schedule::Due => {}
                Schedule::Future => {
                    tracing::debug!("Event {} scheduled for {}", event.id, intent.execute_at);
                    continue;
                }
                Schedule::Missed => {
                    tracing::debug!("Event {} outside execution window, not re-attempting", event.id);
                    continue;
                }
            }

            if self.processed.lock().await.contains(&event.id) {
                report.skipped_duplicates += 1;
                continue;
            }

            if intent.requires_approval {
                match self.approvals.is_approved(event, &intent.approvers).await {
                    Ok(true) => {}
                    Ok(false) => {
                        // Left unprocessed: re-evaluated while the event
                        // remains inside its window.
                        tracing::info!("Event {} awaiting approver RSVPs", event.id);
                        report.pending_approval += 1;
                        continue;
                    }
                    Err(e) => {
                        tracing::error!("Approval check failed for event {}: {:#}", event.id, e);
                        report.failed_transactions += 1;
                        continue;
                    }
                }
            }

            // One submission attempt per event, success or failure.
            self.processed.lock().await.insert(event.id.clone());

            tracing::info!("Executing transaction: {}", title);
            match self
                .executor
                .submit_transfer(&intent.recipient, &intent.amount, &intent.token)
                .await
            {
                Ok(tx_hash) => {
                    report.executed_transactions += 1;
                    tracing::info!("Transaction executed: {}", tx_hash);
                    self.annotate(event, &success_note(&tx_hash)).await;
                }
                Err(e) => {
                    report.failed_transactions += 1;
                    tracing::error!("Transaction failed for event {}: {:#}", event.id, e);
                    self.annotate(event, &failure_note(&e)).await;
                }
            }
        }

        Ok(report)
    }

    async fn annotate(&self, event: &CalendarEvent, note: &str) {
        if let Err(e) = self.source.annotate_event(&event.id, note).await {
            tracing::warn!("Failed to annotate event {}: {:#}", event.id, e);
        }
    }
}

fn success_note(tx_hash: &str) -> String {
    format!(
        "Status: EXECUTED\nTransaction Hash: {}\nExplorer: {}",
        tx_hash,
        explorer_txn_url(tx_hash)
    )
}

fn failure_note(error: &anyhow::Error) -> String {
    format!("Status: FAILED\nError: {error:#}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::RsvpApprovalPolicy;
    use anyhow::bail;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration, Utc};
    use shared_types::{CreatedEvent, EventAttendee};

    struct MockSource {
        authenticated: AtomicBool,
        events: Mutex<Vec<CalendarEvent>>,
        annotations: Mutex<Vec<(String, String)>>,
    }

    impl MockSource {
        fn new(events: Vec<CalendarEvent>) -> Self {
            Self {
                authenticated: AtomicBool::new(true),
                events: Mutex::new(events),
                annotations: Mutex::new(Vec::new()),
            }
        }

        async fn set_events(&self, events: Vec<CalendarEvent>) {
            *self.events.lock().await = events;
        }
    }

    #[async_trait]
    impl EventSource for MockSource {
        fn is_authenticated(&self) -> bool {
            self.authenticated.load(Ordering::SeqCst)
        }

        async fn upcoming_events(&self, _max_results: u32) -> Result<Vec<CalendarEvent>> {
            Ok(self.events.lock().await.clone())
        }

        async fn create_event(
            &self,
            _title: &str,
            _start: DateTime<Utc>,
            _description: Option<&str>,
        ) -> Result<CreatedEvent> {
            unimplemented!("not exercised by monitor tests")
        }

        async fn annotate_event(&self, event_id: &str, note: &str) -> Result<()> {
            self.annotations
                .lock()
                .await
                .push((event_id.to_string(), note.to_string()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockExecutor {
        submissions: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl TransferExecutor for MockExecutor {
        async fn submit_transfer(
            &self,
            recipient: &str,
            amount: &str,
            token: &str,
        ) -> Result<String> {
            self.submissions.lock().await.push((
                recipient.to_string(),
                amount.to_string(),
                token.to_string(),
            ));
            if recipient == "0xdead" {
                bail!("insufficient funds");
            }
            Ok("0xhash".to_string())
        }
    }

    fn due_event(id: &str, title: &str) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            title: Some(title.to_string()),
            start: Some(Utc::now() - ChronoDuration::minutes(1)),
            ..Default::default()
        }
    }

    fn monitor_with(
        events: Vec<CalendarEvent>,
    ) -> (Arc<CalendarMonitor>, Arc<MockSource>, Arc<MockExecutor>) {
        let source = Arc::new(MockSource::new(events));
        let executor = Arc::new(MockExecutor::default());
        let monitor = Arc::new(CalendarMonitor::new(
            source.clone(),
            executor.clone(),
            Arc::new(RsvpApprovalPolicy),
            MonitorConfig::default(),
        ));
        (monitor, source, executor)
    }

    #[tokio::test]
    async fn unauthenticated_source_skips_tick() {
        let (monitor, source, executor) =
            monitor_with(vec![due_event("e1", "send 1 apt to 0x1")]);
        source.authenticated.store(false, Ordering::SeqCst);

        let report = monitor.run_tick().await.unwrap();
        assert_eq!(report.total_events, 0);
        assert!(executor.submissions.lock().await.is_empty());
    }

    #[tokio::test]
    async fn due_event_is_submitted_and_annotated() {
        let (monitor, source, executor) =
            monitor_with(vec![due_event("e1", "Send 3.5 APT to 0xabc")]);

        let report = monitor.run_tick().await.unwrap();
        assert_eq!(report.detected_transactions, 1);
        assert_eq!(report.executed_transactions, 1);

        let submissions = executor.submissions.lock().await;
        assert_eq!(
            submissions.as_slice(),
            &[("0xabc".to_string(), "3.5".to_string(), "APT".to_string())]
        );

        let annotations = source.annotations.lock().await;
        assert_eq!(annotations.len(), 1);
        assert!(annotations[0].1.contains("EXECUTED"));
        assert!(annotations[0].1.contains("0xhash"));
    }

    #[tokio::test]
    async fn sequential_ticks_submit_at_most_once() {
        let (monitor, _source, executor) =
            monitor_with(vec![due_event("e1", "send 1 apt to 0x1")]);

        let first = monitor.run_tick().await.unwrap();
        let second = monitor.run_tick().await.unwrap();

        assert_eq!(first.executed_transactions, 1);
        assert_eq!(second.executed_transactions, 0);
        assert_eq!(second.skipped_duplicates, 1);
        assert_eq!(executor.submissions.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn future_and_missed_events_are_not_submitted() {
        let mut future = due_event("future", "send 1 apt to 0x1");
        future.start = Some(Utc::now() + ChronoDuration::minutes(10));
        let mut missed = due_event("missed", "send 1 apt to 0x1");
        missed.start = Some(Utc::now() - ChronoDuration::minutes(6));

        let (monitor, _source, executor) = monitor_with(vec![future, missed]);

        let report = monitor.run_tick().await.unwrap();
        assert_eq!(report.detected_transactions, 2);
        assert_eq!(report.executed_transactions, 0);
        assert!(executor.submissions.lock().await.is_empty());
    }

    #[tokio::test]
    async fn per_event_failure_does_not_abort_tick() {
        let (monitor, source, executor) = monitor_with(vec![
            due_event("bad", "send 1 apt to 0xdead"),
            due_event("good", "send 2 apt to 0xbeef"),
        ]);

        let report = monitor.run_tick().await.unwrap();
        assert_eq!(report.failed_transactions, 1);
        assert_eq!(report.executed_transactions, 1);
        assert_eq!(executor.submissions.lock().await.len(), 2);

        let annotations = source.annotations.lock().await;
        let failed = annotations.iter().find(|(id, _)| id == "bad").unwrap();
        assert!(failed.1.contains("FAILED"));
    }

    #[tokio::test]
    async fn failed_submission_is_not_retried() {
        let (monitor, _source, executor) =
            monitor_with(vec![due_event("bad", "send 1 apt to 0xdead")]);

        monitor.run_tick().await.unwrap();
        let second = monitor.run_tick().await.unwrap();

        assert_eq!(second.skipped_duplicates, 1);
        assert_eq!(executor.submissions.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn unapproved_event_stays_pending_until_rsvps_arrive() {
        let mut event = due_event("gated", "send 1 apt to 0x1");
        event.attendees = vec![EventAttendee {
            email: "approver@example.com".to_string(),
            response_status: Some("needsAction".to_string()),
        }];

        let (monitor, source, executor) = monitor_with(vec![event.clone()]);

        let report = monitor.run_tick().await.unwrap();
        assert_eq!(report.pending_approval, 1);
        assert!(executor.submissions.lock().await.is_empty());

        // Approver accepts; the still-due event executes on the next tick.
        event.attendees[0].response_status = Some("accepted".to_string());
        source.set_events(vec![event]).await;

        let report = monitor.run_tick().await.unwrap();
        assert_eq!(report.executed_transactions, 1);
        assert_eq!(executor.submissions.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn events_without_title_or_start_are_skipped() {
        let untitled = CalendarEvent {
            id: "untitled".to_string(),
            start: Some(Utc::now()),
            ..Default::default()
        };
        let unscheduled = CalendarEvent {
            id: "unscheduled".to_string(),
            title: Some("send 1 apt to 0x1".to_string()),
            ..Default::default()
        };
        let lunch = due_event("lunch", "Lunch with Bob");

        let (monitor, _source, executor) = monitor_with(vec![untitled, unscheduled, lunch]);

        let report = monitor.run_tick().await.unwrap();
        assert_eq!(report.total_events, 3);
        assert_eq!(report.detected_transactions, 0);
        assert!(executor.submissions.lock().await.is_empty());
    }

    #[tokio::test]
    async fn start_is_idempotent_and_stop_clears_running() {
        let (monitor, _source, _executor) = monitor_with(vec![]);

        assert!(monitor.start());
        assert!(!monitor.start());
        assert!(monitor.is_running());

        monitor.stop();
        // Loop observes the shutdown signal on its next select.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!monitor.is_running());
    }
}
