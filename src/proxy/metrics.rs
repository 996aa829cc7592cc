//! Monitoring of outbound signed requests and session outcomes.
//!
//! Sessions report every upstream call and every completed time sync or audit
//! drain to a pluggable [`MetricsCollector`]. The default collector is
//! [`NoOpMetricsCollector`].

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use super::envelope::Action;

/// Counters tracked by the proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyMetrics {
    /// Total number of upstream requests issued
    pub requests_sent: u64,
    /// Number of upstream requests that returned an error
    pub requests_failed: u64,
    /// Number of `observe` requests issued while polling
    pub observes_sent: u64,
    /// Number of time syncs whose `end` call succeeded
    pub time_syncs_completed: u64,
    /// Number of time syncs whose `end` call failed
    pub time_syncs_failed: u64,
    /// Most observations issued during a single begin window
    pub max_observes_per_sync: u64,
    /// Total audit entries handed to callers
    pub audit_entries_fetched: u64,
    /// Number of cursor resets sent
    pub cursor_resets: u64,
    /// Number of cursor resets skipped by policy
    pub cursor_resets_skipped: u64,
    /// Errors by category
    pub error_counts: ErrorMetrics,
    /// Average upstream round trip (microseconds)
    pub avg_request_time_us: u64,
}

/// Error count metrics by category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorMetrics {
    /// Connection and body-read failures
    pub transport: u64,
    /// Requests that hit the timeout
    pub timeout: u64,
    /// Envelope encoding failures
    pub serialization: u64,
    /// Unparsable audit base offsets
    pub invalid_offset: u64,
    /// Anything else
    pub other: u64,
}

/// Events reported by the sessions.
#[derive(Debug, Clone)]
pub enum MetricEvent {
    /// One upstream request finished
    Request {
        /// The action that was sent
        action: Action,
        /// Round trip time
        duration: Duration,
        /// Whether a body was received
        success: bool,
    },
    /// A time sync finished
    TimeSync {
        /// Observe requests issued during the begin window
        observes: u64,
        /// Whether the `end` call succeeded
        success: bool,
    },
    /// An audit drain finished
    AuditDrain {
        /// Entries returned to the caller
        entries: usize,
        /// Whether the cursor reset was sent
        reset_sent: bool,
    },
    /// An error occurred
    Error {
        /// Stable error code, see [`ProxyError::code`](crate::ProxyError::code)
        error_code: &'static str,
        /// Error message
        error_message: String,
    },
}

/// Trait for metrics collection backends.
///
/// All methods must be thread-safe; the observe loop and the begin task
/// report concurrently.
#[async_trait]
pub trait MetricsCollector: Send + Sync {
    /// Record a metric event.
    async fn record_event(&self, event: MetricEvent);

    /// Get a point-in-time snapshot.
    async fn get_metrics(&self) -> ProxyMetrics;

    /// Reset all metrics to zero.
    async fn reset_metrics(&self);
}

/// In-memory collector built on atomic counters.
///
/// # Example
///
/// ```rust
/// use signed_proxy::{Action, InMemoryMetricsCollector, MetricEvent, MetricsCollector};
/// use std::time::Duration;
///
/// # async fn example() {
/// let collector = InMemoryMetricsCollector::new();
/// collector.record_event(MetricEvent::Request {
///     action: Action::Observe,
///     duration: Duration::from_millis(3),
///     success: true,
/// }).await;
///
/// let metrics = collector.get_metrics().await;
/// assert_eq!(metrics.observes_sent, 1);
/// # }
/// ```
#[derive(Debug, Default)]
pub struct InMemoryMetricsCollector {
    requests_sent: AtomicU64,
    requests_failed: AtomicU64,
    observes_sent: AtomicU64,
    time_syncs_completed: AtomicU64,
    time_syncs_failed: AtomicU64,
    max_observes_per_sync: AtomicU64,
    audit_entries_fetched: AtomicU64,
    cursor_resets: AtomicU64,
    cursor_resets_skipped: AtomicU64,

    transport_errors: AtomicU64,
    timeout_errors: AtomicU64,
    serialization_errors: AtomicU64,
    invalid_offset_errors: AtomicU64,
    other_errors: AtomicU64,

    request_time_total: AtomicU64,
}

impl InMemoryMetricsCollector {
    /// Create a new in-memory metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self) -> [&AtomicU64; 15] {
        [
            &self.requests_sent,
            &self.requests_failed,
            &self.observes_sent,
            &self.time_syncs_completed,
            &self.time_syncs_failed,
            &self.max_observes_per_sync,
            &self.audit_entries_fetched,
            &self.cursor_resets,
            &self.cursor_resets_skipped,
            &self.transport_errors,
            &self.timeout_errors,
            &self.serialization_errors,
            &self.invalid_offset_errors,
            &self.other_errors,
            &self.request_time_total,
        ]
    }
}

#[async_trait]
impl MetricsCollector for InMemoryMetricsCollector {
    async fn record_event(&self, event: MetricEvent) {
        match event {
            MetricEvent::Request {
                action,
                duration,
                success,
            } => {
                self.requests_sent.fetch_add(1, Ordering::Relaxed);
                if !success {
                    self.requests_failed.fetch_add(1, Ordering::Relaxed);
                }
                match action {
                    Action::Observe => {
                        self.observes_sent.fetch_add(1, Ordering::Relaxed);
                    }
                    Action::AuditReset => {
                        self.cursor_resets.fetch_add(1, Ordering::Relaxed);
                    }
                    _ => {}
                }
                self.request_time_total
                    .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
            }
            MetricEvent::TimeSync { observes, success } => {
                self.max_observes_per_sync
                    .fetch_max(observes, Ordering::Relaxed);
                if success {
                    self.time_syncs_completed.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.time_syncs_failed.fetch_add(1, Ordering::Relaxed);
                }
            }
            MetricEvent::AuditDrain {
                entries,
                reset_sent,
            } => {
                self.audit_entries_fetched
                    .fetch_add(entries as u64, Ordering::Relaxed);
                if !reset_sent {
                    self.cursor_resets_skipped.fetch_add(1, Ordering::Relaxed);
                }
            }
            MetricEvent::Error { error_code, .. } => {
                let counter = match error_code {
                    "transport" => &self.transport_errors,
                    "timeout" => &self.timeout_errors,
                    "serialization" => &self.serialization_errors,
                    "invalid_offset" => &self.invalid_offset_errors,
                    _ => &self.other_errors,
                };
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    async fn get_metrics(&self) -> ProxyMetrics {
        let requests_sent = self.requests_sent.load(Ordering::Relaxed);

        ProxyMetrics {
            requests_sent,
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            observes_sent: self.observes_sent.load(Ordering::Relaxed),
            time_syncs_completed: self.time_syncs_completed.load(Ordering::Relaxed),
            time_syncs_failed: self.time_syncs_failed.load(Ordering::Relaxed),
            max_observes_per_sync: self.max_observes_per_sync.load(Ordering::Relaxed),
            audit_entries_fetched: self.audit_entries_fetched.load(Ordering::Relaxed),
            cursor_resets: self.cursor_resets.load(Ordering::Relaxed),
            cursor_resets_skipped: self.cursor_resets_skipped.load(Ordering::Relaxed),
            error_counts: ErrorMetrics {
                transport: self.transport_errors.load(Ordering::Relaxed),
                timeout: self.timeout_errors.load(Ordering::Relaxed),
                serialization: self.serialization_errors.load(Ordering::Relaxed),
                invalid_offset: self.invalid_offset_errors.load(Ordering::Relaxed),
                other: self.other_errors.load(Ordering::Relaxed),
            },
            avg_request_time_us: if requests_sent > 0 {
                self.request_time_total.load(Ordering::Relaxed) / requests_sent
            } else {
                0
            },
        }
    }

    async fn reset_metrics(&self) {
        for counter in self.counters() {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// No-op metrics collector that discards all metrics.
#[derive(Debug, Default)]
pub struct NoOpMetricsCollector;

impl NoOpMetricsCollector {
    /// Create a new no-op metrics collector.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MetricsCollector for NoOpMetricsCollector {
    async fn record_event(&self, _event: MetricEvent) {}

    async fn get_metrics(&self) -> ProxyMetrics {
        ProxyMetrics::default()
    }

    async fn reset_metrics(&self) {}
}

/// Times one operation and reports it to a collector.
pub struct MetricsTimer {
    collector: Arc<dyn MetricsCollector>,
    start_time: Instant,
}

impl MetricsTimer {
    /// Starts timing now.
    pub fn new(collector: Arc<dyn MetricsCollector>) -> Self {
        Self {
            collector,
            start_time: Instant::now(),
        }
    }

    /// Time elapsed since the timer was created.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Record a metric event.
    pub async fn record(&self, event: MetricEvent) {
        self.collector.record_event(event).await;
    }
}
