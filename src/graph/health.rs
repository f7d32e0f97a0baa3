//! Health counters for a graph and a background monitor that turns them
//! into alerts

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Counters updated from the caller's thread and from component
/// callback threads alike
pub struct GraphHealth {
    /// Events received from components
    pub events: AtomicU64,

    /// Error events that became the stored error
    pub component_errors: AtomicU64,

    /// Per-endpoint end-of-stream observations
    pub eos_signals: AtomicU64,

    /// Completed aggregate or single-component transitions
    pub transitions: AtomicU64,

    /// Waits that ran into their deadline
    pub timeouts: AtomicU64,

    /// Buffers still allocated when their component was freed
    pub leaked_buffers: AtomicU64,

    /// Timestamp (Unix microseconds) of the last component event
    pub last_event_time: AtomicU64,
}

impl GraphHealth {
    pub fn new() -> Self {
        Self {
            events: AtomicU64::new(0),
            component_errors: AtomicU64::new(0),
            eos_signals: AtomicU64::new(0),
            transitions: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            leaked_buffers: AtomicU64::new(0),
            last_event_time: AtomicU64::new(now_micros()),
        }
    }

    pub fn record_event(&self) {
        self.last_event_time.store(now_micros(), Ordering::Relaxed);
        self.events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_component_error(&self) {
        self.component_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eos(&self) {
        self.eos_signals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transition(&self) {
        self.transitions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_leaked_buffers(&self, count: usize) {
        self.leaked_buffers.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn events(&self) -> u64 {
        self.events.load(Ordering::Relaxed)
    }

    pub fn component_errors(&self) -> u64 {
        self.component_errors.load(Ordering::Relaxed)
    }

    pub fn eos_signals(&self) -> u64 {
        self.eos_signals.load(Ordering::Relaxed)
    }

    pub fn transitions(&self) -> u64 {
        self.transitions.load(Ordering::Relaxed)
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    pub fn leaked_buffers(&self) -> u64 {
        self.leaked_buffers.load(Ordering::Relaxed)
    }

    pub fn last_event_time(&self) -> u64 {
        self.last_event_time.load(Ordering::Relaxed)
    }

    /// No component event for longer than `threshold`
    pub fn is_silent(&self, threshold: Duration) -> bool {
        now_micros().saturating_sub(self.last_event_time()) > threshold.as_micros() as u64
    }

    pub fn summary(&self) -> HealthSummary {
        HealthSummary {
            events: self.events(),
            component_errors: self.component_errors(),
            eos_signals: self.eos_signals(),
            transitions: self.transitions(),
            timeouts: self.timeouts(),
            leaked_buffers: self.leaked_buffers(),
        }
    }
}

impl Default for GraphHealth {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthSummary {
    pub events: u64,
    pub component_errors: u64,
    pub eos_signals: u64,
    pub transitions: u64,
    pub timeouts: u64,
    pub leaked_buffers: u64,
}

impl std::fmt::Display for HealthSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Health: {} events, {} errors, {} eos, {} transitions, {} timeouts, {} leaked buffers",
            self.events,
            self.component_errors,
            self.eos_signals,
            self.transitions,
            self.timeouts,
            self.leaked_buffers
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HealthAlert {
    /// No component event for the threshold duration
    Silent { duration: Duration },

    /// New asynchronous component errors since the last check
    ComponentErrors { count: u64 },

    /// New wait timeouts since the last check
    Timeouts { count: u64 },

    /// Buffers released only by teardown
    LeakedBuffers { count: u64 },
}

impl std::fmt::Display for HealthAlert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthAlert::Silent { duration } => write!(f, "Graph silent for {:?}", duration),
            HealthAlert::ComponentErrors { count } => write!(f, "Component errors: {}", count),
            HealthAlert::Timeouts { count } => write!(f, "Wait timeouts: {}", count),
            HealthAlert::LeakedBuffers { count } => write!(f, "Leaked buffers: {}", count),
        }
    }
}

/// Periodically checks a graph's counters and sends alerts
pub struct HealthMonitor {
    health: Arc<GraphHealth>,
    alert_tx: mpsc::Sender<HealthAlert>,
    check_interval: Duration,
    silence_threshold: Option<Duration>,
}

impl HealthMonitor {
    pub fn new(health: Arc<GraphHealth>, alert_tx: mpsc::Sender<HealthAlert>) -> Self {
        Self {
            health,
            alert_tx,
            check_interval: Duration::from_secs(5),
            silence_threshold: None,
        }
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Alert when no event arrives for `threshold`. Off by default, an
    /// idle graph is legitimately quiet.
    pub fn with_silence_threshold(mut self, threshold: Duration) -> Self {
        self.silence_threshold = Some(threshold);
        self
    }

    /// Runs until `cancel` fires or the alert receiver is dropped
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.check_interval);
        let mut last_errors = 0u64;
        let mut last_timeouts = 0u64;
        let mut last_leaks = 0u64;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            let mut alerts = Vec::new();

            if let Some(threshold) = self.silence_threshold {
                if self.health.is_silent(threshold) {
                    alerts.push(HealthAlert::Silent { duration: threshold });
                }
            }

            let errors = self.health.component_errors();
            if errors > last_errors {
                alerts.push(HealthAlert::ComponentErrors {
                    count: errors - last_errors,
                });
                last_errors = errors;
            }

            let timeouts = self.health.timeouts();
            if timeouts > last_timeouts {
                alerts.push(HealthAlert::Timeouts {
                    count: timeouts - last_timeouts,
                });
                last_timeouts = timeouts;
            }

            let leaks = self.health.leaked_buffers();
            if leaks > last_leaks {
                alerts.push(HealthAlert::LeakedBuffers {
                    count: leaks - last_leaks,
                });
                last_leaks = leaks;
            }

            for alert in alerts {
                if self.alert_tx.send(alert).await.is_err() {
                    return;
                }
            }
        }
    }
}
