//! Metrics collection for the UDP ingest gateway.
//!
//! Basic counters for monitoring gateway health; surfaced as a JSON
//! snapshot on `/metrics`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Gateway metrics collector
#[derive(Default)]
pub struct Metrics {
    /// Total sessions created since startup
    sessions_created: AtomicU64,

    /// Total sessions closed since startup
    sessions_closed: AtomicU64,

    /// Current active sessions count
    active_sessions: AtomicU64,

    /// Total datagrams received since startup
    datagrams_received: AtomicU64,

    /// Total bytes received since startup
    bytes_received: AtomicU64,

    /// Audio units dispatched to sinks
    audio_dispatched: AtomicU64,

    /// Video units dispatched to sinks
    video_dispatched: AtomicU64,

    /// Packets left to collaborators (container passthrough, metadata)
    packets_passed_through: AtomicU64,

    /// Startup timestamp (unix seconds)
    startup_time: AtomicU64,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        Self {
            startup_time: AtomicU64::new(now),
            ..Default::default()
        }
    }

    /// Record a session creation
    pub fn session_created(&self) {
        self.sessions_created.fetch_add(1, Ordering::Relaxed);
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a session closing
    pub fn session_closed(&self) {
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a received datagram and its size
    pub fn datagram_received(&self, bytes: u64) {
        self.datagrams_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record an audio unit dispatch
    pub fn audio_dispatched(&self) {
        self.audio_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a video unit dispatch
    pub fn video_dispatched(&self) {
        self.video_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a packet that was not ours to route
    pub fn packet_passed_through(&self) {
        self.packets_passed_through.fetch_add(1, Ordering::Relaxed);
    }

    /// Get active session count
    pub fn active_session_count(&self) -> u64 {
        self.active_sessions.load(Ordering::Relaxed)
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let uptime_secs = now.saturating_sub(self.startup_time.load(Ordering::Relaxed));

        MetricsSnapshot {
            sessions_created: self.sessions_created.load(Ordering::Relaxed),
            sessions_closed: self.sessions_closed.load(Ordering::Relaxed),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            audio_dispatched: self.audio_dispatched.load(Ordering::Relaxed),
            video_dispatched: self.video_dispatched.load(Ordering::Relaxed),
            packets_passed_through: self.packets_passed_through.load(Ordering::Relaxed),
            uptime_secs,
        }
    }
}

/// Snapshot of current metrics
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Total sessions created
    pub sessions_created: u64,

    /// Total sessions closed
    pub sessions_closed: u64,

    /// Currently active sessions
    pub active_sessions: u64,

    /// Total datagrams received
    pub datagrams_received: u64,

    /// Total bytes received
    pub bytes_received: u64,

    /// Audio units dispatched
    pub audio_dispatched: u64,

    /// Video units dispatched
    pub video_dispatched: u64,

    /// Packets left to collaborators
    pub packets_passed_through: u64,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl MetricsSnapshot {
    /// Calculate bytes per second since startup
    pub fn bytes_per_second(&self) -> f64 {
        if self.uptime_secs == 0 {
            0.0
        } else {
            self.bytes_received as f64 / self.uptime_secs as f64
        }
    }
}

/// Global metrics instance
static GLOBAL_METRICS: std::sync::OnceLock<Arc<Metrics>> = std::sync::OnceLock::new();

/// Get the global metrics instance
pub fn global_metrics() -> Arc<Metrics> {
    GLOBAL_METRICS
        .get_or_init(|| Arc::new(Metrics::new()))
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new();
        let snapshot = metrics.snapshot();

        assert_eq!(snapshot.sessions_created, 0);
        assert_eq!(snapshot.active_sessions, 0);
        assert_eq!(snapshot.datagrams_received, 0);
    }

    #[test]
    fn test_session_tracking() {
        let metrics = Metrics::new();

        metrics.session_created();
        metrics.session_created();
        assert_eq!(metrics.active_session_count(), 2);

        metrics.session_closed();
        assert_eq!(metrics.active_session_count(), 1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.sessions_created, 2);
        assert_eq!(snapshot.sessions_closed, 1);
    }

    #[test]
    fn test_receive_tracking() {
        let metrics = Metrics::new();

        metrics.datagram_received(188);
        metrics.datagram_received(1316);
        metrics.audio_dispatched();
        metrics.video_dispatched();
        metrics.packet_passed_through();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.datagrams_received, 2);
        assert_eq!(snapshot.bytes_received, 1504);
        assert_eq!(snapshot.audio_dispatched, 1);
        assert_eq!(snapshot.video_dispatched, 1);
        assert_eq!(snapshot.packets_passed_through, 1);
    }

    #[test]
    fn test_global_metrics_is_shared() {
        let m1 = global_metrics();
        let m2 = global_metrics();

        let before = m2.snapshot().packets_passed_through;
        m1.packet_passed_through();
        assert!(m2.snapshot().packets_passed_through > before);
    }
}
