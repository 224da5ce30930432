//! Session management for UDP ingest.
//!
//! An [`IngestSession`] owns one listener and defines the connection
//! lifecycle: registration under a unique stream name, idle detection
//! against the last-receive time, and idempotent teardown. The
//! [`SessionManager`] is the routing scope - it holds the name registry,
//! rejects duplicate names, and runs the periodic idle sweep.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, RwLock};

use tsgate_core::engine::{EngineFactory, SessionConfig};
use tsgate_core::now_millis;
use tsgate_core::sink::StreamSinkFactory;

use crate::config::Config;
use crate::listener::{IngestListener, ListenerError, ListenerSettings};

/// Parameters for a new ingest session, resolved from the create request
/// and the gateway defaults
#[derive(Debug, Clone)]
pub struct CreateSessionParams {
    /// Published stream name; the registry key
    pub name: String,

    /// Host or multicast group to receive on
    pub host: String,

    /// Port to receive on
    pub port: u16,

    /// Whether `host` is a multicast group
    pub multicast: bool,

    /// Audio type fourCC recorded on the sink
    pub audio_fourcc: u32,

    /// Video type fourCC recorded on the sink
    pub video_fourcc: u32,

    /// Metadata type fourCC (carried for collaborators that route metadata)
    pub metadata_fourcc: u32,
}

/// Session-related errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Stream name must not be empty")]
    InvalidName,

    #[error("Stream name already in use: {0}")]
    NameConflict(String),

    #[error("Session not found")]
    NotFound,

    #[error("Maximum sessions reached")]
    MaxSessionsReached,

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("Sink error: {0}")]
    Sink(#[from] tsgate_core::Error),
}

/// Name registry shared between the manager and its sessions.
///
/// Sessions hold a weak reference so an idle-triggered close can unregister
/// itself without keeping the manager alive.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<IngestSession>>>,
}

impl SessionRegistry {
    async fn unregister(&self, name: &str) -> bool {
        self.sessions.write().await.remove(name).is_some()
    }

    async fn snapshot(&self) -> Vec<Arc<IngestSession>> {
        self.sessions.read().await.values().cloned().collect()
    }
}

/// Connection-level object for one ingest stream
pub struct IngestSession {
    /// Internal id for logging
    pub id: String,

    /// Published stream name
    pub name: String,

    pub host: String,

    pub port: u16,

    pub multicast: bool,

    /// Metadata type fourCC; routing metadata is a collaborator concern
    pub metadata_fourcc: u32,

    /// When the session was created
    pub created_at: DateTime<Utc>,

    idle_timeout_ms: u64,

    /// Millis of the latest successful receive; single writer (the
    /// listener worker), read by idle checks
    last_receive: Arc<AtomicU64>,

    /// Set exactly once; guards idempotent teardown
    closed: AtomicBool,

    listener: tokio::sync::Mutex<Option<IngestListener>>,

    registry: Weak<SessionRegistry>,

    sink_factory: Arc<dyn StreamSinkFactory>,
}

impl IngestSession {
    /// Millis since the latest successful receive
    pub fn last_receive_age(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_receive.load(Ordering::Acquire))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Address the listener socket actually bound
    pub async fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.listener.lock().await.as_ref().and_then(IngestListener::local_addr)
    }

    /// Idle check doubling as the reaper: a session found idle is closed
    /// before this returns.
    pub async fn is_idle(&self, now: u64) -> bool {
        let idle = {
            let listener = self.listener.lock().await;
            listener.is_some() && self.last_receive_age(now) > self.idle_timeout_ms
        };
        if idle {
            tracing::info!(
                session_id = %self.id,
                name = %self.name,
                last_recv_ms = self.last_receive_age(now),
                "closing due to inactivity"
            );
            self.close().await;
        }
        idle
    }

    /// Idempotent teardown: unregister, stop the listener (draining its
    /// queue), release the sink. Concurrent callers race on a single
    /// compare-exchange; exactly one runs the teardown.
    pub async fn close(&self) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        tracing::debug!(session_id = %self.id, name = %self.name, "close");

        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(&self.name).await;
        }

        let listener = self.listener.lock().await.take();
        if let Some(listener) = listener {
            listener.stop().await;
        }

        self.sink_factory.release(&self.name);
        crate::metrics::global_metrics().session_closed();
    }
}

/// Routing scope for active sessions: creation with conflict detection,
/// lookup, kill, and the periodic idle sweep
pub struct SessionManager {
    registry: Arc<SessionRegistry>,
    engine_factory: Arc<dyn EngineFactory>,
    sink_factory: Arc<dyn StreamSinkFactory>,
    config: Arc<Config>,
    connection_seq: AtomicU32,
}

impl SessionManager {
    pub fn new(
        config: Arc<Config>,
        engine_factory: Arc<dyn EngineFactory>,
        sink_factory: Arc<dyn StreamSinkFactory>,
    ) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::default()),
            engine_factory,
            sink_factory,
            config,
            connection_seq: AtomicU32::new(1),
        }
    }

    /// Create and start a session.
    ///
    /// Fails with `NameConflict` while a stream of that name is active; on
    /// any failure no registration or sink resources are left behind.
    pub async fn create_session(
        &self,
        params: CreateSessionParams,
    ) -> Result<Arc<IngestSession>, SessionError> {
        let name = params.name.trim();
        if name.is_empty() {
            return Err(SessionError::InvalidName);
        }

        let mut sessions = self.registry.sessions.write().await;
        if sessions.len() >= self.config.ingest.max_sessions {
            return Err(SessionError::MaxSessionsReached);
        }
        if sessions.contains_key(name) {
            return Err(SessionError::NameConflict(name.to_string()));
        }

        // register with the broadcast scope first; the sink is the
        // session's downstream pipeline
        let sink = self.sink_factory.open(name)?;

        let stream = &self.config.stream;
        let engine_config = SessionConfig {
            name: name.to_string(),
            pmt_pid: stream.pmt_pid,
            audio_pid: stream.audio_pid,
            video_pid: stream.video_pid,
            meta_pid: stream.meta_pid,
            stream_id: stream.stream_id,
            connection_id: self.connection_seq.fetch_add(1, Ordering::Relaxed),
            ..SessionConfig::default()
        };

        let settings = ListenerSettings {
            host: params.host.clone(),
            port: params.port,
            multicast: params.multicast,
            datagram_size: self.config.ingest.datagram_size,
            idle_timeout: Duration::from_millis(self.config.ingest.idle_timeout_ms),
            audio_fourcc: params.audio_fourcc,
            video_fourcc: params.video_fourcc,
        };

        let last_receive = Arc::new(AtomicU64::new(now_millis()));
        let listener = match IngestListener::start(
            settings,
            engine_config,
            self.engine_factory.as_ref(),
            sink,
            last_receive.clone(),
        )
        .await
        {
            Ok(listener) => listener,
            Err(e) => {
                // no partial registration
                self.sink_factory.release(name);
                return Err(SessionError::Listener(e));
            }
        };

        let session = Arc::new(IngestSession {
            id: session_id(),
            name: name.to_string(),
            host: params.host,
            port: params.port,
            multicast: params.multicast,
            metadata_fourcc: params.metadata_fourcc,
            created_at: Utc::now(),
            idle_timeout_ms: self.config.ingest.idle_timeout_ms,
            last_receive,
            closed: AtomicBool::new(false),
            listener: tokio::sync::Mutex::new(Some(listener)),
            registry: Arc::downgrade(&self.registry),
            sink_factory: self.sink_factory.clone(),
        });

        sessions.insert(name.to_string(), session.clone());
        drop(sessions);

        crate::metrics::global_metrics().session_created();
        tracing::info!(
            session_id = %session.id,
            name = %session.name,
            port = session.port,
            "session created"
        );
        Ok(session)
    }

    /// Get an active session by stream name
    pub async fn get_session(&self, name: &str) -> Option<Arc<IngestSession>> {
        self.registry.sessions.read().await.get(name).cloned()
    }

    /// Administratively close a session by stream name
    pub async fn kill_session(&self, name: &str) -> Result<(), SessionError> {
        let session = self.get_session(name).await.ok_or(SessionError::NotFound)?;
        session.close().await;
        Ok(())
    }

    /// Names of all active sessions
    pub async fn session_names(&self) -> Vec<String> {
        self.registry.sessions.read().await.keys().cloned().collect()
    }

    pub async fn session_count(&self) -> usize {
        self.registry.sessions.read().await.len()
    }

    /// One idle sweep over all sessions. Idle sessions close themselves
    /// (and unregister) inside `is_idle`.
    pub async fn reap_idle(&self) {
        let now = now_millis();
        for session in self.registry.snapshot().await {
            session.is_idle(now).await;
        }
    }

    /// Periodic idle sweep; health checks double as the reaper.
    pub async fn run_reaper_loop(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        tracing::info!(interval_secs = interval.as_secs(), "idle reaper started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    self.reap_idle().await;
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("idle reaper shutting down");
                    break;
                }
            }
        }
    }

    /// Close every active session; shutdown path.
    pub async fn close_all(&self) {
        for session in self.registry.snapshot().await {
            session.close().await;
        }
    }
}

fn session_id() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("sess_{}", &uuid[..12])
}
