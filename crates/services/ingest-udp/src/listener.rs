//! UDP receive/dispatch loop.
//!
//! One listener per ingest session. The listener owns the datagram socket
//! (unicast or multicast), feeds raw chunks to the demux engine, and routes
//! classified packets from the queue to the stream sink. Shutdown drains the
//! queue so buffered engine output is never silently dropped.
//!
//! Lifecycle: `Created -> Starting -> Listening -> Stopping -> Stopped`.
//! Cancellation is cooperative: the worker re-checks its flag once per
//! receive timeout, so stop latency is bounded by the idle timeout rather
//! than being instantaneous.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::{lookup_host, UdpSocket};
use tokio::task::JoinHandle;

use tsgate_core::engine::{DemuxEngine, EngineFactory, SessionConfig};
use tsgate_core::packet::Packet;
use tsgate_core::queue::PacketQueue;
use tsgate_core::sink::{MediaUnit, StreamSink};

/// Listener lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Created,
    Starting,
    Listening,
    Stopping,
    Stopped,
}

impl ListenerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ListenerState::Created,
            1 => ListenerState::Starting,
            2 => ListenerState::Listening,
            3 => ListenerState::Stopping,
            _ => ListenerState::Stopped,
        }
    }
}

/// Errors raised while starting or running a listener
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("Failed to resolve {0}")]
    Resolve(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("Failed to join multicast group {group}: {source}")]
    MulticastJoin {
        group: IpAddr,
        source: std::io::Error,
    },

    #[error("Engine error: {0}")]
    Engine(#[from] tsgate_core::Error),
}

/// Socket and routing settings for one listener, snapshotted from the
/// session and the gateway config
#[derive(Debug, Clone)]
pub struct ListenerSettings {
    /// Host (or multicast group) to receive on
    pub host: String,

    /// Port to receive on
    pub port: u16,

    /// Whether `host` is a multicast group to join
    pub multicast: bool,

    /// Largest datagram read at once
    pub datagram_size: usize,

    /// Receive timeout; equals the session idle timeout. This is what makes
    /// the blocking receive wake up for shutdown checks - idleness itself is
    /// tracked via the last-receive time.
    pub idle_timeout: Duration,

    /// fourCC recorded on the sink when the first audio unit arrives
    pub audio_fourcc: u32,

    /// fourCC recorded on the sink when the first video unit arrives
    pub video_fourcc: u32,
}

/// Routes classified packets to the stream sink, lazily initializing codecs
/// exactly once per media kind.
#[derive(Clone)]
struct PacketRouter {
    sink: Arc<dyn StreamSink>,
    audio_fourcc: u32,
    video_fourcc: u32,
}

impl PacketRouter {
    fn route(&self, packet: Packet) {
        let metrics = crate::metrics::global_metrics();
        if packet.is_audio() {
            if !self.sink.has_audio_codec() {
                self.sink.set_audio_codec(self.audio_fourcc);
            }
            self.sink.dispatch_audio(MediaUnit {
                timestamp: packet.timestamp(),
                payload: packet.payload_bytes(),
            });
            metrics.audio_dispatched();
        } else if packet.is_video() {
            if !self.sink.has_video_codec() {
                self.sink.set_video_codec(self.video_fourcc);
            }
            self.sink.dispatch_video(MediaUnit {
                timestamp: packet.timestamp(),
                payload: packet.payload_bytes(),
            });
            metrics.video_dispatched();
        } else {
            // container passthrough and metadata belong to other collaborators
            tracing::trace!(
                type_id = packet.type_id(),
                len = packet.len(),
                ts = packet.is_transport_stream(),
                "packet not routed"
            );
            metrics.packet_passed_through();
        }
    }
}

/// Receive/dispatch loop bound to one datagram socket.
pub struct IngestListener {
    socket: Arc<UdpSocket>,

    /// Joined multicast group, if any
    group: Option<IpAddr>,

    engine: Arc<dyn DemuxEngine>,

    queue: Arc<PacketQueue>,

    router: PacketRouter,

    listening: Arc<AtomicBool>,

    state: AtomicU8,

    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl IngestListener {
    /// Resolve, bind, build the engine, and start the receive worker.
    ///
    /// `last_receive` is stored on every successful receive and shared with
    /// the owning session's idle checks.
    pub async fn start(
        settings: ListenerSettings,
        engine_config: SessionConfig,
        factory: &dyn EngineFactory,
        sink: Arc<dyn StreamSink>,
        last_receive: Arc<AtomicU64>,
    ) -> Result<Self, ListenerError> {
        tracing::info!(
            host = %settings.host,
            port = settings.port,
            multicast = settings.multicast,
            "ingest listener starting"
        );

        let addr = resolve(&settings.host, settings.port).await?;
        let (socket, group) = if settings.multicast {
            // receive on the wildcard for the group's port, then join
            let bind_addr: SocketAddr = match addr.ip() {
                IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, settings.port).into(),
                IpAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, settings.port).into(),
            };
            let socket = UdpSocket::bind(bind_addr).await.map_err(|source| {
                ListenerError::Bind {
                    addr: bind_addr,
                    source,
                }
            })?;
            join_group(&socket, addr.ip())?;
            (socket, Some(addr.ip()))
        } else {
            let socket = UdpSocket::bind(addr)
                .await
                .map_err(|source| ListenerError::Bind { addr, source })?;
            (socket, None)
        };

        let queue = Arc::new(PacketQueue::new());
        let engine = factory.create(engine_config, queue.clone())?;

        let router = PacketRouter {
            sink,
            audio_fourcc: settings.audio_fourcc,
            video_fourcc: settings.video_fourcc,
        };

        let socket = Arc::new(socket);
        let listening = Arc::new(AtomicBool::new(true));

        let worker = tokio::spawn(receive_loop(
            socket.clone(),
            engine.clone(),
            queue.clone(),
            router.clone(),
            listening.clone(),
            last_receive,
            settings.datagram_size,
            settings.idle_timeout,
        ));

        tracing::info!(local_addr = ?socket.local_addr().ok(), "ingest listener ready");

        Ok(Self {
            socket,
            group,
            engine,
            queue,
            router,
            listening,
            state: AtomicU8::new(ListenerState::Listening as u8),
            worker: tokio::sync::Mutex::new(Some(worker)),
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> ListenerState {
        ListenerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Address the socket actually bound (useful with port 0)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr().ok()
    }

    /// Queue the engine classifies into
    pub fn queue(&self) -> &Arc<PacketQueue> {
        &self.queue
    }

    /// Engine handle, for the synchronous elementary decode paths
    pub fn engine(&self) -> &Arc<dyn DemuxEngine> {
        &self.engine
    }

    /// Stop the listener: cancel the worker cooperatively, destroy the
    /// engine, flush the queue, leave the multicast group.
    ///
    /// The worker observes cancellation within one receive timeout.
    pub async fn stop(&self) {
        let state = self.state();
        if state == ListenerState::Stopping || state == ListenerState::Stopped {
            return;
        }
        self.state
            .store(ListenerState::Stopping as u8, Ordering::Release);
        tracing::info!("listener stop");

        self.listening.store(false, Ordering::Release);
        if let Some(handle) = self.worker.lock().await.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "receive worker join failed");
            }
        }

        // a misbehaving engine must not block teardown
        if let Err(e) = self.engine.destroy() {
            tracing::warn!(error = %e, "engine destroy failed");
        }

        // flush whatever the engine produced before it was destroyed
        let leftover = self.queue.drain();
        if !leftover.is_empty() {
            tracing::debug!(count = leftover.len(), "routing drained packets");
        }
        for packet in leftover {
            self.router.route(packet);
        }

        if let Some(group) = self.group {
            let result = match group {
                IpAddr::V4(group) => self
                    .socket
                    .leave_multicast_v4(group, Ipv4Addr::UNSPECIFIED),
                IpAddr::V6(group) => self.socket.leave_multicast_v6(&group, 0),
            };
            if let Err(e) = result {
                tracing::debug!(error = %e, "failed to leave multicast group");
            }
        }

        self.state
            .store(ListenerState::Stopped as u8, Ordering::Release);
    }
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr, ListenerError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }
    lookup_host((host, port))
        .await
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| ListenerError::Resolve(host.to_string()))
}

fn join_group(socket: &UdpSocket, group: IpAddr) -> Result<(), ListenerError> {
    let result = match group {
        IpAddr::V4(group) => socket.join_multicast_v4(group, Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(group) => socket.join_multicast_v6(&group, 0),
    };
    result.map_err(|source| ListenerError::MulticastJoin { group, source })
}

/// The per-session receive worker.
///
/// Classified queue output drains ahead of new raw input; the bounded
/// receive timeout keeps cancellation latency within one tick.
#[allow(clippy::too_many_arguments)]
async fn receive_loop(
    socket: Arc<UdpSocket>,
    engine: Arc<dyn DemuxEngine>,
    queue: Arc<PacketQueue>,
    router: PacketRouter,
    listening: Arc<AtomicBool>,
    last_receive: Arc<AtomicU64>,
    datagram_size: usize,
    idle_timeout: Duration,
) {
    let mut buf = vec![0u8; datagram_size];

    while listening.load(Ordering::Acquire) {
        if let Some(packet) = queue.poll() {
            router.route(packet);
            continue;
        }

        match tokio::time::timeout(idle_timeout, socket.recv_from(&mut buf)).await {
            Ok(Ok((len, _peer))) => {
                last_receive.store(tsgate_core::now_millis(), Ordering::Release);
                crate::metrics::global_metrics().datagram_received(len as u64);
                // fresh copy: the receive buffer is reused next iteration
                let chunk = Bytes::copy_from_slice(&buf[..len]);
                engine.push_chunk(chunk);
            }
            Ok(Err(e)) => {
                if listening.load(Ordering::Acquire) {
                    tracing::warn!(error = %e, "receive failed");
                } else {
                    tracing::debug!("socket closed during receive");
                }
                // fatal to this listener only; the session goes idle and is
                // reaped through normal close semantics
                listening.store(false, Ordering::Release);
                break;
            }
            Err(_) => {
                // timeout tick: loop around and re-check the listening flag
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU64;

    use tsgate_core::packet::{fourcc, PayloadType};
    use tsgate_core::passthrough::PassthroughEngineFactory;
    use tsgate_core::sink::CollectingSink;

    use super::*;

    fn test_settings() -> ListenerSettings {
        ListenerSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
            multicast: false,
            datagram_size: 8192,
            idle_timeout: Duration::from_millis(100),
            audio_fourcc: fourcc(*b"ADTS"),
            video_fourcc: fourcc(*b"H264"),
        }
    }

    async fn start_listener(
        sink: Arc<CollectingSink>,
        last_receive: Arc<AtomicU64>,
    ) -> IngestListener {
        IngestListener::start(
            test_settings(),
            SessionConfig::default(),
            &PassthroughEngineFactory,
            sink,
            last_receive,
        )
        .await
        .expect("listener starts on loopback")
    }

    #[tokio::test]
    async fn test_receive_updates_last_receive_time() {
        let sink = Arc::new(CollectingSink::new());
        let last_receive = Arc::new(AtomicU64::new(0));
        let listener = start_listener(sink, last_receive.clone()).await;

        let target = listener.local_addr().expect("bound");
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut chunk = vec![0x47u8];
        chunk.extend_from_slice(&[0u8; 187]);
        sender.send_to(&chunk, target).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(last_receive.load(Ordering::Acquire) > 0);

        listener.stop().await;
        assert_eq!(listener.state(), ListenerState::Stopped);
    }

    #[tokio::test]
    async fn test_untyped_elementary_datagram_routes_as_video() {
        let sink = Arc::new(CollectingSink::new());
        let listener = start_listener(sink.clone(), Arc::new(AtomicU64::new(0))).await;

        let target = listener.local_addr().expect("bound");
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        // Annex-B start code, not a TS sync byte
        sender.send_to(&[0x00, 0x00, 0x01, 0x65], target).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        listener.stop().await;

        let units = sink.video_units();
        assert_eq!(units.len(), 1);
        assert_eq!(sink.video_codec(), Some(fourcc(*b"H264")));
        assert!(sink.audio_units().is_empty());
    }

    #[tokio::test]
    async fn test_stop_drains_queue_to_sink() {
        let sink = Arc::new(CollectingSink::new());
        let listener = start_listener(sink.clone(), Arc::new(AtomicU64::new(0))).await;

        // packets buffered by the engine but not yet consumed
        for timestamp in 0..3 {
            listener.queue().offer(Packet::from_samples(timestamp, vec![0i16; 16]));
        }
        listener.stop().await;

        // every buffered packet reached the sink, in order, whether the
        // worker consumed it or the shutdown drain flushed it
        let units = sink.audio_units();
        let timestamps: Vec<u64> = units.iter().map(|u| u.timestamp).collect();
        assert_eq!(timestamps, vec![0, 1, 2]);
        assert!(listener.queue().is_empty());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let sink = Arc::new(CollectingSink::new());
        let listener = start_listener(sink, Arc::new(AtomicU64::new(0))).await;

        listener.stop().await;
        listener.stop().await;
        assert_eq!(listener.state(), ListenerState::Stopped);
    }

    #[tokio::test]
    async fn test_codec_initialized_once() {
        let sink = Arc::new(CollectingSink::new());
        let router = PacketRouter {
            sink: sink.clone(),
            audio_fourcc: fourcc(*b"ADTS"),
            video_fourcc: fourcc(*b"H264"),
        };

        for timestamp in 0..5 {
            router.route(Packet::from_samples(timestamp, vec![0i16; 8]));
        }

        assert_eq!(sink.audio_codec(), Some(fourcc(*b"ADTS")));
        assert_eq!(sink.audio_units().len(), 5);
        assert_eq!(sink.video_codec(), None);
    }

    #[tokio::test]
    async fn test_container_packets_are_not_dispatched() {
        let sink = Arc::new(CollectingSink::new());
        let router = PacketRouter {
            sink: sink.clone(),
            audio_fourcc: PayloadType::Audio.type_id(),
            video_fourcc: PayloadType::Video.type_id(),
        };

        router.route(Packet::from_bytes(
            0,
            Bytes::from(vec![0x47u8; 188]),
        ));

        assert!(sink.audio_units().is_empty());
        assert!(sink.video_units().is_empty());
        assert_eq!(sink.audio_codec(), None);
    }

    #[tokio::test]
    async fn test_bind_conflict_fails_start() {
        let first = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = first.local_addr().unwrap().port();

        let mut settings = test_settings();
        settings.port = port;
        let result = IngestListener::start(
            settings,
            SessionConfig::default(),
            &PassthroughEngineFactory,
            Arc::new(CollectingSink::new()),
            Arc::new(AtomicU64::new(0)),
        )
        .await;

        assert!(matches!(result, Err(ListenerError::Bind { .. })));
    }
}
