//! Integration tests for the UDP ingest gateway.
//!
//! These tests drive the complete flow: session creation, datagrams pushed
//! over real loopback sockets, classification through the passthrough
//! engine, dispatch into a collecting sink, and lifecycle teardown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::UdpSocket;

use tsgate_core::now_millis;
use tsgate_core::packet::fourcc;
use tsgate_core::passthrough::PassthroughEngineFactory;
use tsgate_core::sink::{CollectingSink, StreamSink, StreamSinkFactory};
use tsgate_ingest_udp::config::Config;
use tsgate_ingest_udp::session::{CreateSessionParams, SessionError, SessionManager};

/// Sink factory handing out collecting sinks and counting releases
#[derive(Default)]
struct TestSinkFactory {
    sinks: Mutex<HashMap<String, Arc<CollectingSink>>>,
    releases: AtomicUsize,
}

impl TestSinkFactory {
    fn sink(&self, name: &str) -> Arc<CollectingSink> {
        self.sinks.lock().unwrap().get(name).cloned().expect("sink opened")
    }
}

impl StreamSinkFactory for TestSinkFactory {
    fn open(&self, stream_name: &str) -> tsgate_core::Result<Arc<dyn StreamSink>> {
        let sink = Arc::new(CollectingSink::new());
        self.sinks
            .lock()
            .unwrap()
            .insert(stream_name.to_string(), sink.clone());
        Ok(sink)
    }

    fn release(&self, _stream_name: &str) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

fn test_manager(idle_timeout_ms: u64) -> (Arc<SessionManager>, Arc<TestSinkFactory>) {
    let mut config = Config::default();
    config.ingest.idle_timeout_ms = idle_timeout_ms;
    let sink_factory = Arc::new(TestSinkFactory::default());
    let manager = Arc::new(SessionManager::new(
        Arc::new(config),
        Arc::new(PassthroughEngineFactory),
        sink_factory.clone(),
    ));
    (manager, sink_factory)
}

fn params(name: &str) -> CreateSessionParams {
    CreateSessionParams {
        name: name.to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        multicast: false,
        audio_fourcc: fourcc(*b"ADTS"),
        video_fourcc: fourcc(*b"H264"),
        metadata_fourcc: fourcc(*b"ID3 "),
    }
}

/// A 188-byte transport-stream packet with the sync byte set
fn ts_chunk() -> Vec<u8> {
    let mut chunk = vec![0x47u8];
    chunk.extend_from_slice(&[0u8; 187]);
    chunk
}

#[tokio::test]
async fn test_ts_chunk_keeps_session_alive() {
    let (manager, _sinks) = test_manager(8000);
    let session = manager.create_session(params("live")).await.unwrap();
    let target = session.local_addr().await.expect("listener bound");

    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    sender.send_to(&ts_chunk(), target).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // a receive arrived ~100ms ago: not idle
    assert!(!session.is_idle(now_millis()).await);
    assert!(!session.is_closed());

    // with no further input, a check 9s past the receive is idle and the
    // session is torn down as a side effect
    assert!(session.is_idle(now_millis() + 9000).await);
    assert!(session.is_closed());
    assert!(manager.get_session("live").await.is_none());
}

#[tokio::test]
async fn test_ts_passthrough_is_not_dispatched() {
    let (manager, sinks) = test_manager(8000);
    let session = manager.create_session(params("live")).await.unwrap();
    let target = session.local_addr().await.expect("listener bound");

    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    for _ in 0..3 {
        sender.send_to(&ts_chunk(), target).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    session.close().await;

    // container passthrough never reaches the audio/video sink paths
    let sink = sinks.sink("live");
    assert!(sink.audio_units().is_empty());
    assert!(sink.video_units().is_empty());
    assert_eq!(sink.audio_codec(), None);
    assert_eq!(sink.video_codec(), None);
}

#[tokio::test]
async fn test_elementary_video_reaches_sink_with_codec() {
    let (manager, sinks) = test_manager(8000);
    let session = manager.create_session(params("live")).await.unwrap();
    let target = session.local_addr().await.expect("listener bound");

    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    // Annex-B start codes, not TS sync bytes: classified as raw video
    for _ in 0..4 {
        sender.send_to(&[0x00, 0x00, 0x00, 0x01, 0x65, 0x88], target).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(150)).await;
    session.close().await;

    let sink = sinks.sink("live");
    assert_eq!(sink.video_units().len(), 4);
    // codec initialized lazily, exactly once, with the session's fourCC
    assert_eq!(sink.video_codec(), Some(fourcc(*b"H264")));
    assert!(sink.audio_units().is_empty());
}

#[tokio::test]
async fn test_name_conflict_and_reuse_after_close() {
    let (manager, _sinks) = test_manager(8000);

    let first = manager.create_session(params("exclusive")).await.unwrap();
    match manager.create_session(params("exclusive")).await {
        Err(SessionError::NameConflict(name)) => assert_eq!(name, "exclusive"),
        other => panic!("expected NameConflict, got {:?}", other.map(|s| s.name.clone())),
    }

    first.close().await;
    manager.create_session(params("exclusive")).await.unwrap();
}

#[tokio::test]
async fn test_kill_releases_resources_exactly_once() {
    let (manager, sinks) = test_manager(8000);
    let session = manager.create_session(params("live")).await.unwrap();

    manager.kill_session("live").await.unwrap();
    assert!(session.is_closed());
    assert_eq!(sinks.releases.load(Ordering::SeqCst), 1);

    // kill after close: not found, and no second release
    assert!(matches!(
        manager.kill_session("live").await,
        Err(SessionError::NotFound)
    ));
    assert_eq!(sinks.releases.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrent_admin_close_and_idle_check() {
    let (manager, sinks) = test_manager(8000);
    let session = manager.create_session(params("live")).await.unwrap();

    // an idle check on one task races an administrative close on another;
    // exactly one performs teardown
    let idle_check = {
        let session = session.clone();
        tokio::spawn(async move { session.is_idle(now_millis() + 9000).await })
    };
    session.close().await;
    idle_check.await.unwrap();

    assert!(session.is_closed());
    assert_eq!(sinks.releases.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_reaper_sweep_closes_idle_sessions_only() {
    let (manager, _sinks) = test_manager(300);
    let stale = manager.create_session(params("stale")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    let fresh = manager.create_session(params("fresh")).await.unwrap();

    // keep "fresh" alive past the point where "stale" times out
    let target = fresh.local_addr().await.expect("listener bound");
    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;
    sender.send_to(&ts_chunk(), target).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    manager.reap_idle().await;

    assert!(stale.is_closed());
    assert!(!fresh.is_closed());
    assert_eq!(manager.session_names().await, vec!["fresh".to_string()]);

    fresh.close().await;
}

#[tokio::test]
async fn test_shutdown_drains_buffered_packets() {
    let (manager, sinks) = test_manager(8000);
    let session = manager.create_session(params("live")).await.unwrap();
    let target = session.local_addr().await.expect("listener bound");

    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    sender.send_to(&[0x00, 0x00, 0x00, 0x01, 0x41], target).await.unwrap();

    // close immediately: whatever the engine produced must still reach the
    // sink through the shutdown drain, not be dropped
    tokio::time::sleep(Duration::from_millis(80)).await;
    session.close().await;

    let sink = sinks.sink("live");
    assert_eq!(sink.video_units().len(), 1);
}
