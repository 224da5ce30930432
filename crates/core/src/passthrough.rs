//! Pure-software demux engine.
//!
//! Classifies incoming chunks synchronously and pushes them straight onto
//! the packet queue: transport-stream chunks pass through container-flagged,
//! elementary payloads land as typed packets. Stands in for the native
//! demuxer in tests and in deployments that ingest pre-segmented elementary
//! streams.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use crate::engine::{DemuxEngine, EngineFactory, SessionConfig};
use crate::error::Result;
use crate::now_millis;
use crate::packet::{hex_preview, Packet, PayloadType};
use crate::queue::PacketQueue;

/// Engine that classifies without demultiplexing.
pub struct PassthroughEngine {
    config: SessionConfig,
    queue: Arc<PacketQueue>,
    destroyed: AtomicBool,
}

impl PassthroughEngine {
    pub fn new(config: SessionConfig, queue: Arc<PacketQueue>) -> Self {
        Self {
            config,
            queue,
            destroyed: AtomicBool::new(false),
        }
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}

impl DemuxEngine for PassthroughEngine {
    fn push_chunk(&self, chunk: Bytes) {
        if self.is_destroyed() {
            return;
        }
        tracing::trace!(
            name = %self.config.name,
            len = chunk.len(),
            payload = %hex_preview(&chunk, 16),
            "chunk"
        );
        self.queue.offer(Packet::from_bytes(now_millis(), chunk));
    }

    fn decode_audio(&self, samples: &[i16]) -> bool {
        if self.is_destroyed() {
            return false;
        }
        self.queue.offer(Packet::from_samples(now_millis(), samples.to_vec()));
        true
    }

    fn decode_video(&self, data: &[u8]) -> bool {
        if self.is_destroyed() {
            return false;
        }
        self.queue.offer(Packet::from_typed(
            now_millis(),
            Bytes::copy_from_slice(data),
            PayloadType::Video.type_id(),
        ));
        true
    }

    fn destroy(&self) -> Result<()> {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            // already destroyed
            return Ok(());
        }
        tracing::debug!(name = %self.config.name, "engine destroyed");
        Ok(())
    }
}

/// Factory producing [`PassthroughEngine`] instances.
#[derive(Debug, Default)]
pub struct PassthroughEngineFactory;

impl EngineFactory for PassthroughEngineFactory {
    fn create(&self, config: SessionConfig, queue: Arc<PacketQueue>) -> Result<Arc<dyn DemuxEngine>> {
        Ok(Arc::new(PassthroughEngine::new(config, queue)))
    }
}
