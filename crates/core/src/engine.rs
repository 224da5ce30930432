//! Demultiplexing engine boundary.
//!
//! The binary transport-stream demuxer/muxer is an external collaborator.
//! Services depend only on the [`DemuxEngine`] abstraction: an engine
//! accepts raw chunks and asynchronously pushes classified packets onto the
//! session's [`PacketQueue`], possibly from its own internal worker
//! thread(s). Engine libraries are initialized by the process entry point;
//! sessions receive an [`EngineFactory`] and never trigger loading
//! themselves.

use std::sync::Arc;

use bytes::Bytes;

use crate::error::Result;
use crate::queue::PacketQueue;

/// Immutable configuration snapshot handed to the engine at creation.
///
/// Owned by the session that created it; never mutated after hand-off. PID
/// values of zero mean "not set" and leave the engine to discover the
/// program layout itself.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Session name (matches the published stream name)
    pub name: String,

    /// Video dimensions, when known up front
    pub width: u32,
    pub height: u32,

    /// Audio sample rate and channel count, when known up front
    pub sample_rate: u32,
    pub channels: u32,

    /// Transport-stream PID hints for demuxing
    pub pmt_pid: u16,
    pub audio_pid: u16,
    pub video_pid: u16,
    pub meta_pid: u16,

    /// PES elementary stream id used when re-multiplexing
    pub stream_id: u8,

    /// Owning connection, for engine-side diagnostics
    pub connection_id: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "tsgate".to_string(),
            width: 0,
            height: 0,
            sample_rate: 0,
            channels: 0,
            pmt_pid: 0,
            audio_pid: 0,
            video_pid: 0,
            meta_pid: 0,
            // default id, start of the PES video range
            stream_id: 0xe0,
            connection_id: 0,
        }
    }
}

/// Handle to a demultiplexing engine instance.
pub trait DemuxEngine: Send + Sync {
    /// Feed a raw chunk to the engine. Fire-and-forget: classified output
    /// arrives on the packet queue, possibly after this call returns.
    fn push_chunk(&self, chunk: Bytes);

    /// Synchronous decode path for pre-typed elementary audio, bypassing
    /// transport-stream demux. Returns true if the decoder accepted.
    fn decode_audio(&self, samples: &[i16]) -> bool;

    /// Synchronous decode path for pre-typed elementary video. Returns true
    /// if the decoder accepted.
    fn decode_video(&self, data: &[u8]) -> bool;

    /// Re-multiplex an elementary payload into the outgoing transport
    /// stream. Engines without a muxer reject.
    fn mux(&self, _data: &[u8], _pts: u64, _stream_type: u8, _pid: u16) -> bool {
        false
    }

    /// Release engine-side resources. Idempotent; must tolerate being
    /// called on an engine that produced no output.
    fn destroy(&self) -> Result<()>;
}

/// Factory for engine instances, injected at process startup.
pub trait EngineFactory: Send + Sync {
    /// Build an engine that classifies into the given queue.
    fn create(&self, config: SessionConfig, queue: Arc<PacketQueue>) -> Result<Arc<dyn DemuxEngine>>;
}
