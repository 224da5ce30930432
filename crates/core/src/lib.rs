//! Core library for the tsgate MPEG-TS ingest gateway.
//!
//! This crate holds the pieces shared between ingest services and the
//! collaborators they bridge:
//!
//! - [`packet`] - the classified media unit produced by the demux stage
//! - [`queue`] - the producer/consumer hand-off between engine and consumer
//! - [`engine`] - the demultiplexing engine boundary (trait + factory)
//! - [`passthrough`] - pure-software engine for tests and elementary ingest
//! - [`sink`] - the downstream broadcast pipeline boundary
//!
//! The binary transport-stream demuxer itself is an external collaborator;
//! services depend only on the [`engine::DemuxEngine`] abstraction and
//! receive an already-initialized [`engine::EngineFactory`] at startup.

pub mod engine;
pub mod error;
pub mod packet;
pub mod passthrough;
pub mod queue;
pub mod sink;

pub use error::{Error, Result};
pub use packet::{Packet, PacketPayload, PayloadType};
pub use queue::PacketQueue;

/// Capture-time clock: wall-clock milliseconds assigned at receipt.
///
/// Packet timestamps come from this clock, never from the bitstream.
pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}
