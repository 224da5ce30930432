//! Downstream broadcast pipeline boundary.
//!
//! A [`StreamSink`] accepts timestamped audio/video units for one published
//! stream and tracks whether codecs have been initialized for the session.
//! Sinks are opened and released per stream name through a
//! [`StreamSinkFactory`], the gateway's handle to the broadcast routing
//! scope.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::error::Result;

/// A timestamped media unit handed to the downstream pipeline.
#[derive(Debug, Clone)]
pub struct MediaUnit {
    /// Capture timestamp in milliseconds
    pub timestamp: u64,

    /// Elementary payload bytes
    pub payload: Bytes,
}

/// Downstream pipeline for one published stream.
pub trait StreamSink: Send + Sync {
    fn has_audio_codec(&self) -> bool;

    /// Record the audio codec for the session; called at most once per
    /// session by the dispatch stage.
    fn set_audio_codec(&self, fourcc: u32);

    fn has_video_codec(&self) -> bool;

    fn set_video_codec(&self, fourcc: u32);

    fn dispatch_audio(&self, unit: MediaUnit);

    fn dispatch_video(&self, unit: MediaUnit);
}

/// Opens and releases per-stream sinks.
pub trait StreamSinkFactory: Send + Sync {
    /// Register the stream name with the routing scope and return its sink.
    fn open(&self, stream_name: &str) -> Result<Arc<dyn StreamSink>>;

    /// Release the resources held for a stream. Called once, from session
    /// close.
    fn release(&self, stream_name: &str);
}

/// Sink that discards media units while still tracking codec setup.
///
/// Default wiring when no broadcast pipeline is attached.
#[derive(Debug, Default)]
pub struct NullSink {
    audio_codec: AtomicU32,
    video_codec: AtomicU32,
}

impl StreamSink for NullSink {
    fn has_audio_codec(&self) -> bool {
        self.audio_codec.load(Ordering::Acquire) != 0
    }

    fn set_audio_codec(&self, fourcc: u32) {
        self.audio_codec.store(fourcc, Ordering::Release);
    }

    fn has_video_codec(&self) -> bool {
        self.video_codec.load(Ordering::Acquire) != 0
    }

    fn set_video_codec(&self, fourcc: u32) {
        self.video_codec.store(fourcc, Ordering::Release);
    }

    fn dispatch_audio(&self, unit: MediaUnit) {
        tracing::trace!(timestamp = unit.timestamp, len = unit.payload.len(), "audio discarded");
    }

    fn dispatch_video(&self, unit: MediaUnit) {
        tracing::trace!(timestamp = unit.timestamp, len = unit.payload.len(), "video discarded");
    }
}

/// Factory producing [`NullSink`] instances.
#[derive(Debug, Default)]
pub struct NullSinkFactory;

impl StreamSinkFactory for NullSinkFactory {
    fn open(&self, stream_name: &str) -> Result<Arc<dyn StreamSink>> {
        tracing::debug!(stream = %stream_name, "null sink opened");
        Ok(Arc::new(NullSink::default()))
    }

    fn release(&self, stream_name: &str) {
        tracing::debug!(stream = %stream_name, "null sink released");
    }
}

/// In-memory sink that records dispatched units, for tests and diagnostics.
#[derive(Debug, Default)]
pub struct CollectingSink {
    audio_codec: AtomicU32,
    video_codec: AtomicU32,
    audio_units: Mutex<Vec<MediaUnit>>,
    video_units: Mutex<Vec<MediaUnit>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of dispatched audio units.
    pub fn audio_units(&self) -> Vec<MediaUnit> {
        self.audio_units.lock().unwrap().clone()
    }

    /// Snapshot of dispatched video units.
    pub fn video_units(&self) -> Vec<MediaUnit> {
        self.video_units.lock().unwrap().clone()
    }

    /// The audio codec recorded for the session, if initialized.
    pub fn audio_codec(&self) -> Option<u32> {
        match self.audio_codec.load(Ordering::Acquire) {
            0 => None,
            fourcc => Some(fourcc),
        }
    }

    /// The video codec recorded for the session, if initialized.
    pub fn video_codec(&self) -> Option<u32> {
        match self.video_codec.load(Ordering::Acquire) {
            0 => None,
            fourcc => Some(fourcc),
        }
    }
}

impl StreamSink for CollectingSink {
    fn has_audio_codec(&self) -> bool {
        self.audio_codec.load(Ordering::Acquire) != 0
    }

    fn set_audio_codec(&self, fourcc: u32) {
        self.audio_codec.store(fourcc, Ordering::Release);
    }

    fn has_video_codec(&self) -> bool {
        self.video_codec.load(Ordering::Acquire) != 0
    }

    fn set_video_codec(&self, fourcc: u32) {
        self.video_codec.store(fourcc, Ordering::Release);
    }

    fn dispatch_audio(&self, unit: MediaUnit) {
        self.audio_units.lock().unwrap().push(unit);
    }

    fn dispatch_video(&self, unit: MediaUnit) {
        self.video_units.lock().unwrap().push(unit);
    }
}
