//! Packet data model and payload classification.
//!
//! A [`Packet`] is the classified unit of media data produced by the demux
//! stage. Classification happens once, at construction, and is total: a type
//! identifier outside the known sets yields a packet with neither the audio
//! nor the video flag set, so unrecognized payloads pass through instead of
//! being rejected. New codec fourCCs therefore never break ingestion.

use bytes::{BufMut, Bytes, BytesMut};

/// MPEG-TS sync byte. An untyped byte payload starting with this is muxed
/// transport-stream content rather than an elementary unit.
pub const TS_SYNC_BYTE: u8 = 0x47;

/// Pack a four-character code big-endian into a 32-bit identifier.
pub const fn fourcc(tag: [u8; 4]) -> u32 {
    ((tag[0] as u32) << 24) | ((tag[1] as u32) << 16) | ((tag[2] as u32) << 8) | (tag[3] as u32)
}

/// Parse a four-character code from its string form (exactly 4 ASCII bytes).
pub fn fourcc_from_str(tag: &str) -> Option<u32> {
    let bytes = tag.as_bytes();
    if bytes.len() != 4 || !bytes.iter().all(u8::is_ascii) {
        return None;
    }
    Some(fourcc([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Payload types we expect at time of writing. Any H.264 or H.265 payload is
/// expected in Annex-B format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadType {
    Unknown,
    Audio,
    Video,
    Meta,
    I420,
    Adts,
    H264,
    Hevc,
    Mp2a,
    Mp1v,
    Id3,
    Klva,
}

impl PayloadType {
    /// Numeric identifier: a small integer for the common classes or a
    /// big-endian-packed fourCC for specific codec/container types.
    pub const fn type_id(self) -> u32 {
        match self {
            PayloadType::Unknown => 0,
            PayloadType::Audio => 8,
            PayloadType::Video => 9,
            PayloadType::Meta => 12,
            PayloadType::I420 => fourcc(*b"I420"),
            PayloadType::Adts => fourcc(*b"ADTS"),
            PayloadType::H264 => fourcc(*b"H264"),
            PayloadType::Hevc => fourcc(*b"HEVC"),
            PayloadType::Mp2a => fourcc(*b"MP2A"),
            PayloadType::Mp1v => fourcc(*b"MP1V"),
            PayloadType::Id3 => fourcc(*b"ID3 "),
            PayloadType::Klva => fourcc(*b"KLVA"),
        }
    }

    /// Look up a known payload type by its identifier.
    pub fn from_type_id(type_id: u32) -> Option<Self> {
        const I420: u32 = fourcc(*b"I420");
        const ADTS: u32 = fourcc(*b"ADTS");
        const H264: u32 = fourcc(*b"H264");
        const HEVC: u32 = fourcc(*b"HEVC");
        const MP2A: u32 = fourcc(*b"MP2A");
        const MP1V: u32 = fourcc(*b"MP1V");
        const ID3: u32 = fourcc(*b"ID3 ");
        const KLVA: u32 = fourcc(*b"KLVA");
        match type_id {
            0 => Some(PayloadType::Unknown),
            8 => Some(PayloadType::Audio),
            9 => Some(PayloadType::Video),
            12 => Some(PayloadType::Meta),
            I420 => Some(PayloadType::I420),
            ADTS => Some(PayloadType::Adts),
            H264 => Some(PayloadType::H264),
            HEVC => Some(PayloadType::Hevc),
            MP2A => Some(PayloadType::Mp2a),
            MP1V => Some(PayloadType::Mp1v),
            ID3 => Some(PayloadType::Id3),
            KLVA => Some(PayloadType::Klva),
            _ => None,
        }
    }

    /// True for identifiers in the known audio set.
    pub const fn is_audio(self) -> bool {
        matches!(self, PayloadType::Audio | PayloadType::Adts | PayloadType::Mp2a)
    }

    /// True for identifiers in the known video set.
    pub const fn is_video(self) -> bool {
        matches!(
            self,
            PayloadType::Video | PayloadType::H264 | PayloadType::Hevc | PayloadType::Mp1v
        )
    }
}

/// Payload carried by a [`Packet`]: opaque bytes or raw 16-bit PCM samples.
#[derive(Debug, Clone)]
pub enum PacketPayload {
    /// Immutable byte sequence (elementary unit or muxed TS content)
    Bytes(Bytes),

    /// Raw PCM samples; only ever audio
    Samples(Vec<i16>),
}

/// Classified unit of media data produced by the demux stage.
///
/// Constructed once, immutable, consumed exactly once by routing. The
/// timestamp is capture time in milliseconds, assigned at receipt.
#[derive(Debug, Clone)]
pub struct Packet {
    timestamp: u64,
    payload: PacketPayload,
    type_id: u32,
    audio: bool,
    video: bool,
    transport_stream: bool,
}

impl Packet {
    /// Untyped byte payload: video or muxed transport-stream content,
    /// decided solely by the leading sync byte.
    pub fn from_bytes(timestamp: u64, payload: Bytes) -> Self {
        let ts = payload.first() == Some(&TS_SYNC_BYTE);
        let (video, type_id) = if ts {
            (false, PayloadType::Unknown.type_id())
        } else {
            (true, PayloadType::Video.type_id())
        };
        Self {
            timestamp,
            payload: PacketPayload::Bytes(payload),
            type_id,
            audio: false,
            video,
            transport_stream: ts,
        }
    }

    /// Byte payload with an explicit type identifier.
    ///
    /// Identifiers outside the known sets leave both media flags off; the
    /// packet passes through unflagged rather than being rejected.
    pub fn from_typed(timestamp: u64, payload: Bytes, type_id: u32) -> Self {
        let ts = payload.first() == Some(&TS_SYNC_BYTE);
        let (audio, video) = match PayloadType::from_type_id(type_id) {
            Some(known) => (known.is_audio(), known.is_video()),
            None => (false, false),
        };
        Self {
            timestamp,
            payload: PacketPayload::Bytes(payload),
            type_id,
            audio,
            video,
            transport_stream: ts,
        }
    }

    /// Raw 16-bit PCM payload; always audio, never transport stream.
    pub fn from_samples(timestamp: u64, samples: Vec<i16>) -> Self {
        Self {
            timestamp,
            payload: PacketPayload::Samples(samples),
            type_id: PayloadType::Audio.type_id(),
            audio: true,
            video: false,
            transport_stream: false,
        }
    }

    /// Capture timestamp in milliseconds.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Raw type identifier (small integer or packed fourCC).
    pub fn type_id(&self) -> u32 {
        self.type_id
    }

    pub fn is_audio(&self) -> bool {
        self.audio
    }

    pub fn is_video(&self) -> bool {
        self.video
    }

    /// True for muxed transport-stream content (container passthrough).
    pub fn is_transport_stream(&self) -> bool {
        self.transport_stream
    }

    pub fn payload(&self) -> &PacketPayload {
        &self.payload
    }

    /// Byte payload, if this packet carries one.
    pub fn bytes(&self) -> Option<&Bytes> {
        match &self.payload {
            PacketPayload::Bytes(bytes) => Some(bytes),
            PacketPayload::Samples(_) => None,
        }
    }

    /// Sample payload, if this packet carries one.
    pub fn samples(&self) -> Option<&[i16]> {
        match &self.payload {
            PacketPayload::Bytes(_) => None,
            PacketPayload::Samples(samples) => Some(samples),
        }
    }

    /// Payload rendered as dispatchable bytes; PCM samples serialize
    /// little-endian.
    pub fn payload_bytes(&self) -> Bytes {
        match &self.payload {
            PacketPayload::Bytes(bytes) => bytes.clone(),
            PacketPayload::Samples(samples) => {
                let mut buf = BytesMut::with_capacity(samples.len() * 2);
                for sample in samples {
                    buf.put_i16_le(*sample);
                }
                buf.freeze()
            }
        }
    }

    /// Payload length in elements (bytes or samples).
    pub fn len(&self) -> usize {
        match &self.payload {
            PacketPayload::Bytes(bytes) => bytes.len(),
            PacketPayload::Samples(samples) => samples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Short hex rendering of a payload prefix for trace logging.
pub fn hex_preview(data: &[u8], max: usize) -> String {
    let shown = &data[..data.len().min(max)];
    let mut out = String::with_capacity(shown.len() * 2 + 2);
    for byte in shown {
        out.push_str(&format!("{:02x}", byte));
    }
    if data.len() > max {
        out.push_str("..");
    }
    out
}
