//! UDP Ingest Gateway
//!
//! Ingests MPEG-TS (or raw elementary audio/video) pushed over UDP or
//! multicast, reconstructs classified media units via a demux engine, and
//! hands them to the downstream broadcast pipeline. Sessions are created
//! and destroyed over a small HTTP control plane.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                        tsgate-ingest-udp                           │
//! ├────────────────────────────────────────────────────────────────────┤
//! │                                                                    │
//! │  ┌──────────────────┐                                              │
//! │  │  HTTP API Server │ ← POST   /api/ingest/sessions                │
//! │  │  (axum)          │ ← DELETE /api/ingest/sessions/:name          │
//! │  └────────┬─────────┘                                              │
//! │           │ creates                                                │
//! │           ▼                                                        │
//! │  ┌──────────────────┐  name conflicts, idle reaper                 │
//! │  │  Session Manager │                                              │
//! │  └────────┬─────────┘                                              │
//! │           │ starts                                                 │
//! │           ▼                                                        │
//! │  ┌──────────────────────────────────────────────────────────────┐  │
//! │  │  Ingest Listener (one UDP socket + worker per session)       │  │
//! │  │  socket → DemuxEngine → PacketQueue → route → StreamSink     │  │
//! │  └──────────────────────────────────────────────────────────────┘  │
//! └────────────────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod listener;
pub mod metrics;
pub mod session;
