//! Session management endpoints.
//!
//! Handles creating, querying, and killing ingest sessions.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use tsgate_core::packet::fourcc_from_str;

use super::AppState;
use crate::session::{CreateSessionParams, SessionError};

/// Request body for creating a session
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    /// Published stream name; must be unique among active sessions
    pub name: String,

    /// Host or multicast group to receive on
    #[serde(default = "default_ingest_host")]
    pub host: String,

    /// Port to receive on
    pub port: u16,

    /// Whether `host` is a multicast group to join
    #[serde(default)]
    pub multicast: bool,

    /// Audio type fourCC; gateway default when omitted
    #[serde(default)]
    pub audio_type: Option<String>,

    /// Video type fourCC; gateway default when omitted
    #[serde(default)]
    pub video_type: Option<String>,

    /// Metadata type fourCC; gateway default when omitted
    #[serde(default)]
    pub metadata_type: Option<String>,
}

fn default_ingest_host() -> String {
    "0.0.0.0".to_string()
}

/// Response body for session creation
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    /// Internal session id
    pub session_id: String,

    /// Published stream name
    pub name: String,

    /// UDP URL the encoder should push to
    pub ingest_url: String,

    /// FFmpeg command for pushing a source in copy mode
    pub ffmpeg_command: String,

    /// Session status URL
    pub status_url: String,

    /// When the session was created (ISO 8601)
    pub created_at: String,
}

/// Response body for session status
#[derive(Debug, Serialize)]
pub struct SessionStatusResponse {
    /// Internal session id
    pub session_id: String,

    /// Published stream name
    pub name: String,

    /// "listening" or "closed"
    pub state: String,

    pub host: String,

    pub port: u16,

    pub multicast: bool,

    /// Millis since the latest received datagram
    pub idle_ms: u64,

    /// When the session was created (ISO 8601)
    pub created_at: String,
}

/// Response body for session listing
#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<String>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Create a new ingest session
///
/// POST /api/ingest/sessions
pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> impl IntoResponse {
    let defaults = &state.config.stream;
    let audio_fourcc = match resolve_type(req.audio_type.as_deref(), &defaults.audio_type) {
        Ok(fourcc) => fourcc,
        Err(response) => return response,
    };
    let video_fourcc = match resolve_type(req.video_type.as_deref(), &defaults.video_type) {
        Ok(fourcc) => fourcc,
        Err(response) => return response,
    };
    let metadata_fourcc = match resolve_type(req.metadata_type.as_deref(), &defaults.metadata_type)
    {
        Ok(fourcc) => fourcc,
        Err(response) => return response,
    };

    let params = CreateSessionParams {
        name: req.name,
        host: req.host,
        port: req.port,
        multicast: req.multicast,
        audio_fourcc,
        video_fourcc,
        metadata_fourcc,
    };

    let session = match state.session_manager.create_session(params).await {
        Ok(session) => session,
        Err(e) => return session_error_response(e),
    };

    let ingest_url = build_ingest_url(&session.host, session.port);
    (
        StatusCode::CREATED,
        Json(SessionResponse {
            session_id: session.id.clone(),
            name: session.name.clone(),
            ffmpeg_command: build_ffmpeg_command(&ingest_url),
            ingest_url,
            status_url: format!("/api/ingest/sessions/{}", session.name),
            created_at: session.created_at.to_rfc3339(),
        }),
    )
        .into_response()
}

/// List active session names
///
/// GET /api/ingest/sessions
pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.session_manager.session_names().await;
    Json(SessionListResponse { sessions })
}

/// Get session status
///
/// GET /api/ingest/sessions/:name
pub async fn get_session(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let session = match state.session_manager.get_session(&name).await {
        Some(session) => session,
        None => return not_found(&name),
    };

    let state_str = if session.is_closed() { "closed" } else { "listening" };
    (
        StatusCode::OK,
        Json(SessionStatusResponse {
            session_id: session.id.clone(),
            name: session.name.clone(),
            state: state_str.to_string(),
            host: session.host.clone(),
            port: session.port,
            multicast: session.multicast,
            idle_ms: session.last_receive_age(tsgate_core::now_millis()),
            created_at: session.created_at.to_rfc3339(),
        }),
    )
        .into_response()
}

/// Kill a session
///
/// DELETE /api/ingest/sessions/:name
pub async fn delete_session(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.session_manager.kill_session(&name).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(_) => not_found(&name),
    }
}

fn resolve_type(
    requested: Option<&str>,
    default: &str,
) -> Result<u32, axum::response::Response> {
    let tag = requested.unwrap_or(default);
    fourcc_from_str(tag).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "invalid_type".to_string(),
                message: format!("Not a four-character code: {:?}", tag),
            }),
        )
            .into_response()
    })
}

fn session_error_response(error: SessionError) -> axum::response::Response {
    let (status, code) = match &error {
        SessionError::InvalidName => (StatusCode::BAD_REQUEST, "invalid_name"),
        SessionError::NameConflict(_) => (StatusCode::CONFLICT, "name_conflict"),
        SessionError::NotFound => (StatusCode::NOT_FOUND, "session_not_found"),
        SessionError::MaxSessionsReached => (StatusCode::SERVICE_UNAVAILABLE, "too_many_sessions"),
        SessionError::Listener(_) => (StatusCode::BAD_GATEWAY, "listener_start_failed"),
        SessionError::Sink(_) => (StatusCode::SERVICE_UNAVAILABLE, "sink_open_failed"),
    };
    (
        status,
        Json(ErrorResponse {
            error: code.to_string(),
            message: error.to_string(),
        }),
    )
        .into_response()
}

fn not_found(name: &str) -> axum::response::Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "session_not_found".to_string(),
            message: format!("Session {} not found", name),
        }),
    )
        .into_response()
}

/// Build the UDP URL encoders push to
fn build_ingest_url(host: &str, port: u16) -> String {
    format!("udp://{}:{}", host, port)
}

/// Build an FFmpeg copy-mode push command. `pkt_size` keeps datagrams
/// 188-aligned (7 TS packets per datagram).
fn build_ffmpeg_command(ingest_url: &str) -> String {
    format!(
        "ffmpeg -re -i '<YOUR_SOURCE>' -c copy -f mpegts '{}?pkt_size=1316'",
        ingest_url
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_ingest_url() {
        assert_eq!(build_ingest_url("0.0.0.0", 5004), "udp://0.0.0.0:5004");
    }

    #[test]
    fn test_ffmpeg_command() {
        let cmd = build_ffmpeg_command("udp://239.1.1.1:5004");
        assert!(cmd.contains("-c copy"));
        assert!(cmd.contains("-f mpegts"));
        assert!(cmd.contains("pkt_size=1316"));
    }

    #[test]
    fn test_resolve_type_falls_back_to_default() {
        assert_eq!(
            resolve_type(None, "ADTS").ok(),
            fourcc_from_str("ADTS")
        );
        assert_eq!(
            resolve_type(Some("MP2A"), "ADTS").ok(),
            fourcc_from_str("MP2A")
        );
        assert!(resolve_type(Some("bad"), "ADTS").is_err());
    }
}
