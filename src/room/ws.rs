//! The websocket gateway: handshake gate, keepalive loop, and relay.
//!
//! Authentication happens before the upgrade completes — a rejected
//! handshake never creates a partial session. Once upgraded, a connection
//! handles each inbound event to completion (including awaited generation
//! calls) before reading the next one; other connections proceed
//! independently.

use std::collections::HashMap;
use std::time::Duration;

use axum::{
    Json,
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast;
use tokio::time::Instant;
use uuid::Uuid;

use crate::api::SharedState;
use crate::auth::extract_bearer;
use crate::errors::{DispatchError, GatewayError};

use super::{OutboundMessage, RoomEvent, Session};

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong response before considering the connection dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

// ── Wire events ──────────────────────────────────────────────────────

/// Events a client may send.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    ProjectMessage {
        text: String,
        #[serde(default)]
        sender: Option<String>,
        #[serde(default)]
        author: Option<String>,
    },
}

/// Events delivered to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    ProjectMessage(OutboundMessage),
}

// ── Handshake ────────────────────────────────────────────────────────

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    State(state): State<SharedState>,
) -> Response {
    match authenticate_handshake(&params, &headers, &state) {
        Ok(session) => ws
            .on_upgrade(move |socket| handle_socket(socket, session, state))
            .into_response(),
        Err(err) => {
            tracing::debug!(code = err.code(), "rejected socket handshake: {err}");
            let status = match &err {
                GatewayError::InvalidProjectId { .. } => StatusCode::BAD_REQUEST,
                _ => StatusCode::UNAUTHORIZED,
            };
            (
                status,
                Json(json!({"error": err.to_string(), "code": err.code()})),
            )
                .into_response()
        }
    }
}

/// The gate: validate the project id, look up the project (absence is not
/// fatal here), then find and verify the bearer credential. Only a fully
/// verified connection gets a session.
fn authenticate_handshake(
    params: &HashMap<String, String>,
    headers: &HeaderMap,
    state: &SharedState,
) -> Result<Session, GatewayError> {
    let raw_id = params.get("projectId").cloned().unwrap_or_default();
    let project_id = Uuid::parse_str(raw_id.trim())
        .map_err(|_| GatewayError::InvalidProjectId { id: raw_id.clone() })?;

    let project = state.projects.get(project_id);

    let token = extract_bearer(params, headers).ok_or(GatewayError::NoSocketToken)?;
    let identity = state.tokens.verify(&token)?;

    // One room per project; membership is fixed for the session's lifetime.
    let room_id = project
        .as_ref()
        .map(|p| p.id.to_string())
        .unwrap_or_else(|| project_id.to_string());

    Ok(Session {
        connection_id: Uuid::new_v4(),
        identity,
        project_id,
        project,
        room_id,
    })
}

// ── Socket loop ──────────────────────────────────────────────────────

async fn handle_socket(socket: WebSocket, session: Session, state: SharedState) {
    let (room_tx, room_rx) = state.rooms.join(&session.room_id);
    tracing::info!(
        room = %session.room_id,
        user = %session.identity.email,
        "session joined room"
    );

    let (sender, receiver) = socket.split();
    run_socket_loop(sender, receiver, room_tx, room_rx, &session, &state).await;

    state.rooms.leave(&session.room_id);
    tracing::info!(room = %session.room_id, user = %session.identity.email, "session left room");
}

/// Core loop with ping/pong keepalive.
///
/// Combines room-event forwarding, client message handling, and periodic
/// health checking in a single select. If no Pong arrives within
/// [`PONG_TIMEOUT`] after a Ping, the connection is considered dead.
async fn run_socket_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    room_tx: broadcast::Sender<RoomEvent>,
    mut room_rx: broadcast::Receiver<RoomEvent>,
    session: &Session,
    state: &SharedState,
) {
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    // The first tick completes immediately; consume it so the first real
    // ping fires after PING_INTERVAL has elapsed.
    ping_interval.tick().await;

    let mut last_pong = Instant::now();
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            // ── Periodic ping ───────────────────────────────────────
            _ = ping_interval.tick() => {
                if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                    break;
                }
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }

            // ── Room event forwarding ───────────────────────────────
            event = room_rx.recv() => {
                match event {
                    Ok(event) => {
                        // Relays skip their own sender; assistant replies
                        // have no origin and reach everyone.
                        if event.origin == Some(session.connection_id) {
                            continue;
                        }
                        match serde_json::to_string(&ServerEvent::ProjectMessage(event.payload)) {
                            Ok(body) => {
                                if sender.send(Message::Text(body.into())).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => tracing::error!("failed to serialize room event: {e}"),
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // At-most-once delivery: missed events are gone.
                        tracing::debug!(missed, "room receiver lagged");
                        continue;
                    }
                }
            }

            // ── Client messages ─────────────────────────────────────
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_event(text.as_str(), &room_tx, session, state).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        // Ignore binary and ping frames from clients.
                    }
                    Some(Err(_)) => break,
                }
            }
        }
    }

    // Best-effort close frame
    let _ = sender.send(Message::Close(None)).await;
}

/// Handle one `project-message`: evaluate the AI mention first, then
/// relay the original text to the rest of the room unconditionally.
///
/// This is the per-event entry point of the gateway; the socket loop calls
/// it for every text frame.
pub async fn handle_client_event(
    raw: &str,
    room_tx: &broadcast::Sender<RoomEvent>,
    session: &Session,
    state: &SharedState,
) {
    let event: ClientEvent = match serde_json::from_str(raw) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!("ignoring malformed client event: {e}");
            return;
        }
    };
    let ClientEvent::ProjectMessage { text, .. } = event;

    match state.dispatcher.handle(&text).await {
        // Assistant replies go to the whole room, the sender included.
        Ok(Some(reply)) => {
            let _ = room_tx.send(RoomEvent::assistant(&reply));
        }
        Ok(None) => {}
        Err(DispatchError::EmptyPrompt) => {
            tracing::debug!(user = %session.identity.email, "mention with empty prompt dropped");
        }
        // Generation failures degrade silently; the room stays usable.
        Err(e) => tracing::warn!("AI generation failed: {e}"),
    }

    let _ = room_tx.send(RoomEvent::relay(
        session.connection_id,
        &session.identity.email,
        &text,
    ));
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::GenerationBackend;
    use crate::api::AppState;
    use crate::config::Config;
    use crate::room::AI_SENDER;
    use anyhow::Result;
    use async_trait::async_trait;
    use axum::http::HeaderValue;
    use std::sync::Arc;

    struct WorkspaceBackend;

    #[async_trait]
    impl GenerationBackend for WorkspaceBackend {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok(r#"{"type":"workspace","files":[{"path":"index.js","language":"js","content":"x"}],"readme":"r"}"#.to_string())
        }
    }

    fn test_state() -> SharedState {
        let config = Config {
            secret_key: Some("test-secret".to_string()),
            ..Config::default()
        };
        Arc::new(AppState::new(config, Arc::new(WorkspaceBackend)))
    }

    fn handshake_params(state: &SharedState, project_id: &str) -> HashMap<String, String> {
        let user = state.users.register("Ada", "ada@example.com", "pw").unwrap();
        let token = state.tokens.mint(user.id, &user.email).unwrap();
        HashMap::from([
            ("projectId".to_string(), project_id.to_string()),
            ("token".to_string(), token),
        ])
    }

    fn session_for(state: &SharedState, email: &str) -> Session {
        let user = state.users.register("U", email, "pw").unwrap();
        let project_id = Uuid::new_v4();
        Session {
            connection_id: Uuid::new_v4(),
            identity: crate::auth::Identity {
                id: user.id,
                email: email.to_string(),
            },
            project_id,
            project: None,
            room_id: project_id.to_string(),
        }
    }

    #[test]
    fn handshake_rejects_malformed_project_ids() {
        let state = test_state();
        let params = handshake_params(&state, "not-a-uuid");
        let err = authenticate_handshake(&params, &HeaderMap::new(), &state).unwrap_err();
        assert_eq!(err.code(), "INVALID_PROJECT_ID");
    }

    #[test]
    fn handshake_rejects_missing_tokens() {
        let state = test_state();
        let params = HashMap::from([(
            "projectId".to_string(),
            Uuid::new_v4().to_string(),
        )]);
        let err = authenticate_handshake(&params, &HeaderMap::new(), &state).unwrap_err();
        assert_eq!(err.code(), "NO_SOCKET_TOKEN");
    }

    #[test]
    fn handshake_rejects_bad_tokens_and_missing_secret() {
        let state = test_state();
        let params = HashMap::from([
            ("projectId".to_string(), Uuid::new_v4().to_string()),
            ("token".to_string(), "forged.token".to_string()),
        ]);
        let err = authenticate_handshake(&params, &HeaderMap::new(), &state).unwrap_err();
        assert_eq!(err.code(), "UNAUTHORIZED");

        let unconfigured = Arc::new(AppState::new(
            Config::default(),
            Arc::new(WorkspaceBackend),
        ));
        let err =
            authenticate_handshake(&params, &HeaderMap::new(), &unconfigured).unwrap_err();
        assert_eq!(err.code(), "UNAUTHORIZED");
    }

    #[test]
    fn handshake_binds_the_room_to_the_project() {
        let state = test_state();
        let user = state.users.register("Ada", "owner@example.com", "pw").unwrap();
        let project = state.projects.create("demo", user.id);

        let token = state.tokens.mint(user.id, &user.email).unwrap();
        let params = HashMap::from([
            ("projectId".to_string(), project.id.to_string()),
            ("token".to_string(), token),
        ]);

        let session = authenticate_handshake(&params, &HeaderMap::new(), &state).unwrap();
        assert_eq!(session.room_id, project.id.to_string());
        assert_eq!(session.project.as_ref().map(|p| p.id), Some(project.id));
        assert_eq!(session.identity.email, "owner@example.com");
    }

    #[test]
    fn handshake_tolerates_a_missing_project() {
        let state = test_state();
        let unknown = Uuid::new_v4();
        let params = handshake_params(&state, &unknown.to_string());
        let session = authenticate_handshake(&params, &HeaderMap::new(), &state).unwrap();
        assert!(session.project.is_none());
        assert_eq!(session.room_id, unknown.to_string());
    }

    #[test]
    fn handshake_accepts_header_and_cookie_credentials() {
        let state = test_state();
        let user = state.users.register("Ada", "h@example.com", "pw").unwrap();
        let token = state.tokens.mint(user.id, &user.email).unwrap();
        let params = HashMap::from([(
            "projectId".to_string(),
            Uuid::new_v4().to_string(),
        )]);

        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        assert!(authenticate_handshake(&params, &headers, &state).is_ok());

        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_str(&format!("token={token}")).unwrap(),
        );
        assert!(authenticate_handshake(&params, &headers, &state).is_ok());
    }

    #[tokio::test]
    async fn plain_message_reaches_others_but_not_the_sender() {
        let state = test_state();
        let session = session_for(&state, "a@example.com");

        let (tx, mut rx_sender) = state.rooms.join(&session.room_id);
        let (_tx_b, mut rx_other) = state.rooms.join(&session.room_id);

        let raw = json!({"event": "project-message", "data": {"text": "hello room"}}).to_string();
        handle_client_event(&raw, &tx, &session, &state).await;

        let event = rx_other.recv().await.unwrap();
        assert_eq!(event.payload.message, "hello room");
        assert_eq!(event.payload.user, "a@example.com");

        // The sender's receiver sees the event but the loop filters it by
        // origin; assert the origin marks it as the sender's own.
        let own = rx_sender.recv().await.unwrap();
        assert_eq!(own.origin, Some(session.connection_id));
    }

    #[tokio::test]
    async fn mention_broadcasts_an_assistant_reply_to_all_then_relays() {
        let state = test_state();
        let session = session_for(&state, "a@example.com");
        let (tx, mut rx) = state.rooms.join(&session.room_id);

        let raw = json!({
            "event": "project-message",
            "data": {"text": "@AI build a hello world server"}
        })
        .to_string();
        handle_client_event(&raw, &tx, &session, &state).await;

        let first = rx.recv().await.unwrap();
        assert_eq!(first.origin, None);
        assert_eq!(first.payload.user, AI_SENDER);
        let workspace = crate::workspace::Workspace::parse(&first.payload.message).unwrap();
        assert!(!workspace.files.is_empty());

        let second = rx.recv().await.unwrap();
        assert_eq!(second.origin, Some(session.connection_id));
        assert_eq!(second.payload.message, "@AI build a hello world server");
    }

    #[tokio::test]
    async fn malformed_events_are_ignored() {
        let state = test_state();
        let session = session_for(&state, "a@example.com");
        let (tx, mut rx) = state.rooms.join(&session.room_id);

        handle_client_event("not json", &tx, &session, &state).await;
        handle_client_event(r#"{"event":"unknown","data":{}}"#, &tx, &session, &state).await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn wire_shapes_match_the_protocol() {
        let client: ClientEvent = serde_json::from_str(
            r#"{"event":"project-message","data":{"text":"hi","sender":"me"}}"#,
        )
        .unwrap();
        let ClientEvent::ProjectMessage { text, sender, .. } = client;
        assert_eq!(text, "hi");
        assert_eq!(sender.as_deref(), Some("me"));

        let server = ServerEvent::ProjectMessage(OutboundMessage {
            user: AI_SENDER.to_string(),
            message: "body".to_string(),
            timestamp: chrono::Utc::now(),
        });
        let json = serde_json::to_string(&server).unwrap();
        assert!(json.contains("\"event\":\"project-message\""));
        assert!(json.contains("\"user\":\"AI\""));
    }
}
