//! WebSocket channel for interactive refinement of one session.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::api::{AppState, feedback_session, refine_session, session_state};

#[derive(Debug, Deserialize)]
struct ClientMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    feedback: String,
    optimization_goal: Option<String>,
    feedback_type: Option<String>,
    text: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, session_id: String) {
    tracing::info!(%session_id, "websocket connected");
    let (mut sender, mut receiver) = socket.split();
    while let Some(msg) = receiver.next().await {
        let text = match msg {
            Ok(Message::Text(t)) => t,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        let Some(reply) = handle_message(&state, &session_id, text.as_str()).await else {
            break;
        };
        if sender.send(Message::Text(reply.to_string().into())).await.is_err() {
            break;
        }
    }
    tracing::info!(%session_id, "websocket closed");
}

/// Reply to one client message; `None` ends the conversation.
pub async fn handle_message(state: &AppState, session_id: &str, raw: &str) -> Option<Value> {
    let msg: ClientMessage = match serde_json::from_str(raw) {
        Ok(m) => m,
        Err(e) => return Some(json!({"type": "error", "message": format!("Invalid message: {e}")})),
    };
    let reply = match msg.kind.as_str() {
        "refine" => {
            refine_session(state, session_id, &msg.feedback, msg.optimization_goal.as_deref())
                .await
                .map(|outcome| json!({"type": "refinement_complete", "data": outcome}))
        }
        "feedback" => feedback_session(
            state,
            session_id,
            msg.feedback_type.as_deref().unwrap_or_default(),
            msg.text.as_deref(),
        )
        .await
        .map(|data| json!({"type": "feedback_received", "data": data})),
        "status_request" => session_state(state, session_id)
            .await
            .map(|data| json!({"type": "status_update", "data": data})),
        "close" => return None,
        other => return Some(json!({"type": "error", "message": format!("Unknown message type: {other}")})),
    };
    Some(reply.unwrap_or_else(|e| json!({"type": "error", "message": e.message()})))
}

#[cfg(test)]
mod tests {
    use cem_core::{ConversationContext, assess_ambiguity, parse_prompt};

    use super::*;
    use crate::config::{Config, LlmConfig};

    async fn state_with_session(id: &str) -> AppState {
        let config = Config {
            database_url: ":memory:".into(),
            llm: LlmConfig {
                enabled: false,
                ..LlmConfig::default()
            },
            ..Config::default()
        };
        let state = AppState::from_config(&config).unwrap();
        let spec = parse_prompt("lightweight robot arm in PLA").specification;
        let mut ctx = ConversationContext::new(id, "lightweight robot arm in PLA");
        ctx.record_specification(spec.clone(), &assess_ambiguity(&spec));
        state.sessions.lock().await.insert(id.to_string(), ctx);
        state
    }

    #[tokio::test]
    async fn test_message_types() {
        let state = state_with_session("w").await;

        let refine = r#"{"type": "refine", "feedback": "lighter", "optimization_goal": "lightweight"}"#;
        let r = handle_message(&state, "w", refine).await.unwrap();
        assert_eq!(r["type"], "refinement_complete");
        assert_eq!(r["data"]["status"], "refined");
        assert_eq!(r["data"]["iteration"], 1);

        let r = handle_message(&state, "w", r#"{"type": "feedback", "feedback_type": "like"}"#)
            .await
            .unwrap();
        assert_eq!(r["type"], "feedback_received");
        assert!(r["data"]["message"].as_str().unwrap().starts_with("Great!"));

        let r = handle_message(&state, "w", r#"{"type": "status_request"}"#).await.unwrap();
        assert_eq!(r["type"], "status_update");
        assert_eq!(r["data"]["session_id"], "w");

        assert!(handle_message(&state, "w", r#"{"type": "close"}"#).await.is_none());
    }

    #[tokio::test]
    async fn test_errors_are_replies() {
        let state = state_with_session("w").await;
        let r = handle_message(&state, "w", r#"{"type": "dance"}"#).await.unwrap();
        assert_eq!(r["message"], "Unknown message type: dance");

        let r = handle_message(&state, "w", "not json").await.unwrap();
        assert_eq!(r["type"], "error");

        let r = handle_message(&state, "other", r#"{"type": "status_request"}"#).await.unwrap();
        assert_eq!(r["message"], "Session not found");

        let r = handle_message(&state, "w", r#"{"type": "feedback", "feedback_type": "meh"}"#)
            .await
            .unwrap();
        assert_eq!(r["type"], "error");
    }
}
