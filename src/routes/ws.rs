//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic. We reply with a single JSON message per request.
//!
//! The socket tracks one session id. An explicit `start_session` picks or
//! restores it; any session-bound message otherwise attaches a fresh session
//! implicitly (`ping` and `list_levels` run without one).

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::errors::ApiError;
use crate::logic;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "poo_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "poo_backend", "WebSocket connected");
  let mut session: Option<Uuid> = None;
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        // Parse, dispatch, serialize response.
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "poo_backend", "WS received: {:?}", &incoming);
            handle_client_ws(incoming, &state, &mut session).await
          }
          Err(e) => {
            debug!(target: "poo_backend", raw = %crate::util::trunc_for_log(&txt, 200), error = %e, "WS message parse failed");
            ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) }
          }
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "poo_backend", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "poo_backend", session = ?session, "WebSocket disconnected");
}

fn ws_error(e: ApiError) -> ServerWsMessage {
  ServerWsMessage::Error { message: e.user_message() }
}

/// Attach the socket to a fresh session the first time a session-bound
/// message arrives without an explicit `start_session`.
async fn ensure_session(state: &AppState, session: &mut Option<Uuid>) -> Uuid {
  match *session {
    Some(id) => id,
    None => {
      let (id, _) = state.attach_session(None).await;
      info!(target: "course", session = %id, "WS implicit session start");
      *session = Some(id);
      id
    }
  }
}

#[instrument(level = "info", skip(state, session))]
async fn handle_client_ws(
  msg: ClientWsMessage,
  state: &AppState,
  session: &mut Option<Uuid>,
) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::StartSession { session_id } => {
      match logic::start_session(state, session_id).await {
        Ok(out) => {
          *session = Some(out.session_id);
          tracing::info!(target: "course", session = %out.session_id, restored = out.restored, "WS session started");
          ServerWsMessage::SessionStarted {
            session_id: out.session_id,
            restored: out.restored,
            progress: out.progress,
          }
        }
        Err(e) => ws_error(e),
      }
    }

    ClientWsMessage::ListLevels => {
      ServerWsMessage::Levels { levels: logic::list_levels(state).await }
    }

    ClientWsMessage::SelectLevel { level } => {
      let id = ensure_session(state, session).await;
      match logic::select_level(state, id, &level).await {
        Ok(progress) => ServerWsMessage::LevelSelected { progress },
        Err(e) => ws_error(e),
      }
    }

    ClientWsMessage::NextStep => {
      let id = ensure_session(state, session).await;
      match logic::next_step(state, id).await {
        Ok(step) => ServerWsMessage::Step {
          step_index: step.step_index,
          step_title: step.step_title,
          progress_percent: step.progress_percent,
        },
        Err(e) => ws_error(e),
      }
    }

    ClientWsMessage::PrevStep => {
      let id = ensure_session(state, session).await;
      match logic::prev_step(state, id).await {
        Ok(step) => ServerWsMessage::Step {
          step_index: step.step_index,
          step_title: step.step_title,
          progress_percent: step.progress_percent,
        },
        Err(e) => ws_error(e),
      }
    }

    ClientWsMessage::CheckMicro { micro, code } => {
      let id = ensure_session(state, session).await;
      match logic::check_micro(state, id, micro, &code).await {
        Ok(out) => {
          tracing::info!(target: "course", session = %id, micro, passed = out.passed, "WS micro checked");
          ServerWsMessage::MicroResult {
            micro: out.micro,
            passed: out.passed,
            feedback: out.feedback,
            badges_awarded: out.badges_awarded,
            completed: out.completed,
            course_message: out.course_message,
          }
        }
        Err(e) => ws_error(e),
      }
    }

    ClientWsMessage::Hint { micro } => {
      let id = ensure_session(state, session).await;
      match logic::hint(state, id, micro).await {
        Ok(out) => ServerWsMessage::Hint { text: out.text },
        Err(e) => ws_error(e),
      }
    }

    ClientWsMessage::Progress => {
      let id = ensure_session(state, session).await;
      match logic::view_progress(state, id).await {
        Ok(progress) => ServerWsMessage::Progress { progress },
        Err(e) => ws_error(e),
      }
    }

    ClientWsMessage::Reset => {
      let id = ensure_session(state, session).await;
      match logic::reset(state, id).await {
        Ok(progress) => ServerWsMessage::ResetDone { progress },
        Err(e) => ws_error(e),
      }
    }
  }
}
