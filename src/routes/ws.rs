//! WebSocket upgrade + message loop. Every build event on the bus is pushed to
//! the client as JSON; client messages get a single JSON reply each.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument};

use crate::events::WILDCARD;
use crate::protocol::{ClientWsMessage, ProgressOut, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "schoolpower_builder", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

fn to_text(msg: &ServerWsMessage) -> String {
  serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
  })
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "schoolpower_builder", "WebSocket connected");

  // Bus handlers are synchronous; hand events to this task over a channel.
  let (tx, mut rx) = mpsc::unbounded_channel::<String>();
  let subscription = state.orchestrator.bus().subscribe(WILDCARD, move |event| {
    let _ = tx.send(to_text(&ServerWsMessage::Event(event.clone())));
  });

  loop {
    tokio::select! {
      Some(out) = rx.recv() => {
        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "schoolpower_builder", error = %e, "WS push error");
          break;
        }
      }
      incoming = socket.recv() => {
        let Some(Ok(msg)) = incoming else { break };
        let reply = match msg {
          Message::Text(txt) => match serde_json::from_str::<ClientWsMessage>(&txt) {
            Ok(m) => {
              debug!(target: "schoolpower_builder", "WS received: {:?}", &m);
              handle_client_ws(m, &state).await
            }
            Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
          },
          Message::Ping(payload) => {
            let _ = socket.send(Message::Pong(payload)).await;
            continue;
          }
          Message::Close(_) => break,
          _ => continue,
        };
        if let Err(e) = socket.send(Message::Text(to_text(&reply))).await {
          error!(target: "schoolpower_builder", error = %e, "WS send error");
          break;
        }
      }
    }
  }

  subscription.unsubscribe();
  info!(target: "schoolpower_builder", "WebSocket disconnected");
}

async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
  let o = &state.orchestrator;
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,
    ClientWsMessage::Progress => ServerWsMessage::Progress(ProgressOut {
      status: o.status().await,
      running: o.is_running(),
      progress: o.progress().await,
    }),
    ClientWsMessage::StopBatch => ServerWsMessage::Stopped { stopped: o.stop_batch() },
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::events::{BuildEvent, EventKind};

  #[test]
  fn client_messages_use_snake_case_tags() {
    let m: ClientWsMessage = serde_json::from_str(r#"{"type": "stop_batch"}"#).unwrap();
    assert!(matches!(m, ClientWsMessage::StopBatch));
  }

  #[test]
  fn pushed_events_are_tagged() {
    let mut e = BuildEvent::new(EventKind::BatchCompleted);
    e.success = Some(false);
    let v: serde_json::Value = serde_json::from_str(&to_text(&ServerWsMessage::Event(e))).unwrap();
    assert_eq!(v["type"], "event");
    assert_eq!(v["event"], "batch_completed");
    assert_eq!(v["success"], false);
  }
}
