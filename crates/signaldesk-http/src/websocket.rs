//! WebSocket handler for real-time event streaming.
//!
//! Clients connect to `/ws/events?token=...` and receive event bus events.
//! With no subscriptions every event is forwarded; otherwise only events
//! matching a subscribed pattern such as `support:conversation:*`.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

use signaldesk_core::event_bus::matches_pattern;

use crate::HttpSharedState;

/// Client control message.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(untagged)]
enum ClientRequest {
    Subscribe { subscribe: String },
    Unsubscribe { unsubscribe: String },
}

#[derive(Serialize)]
struct WsEvent {
    event_type: String,
    payload: serde_json::Value,
}

/// Handler for GET /ws/events
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<HttpSharedState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Wait for either task to finish, then abort the other.
async fn join_first(mut a: JoinHandle<()>, mut b: JoinHandle<()>) {
    tokio::select! {
        _ = &mut a => b.abort(),
        _ = &mut b => a.abort(),
    }
}

fn wants(subscriptions: &Mutex<HashSet<String>>, event_type: &str) -> bool {
    match subscriptions.lock() {
        Ok(subs) => subs.is_empty() || subs.iter().any(|p| matches_pattern(event_type, p)),
        Err(_) => false,
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<HttpSharedState>) {
    let (mut sender, mut receiver) = socket.split();
    let subscriptions: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
    let mut event_rx = state.context.event_bus.subscribe();

    let subs = Arc::clone(&subscriptions);
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            let Message::Text(text) = msg else {
                continue;
            };
            let Ok(request) = serde_json::from_str::<ClientRequest>(&text) else {
                log::debug!("Ignoring unrecognised WebSocket message");
                continue;
            };
            if let Ok(mut subs) = subs.lock() {
                match request {
                    ClientRequest::Subscribe { subscribe } => {
                        subs.insert(subscribe);
                    }
                    ClientRequest::Unsubscribe { unsubscribe } => {
                        subs.remove(&unsubscribe);
                    }
                }
            }
        }
    });

    let send_task = tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(event) => {
                    if !wants(&subscriptions, &event.event_type) {
                        continue;
                    }
                    let ws_event = WsEvent {
                        event_type: event.event_type,
                        payload: event.payload,
                    };
                    if let Ok(json) = serde_json::to_string(&ws_event) {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(count)) => {
                    log::warn!("WebSocket client lagged by {} events", count);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    join_first(recv_task, send_task).await;

    log::debug!("WebSocket connection closed");
}
