//! Progress WebSocket and the live-connection registry.
//!
//! Each socket owns a bounded outbound channel. Workers push through
//! [`LiveConnections`] with `try_send`, so a slow client loses events
//! instead of stalling a job.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use aura_worker::{ConnectionRegistry, DeliveryError, LiveConnection};

use crate::auth::resolve_owner;
use crate::metrics;
use crate::state::AppState;

/// Outbound events buffered per socket.
const WS_SEND_BUFFER_SIZE: usize = 64;

/// Close code sent when the socket cannot be tied to a user.
const CLOSE_UNAUTHORIZED: u16 = 4001;

/// One socket's outbound queue.
#[derive(Debug, Clone)]
pub struct ChannelConnection {
    tx: mpsc::Sender<String>,
}

impl LiveConnection for ChannelConnection {
    fn send(&self, payload: String) -> Result<(), DeliveryError> {
        self.tx.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

/// Process-wide owner → socket map. The newest socket per owner wins.
#[derive(Debug, Default)]
pub struct LiveConnections {
    connections: RwLock<HashMap<String, mpsc::Sender<String>>>,
}

impl LiveConnections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, owner_id: &str, tx: mpsc::Sender<String>) {
        let count = match self.connections.write() {
            Ok(mut map) => {
                map.insert(owner_id.to_string(), tx);
                map.len()
            }
            Err(poisoned) => {
                let mut map = poisoned.into_inner();
                map.insert(owner_id.to_string(), tx);
                map.len()
            }
        };
        metrics::set_ws_active_connections(count);
    }

    /// Remove `owner_id` only if it still maps to `tx`; a newer socket stays registered.
    pub fn unregister(&self, owner_id: &str, tx: &mpsc::Sender<String>) {
        let mut map = match self.connections.write() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        if map.get(owner_id).is_some_and(|current| current.same_channel(tx)) {
            map.remove(owner_id);
        }
        metrics::set_ws_active_connections(map.len());
    }

    pub fn len(&self) -> usize {
        self.connections.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ConnectionRegistry for LiveConnections {
    fn lookup(&self, owner_id: &str) -> Option<Arc<dyn LiveConnection>> {
        let map = self.connections.read().ok()?;
        map.get(owner_id)
            .map(|tx| Arc::new(ChannelConnection { tx: tx.clone() }) as Arc<dyn LiveConnection>)
    }
}

#[derive(Debug, Deserialize)]
pub struct ProgressSocketParams {
    pub token: Option<String>,
    pub user_id: Option<String>,
}

/// `GET /ws/progress/`
pub async fn ws_progress(
    ws: WebSocketUpgrade,
    Query(params): Query<ProgressSocketParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    metrics::record_ws_connection();
    let owner = resolve_owner(
        state.verifier.as_deref(),
        params.token.as_deref(),
        params.user_id.as_deref(),
    );

    ws.on_upgrade(move |socket| async move {
        match owner {
            Ok(owner_id) => handle_progress_socket(socket, owner_id, state.connections).await,
            Err(e) => reject(socket, &e.to_string()).await,
        }
    })
}

async fn reject(mut socket: WebSocket, reason: &str) {
    warn!("Progress socket rejected: {}", reason);
    let frame = CloseFrame {
        code: CLOSE_UNAUTHORIZED,
        reason: reason.to_string().into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

async fn handle_progress_socket(socket: WebSocket, owner_id: String, connections: Arc<LiveConnections>) {
    let (mut ws_sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(WS_SEND_BUFFER_SIZE);
    connections.register(&owner_id, tx.clone());
    info!(owner_id = %owner_id, "Progress socket connected");

    let send_task = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if ws_sender.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    // Inbound messages only keep the connection alive.
    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => debug!(owner_id = %owner_id, "Ignoring inbound progress socket message"),
        }
    }

    connections.unregister(&owner_id, &tx);
    send_task.abort();
    info!(owner_id = %owner_id, "Progress socket disconnected");
}
