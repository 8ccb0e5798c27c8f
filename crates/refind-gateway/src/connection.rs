use std::sync::{Arc, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use refind_db::Database;
use refind_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::{Dispatcher, should_deliver};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a single WebSocket connection: Identify handshake, then the
/// subscribe/deliver loop. The connection watches at most one conversation
/// at a time; Subscribe replaces the previous watch and disconnecting
/// drops both the watch and the broadcast receiver.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    jwt_secret: String,
) {
    let (mut sender, mut receiver) = socket.split();

    // Step 1: Wait for Identify command with JWT
    let (user_id, full_name) = match wait_for_identify(&mut receiver, &jwt_secret).await {
        Some(id) => id,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    info!("{} ({}) connected to gateway", full_name, user_id);

    // Step 2: Send Ready event
    let ready = GatewayEvent::Ready {
        user_id,
        full_name: full_name.clone(),
    };
    let Ok(text) = serde_json::to_string(&ready) else {
        return;
    };
    if sender.send(Message::Text(text.into())).await.is_err() {
        return;
    }

    // The conversation this connection currently watches, shared between
    // the send loop (filtering) and the recv loop (Subscribe/Unsubscribe).
    let watched: Arc<RwLock<Option<Uuid>>> = Arc::new(RwLock::new(None));
    let send_watched = watched.clone();

    // Connection-local events (Subscribed acks) bypass the broadcast bus
    let (local_tx, mut local_rx) = mpsc::unbounded_channel::<GatewayEvent>();

    let mut broadcast_rx = dispatcher.subscribe();

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward watched broadcasts + local events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} events", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    let current = *send_watched.read().expect("watch lock poisoned");
                    if !should_deliver(&event, current) {
                        continue;
                    }

                    let Ok(text) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                result = local_rx.recv() => {
                    let event = match result {
                        Some(event) => event,
                        None => break,
                    };
                    let Ok(text) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let recv_name = full_name.clone();
    let recv_watched = watched.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(&db, user_id, &recv_name, cmd, &recv_watched, &local_tx)
                            .await;
                    }
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            recv_name,
                            user_id,
                            e,
                            log_preview(&text)
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("{} ({}) disconnected from gateway", full_name, user_id);
}

/// First 200 characters of an unparseable command for the log. Truncates
/// on a character boundary — client-supplied text can put a multi-byte
/// character anywhere.
fn log_preview(text: &str) -> &str {
    match text.char_indices().nth(200) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

async fn wait_for_identify(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<(Uuid, String)> {
    use jsonwebtoken::{DecodingKey, Validation, decode};
    use refind_types::api::Claims;

    let timeout = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    let token_data = decode::<Claims>(
                        &token,
                        &DecodingKey::from_secret(jwt_secret.as_bytes()),
                        &Validation::default(),
                    )
                    .ok()?;

                    return Some((token_data.claims.sub, token_data.claims.full_name));
                }
            }
        }
        None
    });

    timeout.await.ok().flatten()
}

async fn handle_command(
    db: &Arc<Database>,
    user_id: Uuid,
    full_name: &str,
    cmd: GatewayCommand,
    watched: &Arc<RwLock<Option<Uuid>>>,
    local_tx: &mpsc::UnboundedSender<GatewayEvent>,
) {
    match cmd {
        GatewayCommand::Identify { .. } => {} // Already handled

        GatewayCommand::Subscribe { conversation_id } => {
            // Only participants may watch a conversation's live feed
            match participant_of(db, conversation_id, user_id).await {
                Ok(true) => {
                    info!(
                        "{} ({}) watching conversation {}",
                        full_name, user_id, conversation_id
                    );
                    // Replaces any previous watch: one conversation per
                    // connection, switching tears the old scope down.
                    *watched.write().expect("watch lock poisoned") = Some(conversation_id);
                    let _ = local_tx.send(GatewayEvent::Subscribed { conversation_id });
                }
                Ok(false) => {
                    warn!(
                        "{} ({}) denied subscription to conversation {}",
                        full_name, user_id, conversation_id
                    );
                }
                Err(e) => {
                    warn!(
                        "Subscription check failed for conversation {}: {:#}",
                        conversation_id, e
                    );
                }
            }
        }

        GatewayCommand::Unsubscribe => {
            info!("{} ({}) stopped watching", full_name, user_id);
            *watched.write().expect("watch lock poisoned") = None;
        }
    }
}

async fn participant_of(
    db: &Arc<Database>,
    conversation_id: Uuid,
    user_id: Uuid,
) -> anyhow::Result<bool> {
    let db = db.clone();
    let row = tokio::task::spawn_blocking(move || db.get_conversation(&conversation_id.to_string()))
        .await??;

    let user_id = user_id.to_string();
    Ok(row
        .map(|c| c.user1_id == user_id || c.user2_id == user_id)
        .unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_preview_truncates_on_char_boundaries() {
        // 300 multi-byte characters: a byte-offset slice at 200 would
        // split one of them and panic.
        let oversized = "é".repeat(300);
        let preview = log_preview(&oversized);
        assert_eq!(preview.chars().count(), 200);
        assert!(oversized.starts_with(preview));
    }

    #[test]
    fn log_preview_keeps_short_text_whole() {
        assert_eq!(log_preview("not json"), "not json");
    }
}
