use std::sync::Arc;

use tokio::sync::broadcast;
use uuid::Uuid;

use refind_types::events::GatewayEvent;

/// Fan-out hub for realtime events. REST handlers publish here; each
/// WebSocket connection holds one receiver and filters events down to the
/// conversation it is currently watching.
///
/// tokio's broadcast channel delivers each event to a receiver at most
/// once, so the bridge appends without dedup. A delivery substrate that
/// can redeliver would need dedup by message id before appending.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    broadcast_tx: broadcast::Sender<GatewayEvent>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner { broadcast_tx }),
        }
    }

    /// Subscribe to gateway events. Returns a broadcast receiver; dropping
    /// it is the teardown — nothing else to unregister.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Publish an event to all connected clients. Lossy when no receiver
    /// exists, which is fine: history is served over REST.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether an event should reach a connection currently watching
/// `watched`. Conversation-scoped events are delivered only to the
/// matching watcher; unscoped events pass through.
pub fn should_deliver(event: &GatewayEvent, watched: Option<Uuid>) -> bool {
    match event.conversation_id() {
        Some(conversation_id) => watched == Some(conversation_id),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_in(conversation_id: Uuid) -> GatewayEvent {
        GatewayEvent::MessageCreate {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id: Uuid::new_v4(),
            sender_name: "Alice".to_string(),
            content: "I think I found your Hydro Flask!".to_string(),
            timestamp: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn one_insert_event_delivers_exactly_once() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();

        let conversation = Uuid::new_v4();
        dispatcher.broadcast(message_in(conversation));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.conversation_id(), Some(conversation));

        // No second delivery of the same event
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn every_receiver_sees_the_broadcast() {
        let dispatcher = Dispatcher::new();
        let mut rx1 = dispatcher.subscribe();
        let mut rx2 = dispatcher.subscribe();

        let conversation = Uuid::new_v4();
        dispatcher.broadcast(message_in(conversation));

        assert_eq!(rx1.recv().await.unwrap().conversation_id(), Some(conversation));
        assert_eq!(rx2.recv().await.unwrap().conversation_id(), Some(conversation));
    }

    #[test]
    fn scoped_events_only_reach_their_watcher() {
        let watched = Uuid::new_v4();
        let other = Uuid::new_v4();

        assert!(should_deliver(&message_in(watched), Some(watched)));
        assert!(!should_deliver(&message_in(other), Some(watched)));
        assert!(!should_deliver(&message_in(other), None));
    }

    #[test]
    fn unscoped_events_pass_through() {
        let ready = GatewayEvent::Ready {
            user_id: Uuid::new_v4(),
            full_name: "Alice".to_string(),
        };
        assert!(should_deliver(&ready, None));
        assert!(should_deliver(&ready, Some(Uuid::new_v4())));
    }
}
