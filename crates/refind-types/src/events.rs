use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, full_name: String },

    /// A new message was appended to a conversation
    MessageCreate {
        id: Uuid,
        conversation_id: Uuid,
        sender_id: Uuid,
        sender_name: String,
        content: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Server accepted a Subscribe command for this conversation
    Subscribed { conversation_id: Uuid },
}

impl GatewayEvent {
    /// Returns the conversation_id if this event is scoped to one
    /// conversation. Scoped events are only delivered to the connection
    /// currently subscribed to that conversation.
    pub fn conversation_id(&self) -> Option<Uuid> {
        match self {
            Self::MessageCreate { conversation_id, .. } => Some(*conversation_id),
            // Ready and Subscribed are connection-local
            _ => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Watch one conversation for new messages. Replaces any previous
    /// subscription held by this connection — a connection watches at
    /// most one conversation at a time.
    Subscribe { conversation_id: Uuid },

    /// Stop watching the current conversation (view exit).
    Unsubscribe,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_create_is_conversation_scoped() {
        let conversation_id = Uuid::new_v4();
        let event = GatewayEvent::MessageCreate {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id: Uuid::new_v4(),
            sender_name: "Alice".to_string(),
            content: "hi".to_string(),
            timestamp: chrono::Utc::now(),
        };
        assert_eq!(event.conversation_id(), Some(conversation_id));

        let ready = GatewayEvent::Ready {
            user_id: Uuid::new_v4(),
            full_name: "Alice".to_string(),
        };
        assert_eq!(ready.conversation_id(), None);
    }

    #[test]
    fn commands_use_tagged_wire_format() {
        let cmd: GatewayCommand =
            serde_json::from_str(r#"{"type":"Unsubscribe"}"#).unwrap();
        assert!(matches!(cmd, GatewayCommand::Unsubscribe));

        let json = serde_json::to_string(&GatewayCommand::Subscribe {
            conversation_id: Uuid::nil(),
        })
        .unwrap();
        assert!(json.contains(r#""type":"Subscribe""#));
    }
}
