use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use refind_types::api::{Claims, MessageResponse, SendMessageRequest};
use refind_types::events::GatewayEvent;

use crate::auth::AppState;
use crate::conversations::require_participant;
use crate::error::{ApiError, join_internal};
use crate::{parse_timestamp, parse_uuid};

/// Append a message to a conversation the caller participates in.
///
/// Empty or whitespace-only content is a no-op (204, nothing persisted) —
/// the optimistic-UI contract, not an error. On success the message is
/// broadcast to gateway subscribers of this conversation; on failure
/// nothing is broadcast and the caller keeps its draft.
pub async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_participant(&state, conversation_id, claims.sub).await?;

    let message_id = Uuid::new_v4();

    // Run blocking DB insert off the async runtime
    let db = state.db.clone();
    let sender = claims.sub.to_string();
    let row = tokio::task::spawn_blocking(move || {
        db.append_message(
            &message_id.to_string(),
            &conversation_id.to_string(),
            &sender,
            &req.content,
        )
    })
    .await
    .map_err(join_internal)??;

    let Some(row) = row else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    let created_at = parse_timestamp(&row.created_at, "message created_at");

    // Fan out to gateway connections watching this conversation
    state.dispatcher.broadcast(GatewayEvent::MessageCreate {
        id: message_id,
        conversation_id,
        sender_id: claims.sub,
        sender_name: claims.full_name.clone(),
        content: row.content.clone(),
        timestamp: created_at,
    });

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            id: message_id,
            conversation_id,
            sender_id: claims.sub,
            content: row.content,
            created_at,
        }),
    )
        .into_response())
}

/// Full message history, oldest first. Unpaginated by design — campus
/// conversations are short; flagged as a scale limit, not fixed here.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    require_participant(&state, conversation_id, claims.sub).await?;

    let db = state.db.clone();
    let rows = tokio::task::spawn_blocking(move || db.get_messages(&conversation_id.to_string()))
        .await
        .map_err(join_internal)??;

    let messages: Vec<MessageResponse> = rows
        .into_iter()
        .map(|row| MessageResponse {
            id: parse_uuid(&row.id, "message id"),
            conversation_id: parse_uuid(&row.conversation_id, "message conversation_id"),
            sender_id: parse_uuid(&row.sender_id, "message sender_id"),
            created_at: parse_timestamp(&row.created_at, "message created_at"),
            content: row.content,
        })
        .collect();

    Ok(Json(messages))
}
