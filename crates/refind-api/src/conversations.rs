use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::warn;
use uuid::Uuid;

use refind_db::models::ConversationRow;
use refind_types::api::{Claims, ConversationDetail, ConversationRef, ConversationSummary};
use refind_types::models::{ParticipantError, Profile, other_participant};

use crate::auth::AppState;
use crate::error::{ApiError, join_internal};
use crate::{parse_timestamp, parse_uuid};

/// Find-or-create the conversation between the caller and the item's owner.
///
/// Idempotent: repeated calls (including concurrent ones) converge on a
/// single conversation id — the storage layer's unique index on the
/// (item, unordered pair) key does the conflict resolution.
pub async fn start_conversation(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let item = tokio::task::spawn_blocking(move || db.get_item(&item_id.to_string()))
        .await
        .map_err(join_internal)??
        .ok_or(ApiError::NotFound("item not found"))?;

    // A user cannot open a conversation with themself about their own item
    if item.user_id == claims.sub.to_string() {
        return Err(ApiError::Validation(
            "cannot start a conversation about your own item".into(),
        ));
    }

    let db = state.db.clone();
    let current_user = claims.sub.to_string();
    let conversation_id = tokio::task::spawn_blocking(move || {
        db.get_or_create_conversation(
            &Uuid::new_v4().to_string(),
            &item_id.to_string(),
            &current_user,
            &item.user_id,
        )
    })
    .await
    .map_err(join_internal)??;

    Ok(Json(ConversationRef {
        id: parse_uuid(&conversation_id, "conversation id"),
    }))
}

/// The caller's conversation list, most recently active first, with the
/// other participant resolved server-side.
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let user_id = claims.sub.to_string();
    let rows = tokio::task::spawn_blocking(move || db.get_conversations_for_user(&user_id))
        .await
        .map_err(join_internal)??;

    let summaries: Vec<ConversationSummary> = rows
        .into_iter()
        .filter_map(|row| {
            let (user1, user2) = participants(&row);
            match other_participant(&user1, &user2, claims.sub) {
                Ok(other) => Some(ConversationSummary {
                    id: parse_uuid(&row.id, "conversation id"),
                    item_id: parse_uuid(&row.item_id, "conversation item_id"),
                    item_title: row.item_title.clone(),
                    other_user: other.clone(),
                    updated_at: parse_timestamp(&row.updated_at, "conversation updated_at"),
                }),
                Err(e) => {
                    // Data-integrity violation; drop the row from the list
                    // rather than failing the whole request.
                    warn!("Conversation '{}' participant integrity: {}", row.id, e);
                    None
                }
            }
        })
        .collect();

    Ok(Json(summaries))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let row = fetch_conversation(&state, conversation_id).await?;

    let (user1, user2) = participants(&row);
    let other = match other_participant(&user1, &user2, claims.sub) {
        Ok(other) => other.clone(),
        Err(ParticipantError::NotAParticipant(_)) => {
            return Err(ApiError::Forbidden("not a participant of this conversation"));
        }
        Err(e @ ParticipantError::DegeneratePair) => {
            return Err(ApiError::Internal(anyhow::anyhow!(
                "conversation '{}': {}",
                row.id,
                e
            )));
        }
    };

    Ok(Json(ConversationDetail {
        id: parse_uuid(&row.id, "conversation id"),
        item_id: parse_uuid(&row.item_id, "conversation item_id"),
        item_title: row.item_title,
        other_user: other,
        created_at: parse_timestamp(&row.created_at, "conversation created_at"),
        updated_at: parse_timestamp(&row.updated_at, "conversation updated_at"),
    }))
}

pub(crate) async fn fetch_conversation(
    state: &AppState,
    conversation_id: Uuid,
) -> Result<ConversationRow, ApiError> {
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || db.get_conversation(&conversation_id.to_string()))
        .await
        .map_err(join_internal)??
        .ok_or(ApiError::NotFound("conversation not found"))
}

pub(crate) fn participants(row: &ConversationRow) -> (Profile, Profile) {
    (
        Profile {
            id: parse_uuid(&row.user1_id, "conversation user1_id"),
            full_name: row.user1_name.clone(),
            avatar_url: row.user1_avatar.clone(),
        },
        Profile {
            id: parse_uuid(&row.user2_id, "conversation user2_id"),
            full_name: row.user2_name.clone(),
            avatar_url: row.user2_avatar.clone(),
        },
    )
}

/// Participant gate shared by the message endpoints: 404 for a missing
/// conversation, 403 for a caller outside the pair.
pub(crate) async fn require_participant(
    state: &AppState,
    conversation_id: Uuid,
    user_id: Uuid,
) -> Result<ConversationRow, ApiError> {
    let row = fetch_conversation(state, conversation_id).await?;
    let user_id = user_id.to_string();
    if row.user1_id != user_id && row.user2_id != user_id {
        return Err(ApiError::Forbidden("not a participant of this conversation"));
    }
    Ok(row)
}
