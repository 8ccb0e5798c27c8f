use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use refind_db::models::ItemRow;
use refind_types::api::{Claims, CreateItemRequest, ItemResponse};
use refind_types::feed::FeedFilter;
use refind_types::models::{Category, ItemStatus, ItemType, Profile};

use crate::auth::AppState;
use crate::error::{ApiError, join_internal};
use crate::{parse_timestamp, parse_uuid};

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    #[serde(default)]
    pub q: Option<String>,
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub item_type: Option<String>,
}

/// The "All Categories" option in the feed UI is a sentinel, not a
/// category — it passes everything through.
const ALL_CATEGORIES: &str = "All Categories";

impl FeedQuery {
    fn into_filter(self) -> Result<FeedFilter, ApiError> {
        let category = match self.category.as_deref() {
            None | Some(ALL_CATEGORIES) | Some("") => None,
            Some(label) => Some(
                label
                    .parse::<Category>()
                    .map_err(|e| ApiError::Validation(e.to_string()))?,
            ),
        };

        let item_type = match self.item_type.as_deref() {
            None | Some("") => None,
            Some(tag) => Some(
                tag.parse::<ItemType>()
                    .map_err(|e| ApiError::Validation(e.to_string()))?,
            ),
        };

        Ok(FeedFilter {
            query: self.q.unwrap_or_default(),
            category,
            item_type,
        })
    }
}

pub async fn list_items(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = query.into_filter()?;

    let db = state.db.clone();
    let rows = tokio::task::spawn_blocking(move || db.get_items())
        .await
        .map_err(join_internal)??;

    let items: Vec<ItemResponse> = rows
        .into_iter()
        .map(|row| item_response(row, false))
        .collect();

    Ok(Json(filter.apply(items)))
}

pub async fn get_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let row = tokio::task::spawn_blocking(move || db.get_item(&item_id.to_string()))
        .await
        .map_err(join_internal)??
        .ok_or(ApiError::NotFound("item not found"))?;

    Ok(Json(item_response(row, true)))
}

pub async fn create_item(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = req.title.trim().to_string();
    let description = req.description.trim().to_string();
    let location = req.location.trim().to_string();
    if title.is_empty() || description.is_empty() || location.is_empty() {
        return Err(ApiError::Validation(
            "title, description and location are required".into(),
        ));
    }

    let item_id = Uuid::new_v4();

    // Run blocking DB insert off the async runtime
    let db = state.db.clone();
    let insert = {
        let title = title.clone();
        let description = description.clone();
        let location = location.clone();
        let image_url = req.image_url.clone();
        let owner = claims.sub.to_string();
        move || {
            db.insert_item(
                &item_id.to_string(),
                &title,
                &description,
                req.category.label(),
                &location,
                req.latitude,
                req.longitude,
                &req.date_lost_found.to_string(),
                image_url.as_deref(),
                req.item_type.as_str(),
                &owner,
            )
        }
    };
    let created_at = tokio::task::spawn_blocking(insert)
        .await
        .map_err(join_internal)??;

    Ok((
        StatusCode::CREATED,
        Json(ItemResponse {
            id: item_id,
            title,
            description,
            category: req.category,
            location,
            latitude: req.latitude,
            longitude: req.longitude,
            date_lost_found: req.date_lost_found,
            image_url: req.image_url,
            item_type: req.item_type,
            status: ItemStatus::Active,
            user_id: claims.sub,
            created_at: parse_timestamp(&created_at, "item created_at"),
            owner: None,
        }),
    ))
}

pub(crate) fn item_response(row: ItemRow, include_owner: bool) -> ItemResponse {
    let owner = include_owner.then(|| Profile {
        id: parse_uuid(&row.user_id, "item owner id"),
        full_name: row.owner_full_name.clone(),
        avatar_url: row.owner_avatar_url.clone(),
    });

    ItemResponse {
        id: parse_uuid(&row.id, "item id"),
        title: row.title,
        description: row.description,
        category: row.category.parse().unwrap_or_else(|e| {
            warn!("Corrupt category on item '{}': {}", row.id, e);
            Category::Other
        }),
        location: row.location,
        latitude: row.latitude,
        longitude: row.longitude,
        date_lost_found: row.date_lost_found.parse().unwrap_or_else(|e| {
            warn!("Corrupt date on item '{}': {}", row.id, e);
            chrono::NaiveDate::default()
        }),
        image_url: row.image_url,
        item_type: row.item_type.parse().unwrap_or_else(|e| {
            warn!("Corrupt type on item '{}': {}", row.id, e);
            ItemType::Lost
        }),
        status: row.status.parse().unwrap_or_else(|e| {
            warn!("Corrupt status on item '{}': {}", row.id, e);
            ItemStatus::Active
        }),
        user_id: parse_uuid(&row.user_id, "item user_id"),
        created_at: parse_timestamp(&row.created_at, "item created_at"),
        owner,
    }
}
