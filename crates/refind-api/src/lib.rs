pub mod auth;
pub mod conversations;
pub mod error;
pub mod items;
pub mod messages;
pub mod middleware;

use tracing::warn;
use uuid::Uuid;

/// Row ids and timestamps are written by this codebase, so parse failures
/// mean a corrupt row; log and fall back rather than failing the request.
pub(crate) fn parse_uuid(value: &str, context: &str) -> Uuid {
    value.parse().unwrap_or_else(|e| {
        warn!("Corrupt uuid '{}' ({}): {}", value, context, e);
        Uuid::default()
    })
}

pub(crate) fn parse_timestamp(value: &str, context: &str) -> chrono::DateTime<chrono::Utc> {
    value
        .parse::<chrono::DateTime<chrono::Utc>>()
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' ({}): {}", value, context, e);
            chrono::DateTime::default()
        })
}
