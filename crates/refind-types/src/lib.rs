pub mod api;
pub mod email;
pub mod events;
pub mod feed;
pub mod models;
