use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use uuid::Uuid;

use refind_db::Database;
use refind_gateway::dispatcher::Dispatcher;
use refind_types::api::{
    Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse,
};
use refind_types::email::is_institutional_email;

use crate::error::{ApiError, join_internal};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub jwt_secret: String,
    /// Required domain suffix for registration, e.g. ".edu".
    pub email_suffix: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Institutional email gate runs before any other work
    let email = req.email.trim().to_lowercase();
    if !is_institutional_email(&email, &state.email_suffix) {
        return Err(ApiError::Validation(format!(
            "a valid {} university email address is required",
            state.email_suffix
        )));
    }
    if req.password.len() < 8 {
        return Err(ApiError::Validation(
            "password must be at least 8 characters".into(),
        ));
    }
    let full_name = req.full_name.trim().to_string();
    if full_name.is_empty() || full_name.len() > 80 {
        return Err(ApiError::Validation("a display name is required".into()));
    }

    let db = state.db.clone();
    let lookup_email = email.clone();
    let existing = tokio::task::spawn_blocking(move || db.get_user_by_email(&lookup_email))
        .await
        .map_err(join_internal)??;
    if existing.is_some() {
        return Err(ApiError::Conflict("email already registered"));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();

    let user_id = Uuid::new_v4();

    let db = state.db.clone();
    let insert_email = email.clone();
    let insert_name = full_name.clone();
    tokio::task::spawn_blocking(move || {
        db.create_user(&user_id.to_string(), &insert_email, &password_hash, &insert_name)
    })
    .await
    .map_err(join_internal)??;

    let token = create_token(&state.jwt_secret, user_id, &full_name, &email)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse { user_id, token }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_lowercase();

    let db = state.db.clone();
    let lookup_email = email.clone();
    let user = tokio::task::spawn_blocking(move || db.get_user_by_email(&lookup_email))
        .await
        .map_err(join_internal)??
        .ok_or(ApiError::Unauthorized)?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| anyhow::anyhow!("stored password hash unreadable: {}", e))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized)?;

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| anyhow::anyhow!("corrupt user id '{}': {}", user.id, e))?;

    let token = create_token(&state.jwt_secret, user_id, &user.full_name, &user.email)?;

    Ok(Json(LoginResponse {
        user_id,
        full_name: user.full_name,
        token,
    }))
}

fn create_token(
    secret: &str,
    user_id: Uuid,
    full_name: &str,
    email: &str,
) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        full_name: full_name.to_string(),
        email: email.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
