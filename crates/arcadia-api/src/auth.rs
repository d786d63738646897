use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;

use arcadia_catalog::IgdbClient;
use arcadia_db::Database;
use arcadia_types::api::{
    Claims, LoginRequest, LoginResponse, LoginUser, RegisterRequest, RegisterResponse, UserSummary,
};

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub catalog: IgdbClient,
    pub jwt_secret: String,
}

const SPECIAL_CHARS: &str = "!@#$%^&*";

/// At least 8 characters, one uppercase letter, one special character.
fn password_meets_policy(password: &str) -> bool {
    password.len() >= 8
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| SPECIAL_CHARS.contains(c))
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.email.is_empty() || req.username.is_empty() || req.password.is_empty() {
        return Err(ApiError::Validation("All fields are required.".into()));
    }

    if !password_meets_policy(&req.password) {
        return Err(ApiError::Validation(
            "Password must be at least 8 characters long, contain 1 uppercase letter, and 1 special character."
                .into(),
        ));
    }

    let email = req.email.to_lowercase();

    if state
        .db
        .email_or_username_taken(&email, &req.username)
        .map_err(ApiError::Internal)?
    {
        return Err(ApiError::Conflict("Email or username already registered.".into()));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hashing failed: {e}")))?
        .to_string();

    let user_id = state
        .db
        .create_user(&req.username, &email, &password_hash)
        .map_err(ApiError::Internal)?;

    info!("Registered user {} ({})", req.username, user_id);

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "Registration successful".into(),
            user: UserSummary {
                id: user_id,
                username: req.username,
                email,
            },
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.email.is_empty() || req.password.is_empty() {
        return Err(ApiError::Validation("Email and password are required.".into()));
    }

    // The same message for an unknown email and a wrong password.
    let invalid = || ApiError::Unauthorized("Invalid email or password".into());

    let user = state
        .db
        .get_user_by_email(&req.email.to_lowercase())
        .map_err(ApiError::Internal)?
        .ok_or_else(invalid)?;

    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("stored hash unreadable: {e}")))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| invalid())?;

    let token = create_token(&state.jwt_secret, user.id, &user.username)
        .map_err(ApiError::Internal)?;

    Ok(Json(LoginResponse {
        message: "Login successful".into(),
        token,
        user: LoginUser {
            id: user.id,
            username: user.username,
            email: user.email,
            profile_pic: user.profile_pic,
            banner: user.banner,
        },
    }))
}

pub async fn logout() -> impl IntoResponse {
    Json(serde_json::json!({ "message": "Logged out successfully" }))
}

fn create_token(secret: &str, user_id: i64, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
