use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// -- JWT Claims --

/// JWT claims shared between the bearer middleware and the handlers.
/// Canonical definition lives here in arcadia-types to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: i64,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user: UserSummary,
}

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub token: String,
    pub user: LoginUser,
}

/// The login payload keeps the camelCase media fields the web client expects.
#[derive(Debug, Serialize)]
pub struct LoginUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(rename = "profilePic")]
    pub profile_pic: String,
    pub banner: String,
}

// -- Users --

#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub profile_pic: String,
    pub banner: String,
    pub platforms: Vec<String>,
    pub genres: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct UpdateUsernameRequest {
    pub old_username: String,
    pub new_username: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfilePicRequest {
    pub username: String,
    pub profile_pic: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdatePreferencesRequest {
    pub username: String,
    pub platforms: Option<Vec<String>>,
    pub genres: Option<Vec<String>>,
}

// -- Friends --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddFriendRequest {
    pub username: String,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: i64,
    pub sender: String,
    pub recipient: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

// -- Posts --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePostRequest {
    pub content: String,
    pub game_id: i64,
}

#[derive(Debug, Serialize)]
pub struct PostResponse {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub profile_pic: String,
    pub game_id: i64,
    pub game_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub replies: Vec<ReplyResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateReplyRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ReplyResponse {
    pub id: i64,
    pub post_id: i64,
    pub username: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
