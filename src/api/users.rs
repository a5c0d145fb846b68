//! User and session endpoints

use axum::{
    extract::{Multipart, Path, State},
    routing::{get, patch, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};

use crate::auth::{CurrentUser, MaybeUser, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE};
use crate::data::PublicUser;
use crate::error::AppError;
use crate::service::{AccountService, LoginInput, NewUser, TokenPair};
use crate::AppState;

use super::{stage_field, ApiResponse};

const MAX_IMAGE_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

fn account_service(state: &AppState) -> AccountService {
    AccountService::new(
        state.db.clone(),
        state.storage.clone(),
        state.tokens.clone(),
    )
}

fn session_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .build()
}

fn removal_cookie(name: &'static str) -> Cookie<'static> {
    let mut cookie = Cookie::from(name);
    cookie.set_path("/");
    cookie
}

/// Add both session cookies to the jar
fn with_session_cookies(jar: CookieJar, state: &AppState, pair: &TokenPair) -> CookieJar {
    let secure = state.config.should_use_secure_cookies();
    jar.add(session_cookie(
        ACCESS_TOKEN_COOKIE,
        pair.access_token.clone(),
        secure,
    ))
    .add(session_cookie(
        REFRESH_TOKEN_COOKIE,
        pair.refresh_token.clone(),
        secure,
    ))
}

fn without_session_cookies(jar: CookieJar) -> CookieJar {
    jar.remove(removal_cookie(ACCESS_TOKEN_COOKIE))
        .remove(removal_cookie(REFRESH_TOKEN_COOKIE))
}

/// POST /api/v1/users/register
async fn register(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<ApiResponse<PublicUser>, AppError> {
    let mut username = String::new();
    let mut email = String::new();
    let mut full_name = String::new();
    let mut password = String::new();
    let mut avatar = None;
    let mut cover_image = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("failed to parse multipart: {}", e)))?
    {
        let field_name = field.name().unwrap_or("").to_string();
        match field_name.as_str() {
            "username" => username = read_text(field).await?,
            "email" => email = read_text(field).await?,
            "fullName" => full_name = read_text(field).await?,
            "password" => password = read_text(field).await?,
            "avatar" => avatar = Some(stage_field(&mut field, MAX_IMAGE_UPLOAD_BYTES).await?),
            "coverImage" => {
                cover_image = Some(stage_field(&mut field, MAX_IMAGE_UPLOAD_BYTES).await?)
            }
            _ => {}
        }
    }

    let user = account_service(&state)
        .register(NewUser {
            username,
            email,
            full_name,
            password,
            avatar,
            cover_image,
        })
        .await?;

    Ok(ApiResponse::created(user, "user registered successfully"))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    pub user: PublicUser,
    pub access_token: String,
    pub refresh_token: String,
}

/// POST /api/v1/users/login
///
/// The pair is set as cookies and also returned in the body for
/// non-cookie clients.
async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, ApiResponse<LoginData>), AppError> {
    let (user, pair) = account_service(&state)
        .login(LoginInput {
            username: req.username,
            email: req.email,
            password: req.password,
        })
        .await?;

    let jar = with_session_cookies(jar, &state, &pair);
    let data = LoginData {
        user,
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    };

    Ok((jar, ApiResponse::ok(data, "logged in successfully")))
}

/// POST /api/v1/users/logout
async fn logout(
    State(state): State<AppState>,
    CurrentUser(viewer): CurrentUser,
    jar: CookieJar,
) -> Result<(CookieJar, ApiResponse<serde_json::Value>), AppError> {
    account_service(&state).logout(&viewer.id).await?;

    Ok((
        without_session_cookies(jar),
        ApiResponse::ok(serde_json::json!({}), "user logged out successfully"),
    ))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

/// POST /api/v1/users/refresh-token
///
/// Accepts the refresh token from the cookie or the body; a successful
/// call rotates both tokens, revoking the presented one.
async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Option<Json<RefreshRequest>>,
) -> Result<(CookieJar, ApiResponse<TokenPair>), AppError> {
    let presented = jar
        .get(REFRESH_TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_owned())
        .or_else(|| body.and_then(|Json(req)| req.refresh_token))
        .ok_or(AppError::MissingCredential)?;

    let pair = account_service(&state).refresh(&presented).await?;

    let jar = with_session_cookies(jar, &state, &pair);
    Ok((
        jar,
        ApiResponse::ok(pair, "access token refreshed successfully"),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

/// POST /api/v1/users/change-password
async fn change_password(
    State(state): State<AppState>,
    CurrentUser(viewer): CurrentUser,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<ApiResponse<serde_json::Value>, AppError> {
    account_service(&state)
        .change_password(
            &viewer.id,
            &req.old_password,
            &req.new_password,
            &req.confirm_password,
        )
        .await?;

    Ok(ApiResponse::ok(
        serde_json::json!({}),
        "password changed successfully",
    ))
}

/// GET /api/v1/users/get-user
async fn get_current_user(
    CurrentUser(viewer): CurrentUser,
) -> Result<ApiResponse<PublicUser>, AppError> {
    Ok(ApiResponse::ok(viewer, "current user fetched successfully"))
}

#[derive(Debug, Deserialize)]
pub struct UpdateDetailsRequest {
    pub username: Option<String>,
    pub email: Option<String>,
}

/// PATCH /api/v1/users/update-details
async fn update_details(
    State(state): State<AppState>,
    CurrentUser(viewer): CurrentUser,
    Json(req): Json<UpdateDetailsRequest>,
) -> Result<ApiResponse<PublicUser>, AppError> {
    let user = account_service(&state)
        .update_details(&viewer.id, req.username.as_deref(), req.email.as_deref())
        .await?;

    Ok(ApiResponse::ok(user, "details updated successfully"))
}

/// Pull a single named file field out of a multipart body
async fn stage_single_file(
    multipart: &mut Multipart,
    expected: &str,
) -> Result<crate::service::StagedFile, AppError> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("failed to parse multipart: {}", e)))?
    {
        if field.name() == Some(expected) {
            return stage_field(&mut field, MAX_IMAGE_UPLOAD_BYTES).await;
        }
    }
    Err(AppError::Validation(format!("{} file is required", expected)))
}

/// PATCH /api/v1/users/update-avatar
async fn update_avatar(
    State(state): State<AppState>,
    CurrentUser(viewer): CurrentUser,
    mut multipart: Multipart,
) -> Result<ApiResponse<PublicUser>, AppError> {
    let staged = stage_single_file(&mut multipart, "avatar").await?;
    let user = account_service(&state)
        .update_avatar(&viewer.id, staged)
        .await?;

    Ok(ApiResponse::ok(user, "avatar updated successfully"))
}

/// PATCH /api/v1/users/update-cover-image
async fn update_cover_image(
    State(state): State<AppState>,
    CurrentUser(viewer): CurrentUser,
    mut multipart: Multipart,
) -> Result<ApiResponse<PublicUser>, AppError> {
    let staged = stage_single_file(&mut multipart, "coverImage").await?;
    let user = account_service(&state)
        .update_cover_image(&viewer.id, staged)
        .await?;

    Ok(ApiResponse::ok(user, "cover image updated successfully"))
}

/// GET /api/v1/users/fetch-info/:username
///
/// Optional auth: `isSubscribed` personalizes for a logged-in viewer
/// and is false for anonymous callers.
async fn channel_info(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(username): Path<String>,
) -> Result<ApiResponse<crate::data::ChannelProfile>, AppError> {
    let profile = account_service(&state)
        .channel_profile(&username, viewer.as_ref().map(|v| v.id.as_str()))
        .await?;

    Ok(ApiResponse::ok(profile, "info fetched successfully"))
}

/// GET /api/v1/users/history
async fn watch_history(
    State(state): State<AppState>,
    CurrentUser(viewer): CurrentUser,
) -> Result<ApiResponse<Vec<crate::data::WatchHistoryEntry>>, AppError> {
    let history = account_service(&state).watch_history(&viewer.id).await?;

    Ok(ApiResponse::ok(
        history,
        "watch history fetched successfully",
    ))
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| AppError::Validation(format!("failed to read field: {}", e)))
}

/// Create user router
pub fn users_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/refresh-token", post(refresh))
        .route("/change-password", post(change_password))
        .route("/get-user", get(get_current_user))
        .route("/update-details", patch(update_details))
        .route("/update-avatar", patch(update_avatar))
        .route("/update-cover-image", patch(update_cover_image))
        .route("/fetch-info/:username", get(channel_info))
        .route("/history", get(watch_history))
}
