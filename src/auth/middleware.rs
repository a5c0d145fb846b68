//! Authentication gates
//!
//! Two extractor variants share one resolution algorithm: pull the
//! access token from the `accessToken` cookie or a bearer header,
//! verify it, and attach the resolved viewer (sans credential columns)
//! to the request.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use axum_extra::extract::CookieJar;

use super::token::TokenKind;
use crate::data::PublicUser;
use crate::error::AppError;
use crate::AppState;

/// Cookie names double as the JSON body field names for non-cookie
/// clients.
pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

fn extract_token_from_headers(headers: &HeaderMap) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    jar.get(ACCESS_TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_owned())
        .or_else(|| {
            headers
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .and_then(|h| h.strip_prefix("Bearer "))
                .map(ToOwned::to_owned)
        })
}

async fn resolve_viewer(token: &str, state: &AppState) -> Result<PublicUser, AppError> {
    let user_id = state.tokens.verify(token, TokenKind::Access)?;
    state
        .db
        .get_public_user(&user_id)
        .await?
        .ok_or(AppError::InvalidCredential)
}

/// Extractor for the authenticated viewer (mandatory gate)
///
/// Halts the request with `MissingCredential` when no token is
/// presented and `InvalidCredential` when verification fails.
///
/// # Usage
/// ```ignore
/// async fn handler(
///     CurrentUser(viewer): CurrentUser,
/// ) -> impl IntoResponse {
///     format!("Hello, {}", viewer.username)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser(pub PublicUser);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(viewer) = parts.extensions.get::<PublicUser>().cloned() {
            return Ok(CurrentUser(viewer));
        }

        let state = AppState::from_ref(state);
        let token =
            extract_token_from_headers(&parts.headers).ok_or(AppError::MissingCredential)?;
        let viewer = resolve_viewer(&token, &state)
            .await
            .map_err(|error| match error {
                AppError::Database(_) | AppError::Internal(_) => error,
                _ => AppError::InvalidCredential,
            })?;
        parts.extensions.insert(viewer.clone());

        Ok(CurrentUser(viewer))
    }
}

/// Optional viewer extractor
///
/// Returns no identity instead of an error, so public endpoints can
/// personalize for logged-in viewers without requiring login.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<PublicUser>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(viewer) = parts.extensions.get::<PublicUser>().cloned() {
            return Ok(MaybeUser(Some(viewer)));
        }

        let app_state = AppState::from_ref(state);
        let viewer = match extract_token_from_headers(&parts.headers) {
            Some(token) => resolve_viewer(&token, &app_state).await.ok(),
            None => None,
        };

        if let Some(viewer) = &viewer {
            parts.extensions.insert(viewer.clone());
        }

        Ok(MaybeUser(viewer))
    }
}
