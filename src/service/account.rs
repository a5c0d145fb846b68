//! Account service
//!
//! Registration, the session lifecycle (login, logout, refresh), and
//! profile maintenance.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use super::{spawn_media_cleanup, StagedFile};
use crate::auth::{password, TokenKind, TokenService};
use crate::data::{ChannelProfile, Database, EntityId, PublicUser, User, WatchHistoryEntry};
use crate::error::AppError;
use crate::storage::{MediaKind, MediaStorage};

/// Registration input, with any media already staged locally
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
    pub avatar: Option<StagedFile>,
    pub cover_image: Option<StagedFile>,
}

/// Login input; at least one identity field must be present
pub struct LoginInput {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: String,
}

/// The session credential pair as returned to clients
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Account service
pub struct AccountService {
    db: Arc<Database>,
    storage: Arc<MediaStorage>,
    tokens: TokenService,
}

impl AccountService {
    pub fn new(db: Arc<Database>, storage: Arc<MediaStorage>, tokens: TokenService) -> Self {
        Self {
            db,
            storage,
            tokens,
        }
    }

    /// Register a new user
    ///
    /// Staged avatar/cover files are uploaded before the row is written;
    /// their temp files are removed on every path when `new_user` drops.
    pub async fn register(&self, new_user: NewUser) -> Result<PublicUser, AppError> {
        let username = new_user.username.trim();
        let email = new_user.email.trim();
        let full_name = new_user.full_name.trim();
        let password = new_user.password.trim();

        if [username, email, full_name, password]
            .iter()
            .any(|field| field.is_empty())
        {
            return Err(AppError::Validation(
                "a required field was empty".to_string(),
            ));
        }

        if self.db.identity_exists(username, email).await? {
            return Err(AppError::Conflict(
                "a user with this username or email already exists".to_string(),
            ));
        }

        let avatar_url = match &new_user.avatar {
            Some(staged) => Some(self.upload_image(staged, MediaKind::Avatar).await?),
            None => None,
        };
        let cover_image_url = match &new_user.cover_image {
            Some(staged) => Some(self.upload_image(staged, MediaKind::CoverImage).await?),
            None => None,
        };

        let now = Utc::now();
        let user = User {
            id: EntityId::new().0,
            username: username.to_string(),
            email: email.to_string(),
            full_name: full_name.to_string(),
            password_hash: password::hash_password(password)?,
            avatar_url,
            cover_image_url,
            refresh_token: None,
            created_at: now,
            updated_at: now,
        };
        self.db.insert_user(&user).await?;

        Ok(user.into_public())
    }

    /// Authenticate and open a session
    ///
    /// Unknown identity and wrong password produce the same error so the
    /// response never reveals which check failed.
    pub async fn login(&self, input: LoginInput) -> Result<(PublicUser, TokenPair), AppError> {
        let username = input.username.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let email = input.email.as_deref().map(str::trim).filter(|s| !s.is_empty());
        if username.is_none() && email.is_none() {
            return Err(AppError::Validation(
                "username or email is required".to_string(),
            ));
        }

        let user = self
            .db
            .find_user_by_identity(username, email)
            .await?
            .ok_or(AppError::InvalidCredential)?;

        if !password::verify_password(&input.password, &user.password_hash)? {
            return Err(AppError::InvalidCredential);
        }

        let pair = self.mint_session(&user.id).await?;
        Ok((user.into_public(), pair))
    }

    /// Close the session by clearing the persisted refresh token
    ///
    /// Idempotent: logging out twice is not an error.
    pub async fn logout(&self, user_id: &str) -> Result<(), AppError> {
        self.db.clear_refresh_token(user_id).await
    }

    /// Exchange a refresh token for a fresh pair
    ///
    /// The presented token must byte-match the persisted one; rotation
    /// closes the replay window after a single legitimate use.
    pub async fn refresh(&self, presented: &str) -> Result<TokenPair, AppError> {
        let user_id = self.tokens.verify(presented, TokenKind::Refresh)?;

        let user = self
            .db
            .get_user(&user_id)
            .await?
            .ok_or(AppError::InvalidCredential)?;

        match user.refresh_token.as_deref() {
            Some(stored) if stored == presented => {}
            _ => return Err(AppError::StaleToken),
        }

        self.mint_session(&user.id).await
    }

    /// Change the password after re-verifying the old one
    pub async fn change_password(
        &self,
        user_id: &str,
        old_password: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<(), AppError> {
        if new_password != confirm_password {
            return Err(AppError::Validation(
                "confirm password does not match".to_string(),
            ));
        }
        if new_password.trim().is_empty() {
            return Err(AppError::Validation(
                "new password must not be empty".to_string(),
            ));
        }

        let user = self
            .db
            .get_user(user_id)
            .await?
            .ok_or(AppError::InvalidCredential)?;

        if !password::verify_password(old_password, &user.password_hash)? {
            return Err(AppError::InvalidCredential);
        }

        let hash = password::hash_password(new_password)?;
        self.db.set_password_hash(user_id, &hash, Utc::now()).await
    }

    /// Update username and/or email
    pub async fn update_details(
        &self,
        user_id: &str,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<PublicUser, AppError> {
        let username = username.map(str::trim).filter(|s| !s.is_empty());
        let email = email.map(str::trim).filter(|s| !s.is_empty());
        if username.is_none() && email.is_none() {
            return Err(AppError::Validation("nothing to update".to_string()));
        }

        if self
            .db
            .identity_taken_by_other(user_id, username, email)
            .await?
        {
            return Err(AppError::Conflict(
                "a user with this username or email already exists".to_string(),
            ));
        }

        self.db
            .update_user_details(user_id, username, email, Utc::now())
            .await?;
        self.db
            .get_public_user(user_id)
            .await?
            .ok_or(AppError::NotFound("user"))
    }

    /// Replace the avatar; the old object is deleted best-effort
    pub async fn update_avatar(
        &self,
        user_id: &str,
        staged: StagedFile,
    ) -> Result<PublicUser, AppError> {
        self.replace_profile_image(user_id, staged, MediaKind::Avatar)
            .await
    }

    /// Replace the cover image; the old object is deleted best-effort
    pub async fn update_cover_image(
        &self,
        user_id: &str,
        staged: StagedFile,
    ) -> Result<PublicUser, AppError> {
        self.replace_profile_image(user_id, staged, MediaKind::CoverImage)
            .await
    }

    /// Channel statistics by username, personalized for the viewer
    pub async fn channel_profile(
        &self,
        username: &str,
        viewer_id: Option<&str>,
    ) -> Result<ChannelProfile, AppError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(AppError::Validation("username is required".to_string()));
        }

        self.db
            .get_channel_profile(username, viewer_id)
            .await?
            .ok_or(AppError::NotFound("channel"))
    }

    /// The viewer's watch history in stored order
    pub async fn watch_history(&self, user_id: &str) -> Result<Vec<WatchHistoryEntry>, AppError> {
        self.db.get_watch_history(user_id).await
    }

    /// Mint a new pair and persist the refresh half, revoking any prior
    /// session. Only the token column is touched.
    async fn mint_session(&self, user_id: &str) -> Result<TokenPair, AppError> {
        let access_token = self.tokens.issue_access_token(user_id)?;
        let refresh_token = self.tokens.issue_refresh_token(user_id)?;
        self.db.set_refresh_token(user_id, &refresh_token).await?;
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    async fn upload_image(
        &self,
        staged: &StagedFile,
        kind: MediaKind,
    ) -> Result<String, AppError> {
        validate_image_type(&staged.content_type)?;
        let stored = self
            .storage
            .upload_file(
                staged.file.path(),
                kind,
                &EntityId::new().0,
                &staged.content_type,
            )
            .await?;
        Ok(stored.url)
    }

    async fn replace_profile_image(
        &self,
        user_id: &str,
        staged: StagedFile,
        kind: MediaKind,
    ) -> Result<PublicUser, AppError> {
        let user = self
            .db
            .get_user(user_id)
            .await?
            .ok_or(AppError::NotFound("user"))?;

        let new_url = self.upload_image(&staged, kind).await?;
        let now = Utc::now();
        let old_url = match kind {
            MediaKind::Avatar => {
                self.db.set_avatar_url(user_id, &new_url, now).await?;
                user.avatar_url
            }
            _ => {
                self.db.set_cover_image_url(user_id, &new_url, now).await?;
                user.cover_image_url
            }
        };

        if let Some(old_url) = old_url {
            spawn_media_cleanup(self.storage.clone(), old_url, kind);
        }

        self.db
            .get_public_user(user_id)
            .await?
            .ok_or(AppError::NotFound("user"))
    }
}

pub(crate) const SUPPORTED_IMAGE_TYPES: [&str; 4] =
    ["image/jpeg", "image/png", "image/webp", "image/gif"];

pub(crate) fn validate_image_type(content_type: &str) -> Result<(), AppError> {
    if !SUPPORTED_IMAGE_TYPES.contains(&content_type) {
        return Err(AppError::Validation(format!(
            "unsupported image type: {}",
            content_type
        )));
    }
    Ok(())
}
