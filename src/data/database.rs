//! SQLite database operations
//!
//! All database access goes through this module. Queries run through
//! SQLx; the dynamic listing query is assembled from pipeline stages
//! with `QueryBuilder`.

use chrono::{DateTime, Utc};
use sqlx::{Pool, QueryBuilder, Row, Sqlite, SqlitePool};
use std::path::Path;

use super::models::*;
use super::pipeline::ListStage;
use crate::error::AppError;

/// Database connection pool wrapper.
pub struct Database {
    pool: Pool<Sqlite>,
}

/// Escape LIKE wildcards in a user-supplied search term.
///
/// The translated search uses `ESCAPE '\'`.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Append the WHERE clauses for the filter/search stages of a listing.
///
/// Sort and pagination stages are handled separately since the count
/// query shares only the filters.
fn push_listing_filters(builder: &mut QueryBuilder<'_, Sqlite>, stages: &[ListStage]) {
    builder.push(" WHERE 1 = 1");
    for stage in stages {
        match stage {
            ListStage::FilterOwner(owner_id) => {
                builder.push(" AND owner_id = ");
                builder.push_bind(owner_id.clone());
            }
            ListStage::FilterPublished => {
                builder.push(" AND is_published = 1");
            }
            ListStage::Search(term) => {
                let pattern = format!("%{}%", escape_like(term));
                builder.push(" AND (title LIKE ");
                builder.push_bind(pattern.clone());
                builder.push(" ESCAPE '\\' OR description LIKE ");
                builder.push_bind(pattern);
                builder.push(" ESCAPE '\\')");
            }
            ListStage::Sort { .. } | ListStage::Paginate { .. } => {}
        }
    }
}

impl Database {
    /// Connect to SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Arguments
    /// * `path` - Path to SQLite database file
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&connection_string).await?;

        sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
            tracing::error!("Migration failed: {}", e);
            AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
        })?;

        tracing::info!("Database connected and migrated successfully");

        Ok(Self { pool })
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Insert a newly registered user
    pub async fn insert_user(&self, user: &User) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO users (
                id, username, email, full_name, password_hash,
                avatar_url, cover_image_url, refresh_token, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(&user.password_hash)
        .bind(&user.avatar_url)
        .bind(&user.cover_image_url)
        .bind(&user.refresh_token)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    /// Fetch a user without the credential columns
    pub async fn get_public_user(&self, id: &str) -> Result<Option<PublicUser>, AppError> {
        let user = sqlx::query_as::<_, PublicUser>(
            r#"
            SELECT id, username, email, full_name, avatar_url, cover_image_url, created_at
            FROM users WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// Look up a user by username or email, whichever is given
    pub async fn find_user_by_identity(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>, AppError> {
        // a NULL bind never matches the NOT NULL identity columns
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ? OR email = ?")
            .bind(username)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    /// Check whether a username or email is already taken
    pub async fn identity_exists(&self, username: &str, email: &str) -> Result<bool, AppError> {
        let row = sqlx::query("SELECT 1 FROM users WHERE username = ? OR email = ? LIMIT 1")
            .bind(username)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Check whether another user already holds one of these identities
    pub async fn identity_taken_by_other(
        &self,
        id: &str,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<bool, AppError> {
        let row = sqlx::query(
            "SELECT 1 FROM users WHERE (username = ? OR email = ?) AND id != ? LIMIT 1",
        )
        .bind(username)
        .bind(email)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// Update username and/or email
    pub async fn update_user_details(
        &self,
        id: &str,
        username: Option<&str>,
        email: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE users SET updated_at = ");
        builder.push_bind(now);
        if let Some(username) = username {
            builder.push(", username = ");
            builder.push_bind(username.to_string());
        }
        if let Some(email) = email {
            builder.push(", email = ");
            builder.push_bind(email.to_string());
        }
        builder.push(" WHERE id = ");
        builder.push_bind(id.to_string());
        builder.build().execute(&self.pool).await?;
        Ok(())
    }

    /// Replace the stored password hash; touches nothing else
    pub async fn set_password_hash(
        &self,
        id: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(password_hash)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_avatar_url(
        &self,
        id: &str,
        avatar_url: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET avatar_url = ?, updated_at = ? WHERE id = ?")
            .bind(avatar_url)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_cover_image_url(
        &self,
        id: &str,
        cover_image_url: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET cover_image_url = ?, updated_at = ? WHERE id = ?")
            .bind(cover_image_url)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // =========================================================================
    // Credential store accessor
    // =========================================================================
    //
    // Refresh-token rotation is a single-column overwrite: it must not
    // re-validate or re-hash anything else on the row.

    /// Persist the current refresh token, replacing any prior value
    pub async fn set_refresh_token(&self, user_id: &str, token: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET refresh_token = ? WHERE id = ?")
            .bind(token)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Clear the persisted refresh token (logout)
    pub async fn clear_refresh_token(&self, user_id: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET refresh_token = NULL WHERE id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // =========================================================================
    // Videos
    // =========================================================================

    pub async fn insert_video(&self, video: &Video) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO videos (
                id, owner_id, title, description, video_url, thumbnail_url,
                duration_seconds, views, is_published, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&video.id)
        .bind(&video.owner_id)
        .bind(&video.title)
        .bind(&video.description)
        .bind(&video.video_url)
        .bind(&video.thumbnail_url)
        .bind(video.duration_seconds)
        .bind(video.views)
        .bind(video.is_published)
        .bind(video.created_at)
        .bind(video.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_video(&self, id: &str) -> Result<Option<Video>, AppError> {
        let video = sqlx::query_as::<_, Video>("SELECT * FROM videos WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(video)
    }

    /// Update title, description, and/or thumbnail
    pub async fn update_video_details(
        &self,
        id: &str,
        title: Option<&str>,
        description: Option<&str>,
        thumbnail_url: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE videos SET updated_at = ");
        builder.push_bind(now);
        if let Some(title) = title {
            builder.push(", title = ");
            builder.push_bind(title.to_string());
        }
        if let Some(description) = description {
            builder.push(", description = ");
            builder.push_bind(description.to_string());
        }
        if let Some(thumbnail_url) = thumbnail_url {
            builder.push(", thumbnail_url = ");
            builder.push_bind(thumbnail_url.to_string());
        }
        builder.push(" WHERE id = ");
        builder.push_bind(id.to_string());
        builder.build().execute(&self.pool).await?;
        Ok(())
    }

    pub async fn set_publish_state(
        &self,
        id: &str,
        is_published: bool,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE videos SET is_published = ?, updated_at = ? WHERE id = ?")
            .bind(is_published)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_video(&self, id: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM watch_history WHERE video_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM videos WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Atomic single-statement view increment
    pub async fn increment_views(&self, id: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE videos SET views = views + 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // =========================================================================
    // Listing pipeline executor
    // =========================================================================

    /// Execute a video listing pipeline built by
    /// [`super::pipeline::build_video_listing`].
    ///
    /// Returns an empty page, not an error, when nothing matches.
    pub async fn run_video_listing(&self, stages: &[ListStage]) -> Result<VideoPage, AppError> {
        let (mut page, mut per_page) = (1u32, super::pipeline::DEFAULT_PAGE_SIZE);
        let mut order_by = None;
        for stage in stages {
            match stage {
                ListStage::Sort { field, direction } => {
                    order_by = Some(format!("{} {}", field.column(), direction.sql()));
                }
                ListStage::Paginate {
                    page: p,
                    per_page: pp,
                } => {
                    page = *p;
                    per_page = *pp;
                }
                _ => {}
            }
        }

        let mut count_builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM videos");
        push_listing_filters(&mut count_builder, stages);
        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM videos");
        push_listing_filters(&mut builder, stages);
        if let Some(order_by) = &order_by {
            // columns come from the SortField whitelist, never the caller
            builder.push(format!(" ORDER BY {}", order_by));
        }
        builder.push(" LIMIT ");
        builder.push_bind(per_page as i64);
        builder.push(" OFFSET ");
        builder.push_bind(((page - 1) as i64) * per_page as i64);

        let items = builder
            .build_query_as::<Video>()
            .fetch_all(&self.pool)
            .await?;

        let total_pages = ((total as u64).div_ceil(per_page as u64)) as u32;

        Ok(VideoPage {
            items,
            total,
            page,
            per_page,
            total_pages,
        })
    }

    // =========================================================================
    // Subscriptions & channel statistics
    // =========================================================================

    pub async fn insert_subscription(&self, subscription: &Subscription) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO subscriptions (id, subscriber_id, channel_id, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&subscription.id)
        .bind(&subscription.subscriber_id)
        .bind(&subscription.channel_id)
        .bind(subscription.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Channel statistics for a username, personalized for the viewer
    ///
    /// Username match is case-insensitive. `is_subscribed` is false when
    /// no viewer is resolved.
    pub async fn get_channel_profile(
        &self,
        username: &str,
        viewer_id: Option<&str>,
    ) -> Result<Option<ChannelProfile>, AppError> {
        let profile = sqlx::query_as::<_, ChannelProfile>(
            r#"
            SELECT
                u.id,
                u.username,
                u.full_name,
                u.avatar_url,
                u.cover_image_url,
                (SELECT COUNT(*) FROM subscriptions s WHERE s.channel_id = u.id)
                    AS subscriber_count,
                (SELECT COUNT(*) FROM subscriptions s WHERE s.subscriber_id = u.id)
                    AS subscribed_count,
                EXISTS(
                    SELECT 1 FROM subscriptions s
                    WHERE s.channel_id = u.id AND s.subscriber_id = ?
                ) AS is_subscribed
            FROM users u
            WHERE u.username = ?
            "#,
        )
        .bind(viewer_id)
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    // =========================================================================
    // Watch history
    // =========================================================================

    /// Append a video to a user's watch history
    ///
    /// Duplicate entries are suppressed; a re-watch keeps the original
    /// position.
    pub async fn record_watch(
        &self,
        user_id: &str,
        video_id: &str,
        watched_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            "INSERT OR IGNORE INTO watch_history (user_id, video_id, watched_at) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(video_id)
        .bind(watched_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Watch history in stored insertion order, each video enriched with
    /// a minimal owner projection
    pub async fn get_watch_history(
        &self,
        user_id: &str,
    ) -> Result<Vec<WatchHistoryEntry>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT
                v.id, v.owner_id, v.title, v.description, v.video_url,
                v.thumbnail_url, v.duration_seconds, v.views, v.is_published,
                v.created_at, v.updated_at,
                u.username AS owner_username,
                u.avatar_url AS owner_avatar_url
            FROM watch_history wh
            JOIN videos v ON v.id = wh.video_id
            JOIN users u ON u.id = v.owner_id
            WHERE wh.user_id = ?
            ORDER BY wh.rowid
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let video = Video {
                id: row.try_get("id")?,
                owner_id: row.try_get("owner_id")?,
                title: row.try_get("title")?,
                description: row.try_get("description")?,
                video_url: row.try_get("video_url")?,
                thumbnail_url: row.try_get("thumbnail_url")?,
                duration_seconds: row.try_get("duration_seconds")?,
                views: row.try_get("views")?,
                is_published: row.try_get("is_published")?,
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
            };
            let owner = VideoOwner {
                username: row.try_get("owner_username")?,
                avatar_url: row.try_get("owner_avatar_url")?,
            };
            entries.push(WatchHistoryEntry { video, owner });
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_like_escapes_wildcards() {
        assert_eq!(escape_like("100%_done\\"), "100\\%\\_done\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }
}
