//! Video service
//!
//! Publishing, listing, single-video reads with view accounting, and
//! owner-gated mutation.

use std::sync::Arc;

use chrono::Utc;

use super::account::validate_image_type;
use super::{spawn_media_cleanup, StagedFile};
use crate::data::{
    build_video_listing, Database, EntityId, ListParams, PublicUser, Video, VideoPage,
};
use crate::error::AppError;
use crate::storage::{MediaKind, MediaStorage};

const SUPPORTED_VIDEO_TYPES: [&str; 2] = ["video/mp4", "video/webm"];

/// Video service
pub struct VideoService {
    db: Arc<Database>,
    storage: Arc<MediaStorage>,
}

impl VideoService {
    pub fn new(db: Arc<Database>, storage: Arc<MediaStorage>) -> Self {
        Self { db, storage }
    }

    /// Publish a new video from staged media files
    pub async fn publish(
        &self,
        owner_id: &str,
        title: &str,
        description: &str,
        video_file: StagedFile,
        thumbnail: StagedFile,
    ) -> Result<Video, AppError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::Validation("title is required".to_string()));
        }
        if !SUPPORTED_VIDEO_TYPES.contains(&video_file.content_type.as_str()) {
            return Err(AppError::Validation(format!(
                "unsupported video type: {}",
                video_file.content_type
            )));
        }
        validate_image_type(&thumbnail.content_type)?;

        let video_id = EntityId::new().0;
        let stored_video = self
            .storage
            .upload_file(
                video_file.file.path(),
                MediaKind::Video,
                &video_id,
                &video_file.content_type,
            )
            .await?;

        let stored_thumbnail = match self
            .storage
            .upload_file(
                thumbnail.file.path(),
                MediaKind::Thumbnail,
                &video_id,
                &thumbnail.content_type,
            )
            .await
        {
            Ok(stored) => stored,
            Err(error) => {
                self.cleanup_after_failed_publish(&stored_video.url, MediaKind::Video)
                    .await;
                return Err(error);
            }
        };

        let now = Utc::now();
        let video = Video {
            id: video_id,
            owner_id: owner_id.to_string(),
            title: title.to_string(),
            description: description.trim().to_string(),
            video_url: stored_video.url.clone(),
            thumbnail_url: stored_thumbnail.url.clone(),
            duration_seconds: stored_video.duration_seconds.unwrap_or(0.0),
            views: 0,
            is_published: true,
            created_at: now,
            updated_at: now,
        };

        if let Err(error) = self.db.insert_video(&video).await {
            self.cleanup_after_failed_publish(&stored_video.url, MediaKind::Video)
                .await;
            self.cleanup_after_failed_publish(&stored_thumbnail.url, MediaKind::Thumbnail)
                .await;
            return Err(error);
        }

        Ok(video)
    }

    /// List videos through the listing pipeline
    pub async fn list(
        &self,
        params: &ListParams,
        viewer_id: Option<&str>,
    ) -> Result<VideoPage, AppError> {
        let stages = build_video_listing(params, viewer_id)?;
        self.db.run_video_listing(&stages).await
    }

    /// Fetch a single video, accounting the view
    ///
    /// Unpublished videos are readable only by their owner. A non-owner
    /// read increments the view counter, and an authenticated non-owner
    /// read appends to the viewer's watch history; both run detached
    /// from the response.
    pub async fn get(
        &self,
        video_id: &str,
        viewer: Option<&PublicUser>,
    ) -> Result<Video, AppError> {
        if !EntityId::is_valid(video_id) {
            return Err(AppError::InvalidIdentifier);
        }

        let video = self
            .db
            .get_video(video_id)
            .await?
            .ok_or(AppError::NotFound("video"))?;

        let viewer_id = viewer.map(|v| v.id.as_str());
        let viewer_is_owner = viewer_id == Some(video.owner_id.as_str());

        if !video.is_published && !viewer_is_owner {
            return Err(AppError::Forbidden);
        }

        if !viewer_is_owner {
            self.spawn_view_accounting(video.id.clone(), viewer_id.map(ToOwned::to_owned));
        }

        Ok(video)
    }

    /// Update title, description, and/or thumbnail (owner only)
    pub async fn update(
        &self,
        video_id: &str,
        viewer_id: &str,
        title: Option<&str>,
        description: Option<&str>,
        thumbnail: Option<StagedFile>,
    ) -> Result<Video, AppError> {
        let video = self.get_owned(video_id, viewer_id).await?;

        let title = title.map(str::trim).filter(|s| !s.is_empty());
        let description = description.map(str::trim);
        if title.is_none() && description.is_none() && thumbnail.is_none() {
            return Err(AppError::Validation("nothing to update".to_string()));
        }

        let new_thumbnail_url = match &thumbnail {
            Some(staged) => {
                validate_image_type(&staged.content_type)?;
                let stored = self
                    .storage
                    .upload_file(
                        staged.file.path(),
                        MediaKind::Thumbnail,
                        &EntityId::new().0,
                        &staged.content_type,
                    )
                    .await?;
                Some(stored.url)
            }
            None => None,
        };

        self.db
            .update_video_details(
                &video.id,
                title,
                description,
                new_thumbnail_url.as_deref(),
                Utc::now(),
            )
            .await?;

        if new_thumbnail_url.is_some() {
            spawn_media_cleanup(
                self.storage.clone(),
                video.thumbnail_url.clone(),
                MediaKind::Thumbnail,
            );
        }

        self.db
            .get_video(&video.id)
            .await?
            .ok_or(AppError::NotFound("video"))
    }

    /// Delete a video (owner only)
    ///
    /// The row is removed first; the two media objects are then deleted
    /// best-effort without blocking the response. A crash in between
    /// leaks orphaned media rather than blocking the delete.
    pub async fn delete(&self, video_id: &str, viewer_id: &str) -> Result<(), AppError> {
        let video = self.get_owned(video_id, viewer_id).await?;

        self.db.delete_video(&video.id).await?;

        spawn_media_cleanup(self.storage.clone(), video.video_url, MediaKind::Video);
        spawn_media_cleanup(
            self.storage.clone(),
            video.thumbnail_url,
            MediaKind::Thumbnail,
        );

        Ok(())
    }

    /// Flip the publish flag (owner only)
    pub async fn toggle_publish(
        &self,
        video_id: &str,
        viewer_id: &str,
    ) -> Result<Video, AppError> {
        let video = self.get_owned(video_id, viewer_id).await?;

        self.db
            .set_publish_state(&video.id, !video.is_published, Utc::now())
            .await?;

        self.db
            .get_video(&video.id)
            .await?
            .ok_or(AppError::NotFound("video"))
    }

    /// Load a video and enforce ownership
    async fn get_owned(&self, video_id: &str, viewer_id: &str) -> Result<Video, AppError> {
        if !EntityId::is_valid(video_id) {
            return Err(AppError::InvalidIdentifier);
        }

        let video = self
            .db
            .get_video(video_id)
            .await?
            .ok_or(AppError::NotFound("video"))?;

        if video.owner_id != viewer_id {
            return Err(AppError::Forbidden);
        }

        Ok(video)
    }

    /// Record the view counter bump and the watch-history append as a
    /// detached task; the response never waits on them.
    fn spawn_view_accounting(&self, video_id: String, viewer_id: Option<String>) {
        let db = self.db.clone();
        tokio::spawn(async move {
            if let Err(error) = db.increment_views(&video_id).await {
                tracing::warn!(%error, video_id = %video_id, "failed to increment views");
            } else {
                crate::metrics::VIDEO_VIEWS_TOTAL.inc();
            }

            if let Some(viewer_id) = viewer_id {
                if let Err(error) = db.record_watch(&viewer_id, &video_id, Utc::now()).await {
                    tracing::warn!(
                        %error,
                        video_id = %video_id,
                        "failed to record watch history"
                    );
                }
            }
        });
    }

    /// Synchronous best-effort cleanup used when publish fails halfway;
    /// unlike the detached paths, the caller is already returning an
    /// error so waiting costs nothing.
    async fn cleanup_after_failed_publish(&self, url: &str, kind: MediaKind) {
        if let Err(cleanup_error) = self.storage.delete_by_url(url, kind).await {
            tracing::warn!(
                error = %cleanup_error,
                url = %url,
                "failed to clean up media after aborted publish"
            );
        }
    }
}
