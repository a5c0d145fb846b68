//! Video endpoints

use axum::{
    extract::{Multipart, Path, Query, State},
    routing::{get, patch, post},
    Router,
};

use crate::auth::{CurrentUser, MaybeUser};
use crate::data::{ListParams, Video, VideoPage};
use crate::error::AppError;
use crate::service::VideoService;
use crate::AppState;

use super::{stage_field, ApiResponse};

const MAX_IMAGE_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const MAX_VIDEO_UPLOAD_BYTES: usize = 40 * 1024 * 1024;

fn video_service(state: &AppState) -> VideoService {
    VideoService::new(state.db.clone(), state.storage.clone())
}

/// GET /api/v1/videos
///
/// Optional auth: the published-only filter is lifted when the viewer
/// lists their own videos.
async fn list_videos(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Query(params): Query<ListParams>,
) -> Result<ApiResponse<VideoPage>, AppError> {
    let page = video_service(&state)
        .list(&params, viewer.as_ref().map(|v| v.id.as_str()))
        .await?;

    crate::metrics::HTTP_REQUESTS_TOTAL
        .with_label_values(&["GET", "/api/v1/videos", "200"])
        .inc();

    let message = if page.items.is_empty() {
        "no videos found"
    } else {
        "videos fetched successfully"
    };
    Ok(ApiResponse::ok(page, message))
}

/// POST /api/v1/videos/publish
async fn publish_video(
    State(state): State<AppState>,
    CurrentUser(viewer): CurrentUser,
    mut multipart: Multipart,
) -> Result<ApiResponse<Video>, AppError> {
    let mut title = String::new();
    let mut description = String::new();
    let mut video_file = None;
    let mut thumbnail = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("failed to parse multipart: {}", e)))?
    {
        let field_name = field.name().unwrap_or("").to_string();
        match field_name.as_str() {
            "title" => title = read_text(field).await?,
            "description" => description = read_text(field).await?,
            "videoFile" => {
                video_file = Some(stage_field(&mut field, MAX_VIDEO_UPLOAD_BYTES).await?)
            }
            "thumbnail" => {
                thumbnail = Some(stage_field(&mut field, MAX_IMAGE_UPLOAD_BYTES).await?)
            }
            _ => {}
        }
    }

    let (video_file, thumbnail) = match (video_file, thumbnail) {
        (Some(video_file), Some(thumbnail)) => (video_file, thumbnail),
        _ => return Err(AppError::Validation("required files missing".to_string())),
    };

    let video = video_service(&state)
        .publish(&viewer.id, &title, &description, video_file, thumbnail)
        .await?;

    Ok(ApiResponse::created(video, "video published successfully"))
}

/// GET /api/v1/videos/:videoId
///
/// Optional auth: owners may read their unpublished videos; non-owner
/// reads are counted.
async fn get_video(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(video_id): Path<String>,
) -> Result<ApiResponse<Video>, AppError> {
    let video = video_service(&state)
        .get(&video_id, viewer.as_ref())
        .await?;

    crate::metrics::HTTP_REQUESTS_TOTAL
        .with_label_values(&["GET", "/api/v1/videos/:videoId", "200"])
        .inc();

    Ok(ApiResponse::ok(video, "video fetched successfully"))
}

/// PATCH /api/v1/videos/:videoId
async fn update_video(
    State(state): State<AppState>,
    CurrentUser(viewer): CurrentUser,
    Path(video_id): Path<String>,
    mut multipart: Multipart,
) -> Result<ApiResponse<Video>, AppError> {
    let mut title = None;
    let mut description = None;
    let mut thumbnail = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("failed to parse multipart: {}", e)))?
    {
        let field_name = field.name().unwrap_or("").to_string();
        match field_name.as_str() {
            "title" => title = Some(read_text(field).await?),
            "description" => description = Some(read_text(field).await?),
            "thumbnail" => {
                thumbnail = Some(stage_field(&mut field, MAX_IMAGE_UPLOAD_BYTES).await?)
            }
            _ => {}
        }
    }

    let video = video_service(&state)
        .update(
            &video_id,
            &viewer.id,
            title.as_deref(),
            description.as_deref(),
            thumbnail,
        )
        .await?;

    Ok(ApiResponse::ok(video, "video details updated successfully"))
}

/// DELETE /api/v1/videos/:videoId
async fn delete_video(
    State(state): State<AppState>,
    CurrentUser(viewer): CurrentUser,
    Path(video_id): Path<String>,
) -> Result<ApiResponse<serde_json::Value>, AppError> {
    video_service(&state).delete(&video_id, &viewer.id).await?;

    Ok(ApiResponse::ok(
        serde_json::json!({}),
        "video successfully deleted",
    ))
}

/// PATCH /api/v1/videos/toggle/publish/:videoId
async fn toggle_publish(
    State(state): State<AppState>,
    CurrentUser(viewer): CurrentUser,
    Path(video_id): Path<String>,
) -> Result<ApiResponse<Video>, AppError> {
    let video = video_service(&state)
        .toggle_publish(&video_id, &viewer.id)
        .await?;

    Ok(ApiResponse::ok(
        video,
        "publish status toggled successfully",
    ))
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| AppError::Validation(format!("failed to read field: {}", e)))
}

/// Create video router
pub fn videos_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_videos))
        .route("/publish", post(publish_video))
        .route(
            "/:videoId",
            get(get_video).patch(update_video).delete(delete_video),
        )
        .route("/toggle/publish/:videoId", patch(toggle_publish))
}
