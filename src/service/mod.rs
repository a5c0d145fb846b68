//! Service layer
//!
//! Contains business logic separated from HTTP handlers.
//! Services orchestrate database, token, and storage operations.

mod account;
mod video;

pub use account::{AccountService, LoginInput, NewUser, TokenPair};
pub use video::VideoService;

use std::sync::Arc;

use crate::storage::{MediaKind, MediaStorage};

/// A multipart upload staged to a local temp file
///
/// Dropping the value removes the temp file, so cleanup is guaranteed
/// on every exit path: success, validation failure, or upload failure.
pub struct StagedFile {
    pub file: tempfile::NamedTempFile,
    pub content_type: String,
}

/// Best-effort deletion of a media object that is no longer referenced
///
/// Detached from the request so the response never waits on the object
/// store; failures are logged and swallowed.
pub(crate) fn spawn_media_cleanup(storage: Arc<MediaStorage>, url: String, kind: MediaKind) {
    tokio::spawn(async move {
        if let Err(error) = storage.delete_by_url(&url, kind).await {
            tracing::warn!(
                %error,
                url = %url,
                kind = kind.as_str(),
                "failed to delete orphaned media"
            );
        }
    });
}
