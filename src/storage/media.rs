//! Media storage using Cloudflare R2
//!
//! Handles upload, delete, and URL generation for media files.
//! Files are served via R2 Custom Domain (CDN). Uploads are staged to
//! local temp files by the handlers; this module reads the staged file,
//! derives video duration at ingest time, and pushes to the bucket.

use std::path::Path;

use aws_sdk_s3::Client as S3Client;

use crate::error::AppError;

/// What a media URL points at; drives the key prefix and, for deletes,
/// the log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Thumbnail,
    Avatar,
    CoverImage,
}

impl MediaKind {
    fn prefix(self) -> &'static str {
        match self {
            Self::Video => "videos",
            Self::Thumbnail => "thumbnails",
            Self::Avatar => "avatars",
            Self::CoverImage => "covers",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Thumbnail => "thumbnail",
            Self::Avatar => "avatar",
            Self::CoverImage => "cover image",
        }
    }
}

/// Result of a media upload
#[derive(Debug, Clone)]
pub struct StoredMedia {
    /// Public URL via Custom Domain
    pub url: String,
    /// Playback length, derived from MP4 metadata at ingest; None for
    /// images and for video containers the probe does not understand
    pub duration_seconds: Option<f64>,
}

/// Media storage service
///
/// Uploads media to Cloudflare R2 and returns public URLs.
pub struct MediaStorage {
    /// S3-compatible client for R2
    client: S3Client,
    /// Media bucket name
    bucket: String,
    /// Public URL base (Custom Domain)
    /// e.g., "https://media.example.com"
    public_url: String,
}

impl MediaStorage {
    /// Create new media storage client
    ///
    /// # Errors
    /// Returns error if S3 client initialization fails
    pub async fn new(
        config: &crate::config::MediaStorageConfig,
        cloudflare: &crate::config::CloudflareConfig,
    ) -> Result<Self, AppError> {
        use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};

        // R2 endpoint: https://{account_id}.r2.cloudflarestorage.com
        let endpoint = format!("https://{}.r2.cloudflarestorage.com", cloudflare.account_id);

        let credentials = Credentials::new(
            &cloudflare.r2_access_key_id,
            &cloudflare.r2_secret_access_key,
            None,
            None,
            "clipstream-r2",
        );

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("auto"))
            .endpoint_url(&endpoint)
            .credentials_provider(credentials)
            .http_client(super::build_r2_http_client())
            .build();

        let client = S3Client::from_conf(s3_config);

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            public_url: config.public_url.clone(),
        })
    }

    /// Upload a staged local file
    ///
    /// # Arguments
    /// * `local_path` - Staged temp file to read
    /// * `kind` - Determines the key prefix
    /// * `id` - Unique identifier for the object
    /// * `content_type` - MIME type as received from the client
    ///
    /// # Returns
    /// Public URL plus, for MP4 video, the probed duration
    pub async fn upload_file(
        &self,
        local_path: &Path,
        kind: MediaKind,
        id: &str,
        content_type: &str,
    ) -> Result<StoredMedia, AppError> {
        use aws_sdk_s3::primitives::ByteStream;

        let data = tokio::fs::read(local_path)
            .await
            .map_err(|e| AppError::Storage(format!("failed to read staged file: {}", e)))?;

        let duration_seconds = if kind == MediaKind::Video {
            probe_mp4_duration(&data)
        } else {
            None
        };

        let ext = extension_for_content_type(content_type);
        let key = format!("{}/{}.{}", kind.prefix(), id, ext);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .cache_control("public, max-age=31536000") // 1 year
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("R2 upload failed: {}", e)))?;

        crate::metrics::MEDIA_UPLOADS_TOTAL.inc();

        Ok(StoredMedia {
            url: self.get_public_url(&key),
            duration_seconds,
        })
    }

    /// Delete a media file by its object key
    pub async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("R2 delete failed: {}", e)))?;

        Ok(())
    }

    /// Delete a media file by its public URL
    ///
    /// Used by the best-effort orphan cleanup paths; a URL outside the
    /// configured public domain is reported as a storage error so the
    /// caller can log it.
    pub async fn delete_by_url(&self, url: &str, kind: MediaKind) -> Result<(), AppError> {
        let key = self.key_from_public_url(url).ok_or_else(|| {
            AppError::Storage(format!(
                "cannot derive object key for {} url: {}",
                kind.as_str(),
                url
            ))
        })?;
        self.delete(&key).await
    }

    /// Get public URL for an object key
    pub fn get_public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_url, key)
    }

    fn key_from_public_url(&self, url: &str) -> Option<String> {
        let base = self.public_url.trim_end_matches('/');
        url.strip_prefix(base)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|key| !key.is_empty())
            .map(ToOwned::to_owned)
    }
}

fn extension_for_content_type(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        _ => "bin",
    }
}

/// Derive playback duration from MP4 container metadata
///
/// Walks the top-level boxes for `moov`, then reads the `mvhd`
/// timescale/duration pair. Returns None for anything the walk does not
/// recognize rather than failing the upload.
fn probe_mp4_duration(data: &[u8]) -> Option<f64> {
    let moov = find_box(data, b"moov")?;
    let mvhd = find_box(moov, b"mvhd")?;

    let version = *mvhd.first()?;
    match version {
        0 => {
            // version, flags, ctime(4), mtime(4), timescale(4), duration(4)
            let timescale = read_u32(mvhd, 12)?;
            let duration = read_u32(mvhd, 16)? as u64;
            (timescale > 0).then(|| duration as f64 / timescale as f64)
        }
        1 => {
            // version, flags, ctime(8), mtime(8), timescale(4), duration(8)
            let timescale = read_u32(mvhd, 20)?;
            let duration = read_u64(mvhd, 24)?;
            (timescale > 0).then(|| duration as f64 / timescale as f64)
        }
        _ => None,
    }
}

/// Find a box by fourcc among the children of `data`, returning its
/// payload (bytes after the box header).
fn find_box<'a>(data: &'a [u8], fourcc: &[u8; 4]) -> Option<&'a [u8]> {
    let mut offset = 0usize;
    while offset + 8 <= data.len() {
        let declared = read_u32(data, offset)? as u64;
        let box_type = &data[offset + 4..offset + 8];

        let (header_len, box_len) = match declared {
            0 => (8u64, (data.len() - offset) as u64),
            1 => (16u64, read_u64(data, offset + 8)?),
            n => (8u64, n),
        };
        if box_len < header_len {
            return None;
        }

        let payload_start = offset.checked_add(header_len as usize)?;
        let payload_end = offset.checked_add(box_len as usize)?;
        if payload_end > data.len() || payload_start > payload_end {
            return None;
        }

        if box_type == fourcc {
            return Some(&data[payload_start..payload_end]);
        }

        offset = payload_end;
    }
    None
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes: [u8; 4] = data.get(offset..offset + 4)?.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

fn read_u64(data: &[u8], offset: usize) -> Option<u64> {
    let bytes: [u8; 8] = data.get(offset..offset + 8)?.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}
