//! Listing pipeline construction
//!
//! A video listing is described as an ordered list of tagged stages,
//! built by pure functions from request parameters and the viewer
//! identity, then translated to SQL by the database layer. Keeping the
//! construction pure makes each stage independently testable and keeps
//! conditional query assembly out of the handlers.

use serde::Deserialize;

use super::models::EntityId;
use crate::error::AppError;

/// Default page size when the caller does not specify one
pub const DEFAULT_PAGE_SIZE: u32 = 10;
/// Upper bound on the page size a caller may request
pub const MAX_PAGE_SIZE: u32 = 100;

/// Sortable video columns
///
/// The whitelist doubles as the column mapping for the SQL translation;
/// unknown fields are rejected before any query is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    Views,
    Duration,
    Title,
}

impl SortField {
    /// Column name for the SQL translation
    pub(crate) fn column(self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::Views => "views",
            Self::Duration => "duration_seconds",
            Self::Title => "title",
        }
    }

    fn parse(raw: &str) -> Result<Self, AppError> {
        match raw {
            "createdAt" | "created_at" => Ok(Self::CreatedAt),
            "views" => Ok(Self::Views),
            "duration" | "duration_seconds" => Ok(Self::Duration),
            "title" => Ok(Self::Title),
            other => Err(AppError::Validation(format!(
                "unsupported sort field: {}",
                other
            ))),
        }
    }
}

/// Sort direction; ascending unless the caller asks for "desc"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub(crate) fn sql(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

/// One stage of a video listing
#[derive(Debug, Clone, PartialEq)]
pub enum ListStage {
    /// Exact match on the owning user
    FilterOwner(String),
    /// Restrict to published videos
    FilterPublished,
    /// Case-insensitive substring search over title OR description
    Search(String),
    /// Ordering; exactly one per listing
    Sort {
        field: SortField,
        direction: SortDirection,
    },
    /// Page slice; exactly one per listing, always last
    Paginate { page: u32, per_page: u32 },
}

/// Raw listing parameters as they arrive on the query string
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub query: Option<String>,
    pub sort_by: Option<String>,
    pub sort_type: Option<String>,
    pub user_id: Option<String>,
}

/// Build the listing pipeline for a video query
///
/// Stage order is fixed: owner filter, visibility filter, text search,
/// sort, pagination. The visibility filter is skipped when the resolved
/// viewer is the owner the listing is filtered to, so owners always see
/// their own unpublished videos.
///
/// # Errors
/// `InvalidIdentifier` if the owner filter is not a well-formed id,
/// `Validation` for unknown sort fields or out-of-range pagination.
pub fn build_video_listing(
    params: &ListParams,
    viewer_id: Option<&str>,
) -> Result<Vec<ListStage>, AppError> {
    let mut stages = Vec::new();

    let owner_filter = params
        .user_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    if let Some(owner_id) = owner_filter {
        if !EntityId::is_valid(owner_id) {
            return Err(AppError::InvalidIdentifier);
        }
        stages.push(ListStage::FilterOwner(owner_id.to_string()));
    }

    let viewer_is_owner = matches!((viewer_id, owner_filter), (Some(v), Some(o)) if v == o);
    if !viewer_is_owner {
        stages.push(ListStage::FilterPublished);
    }

    if let Some(query) = params.query.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        stages.push(ListStage::Search(query.to_string()));
    }

    let sort = match params.sort_by.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => {
            let field = SortField::parse(raw)?;
            let direction = match params.sort_type.as_deref() {
                Some("desc") => SortDirection::Descending,
                _ => SortDirection::Ascending,
            };
            ListStage::Sort { field, direction }
        }
        // newest first when the caller does not specify
        None => ListStage::Sort {
            field: SortField::CreatedAt,
            direction: SortDirection::Descending,
        },
    };
    stages.push(sort);

    let page = params.page.unwrap_or(1);
    if page < 1 {
        return Err(AppError::Validation("page must be at least 1".to_string()));
    }

    let per_page = params.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    if per_page < 1 {
        return Err(AppError::Validation(
            "page size must be at least 1".to_string(),
        ));
    }
    let per_page = per_page.min(MAX_PAGE_SIZE);

    stages.push(ListStage::Paginate { page, per_page });

    Ok(stages)
}
