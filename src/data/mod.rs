//! Data layer module
//!
//! Handles all data persistence:
//! - SQLite database operations
//! - Listing pipeline construction and execution

mod database;
mod models;
pub mod pipeline;

pub use database::Database;
pub use models::*;
pub use pipeline::{build_video_listing, ListParams, ListStage, SortDirection, SortField};
