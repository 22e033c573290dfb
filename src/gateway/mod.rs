//! Remote store gateways.
//!
//! The [`RemoteStore`] trait is the request/response boundary to the
//! authoritative copy of a user's bookmarks, folders and preferences. Every
//! row is owned by a user id and callers pass the owner explicitly.

pub mod rest_store;
pub mod sqlite_store;

use async_trait::async_trait;

use crate::types::bookmark::{Bookmark, BookmarkFolder, BookmarkPatch, NewBookmark, ViewMode};
use crate::types::errors::GatewayError;

pub use rest_store::RestStore;
pub use sqlite_store::SqliteStore;

/// Row-level access to the authoritative store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// All bookmarks of `owner`, ascending by position.
    async fn select_bookmarks(&self, owner: &str) -> Result<Vec<Bookmark>, GatewayError>;

    /// Inserts one bookmark and returns the stored row.
    async fn insert_bookmark(&self, owner: &str, new: &NewBookmark) -> Result<Bookmark, GatewayError>;

    async fn delete_bookmark(&self, owner: &str, id: &str) -> Result<(), GatewayError>;

    /// Applies `patch` to one bookmark and returns the stored row.
    async fn update_bookmark(
        &self,
        owner: &str,
        id: &str,
        patch: &BookmarkPatch,
    ) -> Result<Bookmark, GatewayError>;

    /// Writes every row by id in one request and returns the stored rows.
    async fn upsert_bookmarks(&self, owner: &str, rows: &[Bookmark]) -> Result<Vec<Bookmark>, GatewayError>;

    /// All folders of `owner`, ascending by position.
    async fn select_folders(&self, owner: &str) -> Result<Vec<BookmarkFolder>, GatewayError>;

    async fn insert_folder(
        &self,
        owner: &str,
        name: &str,
        position: i32,
    ) -> Result<BookmarkFolder, GatewayError>;

    async fn upsert_folders(
        &self,
        owner: &str,
        rows: &[BookmarkFolder],
    ) -> Result<Vec<BookmarkFolder>, GatewayError>;

    /// The stored view mode, or `None` when the user has no preferences row.
    async fn get_view_mode(&self, owner: &str) -> Result<Option<ViewMode>, GatewayError>;

    async fn set_view_mode(&self, owner: &str, mode: ViewMode) -> Result<(), GatewayError>;
}

/// Current UNIX timestamp in seconds.
pub(crate) fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Applies the description placeholder to a stored value.
pub(crate) fn description_or_placeholder(description: Option<String>) -> String {
    match description {
        Some(d) if !d.trim().is_empty() => d,
        _ => crate::types::bookmark::DESCRIPTION_PLACEHOLDER.to_string(),
    }
}
