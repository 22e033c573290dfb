//! Search and folder filtering over the bookmark working set.

use serde::{Deserialize, Serialize};

use crate::types::bookmark::Bookmark;

/// Which container the listing is restricted to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum FolderFilter {
    #[default]
    All,
    Unfiled,
    Folder(String),
}

impl FolderFilter {
    /// `Some(id)` selects a folder, `None` shows everything.
    pub fn from_selection(selected: Option<&str>) -> Self {
        match selected {
            Some(id) => FolderFilter::Folder(id.to_string()),
            None => FolderFilter::All,
        }
    }

    fn admits(&self, bookmark: &Bookmark) -> bool {
        match self {
            FolderFilter::All => true,
            FolderFilter::Unfiled => bookmark.folder_id.is_none(),
            FolderFilter::Folder(id) => bookmark.folder_id.as_deref() == Some(id.as_str()),
        }
    }
}

/// Listing order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Ascending position.
    #[default]
    Position,
    /// Newest first. Equal timestamps fall back to descending position,
    /// since appended entries always take the highest slot.
    RecentFirst,
}

/// A bookmark listing request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkQuery {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub folder: FolderFilter,
    #[serde(default)]
    pub order: SortOrder,
}

/// Case-insensitive substring match over title, description and tags.
/// An empty needle matches everything.
pub fn matches_text(bookmark: &Bookmark, text: &str) -> bool {
    let needle = text.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }
    bookmark.title.to_lowercase().contains(&needle)
        || bookmark.description.to_lowercase().contains(&needle)
        || bookmark
            .tags
            .iter()
            .any(|tag| tag.to_lowercase().contains(&needle))
}

/// Applies the folder filter and the text filter together, then sorts.
pub fn filter<'a>(items: &'a [Bookmark], query: &BookmarkQuery) -> Vec<&'a Bookmark> {
    let mut results: Vec<&Bookmark> = items
        .iter()
        .filter(|b| query.folder.admits(b) && matches_text(b, &query.text))
        .collect();

    match query.order {
        SortOrder::Position => {
            results.sort_by(|a, b| a.position.cmp(&b.position).then(a.created_at.cmp(&b.created_at)))
        }
        SortOrder::RecentFirst => {
            results.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.position.cmp(&a.position)))
        }
    }
    results
}
