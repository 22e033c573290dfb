use serde::{Deserialize, Serialize};

/// Shown in place of a missing or empty bookmark description.
pub const DESCRIPTION_PLACEHOLDER: &str = "No description available";

/// Drop zone id the UI uses for the unfiled container.
pub const UNFILED_DROP_ZONE: &str = "main";

/// Represents a saved bookmark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: String,
    pub url: String,
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub tags: Vec<String>,
    pub folder_id: Option<String>,
    pub position: i32,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Represents a folder for organizing bookmarks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkFolder {
    pub id: String,
    pub name: String,
    pub position: i32,
    pub created_at: i64,
}

/// Insert payload for a bookmark. The store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBookmark {
    pub url: String,
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub tags: Vec<String>,
    pub folder_id: Option<String>,
    pub position: i32,
}

/// Field subset for update-by-id. `None` leaves a field untouched; the
/// nested options on nullable columns distinguish "keep" from "set null".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkPatch {
    pub url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub folder_id: Option<Option<String>>,
    pub position: Option<i32>,
}

impl BookmarkPatch {
    /// Patch carrying the ordering fields of `bookmark`.
    pub fn placement_of(bookmark: &Bookmark) -> Self {
        Self {
            folder_id: Some(bookmark.folder_id.clone()),
            position: Some(bookmark.position),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// How bookmarks are laid out in the main view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Grid,
    List,
}

impl ViewMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewMode::Grid => "grid",
            ViewMode::List => "list",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "grid" => Some(ViewMode::Grid),
            "list" => Some(ViewMode::List),
            _ => None,
        }
    }
}

/// A request to place one bookmark at `target_index` of a container.
///
/// `target_folder == None` addresses the unfiled container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveDescriptor {
    pub item_id: String,
    pub target_folder: Option<String>,
    pub target_index: usize,
}

/// Raw drag-end event as reported by the drag-and-drop layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DragEnd {
    pub item_id: String,
    pub source: String,
    /// `None` when the drag was dropped outside any zone.
    pub destination: Option<String>,
    pub index: usize,
}

impl DragEnd {
    /// Maps a drop zone id onto a container reference.
    pub fn zone_to_folder(zone: &str) -> Option<String> {
        if zone == UNFILED_DROP_ZONE {
            None
        } else {
            Some(zone.to_string())
        }
    }

    /// Whether the drag was dropped back into the zone it started in.
    pub fn is_within_zone(&self) -> bool {
        self.destination.as_deref() == Some(self.source.as_str())
    }

    /// The move this drag requests, or `None` for a cancelled drag.
    ///
    /// The target is the destination zone's container. A drop within the
    /// starting zone is a reorder; callers keep the item's own container
    /// for it, since a zone can list items from several containers.
    pub fn to_move(&self) -> Option<MoveDescriptor> {
        let destination = self.destination.as_deref()?;
        Some(MoveDescriptor {
            item_id: self.item_id.clone(),
            target_folder: Self::zone_to_folder(destination),
            target_index: self.index,
        })
    }
}

/// Metadata scraped for a URL by the metadata service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub publisher: Option<String>,
}
