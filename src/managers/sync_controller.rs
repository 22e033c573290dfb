//! Optimistic Sync Controller.
//!
//! Sequences every mutation as two phases: the local phase applies the next
//! state to the working collections immediately, the remote phase sends the
//! matching write to the store. A failed remote phase restores the local
//! state, from the pre-mutation snapshot or by refetching, so the working
//! copy never stays divergent from the store.
//!
//! Each mutating call ends in exactly one notification.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

use crate::gateway::RemoteStore;
use crate::managers::collection::ItemCollection;
use crate::managers::query::{self, BookmarkQuery};
use crate::managers::reorder::{self, MovePlan};
use crate::services::auth::SessionProvider;
use crate::services::metadata::MetadataSource;
use crate::types::bookmark::{
    Bookmark, BookmarkFolder, BookmarkPatch, DragEnd, MoveDescriptor, NewBookmark, ViewMode,
    DESCRIPTION_PLACEHOLDER,
};
use crate::types::errors::{GatewayError, ReorderError, SyncError};
use crate::types::notification::Notification;
use crate::types::settings::RollbackStrategy;

/// The kinds of mutation the controller performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    AddBookmark,
    RemoveBookmark,
    MoveBookmark,
    ReorderBookmarks,
    CreateFolder,
    ReorderFolders,
    SetViewMode,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::AddBookmark => "add_bookmark",
            Operation::RemoveBookmark => "remove_bookmark",
            Operation::MoveBookmark => "move_bookmark",
            Operation::ReorderBookmarks => "reorder_bookmarks",
            Operation::CreateFolder => "create_folder",
            Operation::ReorderFolders => "reorder_folders",
            Operation::SetViewMode => "set_view_mode",
        }
    }

    fn success_notice(&self) -> Notification {
        match self {
            Operation::AddBookmark => {
                Notification::success("Bookmark added", "Your bookmark has been successfully added.")
            }
            Operation::RemoveBookmark => {
                Notification::success("Bookmark deleted", "Your bookmark has been removed.")
            }
            Operation::MoveBookmark => {
                Notification::success("Bookmark moved", "Your bookmark has been moved.")
            }
            Operation::ReorderBookmarks => {
                Notification::success("Bookmarks reordered", "Your bookmark order has been saved.")
            }
            Operation::CreateFolder => {
                Notification::success("Folder created", "Your folder has been created successfully.")
            }
            Operation::ReorderFolders => {
                Notification::success("Folders reordered", "Your folder order has been saved.")
            }
            Operation::SetViewMode => {
                Notification::success("View updated", "Your view preference has been saved.")
            }
        }
    }

    fn failure_title(&self) -> &'static str {
        match self {
            Operation::AddBookmark => "Error adding bookmark",
            Operation::RemoveBookmark => "Error deleting bookmark",
            Operation::MoveBookmark => "Error moving bookmark",
            Operation::ReorderBookmarks => "Error updating bookmark order",
            Operation::CreateFolder => "Error creating folder",
            Operation::ReorderFolders => "Error updating folder order",
            Operation::SetViewMode => "Error updating view mode",
        }
    }
}

/// Where a mutation ended up.
///
/// `Applied` is the optimistic phase; every mutation that reaches it leaves
/// as `Confirmed` or `RolledBack`. `Rejected` mutations failed before any
/// local change was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "strategy")]
pub enum MutationState {
    Rejected,
    Applied,
    Confirmed,
    RolledBack(RollbackStrategy),
}

/// Outcome of one mutating call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationReport {
    pub operation: Operation,
    pub state: MutationState,
    /// Ids of the rows the mutation wrote.
    pub affected: Vec<String>,
}

/// Progress flags for the add-bookmark path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub is_loading: bool,
    pub fetching_metadata: bool,
}

struct Failure {
    error: SyncError,
    state: MutationState,
}

impl Failure {
    fn rejected(error: impl Into<SyncError>) -> Self {
        Self {
            error: error.into(),
            state: MutationState::Rejected,
        }
    }
}

/// Single owner of the working collections.
pub struct SyncController {
    store: Arc<dyn RemoteStore>,
    metadata: Arc<dyn MetadataSource>,
    sessions: Arc<dyn SessionProvider>,
    rollback: RollbackStrategy,
    bookmarks: ItemCollection<Bookmark>,
    folders: ItemCollection<BookmarkFolder>,
    view_mode: ViewMode,
    selected_folder: Option<String>,
    notifications: Vec<Notification>,
    last_mutation: Option<MutationReport>,
    status: watch::Sender<SyncStatus>,
}

impl SyncController {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        metadata: Arc<dyn MetadataSource>,
        sessions: Arc<dyn SessionProvider>,
        rollback: RollbackStrategy,
    ) -> Self {
        let (status, _) = watch::channel(SyncStatus::default());
        Self {
            store,
            metadata,
            sessions,
            rollback,
            bookmarks: ItemCollection::new(),
            folders: ItemCollection::new(),
            view_mode: ViewMode::default(),
            selected_folder: None,
            notifications: Vec::new(),
            last_mutation: None,
            status,
        }
    }

    // ─── Read side ───

    pub fn bookmarks(&self) -> &ItemCollection<Bookmark> {
        &self.bookmarks
    }

    pub fn folders(&self) -> &ItemCollection<BookmarkFolder> {
        &self.folders
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    pub fn rollback_strategy(&self) -> RollbackStrategy {
        self.rollback
    }

    pub fn selected_folder(&self) -> Option<&str> {
        self.selected_folder.as_deref()
    }

    /// Filtered, sorted bookmarks for display.
    pub fn query(&self, query: &BookmarkQuery) -> Vec<&Bookmark> {
        query::filter(self.bookmarks.items(), query)
    }

    pub fn status(&self) -> SyncStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.status().is_loading
    }

    pub fn is_fetching_metadata(&self) -> bool {
        self.status().fetching_metadata
    }

    /// The report of the most recent mutating call, including failed ones.
    pub fn last_mutation(&self) -> Option<&MutationReport> {
        self.last_mutation.as_ref()
    }

    /// Notifications not yet shown, oldest first.
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    /// Chooses the folder new bookmarks go into and the default listing filter.
    pub fn select_folder(&mut self, folder: Option<&str>) -> Result<(), SyncError> {
        if let Some(id) = folder {
            if !self.folders.contains(id) {
                return Err(ReorderError::UnknownFolder(id.to_string()).into());
            }
        }
        self.selected_folder = folder.map(str::to_string);
        Ok(())
    }

    /// Drops everything loaded for the current user: both collections, the
    /// folder selection, the view mode, the last report and any queued
    /// notifications.
    pub fn clear(&mut self) {
        self.bookmarks.load(Vec::new());
        self.folders.load(Vec::new());
        self.selected_folder = None;
        self.view_mode = ViewMode::default();
        self.last_mutation = None;
        self.notifications.clear();
        self.status.send_replace(SyncStatus::default());
        tracing::debug!("working state cleared");
    }

    // ─── Fetch ───

    /// Reloads folders, bookmarks and the view preference from the store.
    ///
    /// Each failing part is reported and leaves its local state untouched;
    /// the first error is returned.
    pub async fn refresh(&mut self) -> Result<(), SyncError> {
        let session = match self.sessions.require_session() {
            Ok(session) => session,
            Err(e) => {
                self.notify(Notification::error("Error fetching bookmarks", e.to_string()));
                return Err(e.into());
            }
        };
        let owner = session.user_id.as_str();
        let mut first_error: Option<SyncError> = None;

        match self.store.select_folders(owner).await {
            Ok(rows) => self.folders.load(rows),
            Err(e) => {
                self.notify(Notification::error("Error fetching folders", e.to_string()));
                first_error.get_or_insert(e.into());
            }
        }

        match self.store.select_bookmarks(owner).await {
            Ok(rows) => self.bookmarks.load(rows),
            Err(e) => {
                self.notify(Notification::error("Error fetching bookmarks", e.to_string()));
                first_error.get_or_insert(e.into());
            }
        }

        if let Err(e) = self.load_view_mode_for(owner).await {
            self.notify(Notification::error("Error fetching preferences", e.to_string()));
            first_error.get_or_insert(e.into());
        }

        if let Some(selected) = self.selected_folder.clone() {
            if !self.folders.contains(&selected) {
                self.selected_folder = None;
            }
        }

        tracing::info!(
            bookmarks = self.bookmarks.len(),
            folders = self.folders.len(),
            "collections refreshed"
        );
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Reads the stored view mode, creating the default row when absent.
    pub async fn load_view_mode(&mut self) -> Result<ViewMode, SyncError> {
        let session = self.sessions.require_session()?;
        if let Err(e) = self.load_view_mode_for(&session.user_id).await {
            self.notify(Notification::error("Error fetching preferences", e.to_string()));
            return Err(e.into());
        }
        Ok(self.view_mode)
    }

    async fn load_view_mode_for(&mut self, owner: &str) -> Result<(), GatewayError> {
        match self.store.get_view_mode(owner).await? {
            Some(mode) => self.view_mode = mode,
            None => {
                self.store.set_view_mode(owner, ViewMode::default()).await?;
                self.view_mode = ViewMode::default();
            }
        }
        Ok(())
    }

    // ─── Bookmarks ───

    /// Fetches metadata for `url` and stores it as a bookmark appended to
    /// `folder` (or the unfiled container).
    ///
    /// Session and metadata failures abort before any local change. The
    /// optimistic row carries a temporary `pending-` id until the store
    /// returns the canonical row.
    pub async fn add_bookmark(
        &mut self,
        url: &str,
        folder: Option<&str>,
    ) -> Result<MutationReport, SyncError> {
        self.status.send_modify(|s| s.is_loading = true);
        let result = self.try_add_bookmark(url, folder).await;
        self.status.send_replace(SyncStatus::default());
        self.finish(Operation::AddBookmark, result)
    }

    async fn try_add_bookmark(
        &mut self,
        url: &str,
        folder: Option<&str>,
    ) -> Result<(MutationState, Vec<String>), Failure> {
        let session = self.sessions.require_session().map_err(Failure::rejected)?;
        self.ensure_folder(folder).map_err(Failure::rejected)?;

        let url = url.trim();
        self.status.send_modify(|s| s.fetching_metadata = true);
        let fetched = self.metadata.fetch(url).await;
        self.status.send_modify(|s| s.fetching_metadata = false);
        let metadata = fetched.map_err(Failure::rejected)?;

        let new = NewBookmark {
            url: url.to_string(),
            title: metadata.title.unwrap_or_else(|| url.to_string()),
            description: metadata
                .description
                .unwrap_or_else(|| DESCRIPTION_PLACEHOLDER.to_string()),
            image_url: metadata.image_url,
            tags: metadata.publisher.into_iter().collect(),
            folder_id: folder.map(str::to_string),
            position: reorder::append_position(self.bookmarks.items(), folder),
        };

        let snapshot = self.bookmarks.snapshot();
        let pending_id = format!("pending-{}", Uuid::new_v4());
        let now = crate::gateway::now();
        self.bookmarks.push(Bookmark {
            id: pending_id.clone(),
            url: new.url.clone(),
            title: new.title.clone(),
            description: new.description.clone(),
            image_url: new.image_url.clone(),
            tags: new.tags.clone(),
            folder_id: new.folder_id.clone(),
            position: new.position,
            created_at: now,
            updated_at: now,
        });
        tracing::debug!(pending_id = %pending_id, position = new.position, "optimistic bookmark applied");

        match self.store.insert_bookmark(&session.user_id, &new).await {
            Ok(row) => {
                let id = row.id.clone();
                self.bookmarks.replace(&pending_id, row);
                Ok((MutationState::Confirmed, vec![id]))
            }
            Err(e) => Err(self.restore_bookmarks(snapshot, e.into()).await),
        }
    }

    /// Deletes one bookmark. Siblings keep their positions.
    pub async fn remove_bookmark(&mut self, id: &str) -> Result<MutationReport, SyncError> {
        let result = self.try_remove_bookmark(id).await;
        self.finish(Operation::RemoveBookmark, result)
    }

    async fn try_remove_bookmark(&mut self, id: &str) -> Result<(MutationState, Vec<String>), Failure> {
        if !self.bookmarks.contains(id) {
            return Err(Failure::rejected(ReorderError::ItemNotFound(id.to_string())));
        }

        let snapshot = self.bookmarks.snapshot();
        self.bookmarks.remove(id);

        let outcome = match self.sessions.require_session() {
            Ok(session) => self
                .store
                .delete_bookmark(&session.user_id, id)
                .await
                .map_err(SyncError::from),
            Err(e) => Err(e.into()),
        };

        match outcome {
            Ok(()) => Ok((MutationState::Confirmed, vec![id.to_string()])),
            Err(e) => Err(self.restore_bookmarks(snapshot, e).await),
        }
    }

    /// Places a bookmark at an index of a container, within its own
    /// container or across containers.
    pub async fn move_bookmark(&mut self, descriptor: &MoveDescriptor) -> Result<MutationReport, SyncError> {
        let result = self.try_move_bookmark(descriptor).await;
        self.finish(Operation::MoveBookmark, result)
    }

    async fn try_move_bookmark(
        &mut self,
        descriptor: &MoveDescriptor,
    ) -> Result<(MutationState, Vec<String>), Failure> {
        self.ensure_folder(descriptor.target_folder.as_deref())
            .map_err(Failure::rejected)?;
        let plan = reorder::apply_move(self.bookmarks.items(), descriptor).map_err(Failure::rejected)?;
        self.commit_bookmark_plan(plan).await
    }

    /// Reassigns a bookmark to `folder`, appending it there. Choosing the
    /// folder it is already in changes nothing.
    pub async fn move_to_folder(
        &mut self,
        id: &str,
        folder: Option<&str>,
    ) -> Result<MutationReport, SyncError> {
        let current = self.bookmarks.get(id).map(|b| b.folder_id.clone());
        let result = match current {
            None => Err(Failure::rejected(ReorderError::ItemNotFound(id.to_string()))),
            Some(current) if current.as_deref() == folder => Ok((MutationState::Confirmed, Vec::new())),
            Some(_) => {
                let descriptor = MoveDescriptor {
                    item_id: id.to_string(),
                    target_folder: folder.map(str::to_string),
                    target_index: usize::MAX,
                };
                self.try_move_bookmark(&descriptor).await
            }
        };
        self.finish(Operation::MoveBookmark, result)
    }

    /// Renumbers one container to follow `ordered_ids`.
    pub async fn reorder_bookmarks(
        &mut self,
        folder: Option<&str>,
        ordered_ids: &[String],
    ) -> Result<MutationReport, SyncError> {
        let result = match reorder::reorder_container(self.bookmarks.items(), folder, ordered_ids) {
            Ok(plan) => self.commit_bookmark_plan(plan).await,
            Err(e) => Err(Failure::rejected(e)),
        };
        self.finish(Operation::ReorderBookmarks, result)
    }

    /// Translates a drag-end event into a move.
    ///
    /// A drop outside any zone is a cancelled drag and returns `Ok(None)`
    /// without a notification.
    pub async fn handle_drag_end(&mut self, drag: &DragEnd) -> Result<Option<MutationReport>, SyncError> {
        let mut descriptor = match drag.to_move() {
            Some(descriptor) => descriptor,
            None => return Ok(None),
        };
        let operation = if drag.is_within_zone() {
            // The zone may list every folder; reordering never refiles.
            if let Some(current) = self.bookmarks.get(&drag.item_id) {
                descriptor.target_folder = current.folder_id.clone();
            }
            Operation::ReorderBookmarks
        } else {
            Operation::MoveBookmark
        };
        let result = self.try_move_bookmark(&descriptor).await;
        self.finish(operation, result).map(Some)
    }

    /// Local phase plus remote phase for a bookmark reorder plan.
    async fn commit_bookmark_plan(
        &mut self,
        plan: MovePlan<Bookmark>,
    ) -> Result<(MutationState, Vec<String>), Failure> {
        if plan.is_noop() {
            return Ok((MutationState::Confirmed, Vec::new()));
        }
        tracing::debug!(changed = ?plan.changed, "bookmark plan computed");

        let rows = plan.changed_rows();
        let snapshot = self.bookmarks.snapshot();
        self.bookmarks.load(plan.items);

        let outcome = match self.sessions.require_session() {
            Ok(session) => self
                .write_bookmark_rows(&session.user_id, &rows)
                .await
                .map_err(SyncError::from),
            Err(e) => Err(e.into()),
        };

        match outcome {
            Ok(stored) => {
                let ids = stored.iter().map(|b| b.id.clone()).collect();
                self.bookmarks.reconcile(stored);
                Ok((MutationState::Confirmed, ids))
            }
            Err(e) => Err(self.restore_bookmarks(snapshot, e).await),
        }
    }

    /// One row goes through update-by-id, several through bulk upsert.
    async fn write_bookmark_rows(&self, owner: &str, rows: &[Bookmark]) -> Result<Vec<Bookmark>, GatewayError> {
        match rows {
            [row] => {
                let stored = self
                    .store
                    .update_bookmark(owner, &row.id, &BookmarkPatch::placement_of(row))
                    .await?;
                Ok(vec![stored])
            }
            _ => self.store.upsert_bookmarks(owner, rows).await,
        }
    }

    // ─── Folders ───

    /// Creates a folder at the end of the sidebar.
    pub async fn create_folder(&mut self, name: &str) -> Result<MutationReport, SyncError> {
        let result = self.try_create_folder(name).await;
        self.finish(Operation::CreateFolder, result)
    }

    async fn try_create_folder(&mut self, name: &str) -> Result<(MutationState, Vec<String>), Failure> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Failure::rejected(SyncError::InvalidInput(
                "folder name cannot be empty".to_string(),
            )));
        }
        let session = self.sessions.require_session().map_err(Failure::rejected)?;
        let position = reorder::append_position(self.folders.items(), None);

        let folder = self
            .store
            .insert_folder(&session.user_id, name, position)
            .await
            .map_err(Failure::rejected)?;
        let id = folder.id.clone();
        self.folders.push(folder);
        Ok((MutationState::Confirmed, vec![id]))
    }

    /// Moves the folder at sidebar index `from` to index `to`.
    pub async fn reorder_folders(&mut self, from: usize, to: usize) -> Result<MutationReport, SyncError> {
        let result = self.try_reorder_folders(from, to).await;
        self.finish(Operation::ReorderFolders, result)
    }

    async fn try_reorder_folders(&mut self, from: usize, to: usize) -> Result<(MutationState, Vec<String>), Failure> {
        let plan = reorder::move_by_index(self.folders.items(), None, from, to).map_err(Failure::rejected)?;
        if plan.is_noop() {
            return Ok((MutationState::Confirmed, Vec::new()));
        }

        let rows = plan.changed_rows();
        let snapshot = self.folders.snapshot();
        self.folders.load(plan.items);

        let outcome = match self.sessions.require_session() {
            Ok(session) => self
                .store
                .upsert_folders(&session.user_id, &rows)
                .await
                .map_err(SyncError::from),
            Err(e) => Err(e.into()),
        };

        match outcome {
            Ok(stored) => {
                let ids = stored.iter().map(|f| f.id.clone()).collect();
                self.folders.reconcile(stored);
                Ok((MutationState::Confirmed, ids))
            }
            Err(e) => Err(self.restore_folders(snapshot, e).await),
        }
    }

    // ─── Preferences ───

    /// Stores the view mode; the local value changes once the store accepts it.
    pub async fn set_view_mode(&mut self, mode: ViewMode) -> Result<MutationReport, SyncError> {
        let result = self.try_set_view_mode(mode).await;
        self.finish(Operation::SetViewMode, result)
    }

    async fn try_set_view_mode(&mut self, mode: ViewMode) -> Result<(MutationState, Vec<String>), Failure> {
        let session = self.sessions.require_session().map_err(Failure::rejected)?;
        self.store
            .set_view_mode(&session.user_id, mode)
            .await
            .map_err(Failure::rejected)?;
        self.view_mode = mode;
        Ok((MutationState::Confirmed, Vec::new()))
    }

    // ─── Rollback and reporting ───

    fn ensure_folder(&self, folder: Option<&str>) -> Result<(), ReorderError> {
        match folder {
            Some(id) if !self.folders.contains(id) => Err(ReorderError::UnknownFolder(id.to_string())),
            _ => Ok(()),
        }
    }

    /// Undoes an applied bookmark change and wraps `error` as a failure.
    ///
    /// A refetch that fails falls back to the snapshot so the optimistic
    /// change is always fully undone.
    async fn restore_bookmarks(&mut self, snapshot: Vec<Bookmark>, error: SyncError) -> Failure {
        let strategy = match (self.rollback, self.sessions.current_session()) {
            (RollbackStrategy::Refetch, Some(session)) => {
                match self.store.select_bookmarks(&session.user_id).await {
                    Ok(rows) => {
                        self.bookmarks.load(rows);
                        RollbackStrategy::Refetch
                    }
                    Err(refetch_error) => {
                        tracing::error!(error = %refetch_error, "refetch after failed mutation failed, restoring snapshot");
                        self.bookmarks.load(snapshot);
                        RollbackStrategy::Snapshot
                    }
                }
            }
            _ => {
                self.bookmarks.load(snapshot);
                RollbackStrategy::Snapshot
            }
        };
        tracing::warn!(error = %error, strategy = ?strategy, "bookmark mutation rolled back");
        Failure {
            error,
            state: MutationState::RolledBack(strategy),
        }
    }

    async fn restore_folders(&mut self, snapshot: Vec<BookmarkFolder>, error: SyncError) -> Failure {
        let strategy = match (self.rollback, self.sessions.current_session()) {
            (RollbackStrategy::Refetch, Some(session)) => {
                match self.store.select_folders(&session.user_id).await {
                    Ok(rows) => {
                        self.folders.load(rows);
                        RollbackStrategy::Refetch
                    }
                    Err(refetch_error) => {
                        tracing::error!(error = %refetch_error, "refetch after failed mutation failed, restoring snapshot");
                        self.folders.load(snapshot);
                        RollbackStrategy::Snapshot
                    }
                }
            }
            _ => {
                self.folders.load(snapshot);
                RollbackStrategy::Snapshot
            }
        };
        tracing::warn!(error = %error, strategy = ?strategy, "folder mutation rolled back");
        Failure {
            error,
            state: MutationState::RolledBack(strategy),
        }
    }

    /// Records the report and emits the single notification for a call.
    fn finish(
        &mut self,
        operation: Operation,
        result: Result<(MutationState, Vec<String>), Failure>,
    ) -> Result<MutationReport, SyncError> {
        match result {
            Ok((state, affected)) => {
                tracing::info!(op = operation.name(), affected = affected.len(), "mutation confirmed");
                let report = MutationReport {
                    operation,
                    state,
                    affected,
                };
                self.last_mutation = Some(report.clone());
                self.notify(operation.success_notice());
                Ok(report)
            }
            Err(failure) => {
                tracing::warn!(op = operation.name(), state = ?failure.state, error = %failure.error, "mutation failed");
                self.last_mutation = Some(MutationReport {
                    operation,
                    state: failure.state,
                    affected: Vec::new(),
                });
                self.notify(Notification::error(operation.failure_title(), failure.error.to_string()));
                Err(failure.error)
            }
        }
    }

    fn notify(&mut self, notification: Notification) {
        tracing::debug!(
            level = ?notification.level,
            title = %notification.title,
            description = %notification.description,
            "notification queued"
        );
        self.notifications.push(notification);
    }
}
