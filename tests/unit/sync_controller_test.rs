//! Unit tests for the optimistic sync controller.
//!
//! Runs against the in-memory SQLite store, wrapped so tests can inject
//! failures, hold writes open, and see which store calls were made.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use markshelf::gateway::{RemoteStore, SqliteStore};
use markshelf::managers::query::{BookmarkQuery, SortOrder};
use markshelf::managers::reorder::{container_order, is_contiguous};
use markshelf::managers::sync_controller::{MutationState, Operation, SyncController};
use markshelf::services::auth::SessionStore;
use markshelf::services::metadata::MetadataSource;
use markshelf::types::bookmark::{
    Bookmark, BookmarkFolder, BookmarkPatch, DragEnd, LinkMetadata, MoveDescriptor, NewBookmark,
    ViewMode, DESCRIPTION_PLACEHOLDER,
};
use markshelf::types::errors::{AuthError, GatewayError, MetadataError, ReorderError, SyncError};
use markshelf::types::notification::NotificationLevel;
use markshelf::types::session::Session;
use markshelf::types::settings::RollbackStrategy;

const OWNER: &str = "user-1";

// ─── Test doubles ───

/// SQLite store with failure switches, a write gate and a call log.
#[derive(Default)]
struct TestStore {
    inner: Option<SqliteStore>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    gated: AtomicBool,
    gate: Notify,
    calls: Mutex<Vec<&'static str>>,
}

impl TestStore {
    fn new() -> Self {
        Self {
            inner: Some(SqliteStore::open_in_memory().unwrap()),
            ..Self::default()
        }
    }

    fn inner(&self) -> &SqliteStore {
        self.inner.as_ref().unwrap()
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn open_gate(&self) {
        self.gate.notify_one();
    }

    async fn write(&self, name: &'static str) -> Result<(), GatewayError> {
        self.calls.lock().unwrap().push(name);
        if self.gated.load(Ordering::SeqCst) {
            self.gate.notified().await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(GatewayError::Network("injected write failure".to_string()));
        }
        Ok(())
    }

    fn read(&self, name: &'static str) -> Result<(), GatewayError> {
        self.calls.lock().unwrap().push(name);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(GatewayError::Network("injected read failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for TestStore {
    async fn select_bookmarks(&self, owner: &str) -> Result<Vec<Bookmark>, GatewayError> {
        self.read("select_bookmarks")?;
        self.inner().select_bookmarks(owner).await
    }

    async fn insert_bookmark(&self, owner: &str, new: &NewBookmark) -> Result<Bookmark, GatewayError> {
        self.write("insert_bookmark").await?;
        self.inner().insert_bookmark(owner, new).await
    }

    async fn delete_bookmark(&self, owner: &str, id: &str) -> Result<(), GatewayError> {
        self.write("delete_bookmark").await?;
        self.inner().delete_bookmark(owner, id).await
    }

    async fn update_bookmark(&self, owner: &str, id: &str, patch: &BookmarkPatch) -> Result<Bookmark, GatewayError> {
        self.write("update_bookmark").await?;
        self.inner().update_bookmark(owner, id, patch).await
    }

    async fn upsert_bookmarks(&self, owner: &str, rows: &[Bookmark]) -> Result<Vec<Bookmark>, GatewayError> {
        self.write("upsert_bookmarks").await?;
        self.inner().upsert_bookmarks(owner, rows).await
    }

    async fn select_folders(&self, owner: &str) -> Result<Vec<BookmarkFolder>, GatewayError> {
        self.read("select_folders")?;
        self.inner().select_folders(owner).await
    }

    async fn insert_folder(&self, owner: &str, name: &str, position: i32) -> Result<BookmarkFolder, GatewayError> {
        self.write("insert_folder").await?;
        self.inner().insert_folder(owner, name, position).await
    }

    async fn upsert_folders(&self, owner: &str, rows: &[BookmarkFolder]) -> Result<Vec<BookmarkFolder>, GatewayError> {
        self.write("upsert_folders").await?;
        self.inner().upsert_folders(owner, rows).await
    }

    async fn get_view_mode(&self, owner: &str) -> Result<Option<ViewMode>, GatewayError> {
        self.read("get_view_mode")?;
        self.inner().get_view_mode(owner).await
    }

    async fn set_view_mode(&self, owner: &str, mode: ViewMode) -> Result<(), GatewayError> {
        self.write("set_view_mode").await?;
        self.inner().set_view_mode(owner, mode).await
    }
}

struct StubMetadata {
    result: Result<LinkMetadata, MetadataError>,
    calls: AtomicUsize,
}

impl StubMetadata {
    fn returning(result: Result<LinkMetadata, MetadataError>) -> Self {
        Self {
            result,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl MetadataSource for StubMetadata {
    async fn fetch(&self, _url: &str) -> Result<LinkMetadata, MetadataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

fn example_metadata() -> LinkMetadata {
    LinkMetadata {
        title: Some("Example Domain".to_string()),
        description: None,
        image_url: Some("https://example.com/og.png".to_string()),
        publisher: Some("example".to_string()),
    }
}

// ─── Harness ───

struct Harness {
    store: Arc<TestStore>,
    sessions: Arc<SessionStore>,
    metadata: Arc<StubMetadata>,
    controller: SyncController,
}

fn harness_with(rollback: RollbackStrategy, metadata: StubMetadata) -> Harness {
    let store = Arc::new(TestStore::new());
    let sessions = Arc::new(SessionStore::signed_in(Session {
        user_id: OWNER.to_string(),
        access_token: "token".to_string(),
    }));
    let metadata = Arc::new(metadata);
    let controller = SyncController::new(store.clone(), metadata.clone(), sessions.clone(), rollback);
    Harness {
        store,
        sessions,
        metadata,
        controller,
    }
}

fn harness() -> Harness {
    harness_with(RollbackStrategy::Snapshot, StubMetadata::returning(Ok(example_metadata())))
}

impl Harness {
    async fn folder(&self, name: &str, position: i32) -> BookmarkFolder {
        self.store.inner().insert_folder(OWNER, name, position).await.unwrap()
    }

    async fn bookmark(&self, url: &str, folder: Option<&str>, position: i32) -> Bookmark {
        let new = NewBookmark {
            url: url.to_string(),
            title: url.to_string(),
            description: "seeded".to_string(),
            image_url: None,
            tags: Vec::new(),
            folder_id: folder.map(str::to_string),
            position,
        };
        self.store.inner().insert_bookmark(OWNER, &new).await.unwrap()
    }

    /// Loads the store into the controller and forgets setup side effects.
    async fn sync(&mut self) {
        self.controller.refresh().await.unwrap();
        self.controller.drain_notifications();
        self.store.clear_calls();
    }

    async fn stored(&self) -> Vec<Bookmark> {
        self.store.inner().select_bookmarks(OWNER).await.unwrap()
    }

    fn freeze_updates(&self) {
        self.store
            .inner()
            .database()
            .connection()
            .execute_batch(
                "CREATE TRIGGER freeze_updates BEFORE UPDATE ON bookmarks BEGIN SELECT RAISE(ABORT, 'frozen'); END;",
            )
            .unwrap();
    }
}

fn order(items: &[Bookmark], folder: Option<&str>) -> Vec<String> {
    container_order(items, folder)
        .into_iter()
        .map(|i| items[i].id.clone())
        .collect()
}

fn sorted(mut items: Vec<Bookmark>) -> Vec<Bookmark> {
    items.sort_by(|a, b| a.id.cmp(&b.id));
    items
}

// ─── Moves ───

#[tokio::test]
async fn test_move_last_to_front_within_folder() {
    let mut h = harness();
    let a = h.folder("A", 0).await;
    let x = h.bookmark("https://x.example", Some(&a.id), 0).await;
    let y = h.bookmark("https://y.example", Some(&a.id), 1).await;
    let z = h.bookmark("https://z.example", Some(&a.id), 2).await;
    h.sync().await;

    let report = h
        .controller
        .move_bookmark(&MoveDescriptor {
            item_id: z.id.clone(),
            target_folder: Some(a.id.clone()),
            target_index: 0,
        })
        .await
        .unwrap();

    assert_eq!(report.state, MutationState::Confirmed);
    assert_eq!(report.operation, Operation::MoveBookmark);
    assert_eq!(order(h.controller.bookmarks().items(), Some(&a.id)), vec![z.id.clone(), x.id.clone(), y.id.clone()]);
    assert_eq!(order(&h.stored().await, Some(&a.id)), vec![z.id, x.id, y.id]);
    assert!(is_contiguous(h.controller.bookmarks().items()));
    assert_eq!(h.store.calls(), vec!["upsert_bookmarks"]);

    let notes = h.controller.drain_notifications();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title, "Bookmark moved");
}

#[tokio::test]
async fn test_move_into_empty_folder_uses_single_update() {
    let mut h = harness();
    let a = h.folder("A", 0).await;
    let b = h.folder("B", 1).await;
    let x = h.bookmark("https://x.example", Some(&a.id), 0).await;
    h.sync().await;

    h.controller
        .move_bookmark(&MoveDescriptor {
            item_id: x.id.clone(),
            target_folder: Some(b.id.clone()),
            target_index: 0,
        })
        .await
        .unwrap();

    let moved = h.controller.bookmarks().get(&x.id).unwrap();
    assert_eq!(moved.folder_id.as_deref(), Some(b.id.as_str()));
    assert_eq!(moved.position, 0);
    assert!(h.controller.bookmarks().in_container(Some(&a.id)).is_empty());
    assert_eq!(h.store.calls(), vec!["update_bookmark"]);
    assert_eq!(h.stored().await[0].folder_id.as_deref(), Some(b.id.as_str()));
}

#[tokio::test]
async fn test_cross_move_renumbers_source_folder() {
    let mut h = harness();
    let a = h.folder("A", 0).await;
    let b = h.folder("B", 1).await;
    let x = h.bookmark("https://x.example", Some(&a.id), 0).await;
    let y = h.bookmark("https://y.example", Some(&a.id), 1).await;
    h.bookmark("https://p.example", Some(&b.id), 0).await;
    h.sync().await;

    h.controller
        .move_bookmark(&MoveDescriptor {
            item_id: x.id.clone(),
            target_folder: Some(b.id.clone()),
            target_index: 99,
        })
        .await
        .unwrap();

    let stored = h.stored().await;
    assert!(is_contiguous(&stored));
    assert_eq!(stored.iter().find(|r| r.id == y.id).unwrap().position, 0);
    assert_eq!(stored.iter().find(|r| r.id == x.id).unwrap().position, 1);
    assert_eq!(sorted(stored), sorted(h.controller.bookmarks().snapshot()));
}

#[tokio::test]
async fn test_noop_move_skips_store() {
    let mut h = harness();
    let x = h.bookmark("https://x.example", None, 0).await;
    h.bookmark("https://y.example", None, 1).await;
    h.sync().await;
    let before = h.controller.bookmarks().snapshot();

    let report = h
        .controller
        .move_bookmark(&MoveDescriptor {
            item_id: x.id.clone(),
            target_folder: None,
            target_index: 0,
        })
        .await
        .unwrap();

    assert_eq!(report.state, MutationState::Confirmed);
    assert!(report.affected.is_empty());
    assert!(h.store.calls().is_empty());
    assert_eq!(h.controller.bookmarks().snapshot(), before);
    assert_eq!(h.controller.drain_notifications().len(), 1);
}

#[tokio::test]
async fn test_failed_move_restores_snapshot() {
    let mut h = harness();
    let a = h.folder("A", 0).await;
    h.bookmark("https://x.example", Some(&a.id), 0).await;
    h.bookmark("https://y.example", Some(&a.id), 1).await;
    let z = h.bookmark("https://z.example", Some(&a.id), 2).await;
    h.sync().await;
    let before = h.controller.bookmarks().snapshot();
    h.freeze_updates();

    let result = h
        .controller
        .move_bookmark(&MoveDescriptor {
            item_id: z.id.clone(),
            target_folder: Some(a.id.clone()),
            target_index: 0,
        })
        .await;

    assert_eq!(
        result.unwrap_err(),
        SyncError::Gateway(GatewayError::Constraint("frozen".to_string()))
    );
    assert_eq!(h.controller.bookmarks().snapshot(), before);
    assert_eq!(
        h.controller.last_mutation().unwrap().state,
        MutationState::RolledBack(RollbackStrategy::Snapshot)
    );

    let notes = h.controller.drain_notifications();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].level, NotificationLevel::Error);
    assert_eq!(notes[0].title, "Error moving bookmark");
    assert_eq!(notes[0].description, "Constraint violation: frozen");
}

#[tokio::test]
async fn test_failed_move_refetches_when_configured() {
    let mut h = harness_with(RollbackStrategy::Refetch, StubMetadata::returning(Ok(example_metadata())));
    let x = h.bookmark("https://x.example", None, 0).await;
    h.bookmark("https://y.example", None, 1).await;
    h.sync().await;

    // Another client wrote behind our back; only a refetch can see it.
    h.bookmark("https://late.example", None, 2).await;
    h.store.fail_writes.store(true, Ordering::SeqCst);

    let result = h
        .controller
        .move_bookmark(&MoveDescriptor {
            item_id: x.id.clone(),
            target_folder: None,
            target_index: 1,
        })
        .await;

    assert!(matches!(result, Err(SyncError::Gateway(GatewayError::Network(_)))));
    assert_eq!(
        h.controller.last_mutation().unwrap().state,
        MutationState::RolledBack(RollbackStrategy::Refetch)
    );
    assert_eq!(sorted(h.controller.bookmarks().snapshot()), sorted(h.stored().await));
    assert_eq!(h.controller.bookmarks().len(), 3);
}

#[tokio::test]
async fn test_failed_refetch_falls_back_to_snapshot() {
    let mut h = harness_with(RollbackStrategy::Refetch, StubMetadata::returning(Ok(example_metadata())));
    let x = h.bookmark("https://x.example", None, 0).await;
    h.bookmark("https://y.example", None, 1).await;
    h.sync().await;
    let before = h.controller.bookmarks().snapshot();
    h.store.fail_writes.store(true, Ordering::SeqCst);
    h.store.fail_reads.store(true, Ordering::SeqCst);

    let result = h
        .controller
        .move_bookmark(&MoveDescriptor {
            item_id: x.id,
            target_folder: None,
            target_index: 1,
        })
        .await;

    assert!(result.is_err());
    assert_eq!(h.controller.bookmarks().snapshot(), before);
    assert_eq!(
        h.controller.last_mutation().unwrap().state,
        MutationState::RolledBack(RollbackStrategy::Snapshot)
    );
    assert_eq!(h.controller.drain_notifications().len(), 1);
}

#[tokio::test]
async fn test_move_without_session_rolls_back() {
    let mut h = harness();
    let x = h.bookmark("https://x.example", None, 0).await;
    h.bookmark("https://y.example", None, 1).await;
    h.sync().await;
    let before = h.controller.bookmarks().snapshot();
    h.sessions.sign_out();

    let result = h
        .controller
        .move_bookmark(&MoveDescriptor {
            item_id: x.id,
            target_folder: None,
            target_index: 1,
        })
        .await;

    assert_eq!(result.unwrap_err(), SyncError::Auth(AuthError::NoSession));
    assert_eq!(h.controller.bookmarks().snapshot(), before);
    assert!(h.store.calls().is_empty());
    let notes = h.controller.drain_notifications();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].description, "You must be logged in to do that");
}

#[tokio::test]
async fn test_move_to_unknown_folder_is_rejected() {
    let mut h = harness();
    let x = h.bookmark("https://x.example", None, 0).await;
    h.sync().await;

    let result = h
        .controller
        .move_bookmark(&MoveDescriptor {
            item_id: x.id,
            target_folder: Some("ghost".to_string()),
            target_index: 0,
        })
        .await;

    assert_eq!(
        result.unwrap_err(),
        SyncError::Reorder(ReorderError::UnknownFolder("ghost".to_string()))
    );
    assert_eq!(h.controller.last_mutation().unwrap().state, MutationState::Rejected);
    assert_eq!(h.controller.drain_notifications().len(), 1);
}

#[tokio::test]
async fn test_optimistic_order_visible_before_store_answers() {
    let mut h = harness();
    let x = h.bookmark("https://x.example", None, 0).await;
    let y = h.bookmark("https://y.example", None, 1).await;
    h.sync().await;
    h.store.gated.store(true, Ordering::SeqCst);

    let mut rx = h.controller.bookmarks().subscribe();
    let store = h.store.clone();
    let observer = async move {
        rx.changed().await.unwrap();
        let seen = order(&rx.borrow_and_update(), None);
        let calls_while_pending = store.calls();
        store.open_gate();
        (seen, calls_while_pending)
    };

    let descriptor = MoveDescriptor {
        item_id: y.id.clone(),
        target_folder: None,
        target_index: 0,
    };
    let (result, (seen, calls_while_pending)) = tokio::join!(h.controller.move_bookmark(&descriptor), observer);

    assert_eq!(seen, vec![y.id.clone(), x.id.clone()]);
    assert_eq!(calls_while_pending, vec!["upsert_bookmarks"]);
    assert_eq!(result.unwrap().state, MutationState::Confirmed);
    assert_eq!(order(&h.stored().await, None), vec![y.id, x.id]);
}

#[tokio::test]
async fn test_move_sequence_keeps_every_container_contiguous() {
    let mut h = harness();
    let a = h.folder("A", 0).await;
    let b = h.folder("B", 1).await;
    let mut ids = Vec::new();
    for i in 0..3 {
        ids.push(h.bookmark(&format!("https://a{}.example", i), Some(&a.id), i).await.id);
        ids.push(h.bookmark(&format!("https://u{}.example", i), None, i).await.id);
    }
    h.sync().await;

    let targets = [Some(b.id.clone()), None, Some(a.id.clone()), Some(b.id.clone()), None];
    for (step, target) in targets.iter().enumerate() {
        h.controller
            .move_bookmark(&MoveDescriptor {
                item_id: ids[step].clone(),
                target_folder: target.clone(),
                target_index: step,
            })
            .await
            .unwrap();
        assert!(is_contiguous(h.controller.bookmarks().items()));
    }
    assert_eq!(sorted(h.controller.bookmarks().snapshot()), sorted(h.stored().await));
    assert_eq!(h.controller.drain_notifications().len(), targets.len());
}

// ─── Folder selector, reorder, drag ───

#[tokio::test]
async fn test_move_to_folder_appends() {
    let mut h = harness();
    let a = h.folder("A", 0).await;
    h.bookmark("https://p.example", Some(&a.id), 0).await;
    let x = h.bookmark("https://x.example", None, 0).await;
    h.sync().await;

    h.controller.move_to_folder(&x.id, Some(&a.id)).await.unwrap();
    let moved = h.controller.bookmarks().get(&x.id).unwrap();
    assert_eq!(moved.folder_id.as_deref(), Some(a.id.as_str()));
    assert_eq!(moved.position, 1);
}

#[tokio::test]
async fn test_move_to_current_folder_changes_nothing() {
    let mut h = harness();
    let x = h.bookmark("https://x.example", None, 0).await;
    h.bookmark("https://y.example", None, 1).await;
    h.sync().await;

    let report = h.controller.move_to_folder(&x.id, None).await.unwrap();
    assert!(report.affected.is_empty());
    assert!(h.store.calls().is_empty());
    assert_eq!(h.controller.bookmarks().get(&x.id).unwrap().position, 0);
}

#[tokio::test]
async fn test_reorder_bookmarks_by_ids() {
    let mut h = harness();
    let x = h.bookmark("https://x.example", None, 0).await;
    let y = h.bookmark("https://y.example", None, 1).await;
    let z = h.bookmark("https://z.example", None, 2).await;
    h.sync().await;

    let wanted = vec![y.id.clone(), z.id.clone(), x.id.clone()];
    let report = h.controller.reorder_bookmarks(None, &wanted).await.unwrap();
    assert_eq!(report.operation, Operation::ReorderBookmarks);
    assert_eq!(order(&h.stored().await, None), wanted);

    let bad = h.controller.reorder_bookmarks(None, &wanted[..2]).await;
    assert!(matches!(bad, Err(SyncError::Reorder(ReorderError::OrderMismatch(_)))));
}

#[tokio::test]
async fn test_drag_end_variants() {
    let mut h = harness();
    let a = h.folder("A", 0).await;
    let x = h.bookmark("https://x.example", None, 0).await;
    let y = h.bookmark("https://y.example", None, 1).await;
    h.sync().await;

    let cancelled = h
        .controller
        .handle_drag_end(&DragEnd {
            item_id: x.id.clone(),
            source: "main".to_string(),
            destination: None,
            index: 0,
        })
        .await
        .unwrap();
    assert!(cancelled.is_none());
    assert!(h.controller.drain_notifications().is_empty());

    let same_zone = h
        .controller
        .handle_drag_end(&DragEnd {
            item_id: y.id.clone(),
            source: "main".to_string(),
            destination: Some("main".to_string()),
            index: 0,
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(same_zone.operation, Operation::ReorderBookmarks);
    assert_eq!(order(h.controller.bookmarks().items(), None), vec![y.id.clone(), x.id.clone()]);

    let across = h
        .controller
        .handle_drag_end(&DragEnd {
            item_id: x.id.clone(),
            source: "main".to_string(),
            destination: Some(a.id.clone()),
            index: 0,
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(across.operation, Operation::MoveBookmark);
    assert_eq!(h.controller.bookmarks().get(&x.id).unwrap().folder_id.as_deref(), Some(a.id.as_str()));
    assert_eq!(h.controller.drain_notifications().len(), 2);
}

#[tokio::test]
async fn test_drag_within_zone_keeps_item_in_its_folder() {
    let mut h = harness();
    let a = h.folder("A", 0).await;
    let f = h.bookmark("https://f.example", Some(&a.id), 0).await;
    let g = h.bookmark("https://g.example", Some(&a.id), 1).await;
    h.bookmark("https://u.example", None, 0).await;
    h.sync().await;

    // The unfiled zone lists every bookmark when no folder is selected.
    let report = h
        .controller
        .handle_drag_end(&DragEnd {
            item_id: g.id.clone(),
            source: "main".to_string(),
            destination: Some("main".to_string()),
            index: 0,
        })
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.operation, Operation::ReorderBookmarks);
    let moved = h.controller.bookmarks().get(&g.id).unwrap();
    assert_eq!(moved.folder_id.as_deref(), Some(a.id.as_str()));
    assert_eq!(order(h.controller.bookmarks().items(), Some(&a.id)), vec![g.id.clone(), f.id.clone()]);
    assert_eq!(order(&h.stored().await, Some(&a.id)), vec![g.id, f.id]);
    assert_eq!(order(&h.stored().await, None).len(), 1);
}

#[tokio::test]
async fn test_drag_within_zone_onto_own_slot_is_noop() {
    let mut h = harness();
    let a = h.folder("A", 0).await;
    let f = h.bookmark("https://f.example", Some(&a.id), 0).await;
    h.bookmark("https://u.example", None, 0).await;
    h.sync().await;

    let report = h
        .controller
        .handle_drag_end(&DragEnd {
            item_id: f.id.clone(),
            source: "main".to_string(),
            destination: Some("main".to_string()),
            index: 0,
        })
        .await
        .unwrap()
        .unwrap();

    assert!(report.affected.is_empty());
    assert!(h.store.calls().is_empty());
    assert_eq!(
        h.controller.bookmarks().get(&f.id).unwrap().folder_id.as_deref(),
        Some(a.id.as_str())
    );
}

// ─── Add / remove ───

#[tokio::test]
async fn test_add_appends_to_unfiled() {
    let mut h = harness();
    h.bookmark("https://x.example", None, 0).await;
    h.bookmark("https://y.example", None, 1).await;
    h.sync().await;

    let report = h.controller.add_bookmark("https://example.com", None).await.unwrap();
    let id = report.affected[0].clone();
    assert!(!id.starts_with("pending-"));

    let added = h.controller.bookmarks().get(&id).unwrap().clone();
    assert_eq!(added.position, 2);
    assert!(added.folder_id.is_none());
    assert_eq!(added.title, "Example Domain");
    assert_eq!(added.description, DESCRIPTION_PLACEHOLDER);
    assert_eq!(added.image_url.as_deref(), Some("https://example.com/og.png"));
    assert_eq!(added.tags, vec!["example"]);

    let recent = h.controller.query(&BookmarkQuery {
        order: SortOrder::RecentFirst,
        ..BookmarkQuery::default()
    });
    assert_eq!(recent[0].id, id);
    let by_position = h.controller.query(&BookmarkQuery::default());
    assert_eq!(by_position.last().unwrap().id, id);

    let notes = h.controller.drain_notifications();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title, "Bookmark added");
    assert!(!h.controller.is_loading());
}

#[tokio::test]
async fn test_add_into_folder_appends_there() {
    let mut h = harness();
    let a = h.folder("A", 0).await;
    h.bookmark("https://p.example", Some(&a.id), 0).await;
    h.bookmark("https://x.example", None, 0).await;
    h.sync().await;

    let report = h.controller.add_bookmark("https://example.com", Some(&a.id)).await.unwrap();
    let added = h.controller.bookmarks().get(&report.affected[0]).unwrap();
    assert_eq!(added.folder_id.as_deref(), Some(a.id.as_str()));
    assert_eq!(added.position, 1);
}

#[tokio::test]
async fn test_add_without_title_falls_back_to_url() {
    let mut h = harness_with(
        RollbackStrategy::Snapshot,
        StubMetadata::returning(Ok(LinkMetadata::default())),
    );
    h.sync().await;

    let report = h.controller.add_bookmark("  https://bare.example  ", None).await.unwrap();
    let added = h.controller.bookmarks().get(&report.affected[0]).unwrap();
    assert_eq!(added.url, "https://bare.example");
    assert_eq!(added.title, "https://bare.example");
    assert!(added.tags.is_empty());
}

#[tokio::test]
async fn test_add_without_session_touches_nothing() {
    let mut h = harness();
    h.sync().await;
    h.sessions.sign_out();

    let result = h.controller.add_bookmark("https://example.com", None).await;
    assert_eq!(result.unwrap_err(), SyncError::Auth(AuthError::NoSession));
    assert_eq!(h.metadata.calls.load(Ordering::SeqCst), 0);
    assert!(h.controller.bookmarks().is_empty());
    assert_eq!(h.controller.last_mutation().unwrap().state, MutationState::Rejected);
    assert_eq!(h.controller.drain_notifications()[0].title, "Error adding bookmark");
}

#[tokio::test]
async fn test_metadata_failure_aborts_before_any_change() {
    let mut h = harness_with(
        RollbackStrategy::Snapshot,
        StubMetadata::returning(Err(MetadataError::Service("Failed to fetch metadata".to_string()))),
    );
    h.bookmark("https://x.example", None, 0).await;
    h.sync().await;
    let before = h.controller.bookmarks().snapshot();
    let mut rx = h.controller.bookmarks().subscribe();

    let result = h.controller.add_bookmark("https://example.com", None).await;

    assert!(matches!(result, Err(SyncError::Metadata(_))));
    assert_eq!(h.controller.bookmarks().snapshot(), before);
    assert!(!rx.has_changed().unwrap(), "no intermediate state may be published");
    assert!(h.store.calls().is_empty());
    assert!(!h.controller.is_fetching_metadata());

    let notes = h.controller.drain_notifications();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title, "Error adding bookmark");
    assert_eq!(notes[0].description, "Failed to fetch metadata");
}

#[tokio::test]
async fn test_pending_row_visible_while_insert_in_flight() {
    let mut h = harness();
    h.sync().await;
    h.store.gated.store(true, Ordering::SeqCst);

    let mut rx = h.controller.bookmarks().subscribe();
    let mut status = h.controller.subscribe_status();
    let store = h.store.clone();
    let observer = async move {
        rx.changed().await.unwrap();
        let pending: Vec<String> = rx.borrow_and_update().iter().map(|b| b.id.clone()).collect();
        let loading = status.borrow_and_update().is_loading;
        store.open_gate();
        (pending, loading)
    };

    let (result, (pending, loading)) = tokio::join!(h.controller.add_bookmark("https://example.com", None), observer);

    assert_eq!(pending.len(), 1);
    assert!(pending[0].starts_with("pending-"));
    assert!(loading);
    let id = result.unwrap().affected[0].clone();
    assert_eq!(h.controller.bookmarks().len(), 1);
    assert_eq!(h.controller.bookmarks().items()[0].id, id);
}

#[tokio::test]
async fn test_failed_insert_removes_pending_row() {
    let mut h = harness();
    h.bookmark("https://x.example", None, 0).await;
    h.sync().await;
    let before = h.controller.bookmarks().snapshot();
    h.store.fail_writes.store(true, Ordering::SeqCst);

    let result = h.controller.add_bookmark("https://example.com", None).await;

    assert!(result.is_err());
    assert_eq!(h.controller.bookmarks().snapshot(), before);
    assert!(h.controller.bookmarks().items().iter().all(|b| !b.id.starts_with("pending-")));
    assert_eq!(
        h.controller.last_mutation().unwrap().state,
        MutationState::RolledBack(RollbackStrategy::Snapshot)
    );
}

#[tokio::test]
async fn test_remove_leaves_gap_until_next_reorder() {
    let mut h = harness();
    let x = h.bookmark("https://x.example", None, 0).await;
    let y = h.bookmark("https://y.example", None, 1).await;
    let z = h.bookmark("https://z.example", None, 2).await;
    h.sync().await;

    h.controller.remove_bookmark(&y.id).await.unwrap();
    assert_eq!(h.controller.bookmarks().get(&z.id).unwrap().position, 2);
    assert_eq!(h.stored().await.len(), 2);

    // Appending after a gap never collides.
    let report = h.controller.add_bookmark("https://example.com", None).await.unwrap();
    assert_eq!(h.controller.bookmarks().get(&report.affected[0]).unwrap().position, 3);

    h.controller
        .move_bookmark(&MoveDescriptor {
            item_id: x.id.clone(),
            target_folder: None,
            target_index: 1,
        })
        .await
        .unwrap();
    assert!(is_contiguous(h.controller.bookmarks().items()));
}

#[tokio::test]
async fn test_failed_remove_restores_row() {
    let mut h = harness();
    let x = h.bookmark("https://x.example", None, 0).await;
    h.sync().await;
    h.store.fail_writes.store(true, Ordering::SeqCst);

    let result = h.controller.remove_bookmark(&x.id).await;
    assert!(result.is_err());
    assert!(h.controller.bookmarks().contains(&x.id));
    assert_eq!(h.controller.drain_notifications()[0].title, "Error deleting bookmark");
}

#[tokio::test]
async fn test_remove_unknown_bookmark_is_rejected() {
    let mut h = harness();
    h.sync().await;
    let result = h.controller.remove_bookmark("ghost").await;
    assert_eq!(
        result.unwrap_err(),
        SyncError::Reorder(ReorderError::ItemNotFound("ghost".to_string()))
    );
    assert!(h.store.calls().is_empty());
}

// ─── Folders ───

#[tokio::test]
async fn test_create_folder_appends() {
    let mut h = harness();
    h.folder("A", 0).await;
    h.sync().await;

    let report = h.controller.create_folder("  Reading  ").await.unwrap();
    let created = h.controller.folders().get(&report.affected[0]).unwrap();
    assert_eq!(created.name, "Reading");
    assert_eq!(created.position, 1);
    assert_eq!(h.controller.drain_notifications()[0].title, "Folder created");
}

#[tokio::test]
async fn test_create_folder_rejects_blank_name() {
    let mut h = harness();
    h.sync().await;

    let result = h.controller.create_folder("   ").await;
    assert!(matches!(result, Err(SyncError::InvalidInput(_))));
    assert!(h.store.calls().is_empty());
    assert_eq!(h.controller.drain_notifications().len(), 1);
}

#[tokio::test]
async fn test_reorder_folders_persists_and_rolls_back() {
    let mut h = harness();
    h.folder("Zero", 0).await;
    h.folder("One", 1).await;
    h.folder("Two", 2).await;
    h.sync().await;

    h.controller.reorder_folders(0, 2).await.unwrap();
    let names: Vec<String> = h
        .store
        .inner()
        .select_folders(OWNER)
        .await
        .unwrap()
        .into_iter()
        .map(|f| f.name)
        .collect();
    assert_eq!(names, vec!["One", "Two", "Zero"]);

    let before = h.controller.folders().snapshot();
    h.store.fail_writes.store(true, Ordering::SeqCst);
    assert!(h.controller.reorder_folders(2, 0).await.is_err());
    assert_eq!(h.controller.folders().snapshot(), before);

    let out_of_range = h.controller.reorder_folders(7, 0).await;
    assert_eq!(
        out_of_range.unwrap_err(),
        SyncError::Reorder(ReorderError::IndexOutOfRange(7))
    );
}

// ─── Preferences / selection ───

#[tokio::test]
async fn test_refresh_creates_default_view_mode() {
    let mut h = harness();
    h.sync().await;

    assert_eq!(h.controller.view_mode(), ViewMode::Grid);
    assert_eq!(h.store.inner().get_view_mode(OWNER).await.unwrap(), Some(ViewMode::Grid));

    h.controller.set_view_mode(ViewMode::List).await.unwrap();
    assert_eq!(h.controller.view_mode(), ViewMode::List);
    assert_eq!(h.store.inner().get_view_mode(OWNER).await.unwrap(), Some(ViewMode::List));
    assert_eq!(h.controller.drain_notifications()[0].title, "View updated");
}

#[tokio::test]
async fn test_load_view_mode_reads_stored_value() {
    let mut h = harness();
    h.store.inner().set_view_mode(OWNER, ViewMode::List).await.unwrap();

    assert_eq!(h.controller.load_view_mode().await.unwrap(), ViewMode::List);
    assert_eq!(h.controller.view_mode(), ViewMode::List);

    h.sessions.sign_out();
    assert_eq!(
        h.controller.load_view_mode().await.unwrap_err(),
        SyncError::Auth(AuthError::NoSession)
    );
}

#[tokio::test]
async fn test_failed_view_mode_keeps_previous() {
    let mut h = harness();
    h.sync().await;
    h.store.fail_writes.store(true, Ordering::SeqCst);

    assert!(h.controller.set_view_mode(ViewMode::List).await.is_err());
    assert_eq!(h.controller.view_mode(), ViewMode::Grid);
}

#[tokio::test]
async fn test_refresh_failure_reports_and_keeps_state() {
    let mut h = harness();
    h.bookmark("https://x.example", None, 0).await;
    h.sync().await;
    h.store.fail_reads.store(true, Ordering::SeqCst);

    assert!(h.controller.refresh().await.is_err());
    assert_eq!(h.controller.bookmarks().len(), 1);
    let notes = h.controller.drain_notifications();
    assert!(notes.iter().all(|n| n.is_error()));
    assert!(notes.iter().any(|n| n.title == "Error fetching bookmarks"));
}

#[tokio::test]
async fn test_clear_drops_loaded_state() {
    let mut h = harness();
    let a = h.folder("A", 0).await;
    h.bookmark("https://x.example", Some(&a.id), 0).await;
    h.sync().await;
    h.controller.select_folder(Some(&a.id)).unwrap();
    h.controller.set_view_mode(ViewMode::List).await.unwrap();
    let mut rx = h.controller.bookmarks().subscribe();

    h.controller.clear();

    assert!(h.controller.bookmarks().is_empty());
    assert!(h.controller.folders().is_empty());
    assert!(h.controller.selected_folder().is_none());
    assert_eq!(h.controller.view_mode(), ViewMode::Grid);
    assert!(h.controller.last_mutation().is_none());
    assert!(h.controller.drain_notifications().is_empty());
    assert!(rx.has_changed().unwrap());
    assert!(rx.borrow_and_update().is_empty());
    // The store keeps the rows; only the working copy is dropped.
    assert_eq!(h.stored().await.len(), 1);
}

#[tokio::test]
async fn test_select_folder_validates() {
    let mut h = harness();
    let a = h.folder("A", 0).await;
    h.sync().await;

    h.controller.select_folder(Some(&a.id)).unwrap();
    assert_eq!(h.controller.selected_folder(), Some(a.id.as_str()));
    assert!(h.controller.select_folder(Some("ghost")).is_err());
    h.controller.select_folder(None).unwrap();
    assert!(h.controller.selected_folder().is_none());
}
