//! RPC method handler for the markshelf JSON-RPC protocol.
//!
//! Extracted from `rpc_server.rs` so it can be unit-tested independently.
//! `handle_method` dispatches one call to the `SyncController` inside the
//! `App`. The App sits behind an async mutex, so calls run one at a time in
//! arrival order.

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::app::App;
use crate::managers::query::{BookmarkQuery, FolderFilter};
use crate::services::auth::SessionProvider;
use crate::services::settings_engine::SettingsEngineTrait;
use crate::types::bookmark::{DragEnd, MoveDescriptor, ViewMode};
use crate::types::session::Session;

fn str_param<'a>(params: &'a Value, key: &str) -> Result<&'a str, String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("missing {}", key))
}

fn usize_param(params: &Value, key: &str) -> Result<usize, String> {
    let raw = params
        .get(key)
        .and_then(|v| v.as_u64())
        .ok_or_else(|| format!("missing {}", key))?;
    usize::try_from(raw).map_err(|_| format!("{} out of range: {}", key, raw))
}

/// `folder_id` absent or null means the unfiled container.
fn folder_param(params: &Value) -> Result<Option<String>, String> {
    match params.get("folder_id") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(id)) => Ok(Some(id.clone())),
        Some(other) => Err(format!("invalid folder_id: {}", other)),
    }
}

fn parse_params<T: DeserializeOwned>(params: &Value) -> Result<T, String> {
    serde_json::from_value(params.clone()).map_err(|e| format!("invalid params: {}", e))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| e.to_string())
}

/// Dispatch a JSON-RPC method call to the appropriate handler.
///
/// Returns `Ok(Value)` on success or `Err(String)` with an error message.
pub async fn handle_method(app: &Mutex<App>, method: &str, params: &Value) -> Result<Value, String> {
    match method {
        "ping" => Ok(json!({"pong": true})),

        // ─── Session ───
        "auth.sign_in" => {
            let session = Session {
                user_id: str_param(params, "user_id")?.to_string(),
                access_token: str_param(params, "access_token")?.to_string(),
            };
            let mut a = app.lock().await;
            a.sign_in(session).await.map_err(|e| e.to_string())?;
            Ok(json!({
                "bookmarks": a.controller.bookmarks().len(),
                "folders": a.controller.folders().len(),
            }))
        }
        "auth.sign_out" => {
            app.lock().await.sign_out();
            Ok(json!({"ok": true}))
        }
        "sync.refresh" => {
            let mut a = app.lock().await;
            a.controller.refresh().await.map_err(|e| e.to_string())?;
            Ok(json!({
                "bookmarks": a.controller.bookmarks().len(),
                "folders": a.controller.folders().len(),
            }))
        }

        // ─── Bookmarks ───
        "bookmark.add" => {
            let url = str_param(params, "url")?;
            let mut a = app.lock().await;
            let folder = match params.get("folder_id") {
                Some(_) => folder_param(params)?,
                None => a.controller.selected_folder().map(str::to_string),
            };
            let report = a
                .controller
                .add_bookmark(url, folder.as_deref())
                .await
                .map_err(|e| e.to_string())?;
            let created = report
                .affected
                .first()
                .and_then(|id| a.controller.bookmarks().get(id))
                .ok_or("bookmark missing after insert")?;
            to_json(created)
        }
        "bookmark.list" => {
            let mut query: BookmarkQuery = parse_params(params)?;
            let a = app.lock().await;
            if params.get("folder").is_none() {
                query.folder = FolderFilter::from_selection(a.controller.selected_folder());
            }
            let items = a.controller.query(&query);
            Ok(json!({"items": to_json(&items)?, "view_mode": a.controller.view_mode().as_str()}))
        }
        "bookmark.delete" => {
            let id = str_param(params, "id")?;
            let report = app
                .lock()
                .await
                .controller
                .remove_bookmark(id)
                .await
                .map_err(|e| e.to_string())?;
            to_json(&report)
        }
        "bookmark.move" => {
            let descriptor = MoveDescriptor {
                item_id: str_param(params, "id")?.to_string(),
                target_folder: folder_param(params)?,
                target_index: usize_param(params, "index")?,
            };
            let report = app
                .lock()
                .await
                .controller
                .move_bookmark(&descriptor)
                .await
                .map_err(|e| e.to_string())?;
            to_json(&report)
        }
        "bookmark.move_to_folder" => {
            let id = str_param(params, "id")?;
            let folder = folder_param(params)?;
            let report = app
                .lock()
                .await
                .controller
                .move_to_folder(id, folder.as_deref())
                .await
                .map_err(|e| e.to_string())?;
            to_json(&report)
        }
        "bookmark.reorder" => {
            let folder = folder_param(params)?;
            let ids: Vec<String> = params
                .get("ids")
                .cloned()
                .ok_or("missing ids")
                .and_then(|v| serde_json::from_value(v).map_err(|_| "ids must be a list of strings"))?;
            let report = app
                .lock()
                .await
                .controller
                .reorder_bookmarks(folder.as_deref(), &ids)
                .await
                .map_err(|e| e.to_string())?;
            to_json(&report)
        }
        "bookmark.drag_end" => {
            let drag: DragEnd = parse_params(params)?;
            let outcome = app
                .lock()
                .await
                .controller
                .handle_drag_end(&drag)
                .await
                .map_err(|e| e.to_string())?;
            match outcome {
                Some(report) => to_json(&report),
                None => Ok(json!({"cancelled": true})),
            }
        }

        // ─── Folders ───
        "folder.create" => {
            let name = str_param(params, "name")?;
            let mut a = app.lock().await;
            let report = a.controller.create_folder(name).await.map_err(|e| e.to_string())?;
            let created = report
                .affected
                .first()
                .and_then(|id| a.controller.folders().get(id))
                .ok_or("folder missing after insert")?;
            to_json(created)
        }
        "folder.list" => {
            let a = app.lock().await;
            Ok(json!({
                "items": to_json(&a.controller.folders().items())?,
                "selected": a.controller.selected_folder(),
            }))
        }
        "folder.select" => {
            let folder = folder_param(params)?;
            app.lock()
                .await
                .controller
                .select_folder(folder.as_deref())
                .map_err(|e| e.to_string())?;
            Ok(json!({"selected": folder}))
        }
        "folder.reorder" => {
            let from = usize_param(params, "from")?;
            let to = usize_param(params, "to")?;
            let report = app
                .lock()
                .await
                .controller
                .reorder_folders(from, to)
                .await
                .map_err(|e| e.to_string())?;
            to_json(&report)
        }

        // ─── Preferences ───
        "prefs.get_view_mode" => {
            let a = app.lock().await;
            Ok(json!({"view_mode": a.controller.view_mode().as_str()}))
        }
        "prefs.set_view_mode" => {
            let raw = str_param(params, "view_mode")?;
            let mode = ViewMode::parse(raw).ok_or_else(|| format!("invalid view_mode: {}", raw))?;
            app.lock()
                .await
                .controller
                .set_view_mode(mode)
                .await
                .map_err(|e| e.to_string())?;
            Ok(json!({"view_mode": mode.as_str()}))
        }

        // ─── Settings ───
        "settings.get" => {
            let a = app.lock().await;
            to_json(a.settings_engine.get_settings())
        }
        "settings.set" => {
            let key = str_param(params, "key")?;
            let value = params.get("value").cloned().ok_or("missing value")?;
            let mut a = app.lock().await;
            a.settings_engine.set_value(key, value).map_err(|e| e.to_string())?;
            Ok(json!({"ok": true}))
        }

        // ─── Notifications / status ───
        "notifications.drain" => {
            let notifications = app.lock().await.controller.drain_notifications();
            to_json(&notifications)
        }
        "status" => {
            let a = app.lock().await;
            let status = a.controller.status();
            Ok(json!({
                "signed_in": a.sessions.current_session().is_some(),
                "is_loading": status.is_loading,
                "fetching_metadata": status.fetching_metadata,
                "bookmarks": a.controller.bookmarks().len(),
                "folders": a.controller.folders().len(),
                "view_mode": a.controller.view_mode().as_str(),
                "selected_folder": a.controller.selected_folder(),
                "rollback": a.controller.rollback_strategy(),
                "last_mutation": a.controller.last_mutation(),
            }))
        }

        _ => Err(format!("unknown method: {}", method)),
    }
}
