//! Hosted store over a PostgREST-compatible HTTP API (e.g. Supabase).
//!
//! Tables are addressed at `{base}/rest/v1/{table}`; rows are filtered by
//! `user_id` and the signed-in user's access token is sent as the bearer
//! credential so row-level security applies server side.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{description_or_placeholder, RemoteStore};
use crate::services::auth::SessionProvider;
use crate::types::bookmark::{Bookmark, BookmarkFolder, BookmarkPatch, NewBookmark, ViewMode};
use crate::types::errors::GatewayError;

const RETURN_REPRESENTATION: &str = "return=representation";
const MERGE_DUPLICATES: &str = "resolution=merge-duplicates,return=representation";

/// A bookmark row as PostgREST returns it.
#[derive(Debug, Clone, Deserialize)]
pub struct BookmarkRow {
    pub id: String,
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub tags: Option<Vec<String>>,
    pub folder_id: Option<String>,
    pub position: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<BookmarkRow> for Bookmark {
    fn from(row: BookmarkRow) -> Self {
        let created_at = row.created_at.timestamp();
        Bookmark {
            id: row.id,
            url: row.url,
            title: row.title,
            description: description_or_placeholder(row.description),
            image_url: row.image_url,
            tags: row.tags.unwrap_or_default(),
            folder_id: row.folder_id,
            position: row.position,
            created_at,
            updated_at: row.updated_at.map(|t| t.timestamp()).unwrap_or(created_at),
        }
    }
}

/// A folder row as PostgREST returns it.
#[derive(Debug, Clone, Deserialize)]
pub struct FolderRow {
    pub id: String,
    pub name: String,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

impl From<FolderRow> for BookmarkFolder {
    fn from(row: FolderRow) -> Self {
        BookmarkFolder {
            id: row.id,
            name: row.name,
            position: row.position,
            created_at: row.created_at.timestamp(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PreferenceRow {
    view_mode: String,
}

/// Full bookmark row for inserts and upserts.
#[derive(Debug, Serialize)]
struct BookmarkWrite<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    user_id: &'a str,
    url: &'a str,
    title: &'a str,
    description: &'a str,
    image_url: Option<&'a str>,
    tags: &'a [String],
    folder_id: Option<&'a str>,
    position: i32,
    updated_at: String,
}

#[derive(Debug, Serialize)]
struct FolderWrite<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    user_id: &'a str,
    name: &'a str,
    position: i32,
}

/// PostgREST error body.
#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    code: Option<String>,
    message: Option<String>,
}

/// Maps a non-success response onto the gateway error taxonomy.
///
/// SQLSTATE class 23 (integrity constraint violation) becomes
/// `GatewayError::Constraint`.
pub fn classify_error(status: u16, body: &str) -> GatewayError {
    let parsed: ApiErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .message
        .unwrap_or_else(|| if body.is_empty() { format!("HTTP {}", status) } else { body.to_string() });

    match parsed.code.as_deref() {
        Some(code) if code.starts_with("23") => GatewayError::Constraint(message),
        _ => GatewayError::Api { status, message },
    }
}

/// Builds the PATCH body for a partial update.
pub fn patch_body(patch: &BookmarkPatch, updated_at: DateTime<Utc>) -> Value {
    let mut body = Map::new();
    if let Some(url) = &patch.url {
        body.insert("url".into(), json!(url));
    }
    if let Some(title) = &patch.title {
        body.insert("title".into(), json!(title));
    }
    if let Some(description) = &patch.description {
        body.insert("description".into(), json!(description));
    }
    if let Some(image_url) = &patch.image_url {
        body.insert("image_url".into(), json!(image_url));
    }
    if let Some(tags) = &patch.tags {
        body.insert("tags".into(), json!(tags));
    }
    if let Some(folder_id) = &patch.folder_id {
        body.insert("folder_id".into(), json!(folder_id));
    }
    if let Some(position) = patch.position {
        body.insert("position".into(), json!(position));
    }
    body.insert("updated_at".into(), json!(updated_at.to_rfc3339()));
    Value::Object(body)
}

/// Remote store speaking PostgREST.
pub struct RestStore {
    client: Client,
    base_url: String,
    api_key: String,
    sessions: Arc<dyn SessionProvider>,
}

impl RestStore {
    pub fn new(base_url: &str, api_key: &str, sessions: Arc<dyn SessionProvider>) -> Self {
        Self::with_client(Client::new(), base_url, api_key, sessions)
    }

    pub fn with_client(
        client: Client,
        base_url: &str,
        api_key: &str,
        sessions: Arc<dyn SessionProvider>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            sessions,
        }
    }

    /// Endpoint for a table.
    pub fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        let bearer = self
            .sessions
            .current_session()
            .map(|s| s.access_token)
            .unwrap_or_else(|| self.api_key.clone());
        builder
            .header("apikey", &self.api_key)
            .bearer_auth(bearer)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, GatewayError> {
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_error(status.as_u16(), &body))
    }

    async fn rows<T: serde::de::DeserializeOwned>(&self, builder: RequestBuilder) -> Result<Vec<T>, GatewayError> {
        self.send(builder)
            .await?
            .json::<Vec<T>>()
            .await
            .map_err(|e| GatewayError::Serialization(e.to_string()))
    }

    /// Exactly one returned row, as `return=representation` produces.
    async fn single<T: serde::de::DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        id: &str,
    ) -> Result<T, GatewayError> {
        self.rows::<T>(builder)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))
    }

    fn eq(value: &str) -> String {
        format!("eq.{}", value)
    }
}

#[async_trait]
impl RemoteStore for RestStore {
    async fn select_bookmarks(&self, owner: &str) -> Result<Vec<Bookmark>, GatewayError> {
        let request = self
            .client
            .get(self.table_url("bookmarks"))
            .query(&[("select", "*".to_string()), ("user_id", Self::eq(owner)), ("order", "position.asc".to_string())]);
        let rows: Vec<BookmarkRow> = self.rows(request).await?;
        Ok(rows.into_iter().map(Bookmark::from).collect())
    }

    async fn insert_bookmark(&self, owner: &str, new: &NewBookmark) -> Result<Bookmark, GatewayError> {
        let body = BookmarkWrite {
            id: None,
            user_id: owner,
            url: &new.url,
            title: &new.title,
            description: &new.description,
            image_url: new.image_url.as_deref(),
            tags: &new.tags,
            folder_id: new.folder_id.as_deref(),
            position: new.position,
            updated_at: Utc::now().to_rfc3339(),
        };
        let request = self
            .client
            .post(self.table_url("bookmarks"))
            .header("Prefer", RETURN_REPRESENTATION)
            .json(&body);
        let row: BookmarkRow = self.single(request, &new.url).await?;
        Ok(row.into())
    }

    async fn delete_bookmark(&self, owner: &str, id: &str) -> Result<(), GatewayError> {
        let request = self
            .client
            .delete(self.table_url("bookmarks"))
            .header("Prefer", RETURN_REPRESENTATION)
            .query(&[("id", Self::eq(id)), ("user_id", Self::eq(owner))]);
        let _deleted: BookmarkRow = self.single(request, id).await?;
        Ok(())
    }

    async fn update_bookmark(
        &self,
        owner: &str,
        id: &str,
        patch: &BookmarkPatch,
    ) -> Result<Bookmark, GatewayError> {
        let request = self
            .client
            .patch(self.table_url("bookmarks"))
            .header("Prefer", RETURN_REPRESENTATION)
            .query(&[("id", Self::eq(id)), ("user_id", Self::eq(owner))])
            .json(&patch_body(patch, Utc::now()));
        let row: BookmarkRow = self.single(request, id).await?;
        Ok(row.into())
    }

    async fn upsert_bookmarks(&self, owner: &str, rows: &[Bookmark]) -> Result<Vec<Bookmark>, GatewayError> {
        let updated_at = Utc::now().to_rfc3339();
        let body: Vec<BookmarkWrite> = rows
            .iter()
            .map(|b| BookmarkWrite {
                id: Some(&b.id),
                user_id: owner,
                url: &b.url,
                title: &b.title,
                description: &b.description,
                image_url: b.image_url.as_deref(),
                tags: &b.tags,
                folder_id: b.folder_id.as_deref(),
                position: b.position,
                updated_at: updated_at.clone(),
            })
            .collect();
        let request = self
            .client
            .post(self.table_url("bookmarks"))
            .header("Prefer", MERGE_DUPLICATES)
            .query(&[("on_conflict", "id")])
            .json(&body);
        let stored: Vec<BookmarkRow> = self.rows(request).await?;
        Ok(stored.into_iter().map(Bookmark::from).collect())
    }

    async fn select_folders(&self, owner: &str) -> Result<Vec<BookmarkFolder>, GatewayError> {
        let request = self
            .client
            .get(self.table_url("folders"))
            .query(&[("select", "*".to_string()), ("user_id", Self::eq(owner)), ("order", "position.asc".to_string())]);
        let rows: Vec<FolderRow> = self.rows(request).await?;
        Ok(rows.into_iter().map(BookmarkFolder::from).collect())
    }

    async fn insert_folder(
        &self,
        owner: &str,
        name: &str,
        position: i32,
    ) -> Result<BookmarkFolder, GatewayError> {
        let body = FolderWrite {
            id: None,
            user_id: owner,
            name,
            position,
        };
        let request = self
            .client
            .post(self.table_url("folders"))
            .header("Prefer", RETURN_REPRESENTATION)
            .json(&body);
        let row: FolderRow = self.single(request, name).await?;
        Ok(row.into())
    }

    async fn upsert_folders(
        &self,
        owner: &str,
        rows: &[BookmarkFolder],
    ) -> Result<Vec<BookmarkFolder>, GatewayError> {
        let body: Vec<FolderWrite> = rows
            .iter()
            .map(|f| FolderWrite {
                id: Some(&f.id),
                user_id: owner,
                name: &f.name,
                position: f.position,
            })
            .collect();
        let request = self
            .client
            .post(self.table_url("folders"))
            .header("Prefer", MERGE_DUPLICATES)
            .query(&[("on_conflict", "id")])
            .json(&body);
        let stored: Vec<FolderRow> = self.rows(request).await?;
        Ok(stored.into_iter().map(BookmarkFolder::from).collect())
    }

    async fn get_view_mode(&self, owner: &str) -> Result<Option<ViewMode>, GatewayError> {
        let request = self
            .client
            .get(self.table_url("user_preferences"))
            .query(&[("select", "view_mode".to_string()), ("user_id", Self::eq(owner))]);
        let rows: Vec<PreferenceRow> = self.rows(request).await?;
        match rows.into_iter().next() {
            Some(row) => ViewMode::parse(&row.view_mode)
                .map(Some)
                .ok_or_else(|| GatewayError::Serialization(format!("unknown view mode: {}", row.view_mode))),
            None => Ok(None),
        }
    }

    async fn set_view_mode(&self, owner: &str, mode: ViewMode) -> Result<(), GatewayError> {
        let request = self
            .client
            .post(self.table_url("user_preferences"))
            .header("Prefer", "resolution=merge-duplicates")
            .query(&[("on_conflict", "user_id")])
            .json(&json!({ "user_id": owner, "view_mode": mode.as_str() }));
        self.send(request).await?;
        Ok(())
    }
}
