//! Embedded store backed by SQLite via `rusqlite`.
//!
//! Serves the same row contract as a hosted backend, so the rest of the
//! crate (and the tests) can run against a local file or an in-memory
//! database.

use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use uuid::Uuid;

use super::{description_or_placeholder, now, RemoteStore};
use crate::database::Database;
use crate::types::bookmark::{Bookmark, BookmarkFolder, BookmarkPatch, NewBookmark, ViewMode};
use crate::types::errors::GatewayError;

const BOOKMARK_COLUMNS: &str =
    "id, url, title, description, image_url, tags, folder_id, position, created_at, updated_at";

/// Remote store implementation over a local SQLite database.
pub struct SqliteStore {
    db: Arc<Database>,
}

impl SqliteStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Opens a fresh in-memory store.
    pub fn open_in_memory() -> Result<Self, GatewayError> {
        Ok(Self::new(Arc::new(Database::open_in_memory()?)))
    }

    /// The database this store writes to.
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    fn row_to_bookmark(row: &rusqlite::Row) -> rusqlite::Result<Bookmark> {
        let tags_json: String = row.get(5)?;
        let tags: Vec<String> = serde_json::from_str(&tags_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;
        Ok(Bookmark {
            id: row.get(0)?,
            url: row.get(1)?,
            title: row.get(2)?,
            description: description_or_placeholder(row.get(3)?),
            image_url: row.get(4)?,
            tags,
            folder_id: row.get(6)?,
            position: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn row_to_folder(row: &rusqlite::Row) -> rusqlite::Result<BookmarkFolder> {
        Ok(BookmarkFolder {
            id: row.get(0)?,
            name: row.get(1)?,
            position: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    fn tags_to_json(tags: &[String]) -> Result<String, GatewayError> {
        serde_json::to_string(tags).map_err(|e| GatewayError::Serialization(e.to_string()))
    }

    fn find_bookmark(conn: &Connection, owner: &str, id: &str) -> Result<Bookmark, GatewayError> {
        let sql = format!(
            "SELECT {} FROM bookmarks WHERE id = ?1 AND user_id = ?2",
            BOOKMARK_COLUMNS
        );
        conn.query_row(&sql, params![id, owner], Self::row_to_bookmark)
            .optional()?
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))
    }

    fn find_folder(conn: &Connection, owner: &str, id: &str) -> Result<BookmarkFolder, GatewayError> {
        conn.query_row(
            "SELECT id, name, position, created_at FROM folders WHERE id = ?1 AND user_id = ?2",
            params![id, owner],
            Self::row_to_folder,
        )
        .optional()?
        .ok_or_else(|| GatewayError::NotFound(id.to_string()))
    }

    /// Fails when `id` exists but belongs to someone else.
    fn ensure_not_foreign(
        conn: &Connection,
        table: &str,
        owner: &str,
        id: &str,
    ) -> Result<(), GatewayError> {
        let sql = format!("SELECT user_id FROM {} WHERE id = ?1", table);
        let existing: Option<String> = conn
            .query_row(&sql, params![id], |row| row.get(0))
            .optional()?;
        match existing {
            Some(user) if user != owner => Err(GatewayError::Constraint(format!(
                "{} row {} is owned by another user",
                table, id
            ))),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteStore for SqliteStore {
    async fn select_bookmarks(&self, owner: &str) -> Result<Vec<Bookmark>, GatewayError> {
        let conn = self.db.connection();
        let sql = format!(
            "SELECT {} FROM bookmarks WHERE user_id = ?1 ORDER BY position, created_at",
            BOOKMARK_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![owner], Self::row_to_bookmark)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    async fn insert_bookmark(&self, owner: &str, new: &NewBookmark) -> Result<Bookmark, GatewayError> {
        let conn = self.db.connection();
        let id = Uuid::new_v4().to_string();
        let now = now();
        let tags = Self::tags_to_json(&new.tags)?;

        conn.execute(
            "INSERT INTO bookmarks (id, user_id, url, title, description, image_url, tags, folder_id, position, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                id,
                owner,
                new.url,
                new.title,
                new.description,
                new.image_url,
                tags,
                new.folder_id,
                new.position,
                now,
                now
            ],
        )?;

        Self::find_bookmark(&conn, owner, &id)
    }

    async fn delete_bookmark(&self, owner: &str, id: &str) -> Result<(), GatewayError> {
        let conn = self.db.connection();
        let affected = conn.execute(
            "DELETE FROM bookmarks WHERE id = ?1 AND user_id = ?2",
            params![id, owner],
        )?;

        if affected == 0 {
            return Err(GatewayError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn update_bookmark(
        &self,
        owner: &str,
        id: &str,
        patch: &BookmarkPatch,
    ) -> Result<Bookmark, GatewayError> {
        let conn = self.db.connection();

        let mut columns: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(url) = &patch.url {
            columns.push("url");
            values.push(Value::Text(url.clone()));
        }
        if let Some(title) = &patch.title {
            columns.push("title");
            values.push(Value::Text(title.clone()));
        }
        if let Some(description) = &patch.description {
            columns.push("description");
            values.push(Value::Text(description.clone()));
        }
        if let Some(image_url) = &patch.image_url {
            columns.push("image_url");
            values.push(Value::from(image_url.clone()));
        }
        if let Some(tags) = &patch.tags {
            columns.push("tags");
            values.push(Value::Text(Self::tags_to_json(tags)?));
        }
        if let Some(folder_id) = &patch.folder_id {
            columns.push("folder_id");
            values.push(Value::from(folder_id.clone()));
        }
        if let Some(position) = patch.position {
            columns.push("position");
            values.push(Value::Integer(i64::from(position)));
        }
        // Always bump updated_at, which also verifies the row exists when
        // the patch is empty.
        columns.push("updated_at");
        values.push(Value::Integer(now()));

        let assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{} = ?{}", column, i + 1))
            .collect();
        let sql = format!(
            "UPDATE bookmarks SET {} WHERE id = ?{} AND user_id = ?{}",
            assignments.join(", "),
            columns.len() + 1,
            columns.len() + 2
        );
        values.push(Value::Text(id.to_string()));
        values.push(Value::Text(owner.to_string()));

        let affected = conn.execute(&sql, params_from_iter(values.iter()))?;
        if affected == 0 {
            return Err(GatewayError::NotFound(id.to_string()));
        }

        Self::find_bookmark(&conn, owner, id)
    }

    async fn upsert_bookmarks(&self, owner: &str, rows: &[Bookmark]) -> Result<Vec<Bookmark>, GatewayError> {
        let mut conn = self.db.connection();
        let tx = conn.transaction()?;
        let now = now();

        for row in rows {
            Self::ensure_not_foreign(&tx, "bookmarks", owner, &row.id)?;
            let tags = Self::tags_to_json(&row.tags)?;
            tx.execute(
                "INSERT INTO bookmarks (id, user_id, url, title, description, image_url, tags, folder_id, position, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11) \
                 ON CONFLICT(id) DO UPDATE SET \
                    url = excluded.url, title = excluded.title, description = excluded.description, \
                    image_url = excluded.image_url, tags = excluded.tags, folder_id = excluded.folder_id, \
                    position = excluded.position, updated_at = excluded.updated_at",
                params![
                    row.id,
                    owner,
                    row.url,
                    row.title,
                    row.description,
                    row.image_url,
                    tags,
                    row.folder_id,
                    row.position,
                    row.created_at,
                    now
                ],
            )?;
        }

        let mut stored = Vec::with_capacity(rows.len());
        for row in rows {
            stored.push(Self::find_bookmark(&tx, owner, &row.id)?);
        }
        tx.commit()?;
        Ok(stored)
    }

    async fn select_folders(&self, owner: &str) -> Result<Vec<BookmarkFolder>, GatewayError> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare(
            "SELECT id, name, position, created_at FROM folders WHERE user_id = ?1 ORDER BY position, created_at",
        )?;
        let rows = stmt.query_map(params![owner], Self::row_to_folder)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    async fn insert_folder(
        &self,
        owner: &str,
        name: &str,
        position: i32,
    ) -> Result<BookmarkFolder, GatewayError> {
        let conn = self.db.connection();
        let id = Uuid::new_v4().to_string();

        conn.execute(
            "INSERT INTO folders (id, user_id, name, position, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, owner, name, position, now()],
        )?;

        Self::find_folder(&conn, owner, &id)
    }

    async fn upsert_folders(
        &self,
        owner: &str,
        rows: &[BookmarkFolder],
    ) -> Result<Vec<BookmarkFolder>, GatewayError> {
        let mut conn = self.db.connection();
        let tx = conn.transaction()?;

        for row in rows {
            Self::ensure_not_foreign(&tx, "folders", owner, &row.id)?;
            tx.execute(
                "INSERT INTO folders (id, user_id, name, position, created_at) VALUES (?1, ?2, ?3, ?4, ?5) \
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name, position = excluded.position",
                params![row.id, owner, row.name, row.position, row.created_at],
            )?;
        }

        let mut stored = Vec::with_capacity(rows.len());
        for row in rows {
            stored.push(Self::find_folder(&tx, owner, &row.id)?);
        }
        tx.commit()?;
        Ok(stored)
    }

    async fn get_view_mode(&self, owner: &str) -> Result<Option<ViewMode>, GatewayError> {
        let conn = self.db.connection();
        let stored: Option<String> = conn
            .query_row(
                "SELECT view_mode FROM user_preferences WHERE user_id = ?1",
                params![owner],
                |row| row.get(0),
            )
            .optional()?;

        match stored {
            Some(raw) => ViewMode::parse(&raw)
                .map(Some)
                .ok_or_else(|| GatewayError::Serialization(format!("unknown view mode: {}", raw))),
            None => Ok(None),
        }
    }

    async fn set_view_mode(&self, owner: &str, mode: ViewMode) -> Result<(), GatewayError> {
        let conn = self.db.connection();
        conn.execute(
            "INSERT INTO user_preferences (user_id, view_mode) VALUES (?1, ?2) \
             ON CONFLICT(user_id) DO UPDATE SET view_mode = excluded.view_mode",
            params![owner, mode.as_str()],
        )?;
        Ok(())
    }
}
