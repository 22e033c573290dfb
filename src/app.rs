//! App Core for markshelf.
//!
//! Wires settings, the selected remote store, the metadata client and the
//! session holder into one `SyncController`.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::database::Database;
use crate::gateway::{RemoteStore, RestStore, SqliteStore};
use crate::managers::sync_controller::SyncController;
use crate::platform;
use crate::services::auth::{SessionProvider, SessionStore};
use crate::services::metadata::{MetadataSource, MicrolinkClient};
use crate::services::settings_engine::{SettingsEngine, SettingsEngineTrait};
use crate::types::session::Session;
use crate::types::settings::{AppSettings, StoreBackend};

const DATABASE_FILE: &str = "markshelf.db";

/// Central application struct.
pub struct App {
    pub settings_engine: SettingsEngine,
    pub sessions: Arc<SessionStore>,
    pub controller: SyncController,
}

impl App {
    /// Loads settings from `config_path` (or the default location) and
    /// builds every component from them.
    pub fn new(config_path: Option<String>) -> Result<Self, Box<dyn std::error::Error>> {
        let mut settings_engine = SettingsEngine::new(config_path);
        let settings = settings_engine.load()?;

        let sessions = Arc::new(SessionStore::new());
        if let (Some(user_id), Some(access_token)) =
            (settings.session.user_id.clone(), settings.session.access_token.clone())
        {
            tracing::info!(user_id = %user_id, "signing in from configured session");
            sessions.sign_in(Session { user_id, access_token });
        }

        let store = build_store(&settings, sessions.clone())?;
        let metadata: Arc<dyn MetadataSource> = Arc::new(MicrolinkClient::new(
            &settings.metadata.endpoint,
            settings.metadata.timeout_secs,
        )?);
        let controller = SyncController::new(store, metadata, sessions.clone(), settings.sync.rollback);

        Ok(Self {
            settings_engine,
            sessions,
            controller,
        })
    }

    /// Assembles an App from already-built parts.
    pub fn from_parts(
        settings_engine: SettingsEngine,
        store: Arc<dyn RemoteStore>,
        metadata: Arc<dyn MetadataSource>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        let rollback = settings_engine.get_settings().sync.rollback;
        let provider: Arc<dyn SessionProvider> = sessions.clone();
        Self {
            settings_engine,
            sessions,
            controller: SyncController::new(store, metadata, provider, rollback),
        }
    }

    /// Records the session and pulls the user's collections.
    pub async fn sign_in(&mut self, session: Session) -> Result<(), crate::types::errors::SyncError> {
        self.sessions.sign_in(session);
        self.controller.refresh().await
    }

    /// Forgets the session and everything loaded for it.
    pub fn sign_out(&mut self) {
        self.sessions.sign_out();
        self.controller.clear();
        tracing::info!("signed out");
    }
}

/// Resolves the embedded database file: the configured path, or
/// `markshelf.db` in the data directory.
pub fn database_path(settings: &AppSettings) -> PathBuf {
    match &settings.store.database_path {
        Some(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => platform::get_data_dir().join(DATABASE_FILE),
    }
}

fn build_store(
    settings: &AppSettings,
    sessions: Arc<SessionStore>,
) -> Result<Arc<dyn RemoteStore>, Box<dyn std::error::Error>> {
    match settings.store.backend {
        StoreBackend::Sqlite => {
            let path = database_path(settings);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            tracing::info!(path = %path.display(), "opening embedded store");
            let db = Arc::new(Database::open(&path)?);
            Ok(Arc::new(SqliteStore::new(db)))
        }
        StoreBackend::Rest => {
            let base_url = settings
                .store
                .rest_url
                .as_deref()
                .ok_or("store.rest_url is required for the rest backend")?;
            let api_key = settings.store.api_key.as_deref().unwrap_or_default();
            tracing::info!(base_url = %base_url, "using REST store");
            Ok(Arc::new(RestStore::new(base_url, api_key, sessions)))
        }
    }
}
