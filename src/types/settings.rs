use serde::{Deserialize, Serialize};

/// Top-level application settings container.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppSettings {
    pub store: StoreSettings,
    pub metadata: MetadataSettings,
    pub sync: SyncSettings,
    pub session: SessionSettings,
}

/// Which remote store backs the collections.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Rest,
}

/// Remote store connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    /// SQLite file for the embedded backend. Relative to the data dir when unset.
    pub database_path: Option<String>,
    /// Base URL of a PostgREST-compatible API, e.g. `https://xyz.supabase.co`.
    pub rest_url: Option<String>,
    pub api_key: Option<String>,
}

/// Metadata service settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetadataSettings {
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for MetadataSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://api.microlink.io".to_string(),
            timeout_secs: 10,
        }
    }
}

/// How local state is restored after a failed remote mutation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RollbackStrategy {
    /// Restore the copy taken before the optimistic step.
    #[default]
    Snapshot,
    /// Discard local state and reload it from the store.
    Refetch,
}

/// Optimistic sync behavior.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SyncSettings {
    pub rollback: RollbackStrategy,
}

/// Credentials used to sign in automatically at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionSettings {
    pub user_id: Option<String>,
    pub access_token: Option<String>,
}
