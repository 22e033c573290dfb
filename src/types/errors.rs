use std::fmt;

// === AuthError ===

/// Errors related to the user session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// A mutating action was attempted without a signed-in user.
    NoSession,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::NoSession => write!(f, "You must be logged in to do that"),
        }
    }
}

impl std::error::Error for AuthError {}

// === GatewayError ===

/// Errors returned by a remote store gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The store could not be reached.
    Network(String),
    /// The store answered with a non-success status.
    Api { status: u16, message: String },
    /// A uniqueness, foreign key or check constraint rejected the write.
    Constraint(String),
    /// No row with the given ID is visible to the owner.
    NotFound(String),
    /// Embedded database operation failed.
    Database(String),
    /// A row could not be encoded or decoded.
    Serialization(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Network(msg) => write!(f, "Store unreachable: {}", msg),
            GatewayError::Api { status, message } => {
                write!(f, "Store error ({}): {}", status, message)
            }
            GatewayError::Constraint(msg) => write!(f, "Constraint violation: {}", msg),
            GatewayError::NotFound(id) => write!(f, "Row not found: {}", id),
            GatewayError::Database(msg) => write!(f, "Store database error: {}", msg),
            GatewayError::Serialization(msg) => {
                write!(f, "Store serialization error: {}", msg)
            }
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<rusqlite::Error> for GatewayError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(code, msg)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                GatewayError::Constraint(msg.unwrap_or_else(|| code.to_string()))
            }
            other => GatewayError::Database(other.to_string()),
        }
    }
}

// === MetadataError ===

/// Errors related to fetching link metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    /// The URL is not an absolute http(s) URL.
    InvalidUrl(String),
    /// The metadata service could not be reached.
    Network(String),
    /// The metadata service answered with a non-success response.
    Service(String),
    /// The response body did not have the expected shape.
    Malformed(String),
}

impl fmt::Display for MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataError::InvalidUrl(url) => write!(f, "Invalid URL: {}", url),
            MetadataError::Network(msg) => write!(f, "Metadata network error: {}", msg),
            MetadataError::Service(msg) => write!(f, "{}", msg),
            MetadataError::Malformed(msg) => write!(f, "Malformed metadata: {}", msg),
        }
    }
}

impl std::error::Error for MetadataError {}

// === ReorderError ===

/// Errors produced by the reordering engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReorderError {
    /// No item with the given ID is in the collection.
    ItemNotFound(String),
    /// The target folder is not in the collection.
    UnknownFolder(String),
    /// A bulk reorder did not list exactly the container's items.
    OrderMismatch(String),
    /// An index does not address an existing entry.
    IndexOutOfRange(usize),
}

impl fmt::Display for ReorderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReorderError::ItemNotFound(id) => write!(f, "Item not found: {}", id),
            ReorderError::UnknownFolder(id) => write!(f, "Unknown folder: {}", id),
            ReorderError::OrderMismatch(msg) => write!(f, "Order mismatch: {}", msg),
            ReorderError::IndexOutOfRange(index) => write!(f, "Index out of range: {}", index),
        }
    }
}

impl std::error::Error for ReorderError {}

// === SyncError ===

/// Errors surfaced by the optimistic sync controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    Auth(AuthError),
    Gateway(GatewayError),
    Metadata(MetadataError),
    Reorder(ReorderError),
    /// The request was rejected before anything was applied.
    InvalidInput(String),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Auth(e) => write!(f, "{}", e),
            SyncError::Gateway(e) => write!(f, "{}", e),
            SyncError::Metadata(e) => write!(f, "{}", e),
            SyncError::Reorder(e) => write!(f, "{}", e),
            SyncError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Auth(e) => Some(e),
            SyncError::Gateway(e) => Some(e),
            SyncError::Metadata(e) => Some(e),
            SyncError::Reorder(e) => Some(e),
            SyncError::InvalidInput(_) => None,
        }
    }
}

impl From<AuthError> for SyncError {
    fn from(err: AuthError) -> Self {
        SyncError::Auth(err)
    }
}

impl From<GatewayError> for SyncError {
    fn from(err: GatewayError) -> Self {
        SyncError::Gateway(err)
    }
}

impl From<MetadataError> for SyncError {
    fn from(err: MetadataError) -> Self {
        SyncError::Metadata(err)
    }
}

impl From<ReorderError> for SyncError {
    fn from(err: ReorderError) -> Self {
        SyncError::Reorder(err)
    }
}

// === SettingsError ===

/// Errors related to settings management.
#[derive(Debug)]
pub enum SettingsError {
    /// An I/O error occurred while reading or writing settings.
    IoError(String),
    /// Failed to serialize or deserialize settings.
    SerializationError(String),
    /// The provided settings key is invalid.
    InvalidKey(String),
    /// The provided settings value is invalid.
    InvalidValue(String),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::IoError(msg) => write!(f, "Settings I/O error: {}", msg),
            SettingsError::SerializationError(msg) => {
                write!(f, "Settings serialization error: {}", msg)
            }
            SettingsError::InvalidKey(key) => write!(f, "Invalid settings key: {}", key),
            SettingsError::InvalidValue(msg) => {
                write!(f, "Invalid settings value: {}", msg)
            }
        }
    }
}

impl std::error::Error for SettingsError {}
