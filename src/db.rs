mod schema;

pub use schema::Database;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// User account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique user ID.
    pub id: i64,
    /// Username for login.
    pub username: String,
    /// Optional email address.
    pub email: Option<String>,
    /// Password hash (`hex(salt):hex(key)`).
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// User role: "admin" or "user".
    pub role: String,
    /// URL of the uploaded avatar image.
    pub avatar_url: Option<String>,
    /// URL of the uploaded profile header image.
    pub header_url: Option<String>,
    /// Account creation timestamp (ms).
    pub created_at: i64,
}

/// Authentication session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Opaque bearer token (256-bit, hex-encoded).
    pub token: String,
    /// User ID.
    pub user_id: i64,
    /// Expiration timestamp (ms).
    pub expires_at: i64,
}

/// Configured library root directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryPath {
    /// Unique library path ID.
    pub id: i64,
    /// Absolute path on the filesystem.
    pub path: String,
    /// Creation timestamp (ms).
    pub created_at: i64,
}

/// Cataloged comic/manga volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    /// Unique volume ID.
    pub id: i64,
    /// Title derived from the archive file name.
    pub title: String,
    /// Absolute path to the archive file; the idempotency key.
    pub file_path: String,
    /// Path to the generated cover thumbnail.
    pub thumbnail_path: Option<String>,
    /// Author, if known.
    pub author: Option<String>,
    /// Owning library path ID.
    pub library_path_id: i64,
    /// Creation timestamp (ms).
    pub created_at: i64,
    /// Last update timestamp (ms); equals `created_at` right after insert.
    pub updated_at: i64,
}

/// Fields for a volume upsert.
#[derive(Debug, Clone)]
pub struct NewVolume {
    /// Title derived from the archive file name.
    pub title: String,
    /// Absolute path to the archive file.
    pub file_path: String,
    /// Path to the generated cover thumbnail.
    pub thumbnail_path: String,
    /// Owning library path ID.
    pub library_path_id: i64,
}

/// Current timestamp in milliseconds.
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp_millis()
}
