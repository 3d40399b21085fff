use crate::db::*;
use crate::error::{AppError, Result};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Arc;

/// Database wrapper for thread-safe access.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Open in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Initialize database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            -- Users table
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT UNIQUE NOT NULL,
                email TEXT,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'user',
                avatar_url TEXT,
                header_url TEXT,
                created_at INTEGER NOT NULL
            );

            -- Sessions table
            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            -- Library root directories
            CREATE TABLE IF NOT EXISTS library_paths (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT UNIQUE NOT NULL,
                created_at INTEGER NOT NULL
            );

            -- Cataloged volumes
            CREATE TABLE IF NOT EXISTS volumes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                file_path TEXT UNIQUE NOT NULL,
                thumbnail_path TEXT,
                author TEXT,
                library_path_id INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                FOREIGN KEY (library_path_id) REFERENCES library_paths(id) ON DELETE CASCADE
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at);
            CREATE INDEX IF NOT EXISTS idx_volumes_library ON volumes(library_path_id);
            "#,
        )
        .map_err(|e| AppError::Internal(format!("Failed to initialize schema: {}", e)))?;

        Ok(())
    }

    // ========== USER OPERATIONS ==========

    /// Create a new user. Returns the stored row.
    pub fn create_user(
        &self,
        username: &str,
        email: Option<&str>,
        password_hash: &str,
        role: &str,
    ) -> Result<User> {
        let conn = self.conn.lock();
        let now = now_timestamp();
        conn.execute(
            "INSERT INTO users (username, email, password_hash, role, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![username, email, password_hash, role, now],
        )
        .map_err(|e| {
            if e.to_string().contains("UNIQUE constraint") {
                AppError::Validation(format!("Username '{}' already exists", username))
            } else {
                AppError::Internal(format!("Failed to create user: {}", e))
            }
        })?;

        Ok(User {
            id: conn.last_insert_rowid(),
            username: username.to_string(),
            email: email.map(String::from),
            password_hash: password_hash.to_string(),
            role: role.to_string(),
            avatar_url: None,
            header_url: None,
            created_at: now,
        })
    }

    /// Get user by username.
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, username, email, password_hash, role, avatar_url, header_url, created_at
             FROM users WHERE username = ?1",
            params![username],
            Self::row_to_user,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get user: {}", e)))
    }

    /// Get user by ID.
    pub fn get_user_by_id(&self, id: i64) -> Result<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, username, email, password_hash, role, avatar_url, header_url, created_at
             FROM users WHERE id = ?1",
            params![id],
            Self::row_to_user,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get user: {}", e)))
    }

    /// Count all users. Zero means the instance has not been bootstrapped.
    pub fn count_users(&self) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .map_err(|e| AppError::Internal(format!("Failed to count users: {}", e)))
    }

    /// Update a user's avatar URL.
    pub fn update_user_avatar(&self, id: i64, avatar_url: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE users SET avatar_url = ?1 WHERE id = ?2",
            params![avatar_url, id],
        )
        .map_err(|e| AppError::Internal(format!("Failed to update avatar: {}", e)))?;
        Ok(())
    }

    /// Update a user's profile header URL.
    pub fn update_user_header(&self, id: i64, header_url: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE users SET header_url = ?1 WHERE id = ?2",
            params![header_url, id],
        )
        .map_err(|e| AppError::Internal(format!("Failed to update header: {}", e)))?;
        Ok(())
    }

    fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            role: row.get(4)?,
            avatar_url: row.get(5)?,
            header_url: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    // ========== SESSION OPERATIONS ==========

    /// Create session.
    pub fn create_session(&self, session: &Session) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
            params![session.token, session.user_id, session.expires_at],
        )
        .map_err(|e| AppError::Internal(format!("Failed to create session: {}", e)))?;
        Ok(())
    }

    /// Get session by token.
    pub fn get_session(&self, token: &str) -> Result<Option<Session>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT token, user_id, expires_at FROM sessions WHERE token = ?1",
            params![token],
            |row| {
                Ok(Session {
                    token: row.get(0)?,
                    user_id: row.get(1)?,
                    expires_at: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get session: {}", e)))
    }

    /// Delete session. Deleting an unknown token is not an error.
    pub fn delete_session(&self, token: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])
            .map_err(|e| AppError::Internal(format!("Failed to delete session: {}", e)))?;
        Ok(())
    }

    // ========== LIBRARY PATH OPERATIONS ==========

    /// Insert library paths, silently skipping paths that already exist.
    /// Returns the number of newly inserted rows.
    pub fn insert_library_paths(&self, paths: &[String]) -> Result<usize> {
        let conn = self.conn.lock();
        let now = now_timestamp();
        let mut inserted = 0;
        for path in paths {
            inserted += conn
                .execute(
                    "INSERT OR IGNORE INTO library_paths (path, created_at) VALUES (?1, ?2)",
                    params![path, now],
                )
                .map_err(|e| AppError::Internal(format!("Failed to insert library path: {}", e)))?;
        }
        Ok(inserted)
    }

    /// List all library paths.
    pub fn list_library_paths(&self) -> Result<Vec<LibraryPath>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT id, path, created_at FROM library_paths ORDER BY id")
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let paths = stmt
            .query_map([], |row| {
                Ok(LibraryPath {
                    id: row.get(0)?,
                    path: row.get(1)?,
                    created_at: row.get(2)?,
                })
            })
            .map_err(|e| AppError::Internal(format!("Failed to list library paths: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect library paths: {}", e)))?;

        Ok(paths)
    }

    // ========== VOLUME OPERATIONS ==========

    /// Insert or update a volume keyed by `file_path`, returning the stored
    /// row. A fresh insert has `created_at == updated_at`; an update keeps
    /// the original `created_at` and bumps only `updated_at`, so the caller
    /// can classify the write after the fact.
    pub fn upsert_volume(&self, volume: &NewVolume) -> Result<Volume> {
        let conn = self.conn.lock();
        let now = now_timestamp();
        conn.query_row(
            "INSERT INTO volumes (title, file_path, thumbnail_path, library_path_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT (file_path) DO UPDATE SET
                title = excluded.title,
                thumbnail_path = excluded.thumbnail_path,
                library_path_id = excluded.library_path_id,
                updated_at = excluded.updated_at
             RETURNING id, title, file_path, thumbnail_path, author, library_path_id, created_at, updated_at",
            params![
                volume.title,
                volume.file_path,
                volume.thumbnail_path,
                volume.library_path_id,
                now,
            ],
            Self::row_to_volume,
        )
        .map_err(|e| AppError::Internal(format!("Failed to upsert volume: {}", e)))
    }

    /// Get volume by ID.
    pub fn get_volume(&self, id: i64) -> Result<Option<Volume>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, title, file_path, thumbnail_path, author, library_path_id, created_at, updated_at
             FROM volumes WHERE id = ?1",
            params![id],
            Self::row_to_volume,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get volume: {}", e)))
    }

    /// List all volumes ordered by title.
    pub fn list_volumes(&self) -> Result<Vec<Volume>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, title, file_path, thumbnail_path, author, library_path_id, created_at, updated_at
                 FROM volumes ORDER BY title",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let volumes = stmt
            .query_map([], Self::row_to_volume)
            .map_err(|e| AppError::Internal(format!("Failed to list volumes: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect volumes: {}", e)))?;

        Ok(volumes)
    }

    fn row_to_volume(row: &rusqlite::Row<'_>) -> rusqlite::Result<Volume> {
        Ok(Volume {
            id: row.get(0)?,
            title: row.get(1)?,
            file_path: row.get(2)?,
            thumbnail_path: row.get(3)?,
            author: row.get(4)?,
            library_path_id: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    // ========== BOOTSTRAP ==========

    /// Create the first admin and the initial library paths atomically.
    ///
    /// The user-count check and both inserts share a single transaction
    /// behind the connection mutex, so two racing bootstrap calls cannot
    /// both succeed.
    pub fn complete_setup(
        &self,
        username: &str,
        email: Option<&str>,
        password_hash: &str,
        library_paths: &[String],
    ) -> Result<User> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Internal(format!("Failed to start transaction: {}", e)))?;

        let user_count: i64 = tx
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .map_err(|e| AppError::Internal(format!("Failed to count users: {}", e)))?;

        if user_count > 0 {
            return Err(AppError::Conflict(
                "Setup has already been completed.".to_string(),
            ));
        }

        let now = now_timestamp();
        tx.execute(
            "INSERT INTO users (username, email, password_hash, role, created_at)
             VALUES (?1, ?2, ?3, 'admin', ?4)",
            params![username, email, password_hash, now],
        )
        .map_err(|e| AppError::Internal(format!("Failed to create admin: {}", e)))?;
        let user_id = tx.last_insert_rowid();

        for path in library_paths {
            tx.execute(
                "INSERT OR IGNORE INTO library_paths (path, created_at) VALUES (?1, ?2)",
                params![path, now],
            )
            .map_err(|e| AppError::Internal(format!("Failed to insert library path: {}", e)))?;
        }

        tx.commit()
            .map_err(|e| AppError::Internal(format!("Failed to commit setup: {}", e)))?;

        Ok(User {
            id: user_id,
            username: username.to_string(),
            email: email.map(String::from),
            password_hash: password_hash.to_string(),
            role: "admin".to_string(),
            avatar_url: None,
            header_url: None,
            created_at: now,
        })
    }
}
