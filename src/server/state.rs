//! Application state shared across handlers.

use crate::auth::AuthService;
use crate::config::Config;
use crate::db::Database;
use crate::library::Scanner;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<Config>,
    /// Database connection.
    pub db: Database,
    /// Authentication service.
    pub auth: Arc<AuthService>,
    /// Library scanner.
    pub scanner: Arc<Scanner>,
}

impl AppState {
    /// Create new application state.
    pub fn new(config: Config, db: Database) -> Self {
        let auth = AuthService::new(db.clone(), config.auth.session_days);
        let scanner = Scanner::new(db.clone(), config.storage.thumbnails_dir.clone());

        Self {
            config: Arc::new(config),
            db,
            auth: Arc::new(auth),
            scanner: Arc::new(scanner),
        }
    }
}
