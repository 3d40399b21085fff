//! HTTP server and routes.

mod handlers;
mod state;

pub use state::AppState;

use crate::db::Database;
use crate::error::Result;
use axum::{
    Router,
    extract::{DefaultBodyLimit, Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

/// Maximum request body size; profile image uploads are capped at 5 MB
/// with some headroom for multipart framing.
const MAX_BODY_BYTES: usize = 6 * 1024 * 1024;

/// Route prefixes that stay reachable before setup has completed.
const SETUP_EXEMPT_PREFIXES: [&str; 4] = ["/setup", "/api/setup", "/static", "/favicon"];

fn is_setup_exempt(path: &str) -> bool {
    SETUP_EXEMPT_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix))
}

/// Whether a request for `path` must be redirected to the setup wizard.
fn requires_setup_redirect(db: &Database, path: &str) -> Result<bool> {
    if is_setup_exempt(path) {
        return Ok(false);
    }
    Ok(db.count_users()? == 0)
}

/// Redirect every request to the setup wizard until the first admin exists.
async fn setup_gate(State(state): State<AppState>, request: Request, next: Next) -> Response {
    match requires_setup_redirect(&state.db, request.uri().path()) {
        Ok(true) => return Redirect::temporary("/setup").into_response(),
        Ok(false) => {}
        Err(e) => return e.into_response(),
    }

    next.run(request).await
}

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/login", post(handlers::auth_login))
        .route("/logout", post(handlers::auth_logout))
        .route("/me", get(handlers::auth_me));

    let setup_routes = Router::new()
        .route("/status", get(handlers::setup_status))
        .route("/library-paths", post(handlers::setup_library_paths))
        .route("/complete", post(handlers::setup_complete));

    let manga_routes = Router::new()
        .route("/", get(handlers::manga_list))
        .route("/{id}/pages", get(handlers::manga_page_count))
        .route("/{id}/pages/{page}", get(handlers::manga_page));

    let api_routes = Router::new()
        .route("/fs/list", get(handlers::fs_list))
        .route("/library/scan", post(handlers::library_scan))
        .route("/thumbnail", get(handlers::thumbnail_by_query))
        .route("/thumbnail/{id}", get(handlers::thumbnail))
        .route("/profile/avatar", post(handlers::profile_avatar))
        .route("/profile/header", post(handlers::profile_header));

    let avatars_dir = state.config.storage.avatars_dir();
    let headers_dir = state.config.storage.headers_dir();

    Router::new()
        .route("/", get(handlers::index))
        .route("/setup", get(handlers::setup_page))
        .nest("/api/auth", auth_routes)
        .nest("/api/setup", setup_routes)
        .nest("/api/manga", manga_routes)
        .nest("/api", api_routes)
        .nest_service("/avatars", ServeDir::new(avatars_dir))
        .nest_service("/headers", ServeDir::new(headers_dir))
        .layer(middleware::from_fn_with_state(state.clone(), setup_gate))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_exempt_prefixes() {
        assert!(is_setup_exempt("/setup"));
        assert!(is_setup_exempt("/api/setup/complete"));
        assert!(is_setup_exempt("/static/app.css"));
        assert!(is_setup_exempt("/favicon.ico"));

        assert!(!is_setup_exempt("/"));
        assert!(!is_setup_exempt("/api/manga"));
        assert!(!is_setup_exempt("/api/auth/login"));
    }

    #[test]
    fn test_gate_redirects_until_first_user() {
        let db = Database::open_memory().unwrap();

        assert!(requires_setup_redirect(&db, "/api/manga").unwrap());
        assert!(!requires_setup_redirect(&db, "/api/setup/status").unwrap());
        assert!(!requires_setup_redirect(&db, "/setup").unwrap());

        db.create_user("admin", None, "hash", "admin").unwrap();
        assert!(!requires_setup_redirect(&db, "/api/manga").unwrap());
    }
}
