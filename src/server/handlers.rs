//! HTTP request handlers.

use crate::archive;
use crate::auth;
use crate::db::User;
use crate::error::{AppError, Result};
use crate::library::ScanReport;
use crate::server::AppState;
use crate::setup::{self, AdminPayload, DirectoryListing};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

/// Maximum accepted upload size for profile images.
const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// MIME types accepted for profile image uploads.
const ALLOWED_UPLOAD_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];

/// Resolve the session cookie to a user, or fail with 401.
fn require_user(state: &AppState, headers: &HeaderMap) -> Result<User> {
    let token = auth::extract_session_cookie(headers).ok_or(AppError::Authentication)?;
    state
        .auth
        .resolve_token(&token)?
        .ok_or(AppError::Authentication)
}

// ============================================================================
// WEB PAGES
// ============================================================================

/// Index page (simple HTML).
pub async fn index(State(state): State<AppState>) -> Result<Html<String>> {
    let volume_count = state.db.list_volumes()?.len();
    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{title}</title>
    <style>
        body {{ font-family: system-ui, sans-serif; max-width: 600px; margin: 2rem auto; padding: 0 1rem; }}
        h1 {{ color: #333; }}
        a {{ color: #0066cc; }}
        .stats {{ background: #f5f5f5; padding: 1rem; border-radius: 8px; margin: 1rem 0; }}
        code {{ background: #e8e8e8; padding: 0.2rem 0.4rem; border-radius: 4px; }}
    </style>
</head>
<body>
    <h1>{title}</h1>
    <div class="stats">
        <p><strong>{volume_count}</strong> volumes in library</p>
    </div>
    <h2>API</h2>
    <ul>
        <li><a href="/api/manga">Volume list (JSON)</a></li>
        <li><code>POST /api/library/scan</code> to rescan library paths</li>
    </ul>
</body>
</html>"#,
        title = state.config.server.title,
        volume_count = volume_count,
    );

    Ok(Html(html))
}

/// Setup wizard page (simple HTML).
pub async fn setup_page(State(state): State<AppState>) -> Html<String> {
    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>Setup - {title}</title>
    <style>
        body {{ font-family: system-ui, sans-serif; max-width: 600px; margin: 2rem auto; padding: 0 1rem; }}
        code {{ background: #e8e8e8; padding: 0.2rem 0.4rem; border-radius: 4px; }}
    </style>
</head>
<body>
    <h1>First-run setup</h1>
    <p>No admin account exists yet. Create one by POSTing to
    <code>/api/setup/complete</code> with the admin credentials and at least
    one library path:</p>
    <pre><code>{{"admin": {{"username": "...", "password": "..."}}, "libraryPaths": ["/path/to/manga"]}}</code></pre>
    <p>Browse the server filesystem with <code>GET /api/fs/list?path=/</code>.</p>
</body>
</html>"#,
        title = state.config.server.title,
    );

    Html(html)
}

// ============================================================================
// AUTH API
// ============================================================================

/// Login request.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    username: Option<String>,
    password: Option<String>,
}

/// Public view of a user account.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    id: i64,
    username: String,
    role: String,
    avatar_url: Option<String>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            role: user.role,
            avatar_url: user.avatar_url,
        }
    }
}

/// Auth login. Sets the session cookie on success.
pub async fn auth_login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Response> {
    let username = req.username.as_deref().unwrap_or("");
    let password = req.password.as_deref().unwrap_or("");

    if username.is_empty() || password.is_empty() {
        return Err(AppError::Validation(
            "Username and password are required.".to_string(),
        ));
    }

    let (user, session) = state.auth.login(username, password)?;

    let cookie = auth::session_cookie(
        &session.token,
        state.auth.session_max_age_seconds(),
        state.config.server.secure_cookies,
    );

    let mut response = Json(UserResponse::from(user)).into_response();
    response.headers_mut().insert(
        header::SET_COOKIE,
        cookie
            .parse()
            .map_err(|_| AppError::Internal("Invalid cookie value".to_string()))?,
    );

    Ok(response)
}

/// Auth logout. Clears the session cookie; always succeeds.
pub async fn auth_logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response> {
    if let Some(token) = auth::extract_session_cookie(&headers) {
        state.auth.revoke(&token)?;
    }

    let cookie = auth::clear_session_cookie(state.config.server.secure_cookies);
    let mut response = Json(serde_json::json!({ "success": true })).into_response();
    response.headers_mut().insert(
        header::SET_COOKIE,
        cookie
            .parse()
            .map_err(|_| AppError::Internal("Invalid cookie value".to_string()))?,
    );

    Ok(response)
}

/// Current user from the session cookie.
pub async fn auth_me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserResponse>> {
    let user = require_user(&state, &headers)?;
    Ok(Json(UserResponse::from(user)))
}

// ============================================================================
// SETUP API
// ============================================================================

/// Setup status response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupStatusResponse {
    has_users: bool,
}

/// Whether the instance has been bootstrapped.
pub async fn setup_status(State(state): State<AppState>) -> Result<Json<SetupStatusResponse>> {
    let count = state.db.count_users()?;
    Ok(Json(SetupStatusResponse {
        has_users: count > 0,
    }))
}

/// Library paths request.
#[derive(Debug, Deserialize)]
pub struct LibraryPathsRequest {
    paths: Option<Vec<String>>,
}

/// Validate and persist library paths during setup.
pub async fn setup_library_paths(
    State(state): State<AppState>,
    Json(req): Json<LibraryPathsRequest>,
) -> Result<Json<serde_json::Value>> {
    let paths = setup::validate_library_paths(req.paths.as_deref().unwrap_or(&[]))?;
    state.db.insert_library_paths(&paths)?;

    Ok(Json(serde_json::json!({ "success": true })))
}

/// Setup completion request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupCompleteRequest {
    admin: Option<AdminPayload>,
    library_paths: Option<Vec<String>>,
}

/// Create the first admin and library paths.
pub async fn setup_complete(
    State(state): State<AppState>,
    Json(req): Json<SetupCompleteRequest>,
) -> Result<Json<serde_json::Value>> {
    let admin = req.admin.unwrap_or_default();
    let paths = req.library_paths.unwrap_or_default();

    setup::complete_setup(&state.db, &admin, &paths)?;

    Ok(Json(serde_json::json!({ "success": true })))
}

/// Query parameters for directory listing.
#[derive(Debug, Deserialize)]
pub struct FsListParams {
    path: Option<String>,
}

/// List server-side directories for the setup path browser.
pub async fn fs_list(Query(params): Query<FsListParams>) -> Result<Json<DirectoryListing>> {
    let requested = params.path.as_deref().unwrap_or("/");
    let listing = setup::list_directories(requested)?;
    Ok(Json(listing))
}

// ============================================================================
// MANGA API
// ============================================================================

/// Catalog entry for the library listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MangaResponse {
    id: i64,
    title: String,
    author: Option<String>,
    thumbnail_url: String,
    created_at: i64,
    updated_at: i64,
}

/// List all cataloged volumes, ordered by title.
pub async fn manga_list(State(state): State<AppState>) -> Result<Json<Vec<MangaResponse>>> {
    let volumes = state.db.list_volumes()?;
    let entries = volumes
        .into_iter()
        .map(|v| MangaResponse {
            thumbnail_url: format!("/api/thumbnail/{}", v.id),
            id: v.id,
            title: v.title,
            author: v.author,
            created_at: v.created_at,
            updated_at: v.updated_at,
        })
        .collect();

    Ok(Json(entries))
}

/// Page count response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageCountResponse {
    page_count: usize,
}

fn parse_manga_id(raw: &str) -> Result<i64> {
    raw.parse()
        .map_err(|_| AppError::Validation("Invalid manga id.".to_string()))
}

/// Number of pages in a volume's archive.
pub async fn manga_page_count(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PageCountResponse>> {
    let id = parse_manga_id(&id)?;
    let volume = state
        .db
        .get_volume(id)?
        .ok_or_else(|| AppError::NotFound("Manga not found.".to_string()))?;

    let entries = archive::list_image_entries(std::path::Path::new(&volume.file_path))
        .map_err(|e| AppError::Internal(format!("Unable to read manga pages: {}", e)))?;

    Ok(Json(PageCountResponse {
        page_count: entries.len(),
    }))
}

/// One page image from a volume's archive.
///
/// Pages are immutable for a given archive, so the response carries a
/// long-lived cache header.
pub async fn manga_page(
    State(state): State<AppState>,
    Path((id, page)): Path<(String, String)>,
) -> Result<Response<Body>> {
    let id: i64 = id
        .parse()
        .map_err(|_| AppError::Validation("Invalid request.".to_string()))?;
    let page_index: usize = page
        .parse()
        .map_err(|_| AppError::Validation("Invalid request.".to_string()))?;

    let volume = state
        .db
        .get_volume(id)?
        .ok_or_else(|| AppError::NotFound("Manga not found.".to_string()))?;

    let (data, mime_type) = archive::read_page(std::path::Path::new(&volume.file_path), page_index)
        .map_err(|e| match e {
            AppError::OutOfRange(_) => e,
            _ => AppError::NotFound("Unable to read requested page.".to_string()),
        })?;

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime_type)
        .header(header::CACHE_CONTROL, "public, max-age=31536000, immutable")
        .body(Body::from(data))
        .unwrap_or_else(|_| Response::default()))
}

// ============================================================================
// LIBRARY API
// ============================================================================

/// Scan all library paths and refresh the catalog.
pub async fn library_scan(State(state): State<AppState>) -> Result<Json<ScanReport>> {
    let scanner = state.scanner.clone();
    let report = tokio::task::spawn_blocking(move || scanner.scan())
        .await
        .map_err(|e| AppError::Internal(format!("Scan task failed: {}", e)))??;

    Ok(Json(report))
}

async fn thumbnail_response(state: &AppState, id: i64) -> Result<Response<Body>> {
    let volume = state
        .db
        .get_volume(id)?
        .ok_or_else(|| AppError::NotFound("Not found.".to_string()))?;

    let thumbnail_path = volume
        .thumbnail_path
        .ok_or_else(|| AppError::NotFound("Not found.".to_string()))?;

    let data = tokio::fs::read(&thumbnail_path).await?;

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "image/jpeg")
        .body(Body::from(data))
        .unwrap_or_else(|_| Response::default()))
}

/// Query parameters for the query-string thumbnail route.
#[derive(Debug, Deserialize)]
pub struct ThumbnailParams {
    id: Option<String>,
}

/// Cover thumbnail for a volume, id passed as a query parameter.
pub async fn thumbnail_by_query(
    State(state): State<AppState>,
    Query(params): Query<ThumbnailParams>,
) -> Result<Response<Body>> {
    let id = params
        .id
        .ok_or_else(|| AppError::Validation("Missing id.".to_string()))?;
    thumbnail_response(&state, parse_manga_id(&id)?).await
}

/// Cover thumbnail for a volume.
pub async fn thumbnail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response<Body>> {
    thumbnail_response(&state, parse_manga_id(&id)?).await
}

// ============================================================================
// PROFILE API
// ============================================================================

/// Pull the named file field out of a multipart body, enforcing the type
/// allow-list and size cap.
async fn read_upload_field(
    multipart: &mut Multipart,
    field_name: &str,
    missing_message: &str,
) -> Result<Vec<u8>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid upload: {}", e)))?
    {
        if field.name() != Some(field_name) {
            continue;
        }

        let content_type = field.content_type().unwrap_or("").to_lowercase();
        if !ALLOWED_UPLOAD_TYPES.contains(&content_type.as_str()) {
            return Err(AppError::Validation("Unsupported file type.".to_string()));
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Invalid upload: {}", e)))?;

        if data.len() > MAX_UPLOAD_BYTES {
            return Err(AppError::Validation("File is too large.".to_string()));
        }

        return Ok(data.to_vec());
    }

    Err(AppError::Validation(missing_message.to_string()))
}

/// Re-encode an uploaded image as a cover-cropped JPEG.
fn process_profile_image(data: &[u8], width: u32, height: u32, quality: u8) -> Result<Vec<u8>> {
    let img = image::load_from_memory(data)?;
    let resized = img
        .resize_to_fill(width, height, FilterType::Lanczos3)
        .into_rgb8();

    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, quality);
    resized.write_with_encoder(encoder)?;

    Ok(out)
}

/// Avatar upload response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarResponse {
    avatar_url: String,
}

/// Upload a new avatar for the current user.
pub async fn profile_avatar(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<AvatarResponse>> {
    let user = require_user(&state, &headers)?;
    let data = read_upload_field(&mut multipart, "avatar", "Avatar file is required.").await?;

    let processed = process_profile_image(&data, 512, 512, 90)?;

    let avatars_dir = state.config.storage.avatars_dir();
    tokio::fs::create_dir_all(&avatars_dir).await?;

    let file_name = format!("{}-{}.jpg", user.id, crate::db::now_timestamp());
    tokio::fs::write(avatars_dir.join(&file_name), processed).await?;

    let avatar_url = format!("/avatars/{}", file_name);
    state.db.update_user_avatar(user.id, &avatar_url)?;

    Ok(Json(AvatarResponse { avatar_url }))
}

/// Header upload response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderResponse {
    header_url: String,
}

/// Upload a new profile header image for the current user.
pub async fn profile_header(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<HeaderResponse>> {
    let user = require_user(&state, &headers)?;
    let data = read_upload_field(&mut multipart, "header", "Header image is required.").await?;

    let processed = process_profile_image(&data, 1600, 320, 90)
        .map_err(|e| AppError::Internal(format!("Unable to process header image: {}", e)))?;

    let headers_dir = state.config.storage.headers_dir();
    tokio::fs::create_dir_all(&headers_dir).await?;

    let file_name = format!("{}-header-{}.jpg", user.id, crate::db::now_timestamp());
    tokio::fs::write(headers_dir.join(&file_name), processed).await?;

    let header_url = format!("/headers/{}", file_name);
    state.db.update_user_header(user.id, &header_url)?;

    Ok(Json(HeaderResponse { header_url }))
}
