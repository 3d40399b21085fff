use crate::archive;
use crate::auth::{self, AuthService};
use crate::db::{Database, NewVolume, Session, now_timestamp};
use crate::library::Scanner;
use std::io::Write;
use std::path::{Path, PathBuf};

fn test_db() -> Database {
    Database::open_memory().unwrap()
}

fn create_user(db: &Database, username: &str, password: &str) -> i64 {
    let hash = auth::hash_password(password).unwrap();
    let user = db.create_user(username, None, &hash, "user").unwrap();
    user.id
}

/// Write a CBZ with the given (entry name, bytes) pairs.
fn make_cbz(path: &Path, entries: &[(&str, &[u8])]) {
    let file = std::fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();

    for (name, data) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }

    writer.finish().unwrap();
}

/// A small real PNG so thumbnail generation can decode it.
fn png_bytes() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(4, 4, image::Rgb([180, 40, 40]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

// ============================================================================
// DATABASE
// ============================================================================

#[test]
fn db_create_and_get_user() {
    let db = test_db();
    let user = db
        .create_user("alice", Some("alice@example.com"), "hash", "admin")
        .unwrap();

    let found = db.get_user_by_username("alice").unwrap().unwrap();
    assert_eq!(found.id, user.id);
    assert_eq!(found.email.as_deref(), Some("alice@example.com"));
    assert_eq!(found.role, "admin");

    let found_by_id = db.get_user_by_id(user.id).unwrap().unwrap();
    assert_eq!(found_by_id.username, "alice");

    assert!(db.get_user_by_username("nobody").unwrap().is_none());
}

#[test]
fn db_duplicate_username_fails() {
    let db = test_db();
    db.create_user("alice", None, "hash", "user").unwrap();
    assert!(db.create_user("alice", None, "hash2", "user").is_err());
    assert_eq!(db.count_users().unwrap(), 1);
}

#[test]
fn db_update_profile_images() {
    let db = test_db();
    let id = create_user(&db, "alice", "pw");

    db.update_user_avatar(id, "/avatars/1-1.jpg").unwrap();
    db.update_user_header(id, "/headers/1-header-1.jpg").unwrap();

    let user = db.get_user_by_id(id).unwrap().unwrap();
    assert_eq!(user.avatar_url.as_deref(), Some("/avatars/1-1.jpg"));
    assert_eq!(user.header_url.as_deref(), Some("/headers/1-header-1.jpg"));
}

#[test]
fn db_session_lifecycle() {
    let db = test_db();
    let user_id = create_user(&db, "alice", "pw");

    let session = Session {
        token: "tok".to_string(),
        user_id,
        expires_at: now_timestamp() + 10_000,
    };
    db.create_session(&session).unwrap();

    let found = db.get_session("tok").unwrap().unwrap();
    assert_eq!(found.user_id, user_id);

    db.delete_session("tok").unwrap();
    assert!(db.get_session("tok").unwrap().is_none());

    // Deleting again is a no-op
    db.delete_session("tok").unwrap();
}

#[test]
fn db_library_paths_skip_duplicates() {
    let db = test_db();
    let inserted = db
        .insert_library_paths(&["/a".to_string(), "/b".to_string()])
        .unwrap();
    assert_eq!(inserted, 2);

    let inserted = db
        .insert_library_paths(&["/b".to_string(), "/c".to_string()])
        .unwrap();
    assert_eq!(inserted, 1);

    let paths = db.list_library_paths().unwrap();
    let names: Vec<&str> = paths.iter().map(|p| p.path.as_str()).collect();
    assert_eq!(names, vec!["/a", "/b", "/c"]);
}

#[test]
fn db_upsert_volume_keyed_by_file_path() {
    let db = test_db();
    db.insert_library_paths(&["/lib".to_string()]).unwrap();
    let library_path_id = db.list_library_paths().unwrap()[0].id;

    let new = NewVolume {
        title: "Vol 1".to_string(),
        file_path: "/lib/vol1.cbz".to_string(),
        thumbnail_path: "/thumbs/vol1.jpg".to_string(),
        library_path_id,
    };

    let first = db.upsert_volume(&new).unwrap();
    assert_eq!(first.created_at, first.updated_at);

    // Same key a moment later updates in place
    std::thread::sleep(std::time::Duration::from_millis(5));
    let second = db
        .upsert_volume(&NewVolume {
            title: "Vol 1 (renamed)".to_string(),
            ..new.clone()
        })
        .unwrap();

    assert_eq!(second.id, first.id);
    assert_eq!(second.title, "Vol 1 (renamed)");
    assert_eq!(second.created_at, first.created_at);
    assert!(second.updated_at > second.created_at);

    assert_eq!(db.list_volumes().unwrap().len(), 1);
}

#[test]
fn db_list_volumes_ordered_by_title() {
    let db = test_db();
    db.insert_library_paths(&["/lib".to_string()]).unwrap();
    let library_path_id = db.list_library_paths().unwrap()[0].id;

    for (title, path) in [("Beta", "/lib/b.cbz"), ("Alpha", "/lib/a.cbz")] {
        db.upsert_volume(&NewVolume {
            title: title.to_string(),
            file_path: path.to_string(),
            thumbnail_path: String::new(),
            library_path_id,
        })
        .unwrap();
    }

    let titles: Vec<String> = db
        .list_volumes()
        .unwrap()
        .into_iter()
        .map(|v| v.title)
        .collect();
    assert_eq!(titles, vec!["Alpha", "Beta"]);
}

// ============================================================================
// AUTH
// ============================================================================

#[test]
fn auth_login_and_resolve() {
    let db = test_db();
    create_user(&db, "alice", "secret");
    let auth = AuthService::new(db.clone(), 7);

    let (user, session) = auth.login("alice", "secret").unwrap();
    assert_eq!(user.username, "alice");

    let resolved = auth.resolve_token(&session.token).unwrap().unwrap();
    assert_eq!(resolved.id, user.id);

    assert!(auth.login("alice", "wrong").is_err());
    assert!(auth.login("nobody", "secret").is_err());
}

#[test]
fn auth_expired_session_deleted_lazily() {
    let db = test_db();
    let user_id = create_user(&db, "alice", "pw");
    let auth = AuthService::new(db.clone(), 7);

    db.create_session(&Session {
        token: "old".to_string(),
        user_id,
        expires_at: now_timestamp() - 1,
    })
    .unwrap();

    assert!(auth.resolve_token("old").unwrap().is_none());
    // First resolution removed the row
    assert!(db.get_session("old").unwrap().is_none());
    assert!(auth.resolve_token("old").unwrap().is_none());
}

#[test]
fn auth_revoke_unknown_token_is_noop() {
    let db = test_db();
    let auth = AuthService::new(db, 7);
    auth.revoke("never-issued").unwrap();
}

// ============================================================================
// SETUP
// ============================================================================

#[test]
fn setup_complete_creates_admin_and_paths() {
    let db = test_db();
    let dir = tempfile::tempdir().unwrap();
    let admin = crate::setup::AdminPayload {
        username: Some("admin".to_string()),
        email: None,
        password: Some("secret".to_string()),
    };

    let user = crate::setup::complete_setup(
        &db,
        &admin,
        &[dir.path().to_string_lossy().to_string()],
    )
    .unwrap();

    assert_eq!(user.role, "admin");
    assert_eq!(db.count_users().unwrap(), 1);
    assert_eq!(db.list_library_paths().unwrap().len(), 1);

    // The stored hash verifies the original password
    let stored = db.get_user_by_username("admin").unwrap().unwrap();
    assert!(auth::verify_password("secret", &stored.password_hash));
}

#[test]
fn setup_complete_rejects_second_bootstrap() {
    let db = test_db();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().to_string_lossy().to_string();
    let admin = crate::setup::AdminPayload {
        username: Some("admin".to_string()),
        email: None,
        password: Some("secret".to_string()),
    };

    crate::setup::complete_setup(&db, &admin, &[path.clone()]).unwrap();

    let second = crate::setup::AdminPayload {
        username: Some("intruder".to_string()),
        email: None,
        password: Some("pw".to_string()),
    };
    let err = crate::setup::complete_setup(&db, &second, &[path]).unwrap_err();
    assert!(err.to_string().contains("already been completed"));

    // Nothing was added
    assert_eq!(db.count_users().unwrap(), 1);
    assert!(db.get_user_by_username("intruder").unwrap().is_none());
}

// ============================================================================
// ARCHIVE
// ============================================================================

#[test]
fn archive_lists_images_in_lexicographic_order() {
    let dir = tempfile::tempdir().unwrap();
    let cbz = dir.path().join("vol.cbz");
    make_cbz(
        &cbz,
        &[
            ("b.jpg", b"jpg-bytes".as_slice()),
            ("readme.txt", b"not a page"),
            ("a.png", b"png-bytes"),
            ("__MACOSX/._a.png", b"junk"),
            ("c.gif", b"gif-bytes"),
        ],
    );

    let entries = archive::list_image_entries(&cbz).unwrap();
    assert_eq!(entries, vec!["a.png", "b.jpg", "c.gif"]);
}

#[test]
fn archive_read_page_bytes_and_mime() {
    let dir = tempfile::tempdir().unwrap();
    let cbz = dir.path().join("vol.cbz");
    make_cbz(
        &cbz,
        &[("02.jpg", b"second".as_slice()), ("01.png", b"first")],
    );

    let (data, mime) = archive::read_page(&cbz, 0).unwrap();
    assert_eq!(data, b"first");
    assert_eq!(mime, "image/png");

    let (data, mime) = archive::read_page(&cbz, 1).unwrap();
    assert_eq!(data, b"second");
    assert_eq!(mime, "image/jpeg");
}

#[test]
fn archive_read_page_out_of_range() {
    let dir = tempfile::tempdir().unwrap();
    let cbz = dir.path().join("vol.cbz");
    make_cbz(&cbz, &[("01.png", b"first".as_slice())]);

    let err = archive::read_page(&cbz, 1).unwrap_err();
    assert!(matches!(err, crate::AppError::OutOfRange(1)));
}

#[test]
fn archive_without_images_has_no_pages() {
    let dir = tempfile::tempdir().unwrap();
    let cbz = dir.path().join("vol.cbz");
    make_cbz(&cbz, &[("notes.txt", b"text only".as_slice())]);

    assert!(archive::list_image_entries(&cbz).unwrap().is_empty());
    assert!(archive::cover_image(&cbz).is_err());
}

// ============================================================================
// SCANNER
// ============================================================================

fn scan_fixture(db: &Database) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let library = dir.path().join("library");
    let thumbs = dir.path().join("thumbs");
    std::fs::create_dir_all(&library).unwrap();

    make_cbz(
        &library.join("Vol 01.cbz"),
        &[("001.png", png_bytes().as_slice())],
    );
    // Not a valid zip; the scanner must skip it and keep going
    std::fs::write(library.join("broken.cbz"), b"garbage").unwrap();

    db.insert_library_paths(&[library.to_string_lossy().to_string()])
        .unwrap();

    (dir, thumbs)
}

#[test]
fn scanner_creates_then_updates() {
    let db = test_db();
    let (_dir, thumbs) = scan_fixture(&db);
    let scanner = Scanner::new(db.clone(), thumbs.clone());

    let report = scanner.scan().unwrap();
    assert_eq!(report.found, 2);
    assert_eq!(report.created, 1);
    assert_eq!(report.updated_thumbs, 0);

    let volumes = db.list_volumes().unwrap();
    assert_eq!(volumes.len(), 1);
    assert_eq!(volumes[0].title, "Vol 01");
    assert!(thumbs.join("Vol 01.jpg").exists());

    // Rescan is idempotent: same file counts as a thumbnail refresh
    std::thread::sleep(std::time::Duration::from_millis(5));
    let report = scanner.scan().unwrap();
    assert_eq!(report.found, 2);
    assert_eq!(report.created, 0);
    assert_eq!(report.updated_thumbs, 1);
    assert_eq!(db.list_volumes().unwrap().len(), 1);
}

#[test]
fn scanner_missing_library_path_aborts() {
    let db = test_db();
    db.insert_library_paths(&["/does/not/exist".to_string()])
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let scanner = Scanner::new(db, dir.path().join("thumbs"));
    assert!(scanner.scan().is_err());
}

#[test]
fn scan_report_serializes_camel_case() {
    let report = crate::library::ScanReport {
        found: 3,
        created: 2,
        updated_thumbs: 1,
    };
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["found"], 3);
    assert_eq!(json["created"], 2);
    assert_eq!(json["updatedThumbs"], 1);
}

#[test]
fn scanner_generated_thumbnail_is_jpeg() {
    let db = test_db();
    let (_dir, thumbs) = scan_fixture(&db);
    let scanner = Scanner::new(db, thumbs.clone());
    scanner.scan().unwrap();

    let data = std::fs::read(thumbs.join("Vol 01.jpg")).unwrap();
    let img = image::load_from_memory(&data).unwrap();
    assert_eq!(img.width(), 300);
    assert_eq!(img.height(), 400);
}
