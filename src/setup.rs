//! First-run bootstrap: admin account and library path validation.

use crate::auth;
use crate::db::{Database, User};
use crate::error::{AppError, Result};
use serde::Deserialize;
use std::path::Path;

/// Admin account payload submitted by the setup wizard.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminPayload {
    /// Username for the admin account.
    pub username: Option<String>,
    /// Optional email address.
    pub email: Option<String>,
    /// Password in clear text, hashed before storage.
    pub password: Option<String>,
}

/// Admin fields after validation and normalization.
#[derive(Debug, Clone)]
pub struct ValidatedAdmin {
    /// Trimmed, non-empty username.
    pub username: String,
    /// Trimmed email, `None` when blank.
    pub email: Option<String>,
    /// Password as submitted.
    pub password: String,
}

/// Validate the admin payload.
///
/// The username must be non-blank after trimming; a blank email is
/// normalized to `None`.
pub fn validate_admin(payload: &AdminPayload) -> Result<ValidatedAdmin> {
    let username = payload
        .username
        .as_deref()
        .unwrap_or("")
        .trim()
        .to_string();
    if username.is_empty() {
        return Err(AppError::Validation("Username is required.".to_string()));
    }

    let email = payload
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(String::from);

    Ok(ValidatedAdmin {
        username,
        email,
        password: payload.password.clone().unwrap_or_default(),
    })
}

/// Validate library paths: each must be a non-blank path naming an
/// existing directory. Returns the trimmed paths with duplicates removed,
/// first occurrence kept.
pub fn validate_library_paths(paths: &[String]) -> Result<Vec<String>> {
    if paths.is_empty() {
        return Err(AppError::Validation(
            "paths must be a non-empty array.".to_string(),
        ));
    }

    let mut validated = Vec::new();

    for raw in paths {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AppError::Validation("Path cannot be empty.".to_string()));
        }

        match std::fs::metadata(trimmed) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(AppError::Validation(format!(
                    "{} is not a directory.",
                    trimmed
                )));
            }
            Err(_) => {
                return Err(AppError::Validation(format!(
                    "{} does not exist on the filesystem.",
                    trimmed
                )));
            }
        }

        if !validated.iter().any(|p| p == trimmed) {
            validated.push(trimmed.to_string());
        }
    }

    Ok(validated)
}

/// Complete first-run setup: validate the payload, hash the admin password
/// and insert the admin plus all library paths atomically.
///
/// Fails with a conflict when any user already exists, so a second
/// bootstrap attempt can never add another admin.
pub fn complete_setup(
    db: &Database,
    admin: &AdminPayload,
    library_paths: &[String],
) -> Result<User> {
    let admin = validate_admin(admin)?;
    let paths = validate_library_paths(library_paths)?;
    let password_hash = auth::hash_password(&admin.password)?;

    db.complete_setup(&admin.username, admin.email.as_deref(), &password_hash, &paths)
}

/// A directory listing entry for the setup wizard's path browser.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    /// Entry name within its parent.
    pub name: String,
    /// Absolute path of the entry.
    pub full_path: String,
}

/// Listing of one directory, with its parent for upward navigation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DirectoryListing {
    /// The resolved directory that was listed.
    pub path: String,
    /// Parent directory, `None` at the filesystem root.
    pub parent: Option<String>,
    /// Subdirectories, unreadable entries skipped.
    pub directories: Vec<DirectoryEntry>,
}

/// List the subdirectories of `requested`, for the setup path browser.
///
/// Hidden directories are excluded. Entries that cannot be stat'ed are
/// skipped with a warning rather than failing the whole listing.
pub fn list_directories(requested: &str) -> Result<DirectoryListing> {
    let resolved = Path::new(requested)
        .canonicalize()
        .map_err(|_| AppError::Validation("Unable to access the requested path.".to_string()))?;

    let meta = std::fs::metadata(&resolved)
        .map_err(|_| AppError::Validation("Unable to access the requested path.".to_string()))?;
    if !meta.is_dir() {
        return Err(AppError::Validation("Path is not a directory.".to_string()));
    }

    let mut directories = Vec::new();
    let entries = std::fs::read_dir(&resolved)
        .map_err(|_| AppError::Validation("Unable to access the requested path.".to_string()))?;

    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "Unable to read directory entry");
                continue;
            }
        };
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        match entry.file_type() {
            Ok(ft) if ft.is_dir() => directories.push(DirectoryEntry {
                name,
                full_path: entry.path().to_string_lossy().to_string(),
            }),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(path = %entry.path().display(), error = %e, "Unable to stat entry");
            }
        }
    }

    directories.sort_by(|a, b| a.name.cmp(&b.name));

    let parent = resolved
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .filter(|p| !p.is_empty());

    Ok(DirectoryListing {
        path: resolved.to_string_lossy().to_string(),
        parent,
        directories,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_admin() {
        let payload = AdminPayload {
            username: Some("  admin  ".to_string()),
            email: Some("   ".to_string()),
            password: Some("secret".to_string()),
        };
        let admin = validate_admin(&payload).unwrap();

        assert_eq!(admin.username, "admin");
        assert_eq!(admin.email, None);
        assert_eq!(admin.password, "secret");
    }

    #[test]
    fn test_validate_admin_blank_username() {
        let payload = AdminPayload {
            username: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            validate_admin(&payload),
            Err(AppError::Validation(_))
        ));

        assert!(validate_admin(&AdminPayload::default()).is_err());
    }

    #[test]
    fn test_validate_library_paths_empty_array() {
        let err = validate_library_paths(&[]).unwrap_err();
        assert!(err.to_string().contains("non-empty array"));
    }

    #[test]
    fn test_validate_library_paths_blank_entry() {
        let err = validate_library_paths(&["   ".to_string(), "/tmp".to_string()]).unwrap_err();
        assert_eq!(err.to_string(), "Path cannot be empty.");
    }

    #[test]
    fn test_validate_library_paths_dedup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_string_lossy().to_string();

        let validated =
            validate_library_paths(&[format!("  {}  ", path), path.clone()]).unwrap();
        assert_eq!(validated, vec![path]);
    }

    #[test]
    fn test_validate_library_paths_rejects_files_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("note.txt");
        std::fs::write(&file, "x").unwrap();

        let err =
            validate_library_paths(&[file.to_string_lossy().to_string()]).unwrap_err();
        assert!(err.to_string().ends_with("is not a directory."));

        let missing = dir.path().join("nope");
        let err =
            validate_library_paths(&[missing.to_string_lossy().to_string()]).unwrap_err();
        assert!(err.to_string().ends_with("does not exist on the filesystem."));
    }

    #[test]
    fn test_list_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("b")).unwrap();
        std::fs::create_dir(dir.path().join("a")).unwrap();
        std::fs::create_dir(dir.path().join(".hidden")).unwrap();
        std::fs::write(dir.path().join("file.txt"), "x").unwrap();

        let listing = list_directories(&dir.path().to_string_lossy()).unwrap();
        let names: Vec<&str> = listing.directories.iter().map(|d| d.name.as_str()).collect();

        assert_eq!(names, vec!["a", "b"]);
        assert!(listing.parent.is_some());
    }
}
