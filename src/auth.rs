//! Password hashing, session tokens and cookie handling.

use crate::db::{Database, Session, User, now_timestamp};
use crate::error::{AppError, Result};
use argon2::Argon2;
use argon2::password_hash::rand_core::{OsRng, RngCore};
use axum::http::{HeaderMap, header};
use subtle::ConstantTimeEq;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "tanko_session";

const SALT_LEN: usize = 16;
const KEY_LEN: usize = 64;
const TOKEN_LEN: usize = 32;

/// Hash a password with a fresh random salt.
///
/// The result is `hex(salt):hex(key)` where the key is derived with Argon2.
pub fn hash_password(password: &str) -> Result<String> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);

    let mut key = [0u8; KEY_LEN];
    Argon2::default()
        .hash_password_into(password.as_bytes(), &salt, &mut key)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;

    Ok(format!("{}:{}", hex::encode(salt), hex::encode(key)))
}

/// Verify a password against a stored hash.
///
/// Fails closed: a malformed stored hash verifies as `false` rather than
/// erroring. The key comparison is constant-time.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Some((salt_hex, key_hex)) = stored_hash.split_once(':') else {
        return false;
    };
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    let Ok(stored_key) = hex::decode(key_hex) else {
        return false;
    };

    let mut derived = [0u8; KEY_LEN];
    if Argon2::default()
        .hash_password_into(password.as_bytes(), &salt, &mut derived)
        .is_err()
    {
        return false;
    }

    if derived.len() != stored_key.len() {
        return false;
    }

    derived.ct_eq(stored_key.as_slice()).into()
}

/// Generate a secure random session token (256-bit, hex-encoded).
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_LEN];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Build the `Set-Cookie` value for a new session.
pub fn session_cookie(token: &str, max_age_seconds: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
        SESSION_COOKIE, token, max_age_seconds
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Build the `Set-Cookie` value that clears the session cookie.
pub fn clear_session_cookie(secure: bool) -> String {
    session_cookie("", 0, secure)
}

/// Extract the session token from the `Cookie` request header.
pub fn extract_session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .find_map(|cookie| {
            let (name, value) = cookie.trim().split_once('=')?;
            if name == SESSION_COOKIE {
                Some(value.to_string())
            } else {
                None
            }
        })
}

/// Authentication service.
pub struct AuthService {
    db: Database,
    session_duration_days: u32,
}

impl AuthService {
    /// Create a new auth service.
    pub fn new(db: Database, session_duration_days: u32) -> Self {
        Self {
            db,
            session_duration_days,
        }
    }

    /// Session lifetime in seconds.
    pub fn session_max_age_seconds(&self) -> i64 {
        self.session_duration_days as i64 * 24 * 60 * 60
    }

    /// Check credentials and create a session on success.
    pub fn login(&self, username: &str, password: &str) -> Result<(User, Session)> {
        let user = self
            .db
            .get_user_by_username(username)?
            .ok_or(AppError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash) {
            return Err(AppError::InvalidCredentials);
        }

        let session = self.create_session(user.id)?;
        Ok((user, session))
    }

    /// Create a session for a user.
    pub fn create_session(&self, user_id: i64) -> Result<Session> {
        let session = Session {
            token: generate_token(),
            user_id,
            expires_at: now_timestamp() + self.session_max_age_seconds() * 1000,
        };
        self.db.create_session(&session)?;
        Ok(session)
    }

    /// Resolve a session token to its user.
    ///
    /// Expired sessions are deleted on first access (lazy expiry); there is
    /// no background sweep.
    pub fn resolve_token(&self, token: &str) -> Result<Option<User>> {
        let session = match self.db.get_session(token)? {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.expires_at < now_timestamp() {
            self.db.delete_session(token)?;
            return Ok(None);
        }

        self.db.get_user_by_id(session.user_id)
    }

    /// Delete a session. Revoking an unknown token is a no-op.
    pub fn revoke(&self, token: &str) -> Result<()> {
        self.db.delete_session(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_and_verify() {
        let hash = hash_password("secret").unwrap();

        assert!(verify_password("secret", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn test_hash_format() {
        let hash = hash_password("secret").unwrap();
        let (salt, key) = hash.split_once(':').unwrap();

        assert_eq!(salt.len(), SALT_LEN * 2);
        assert_eq!(key.len(), KEY_LEN * 2);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() || c == ':'));
    }

    #[test]
    fn test_verify_malformed_hash_fails_closed() {
        assert!(!verify_password("secret", "no-separator-here"));
        assert!(!verify_password("secret", "zz:zz"));
        assert!(!verify_password("secret", "deadbeef:"));
        assert!(!verify_password("secret", ""));
    }

    #[test]
    fn test_generate_token() {
        let token1 = generate_token();
        let token2 = generate_token();

        assert_eq!(token1.len(), 64); // Hex of 32 bytes
        assert!(token1.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token1, token2);
    }

    #[test]
    fn test_session_cookie_flags() {
        let cookie = session_cookie("abc", 604800, false);
        assert_eq!(
            cookie,
            "tanko_session=abc; Path=/; Max-Age=604800; HttpOnly; SameSite=Lax"
        );
        assert!(session_cookie("abc", 604800, true).ends_with("; Secure"));
    }

    #[test]
    fn test_extract_session_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            "theme=dark; tanko_session=tok123; other=1".parse().unwrap(),
        );
        assert_eq!(extract_session_cookie(&headers), Some("tok123".to_string()));

        let empty = HeaderMap::new();
        assert_eq!(extract_session_cookie(&empty), None);
    }
}
