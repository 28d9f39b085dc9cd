pub mod dispatcher;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SecurityConfig;
use crate::database::models::{User, ANONYMOUS};
use crate::database::store::{Store, StoreError};

pub use dispatcher::{Caller, Challenge, Identity};

/// Session token claims; `sub` is the username
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(username: impl Into<String>, expiry_hours: u64) -> Self {
        let now = Utc::now();
        Self {
            sub: username.into(),
            exp: (now + Duration::hours(expiry_hours as i64)).timestamp(),
            iat: now.timestamp(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session secret not configured")]
    MissingSecret,

    #[error("Invalid session token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

/// Sign a session token for `username`
pub fn issue_session(username: &str, security: &SecurityConfig) -> Result<String, SessionError> {
    if security.jwt_secret.is_empty() {
        return Err(SessionError::MissingSecret);
    }
    let claims = Claims::new(username, security.session_expiry_hours);
    let key = EncodingKey::from_secret(security.jwt_secret.as_bytes());
    Ok(encode(&Header::default(), &claims, &key)?)
}

/// Verify signature and expiry of a session token
pub fn validate_session(token: &str, security: &SecurityConfig) -> Result<Claims, SessionError> {
    if security.jwt_secret.is_empty() {
        return Err(SessionError::MissingSecret);
    }
    let key = DecodingKey::from_secret(security.jwt_secret.as_bytes());
    let data = decode::<Claims>(token, &key, &Validation::default())?;
    Ok(data.claims)
}

/// bcrypt hash of `password` with a fresh salt
pub fn hash_password(password: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, cost)
}

/// Unreadable stored hashes never match
pub fn verify_password(password: &str, stored: &str) -> bool {
    match bcrypt::verify(password, stored) {
        Ok(matches) => matches,
        Err(e) => {
            tracing::warn!("Stored password hash is unusable: {}", e);
            false
        }
    }
}

/// Build a user with a freshly salted password hash
pub fn new_user(username: &str, password: &str, cost: u32) -> Result<User, bcrypt::BcryptError> {
    Ok(User {
        username: username.to_string(),
        password_hash: hash_password(password, cost)?,
    })
}

/// Check a username / password pair against the user table.
/// The anonymous user never authenticates.
pub async fn authenticate(store: &dyn Store, username: &str, password: &str) -> Result<Option<String>, StoreError> {
    if username == ANONYMOUS {
        return Ok(None);
    }
    let user = match store.find_user(username).await? {
        Some(user) => user,
        None => return Ok(None),
    };
    if verify_password(password, &user.password_hash) {
        Ok(Some(user.username))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::database::memory::MemoryStore;

    #[test]
    fn password_hash_round_trip() {
        let stored = hash_password("abc123", 4 /* bcrypt minimum cost; bcrypt::MIN_COST is private */).unwrap();
        assert!(stored.starts_with("$2"));
        assert!(verify_password("abc123", &stored));
        assert!(!verify_password("abc124", &stored));
        assert!(!verify_password("", ""));
    }

    #[test]
    fn hashes_are_salted() {
        assert_ne!(
            hash_password("abc123", 4 /* bcrypt minimum cost; bcrypt::MIN_COST is private */).unwrap(),
            hash_password("abc123", 4 /* bcrypt minimum cost; bcrypt::MIN_COST is private */).unwrap()
        );
    }

    #[test]
    fn old_digest_format_is_refused() {
        assert!(!verify_password("abc123", "sha256$salt$6ca13d52ca70c883e0f0bb101e425a89e8624de51db2d2392593af6a84118090"));
    }

    #[test]
    fn session_round_trip() {
        let security = AppConfig::development().security;
        let token = issue_session("testuser", &security).unwrap();
        let claims = validate_session(&token, &security).unwrap();
        assert_eq!(claims.sub, "testuser");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn session_rejects_other_secret() {
        let security = AppConfig::development().security;
        let token = issue_session("testuser", &security).unwrap();
        let mut other = security.clone();
        other.jwt_secret = "another-secret".into();
        assert!(matches!(validate_session(&token, &other), Err(SessionError::Token(_))));
    }

    #[test]
    fn session_requires_secret() {
        let mut security = AppConfig::development().security;
        security.jwt_secret.clear();
        assert!(matches!(issue_session("testuser", &security), Err(SessionError::MissingSecret)));
    }

    #[tokio::test]
    async fn authenticate_checks_password_and_anonymous() {
        let store = MemoryStore::new();
        store.create_user(new_user("testuser", "abc123", 4 /* bcrypt minimum cost; bcrypt::MIN_COST is private */).unwrap()).await.unwrap();
        assert_eq!(
            authenticate(&store, "testuser", "abc123").await.unwrap(),
            Some("testuser".to_string())
        );
        assert_eq!(authenticate(&store, "testuser", "wrong").await.unwrap(), None);
        assert_eq!(authenticate(&store, "nobody", "abc123").await.unwrap(), None);
        assert_eq!(authenticate(&store, ANONYMOUS, "").await.unwrap(), None);
    }
}
