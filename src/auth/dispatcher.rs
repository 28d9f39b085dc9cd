//! Caller identity resolution.
//!
//! A request carrying the session cookie is judged by the session alone;
//! otherwise an `Authorization: Basic` header is checked against the user
//! table. Whichever scheme was tried decides the challenge sent back when
//! access needs a login: a redirect to the login page for sessions, a 401
//! with `WWW-Authenticate` for Basic.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use base64::prelude::{Engine as _, BASE64_STANDARD};
use std::convert::Infallible;
use tokio::sync::OnceCell;
use tracing::debug;

use super::{authenticate, validate_session};
use crate::app::AppState;
use crate::config::AppConfig;
use crate::database::models::ANONYMOUS;
use crate::error::ApiError;

/// Who is making the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Anonymous,
    User(String),
}

impl Identity {
    pub fn username(&self) -> &str {
        match self {
            Identity::Anonymous => ANONYMOUS,
            Identity::User(name) => name,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous)
    }
}

/// Response asking the client to log in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    Basic { realm: String },
    Login { location: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scheme {
    Session,
    Basic,
}

/// Credentials presented by the caller. Identity is resolved on first use
/// and memoized for the rest of the request.
#[derive(Debug)]
pub struct Caller {
    session: Option<String>,
    authorization: Option<String>,
    full_path: String,
    identity: OnceCell<Identity>,
}

impl Caller {
    pub fn new(session: Option<String>, authorization: Option<String>, full_path: impl Into<String>) -> Self {
        Self {
            session,
            authorization,
            full_path: full_path.into(),
            identity: OnceCell::new(),
        }
    }

    fn from_headers(headers: &HeaderMap, cookie_name: &str, full_path: &str) -> Self {
        let session = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(|cookies| cookie_value(cookies, cookie_name));
        let authorization = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        Self::new(session, authorization, full_path)
    }

    fn scheme(&self) -> Scheme {
        if self.session.is_some() {
            Scheme::Session
        } else {
            Scheme::Basic
        }
    }

    /// Resolve the caller, falling back to [`Identity::Anonymous`]
    pub async fn identity(&self, state: &AppState) -> Result<&Identity, ApiError> {
        self.identity.get_or_try_init(|| self.resolve(state)).await
    }

    async fn resolve(&self, state: &AppState) -> Result<Identity, ApiError> {
        let username = match self.scheme() {
            Scheme::Session => {
                let token = self.session.as_deref().unwrap_or_default();
                match validate_session(token, &state.config.security) {
                    Ok(claims) => match state.store.find_user(&claims.sub).await? {
                        Some(user) if user.username != ANONYMOUS => Some(user.username),
                        _ => None,
                    },
                    Err(e) => {
                        debug!("Session rejected: {}", e);
                        None
                    }
                }
            }
            Scheme::Basic => match self.authorization.as_deref().and_then(basic_credentials) {
                Some((user, password)) => authenticate(state.store.as_ref(), &user, &password).await?,
                None => None,
            },
        };

        let identity = username.map_or(Identity::Anonymous, Identity::User);
        debug!("Resolved caller {:?} via {:?}", identity, self.scheme());
        Ok(identity)
    }

    /// Challenge matching the scheme that was tried
    pub fn challenge(&self, config: &AppConfig) -> Challenge {
        match self.scheme() {
            Scheme::Session => {
                let next = url::form_urlencoded::Serializer::new(String::new())
                    .append_pair("next", &self.full_path)
                    .finish();
                Challenge::Login {
                    location: format!("{}?{}", config.security.login_url, next),
                }
            }
            Scheme::Basic => Challenge::Basic {
                realm: config.security.realm.clone(),
            },
        }
    }

    /// 401 (or login redirect) for this caller
    pub fn unauthorized(&self, config: &AppConfig) -> ApiError {
        ApiError::unauthorized("Authorization Required", self.challenge(config))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let full_path = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| parts.uri.path());
        Ok(Caller::from_headers(
            &parts.headers,
            &state.config.security.session_cookie,
            full_path,
        ))
    }
}

fn cookie_value(cookies: &str, name: &str) -> Option<String> {
    cookies.split(';').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key.trim() == name && !value.trim().is_empty()).then(|| value.trim().to_string())
    })
}

/// Decode `Basic base64(user:password)`
fn basic_credentials(header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = BASE64_STANDARD.decode(encoded.trim()).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (user, password) = text.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_named_cookie() {
        assert_eq!(cookie_value("a=1; sessionid=tok; b=2", "sessionid"), Some("tok".to_string()));
        assert_eq!(cookie_value("a=1", "sessionid"), None);
        assert_eq!(cookie_value("sessionid=", "sessionid"), None);
    }

    #[test]
    fn decodes_basic_header() {
        let header = format!("Basic {}", BASE64_STANDARD.encode("testuser:abc:123"));
        assert_eq!(
            basic_credentials(&header),
            Some(("testuser".to_string(), "abc:123".to_string()))
        );
        assert_eq!(basic_credentials("Bearer xyz"), None);
        assert_eq!(basic_credentials("Basic !!!"), None);
    }

    #[test]
    fn challenge_follows_scheme() {
        let config = AppConfig::development();

        let basic = Caller::new(None, None, "/TestProject/");
        assert_eq!(
            basic.challenge(&config),
            Challenge::Basic { realm: "Sumatra Server API".to_string() }
        );

        let session = Caller::new(Some("expired".into()), None, "/TestProject/?format=html");
        assert_eq!(
            session.challenge(&config),
            Challenge::Login {
                location: "/login?next=%2FTestProject%2F%3Fformat%3Dhtml".to_string()
            }
        );
    }

    #[test]
    fn anonymous_identity_uses_sentinel_name() {
        assert_eq!(Identity::Anonymous.username(), "anonymous");
        assert!(!Identity::User("testuser".into()).is_anonymous());
    }
}
