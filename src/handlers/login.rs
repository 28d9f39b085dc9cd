use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::api::response::Representation;
use crate::app::AppState;
use crate::auth::{authenticate, issue_session, SessionError};
use crate::error::ApiError;

#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    pub next: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub next: Option<String>,
}

/// Only same-site paths are followed after login
fn safe_next(next: Option<&str>) -> String {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path.to_string(),
        _ => "/".to_string(),
    }
}

fn parse_form(headers: &HeaderMap, body: &Bytes) -> Result<LoginForm, ApiError> {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("json"));
    if is_json {
        return serde_json::from_slice(body).map_err(|e| ApiError::invalid_json(format!("Invalid JSON body: {}", e)));
    }
    let mut form = LoginForm::default();
    for (key, value) in url::form_urlencoded::parse(body) {
        match key.as_ref() {
            "username" => form.username = value.into_owned(),
            "password" => form.password = value.into_owned(),
            "next" => form.next = Some(value.into_owned()),
            _ => {}
        }
    }
    Ok(form)
}

fn session_cookie(name: &str, value: &str, max_age: u64, secure: bool) -> String {
    let mut cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}", name, value, max_age);
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// GET /login
pub async fn form(State(state): State<AppState>, Query(query): Query<LoginQuery>) -> Representation {
    let next = safe_next(query.next.as_deref());
    Representation::html(state.renderer.login(&next, None))
}

/// POST /login - verify credentials, set the session cookie and redirect
pub async fn submit(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Response, ApiError> {
    let form = parse_form(&headers, &body)?;
    let next = safe_next(form.next.as_deref());

    let username = match authenticate(state.store.as_ref(), &form.username, &form.password).await? {
        Some(username) => username,
        None => {
            warn!("Failed login for '{}'", form.username);
            let page = state.renderer.login(&next, Some("Please enter a correct username and password."));
            return Ok(Representation::html(page).with_status(StatusCode::UNAUTHORIZED).into_response());
        }
    };

    let security = &state.config.security;
    let token = issue_session(&username, security).map_err(|e| match e {
        SessionError::MissingSecret => {
            tracing::error!("Login attempted without a configured session secret");
            ApiError::service_unavailable("Sessions are not configured")
        }
        other => ApiError::internal_server_error(other.to_string()),
    })?;
    let cookie = session_cookie(
        &security.session_cookie,
        &token,
        security.session_expiry_hours * 3600,
        security.require_https,
    );

    info!("User '{}' logged in", username);
    Ok((StatusCode::FOUND, [(header::SET_COOKIE, cookie), (header::LOCATION, next)]).into_response())
}

/// POST /logout - clear the session cookie
pub async fn logout(State(state): State<AppState>) -> Response {
    let security = &state.config.security;
    let cookie = session_cookie(&security.session_cookie, "", 0, security.require_https);
    (StatusCode::FOUND, [(header::SET_COOKIE, cookie), (header::LOCATION, "/".to_string())]).into_response()
}
