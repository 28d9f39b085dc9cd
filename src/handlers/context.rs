use axum::http::{header, HeaderMap};
use serde::Deserialize;

use crate::api::media::{negotiate, MediaType, Resource};
use crate::config::AppConfig;
use crate::error::ApiError;

/// Query parameters shared by every negotiated resource
#[derive(Debug, Default, Deserialize)]
pub struct FormatQuery {
    pub format: Option<String>,
}

/// Project GET accepts a tag filter in addition to `format`
#[derive(Debug, Default, Deserialize)]
pub struct ProjectQuery {
    pub format: Option<String>,
    pub tags: Option<String>,
}

pub fn negotiate_for(
    resource: Resource,
    format: Option<&str>,
    headers: &HeaderMap,
    config: &AppConfig,
) -> Result<MediaType, ApiError> {
    let accept = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok());
    negotiate(resource, format, accept, &config.api.product)
}

/// `{scheme}://{host}{mount}`, the prefix of every absolute resource URI
pub fn base_uri(headers: &HeaderMap, config: &AppConfig) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or("localhost");
    format!("{}://{}{}", config.scheme(), host, config.api.mount)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Record labels in URLs: a word character followed by word characters, `|`, `-` or `.`
pub fn check_label(label: &str) -> Result<(), ApiError> {
    let mut chars = label.chars();
    let valid = chars.next().is_some_and(is_word_char)
        && chars.all(|c| is_word_char(c) || matches!(c, '|' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(ApiError::not_found(format!("No record resource at '{}'", label)))
    }
}
