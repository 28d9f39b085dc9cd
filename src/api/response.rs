use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use super::media::MediaType;
use crate::error::ApiError;

/// A negotiated response body with its `Content-Type`
#[derive(Debug)]
pub struct Representation {
    pub status: StatusCode,
    pub content_type: String,
    pub body: String,
}

impl Representation {
    /// Serialize `data` as JSON, or call `html` when HTML was negotiated
    pub fn negotiated<T, F>(media: MediaType, product: &str, data: &T, html: F) -> Result<Self, ApiError>
    where
        T: Serialize + ?Sized,
        F: FnOnce() -> String,
    {
        let body = if media.is_html() {
            html()
        } else {
            serde_json::to_string(data).map_err(|e| {
                tracing::error!("Failed to serialize response data: {}", e);
                ApiError::internal_server_error("Failed to serialize response data")
            })?
        };
        Ok(Self {
            status: StatusCode::OK,
            content_type: media.content_type(product),
            body,
        })
    }

    pub fn html(body: String) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: "text/html; charset=utf-8".to_string(),
            body,
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }
}

impl IntoResponse for Representation {
    fn into_response(self) -> Response {
        match HeaderValue::from_str(&self.content_type) {
            Ok(content_type) => (self.status, [(header::CONTENT_TYPE, content_type)], self.body).into_response(),
            Err(_) => ApiError::internal_server_error("Invalid content type").into_response(),
        }
    }
}

/// Plain-text status response such as `201 Created` or `409 Conflict/Duplicate`
pub fn status_only(status: StatusCode, body: &'static str) -> Response {
    (status, body).into_response()
}
