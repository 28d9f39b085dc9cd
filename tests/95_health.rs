mod common;

use anyhow::Result;
use axum::http::StatusCode;

use common::{body_json, get_anonymous, TestApp};

#[tokio::test]
async fn health_endpoint_responds() -> Result<()> {
    let app = TestApp::new().await;

    let res = app.send(get_anonymous("/health")).await;
    assert_eq!(res.status(), StatusCode::OK);

    let body = body_json(res).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "ok");
    assert!(body["version"].is_string());
    Ok(())
}
