mod common;

use anyhow::Result;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use serde_json::json;

use common::{
    basic_auth, body_json, get_anonymous, get_as_testuser, header_value, request, TestApp, BASE, OTHER_PASSWORD,
    OTHER_USER, TEST_PASSWORD, TEST_USER,
};
use sumatra_server::database::Store;

fn grant_form(project: &str, body: &str) -> Request<Body> {
    request("POST", &format!("/{}/permissions/", project))
        .header(header::AUTHORIZATION, basic_auth(TEST_USER, TEST_PASSWORD))
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn member_lists_permissions() -> Result<()> {
    let app = TestApp::new().await;

    let res = app.send(get_as_testuser("/TestProject2/permissions/")).await;
    assert_eq!(res.status(), StatusCode::OK);
    let data = body_json(res).await;
    assert_eq!(data["id"], "TestProject2");
    assert_eq!(data["access"], json!(["anonymous", TEST_USER]));
    Ok(())
}

#[tokio::test]
async fn non_members_cannot_list_permissions() -> Result<()> {
    let app = TestApp::new().await;

    // public read access does not extend to the permission list
    let res = app.send(get_anonymous("/TestProject2/permissions/")).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let req = request("GET", "/TestProject2/permissions/")
        .header(header::AUTHORIZATION, basic_auth(OTHER_USER, OTHER_PASSWORD))
        .body(Body::empty())?;
    let res = app.send(req).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn granting_access_redirects_to_project() -> Result<()> {
    let app = TestApp::new().await;

    let res = app.send(grant_form("TestProject", "user=otheruser")).await;
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(
        header_value(&res, header::LOCATION),
        Some(format!("{}TestProject/", BASE))
    );

    let access = app.store.project_access("TestProject").await?;
    assert!(access.contains(&OTHER_USER.to_string()));

    let req = request("GET", "/TestProject/haggling/")
        .header(header::AUTHORIZATION, basic_auth(OTHER_USER, OTHER_PASSWORD))
        .body(Body::empty())?;
    assert_eq!(app.send(req).await.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn granting_anonymous_makes_project_public() -> Result<()> {
    let app = TestApp::new().await;

    let req = request("POST", "/TestProject/permissions/")
        .header(header::AUTHORIZATION, basic_auth(TEST_USER, TEST_PASSWORD))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"user": "anonymous"}"#))?;
    let res = app.send(req).await;
    assert_eq!(res.status(), StatusCode::FOUND);

    let res = app.send(get_anonymous("/TestProject/haggling/")).await;
    assert_eq!(res.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn granting_twice_is_harmless() -> Result<()> {
    let app = TestApp::new().await;

    app.send(grant_form("TestProject", "user=otheruser")).await;
    let res = app.send(grant_form("TestProject", "user=otheruser")).await;
    assert_eq!(res.status(), StatusCode::FOUND);

    let access = app.store.project_access("TestProject").await?;
    assert_eq!(access.iter().filter(|u| *u == OTHER_USER).count(), 1);
    Ok(())
}

#[tokio::test]
async fn unknown_user_is_a_field_error() -> Result<()> {
    let app = TestApp::new().await;

    let res = app.send(grant_form("TestProject", "user=nobody")).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = body_json(res).await;
    assert!(body["field_errors"]["user"].is_string(), "{}", body);
    Ok(())
}

#[tokio::test]
async fn missing_user_is_a_field_error() -> Result<()> {
    let app = TestApp::new().await;

    let res = app.send(grant_form("TestProject", "")).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = body_json(res).await;
    assert_eq!(body["field_errors"]["user"], "This field is required.");
    Ok(())
}

#[tokio::test]
async fn non_member_cannot_grant() -> Result<()> {
    let app = TestApp::new().await;

    let req = request("POST", "/TestProject/permissions/")
        .header(header::AUTHORIZATION, basic_auth(OTHER_USER, OTHER_PASSWORD))
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("user=otheruser"))?;
    let res = app.send(req).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let access = app.store.project_access("TestProject").await?;
    assert!(!access.contains(&OTHER_USER.to_string()));
    Ok(())
}
