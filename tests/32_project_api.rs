mod common;

use anyhow::Result;
use axum::{
    body::Body,
    http::{header, StatusCode},
};
use serde_json::json;

use common::{
    basic_auth, body_json, get_anonymous, get_as_testuser, put_json_as, put_json_as_testuser, request, TestApp,
    BASE, OTHER_PASSWORD, OTHER_USER, TEST_PASSWORD, TEST_USER,
};
use sumatra_server::database::Store;

#[tokio::test]
async fn get_project_lists_record_uris() -> Result<()> {
    let app = TestApp::new().await;

    let res = app.send(get_as_testuser("/TestProject/")).await;
    assert_eq!(res.status(), StatusCode::OK);
    let data = body_json(res).await;

    assert_eq!(data["id"], "TestProject");
    assert_eq!(data["name"], "TestProject");
    assert_eq!(data["user"], TEST_USER);
    assert_eq!(data["access"], json!([TEST_USER]));
    assert_eq!(data["tags"], serde_json::Value::Null);

    let records = data["records"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.contains(&json!(format!("{}TestProject/haggling/", BASE))));

    // every listed record resolves
    for uri in records {
        let path = uri.as_str().unwrap().trim_start_matches("http://testserver");
        let res = app.send(get_as_testuser(path)).await;
        assert_eq!(res.status(), StatusCode::OK, "{}", path);
    }
    Ok(())
}

#[tokio::test]
async fn tag_filter_restricts_records() -> Result<()> {
    let app = TestApp::new().await;

    let data = body_json(app.send(get_as_testuser("/TestProject/?tags=foobar")).await).await;
    assert_eq!(data["records"], json!([format!("{}TestProject/haggling/", BASE)]));
    assert_eq!(data["tags"], "foobar");

    // substring match over the stored tag string
    let data = body_json(app.send(get_as_testuser("/TestProject/?tags=oob")).await).await;
    assert_eq!(data["records"].as_array().unwrap().len(), 1);

    let data = body_json(app.send(get_as_testuser("/TestProject/?tags=nothing")).await).await;
    assert_eq!(data["records"], json!([]));

    // an empty filter is no filter
    let data = body_json(app.send(get_as_testuser("/TestProject/?tags=")).await).await;
    assert_eq!(data["records"].as_array().unwrap().len(), 2);
    assert_eq!(data["tags"], serde_json::Value::Null);
    Ok(())
}

#[tokio::test]
async fn anonymous_does_not_see_access_list() -> Result<()> {
    let app = TestApp::new().await;

    let res = app.send(get_anonymous("/TestProject2/")).await;
    assert_eq!(res.status(), StatusCode::OK);
    let data = body_json(res).await;
    assert_eq!(data["user"], "anonymous");
    assert!(data.get("access").is_none(), "{}", data);

    let data = body_json(app.send(get_as_testuser("/TestProject2/")).await).await;
    let access = data["access"].as_array().unwrap();
    assert!(access.contains(&json!("anonymous")));
    assert!(access.contains(&json!(TEST_USER)));
    Ok(())
}

#[tokio::test]
async fn put_creates_project_with_creator_permission() -> Result<()> {
    let app = TestApp::new().await;

    let res = app
        .send(put_json_as_testuser("/NewProject/", &json!({"name": "A new project", "description": "Testing"})))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    assert_eq!(app.store.project_access("NewProject").await?, vec![TEST_USER.to_string()]);

    let data = body_json(app.send(get_as_testuser("/NewProject/")).await).await;
    assert_eq!(data["name"], "A new project");
    assert_eq!(data["description"], "Testing");
    assert_eq!(data["records"], json!([]));
    Ok(())
}

#[tokio::test]
async fn put_with_empty_body_creates_project() -> Result<()> {
    let app = TestApp::new().await;

    let req = request("PUT", "/EmptyProject/")
        .header(header::AUTHORIZATION, basic_auth(TEST_USER, TEST_PASSWORD))
        .body(Body::empty())?;
    let res = app.send(req).await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let data = body_json(app.send(get_as_testuser("/EmptyProject/")).await).await;
    assert_eq!(data["name"], "EmptyProject");
    Ok(())
}

#[tokio::test]
async fn put_updates_existing_project() -> Result<()> {
    let app = TestApp::new().await;

    let res = app
        .send(put_json_as_testuser("/TestProject/", &json!({"description": "Updated description"})))
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let project = app.store.find_project("TestProject").await?.unwrap();
    assert_eq!(project.description, "Updated description");
    assert_eq!(app.store.project_access("TestProject").await?, vec![TEST_USER.to_string()]);
    Ok(())
}

#[tokio::test]
async fn concurrent_project_creation_keeps_one_owner() -> Result<()> {
    let app = TestApp::with_slow_lookups().await;

    let (a, b) = tokio::join!(
        app.send(put_json_as_testuser("/Race2/", &json!({}))),
        app.send(put_json_as(OTHER_USER, OTHER_PASSWORD, "/Race2/", &json!({"name": "hijacked"}))),
    );
    let mut statuses = [a.status(), b.status()];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::CREATED, StatusCode::FORBIDDEN]);

    let access = app.store.project_access("Race2").await?;
    assert_eq!(access.len(), 1);
    let project = app.store.find_project("Race2").await?.unwrap();
    if access[0] == OTHER_USER {
        assert_eq!(project.name, "hijacked");
    } else {
        assert_eq!(project.name, "");
    }
    Ok(())
}

#[tokio::test]
async fn concurrent_puts_by_one_user_create_once() -> Result<()> {
    let app = TestApp::with_slow_lookups().await;

    let (a, b) = tokio::join!(
        app.send(put_json_as_testuser("/Race3/", &json!({}))),
        app.send(put_json_as_testuser("/Race3/", &json!({"description": "second"}))),
    );
    let mut statuses = [a.status(), b.status()];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::OK, StatusCode::CREATED]);
    assert_eq!(app.store.project_access("Race3").await?, vec![TEST_USER.to_string()]);
    assert_eq!(app.store.find_project("Race3").await?.unwrap().description, "second");
    Ok(())
}

#[tokio::test]
async fn put_rejects_non_string_fields() -> Result<()> {
    let app = TestApp::new().await;

    let res = app.send(put_json_as_testuser("/TestProject/", &json!({"name": 42}))).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = body_json(res).await;
    assert!(body["field_errors"]["name"].is_string());
    Ok(())
}

#[tokio::test]
async fn put_project_needs_identity_and_access() -> Result<()> {
    let app = TestApp::new().await;

    let req = request("PUT", "/NewProject/").body(Body::from("{}"))?;
    let res = app.send(req).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert!(app.store.find_project("NewProject").await?.is_none());

    let req = request("PUT", "/TestProject/")
        .header(header::AUTHORIZATION, basic_auth(OTHER_USER, OTHER_PASSWORD))
        .body(Body::from(r#"{"name": "hijacked"}"#))?;
    let res = app.send(req).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn project_list_orders_by_last_update() -> Result<()> {
    let app = TestApp::new().await;

    let res = app.send(get_as_testuser("/")).await;
    assert_eq!(res.status(), StatusCode::OK);
    let data = body_json(res).await;
    let ids: Vec<&str> = data.as_array().unwrap().iter().map(|p| p["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["TestProject2", "TestProject"]);

    let first = &data[0];
    assert_eq!(first["uri"], format!("{}TestProject2/", BASE));
    assert_eq!(first["last_updated"], "2011-10-13 17:25:03");
    Ok(())
}

#[tokio::test]
async fn project_list_hides_unreadable_projects() -> Result<()> {
    let app = TestApp::new().await;

    let data = body_json(app.send(get_anonymous("/")).await).await;
    let ids: Vec<&str> = data.as_array().unwrap().iter().map(|p| p["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["TestProject2"]);

    let req = request("GET", "/")
        .header(header::AUTHORIZATION, basic_auth(OTHER_USER, OTHER_PASSWORD))
        .body(Body::empty())?;
    let data = body_json(app.send(req).await).await;
    let ids: Vec<&str> = data.as_array().unwrap().iter().map(|p| p["id"].as_str().unwrap()).collect();
    // projects without records sort last
    assert_eq!(ids, vec!["TestProject2", "OtherProject"]);
    Ok(())
}
