#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, request::Builder, Request, Response},
    Router,
};
use base64::prelude::{Engine as _, BASE64_STANDARD};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt; // for `oneshot`

use sumatra_server::api::html::{BasicHtmlRenderer, HtmlRenderer};
use sumatra_server::auth::{issue_session, new_user};
use sumatra_server::config::AppConfig;
use sumatra_server::database::models::{
    DataKey, Mapping, Project, ProjectSummary, Record, RecordUpdate, StoredRecord, Timestamp, User, ANONYMOUS,
};
use sumatra_server::database::store::{Created, StoreError};
use sumatra_server::database::{MemoryStore, Store};
use sumatra_server::{app, AppState};

pub const HOST: &str = "testserver";
pub const BASE: &str = "http://testserver/";

pub const TEST_USER: &str = "testuser";
pub const TEST_PASSWORD: &str = "abc123";
pub const OTHER_USER: &str = "otheruser";
pub const OTHER_PASSWORD: &str = "xyz789";

/// Router over a seeded in-memory store.
///
/// * `TestProject` - private, `testuser` only; records `haggling` (tag
///   `foobar`) and `20100709-154255`
/// * `TestProject2` - public, created by `testuser`; record `20111013-172503`
/// * `OtherProject` - private, `otheruser` only; no records
pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub config: AppConfig,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_renderer(Arc::new(BasicHtmlRenderer)).await
    }

    pub async fn with_renderer(renderer: Arc<dyn HtmlRenderer>) -> Self {
        let store = Arc::new(MemoryStore::new());
        seed(&store).await;
        Self::build(store.clone(), store, renderer)
    }

    /// Same seed, but project lookups take a while, as they would over a
    /// network. Concurrent requests then interleave between their access
    /// check and their write.
    pub async fn with_slow_lookups() -> Self {
        let store = Arc::new(MemoryStore::new());
        seed(&store).await;
        let slow = Arc::new(SlowLookups { inner: store.clone(), delay: Duration::from_millis(50) });
        Self::build(slow, store, Arc::new(BasicHtmlRenderer))
    }

    fn build(serving: Arc<dyn Store>, store: Arc<MemoryStore>, renderer: Arc<dyn HtmlRenderer>) -> Self {
        let mut config = AppConfig::development();
        config.api.enable_request_logging = false;

        let state = AppState::new(serving, config.clone()).with_renderer(renderer);
        Self { router: app(state), store, config }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.expect("router is infallible")
    }

    /// `Cookie` header value holding a valid session for `username`
    pub fn session_cookie(&self, username: &str) -> String {
        let token = issue_session(username, &self.config.security).expect("development config has a secret");
        format!("{}={}", self.config.security.session_cookie, token)
    }
}

pub fn timestamp(raw: &str) -> Timestamp {
    Timestamp::parse(raw).expect("valid timestamp")
}

async fn seed(store: &MemoryStore) {
    store.create_user(new_user(TEST_USER, TEST_PASSWORD, 4 /* bcrypt minimum cost; bcrypt::MIN_COST is private */).unwrap()).await.unwrap();
    store.create_user(new_user(OTHER_USER, OTHER_PASSWORD, 4 /* bcrypt minimum cost; bcrypt::MIN_COST is private */).unwrap()).await.unwrap();

    let mut haggling = Record::new("haggling", timestamp("2010-07-09 15:42:55"));
    haggling.reason = "initial reason".into();
    haggling.version = Some("6933:7e9ad3b3a0fc".into());
    haggling.tags = ["foobar".to_string()].into_iter().collect();
    haggling.output_data.push(DataKey {
        path: "example2.dat".into(),
        digest: "0fd8f8b2c32f1e3d1f2fcbd9e7d1c77d00b3b3cc".into(),
        metadata: Mapping::new(),
        creation: Some(timestamp("2010-07-09 15:43:10")),
    });
    store.create_record("TestProject", TEST_USER, &haggling).await.unwrap();

    let older = Record::new("20100709-154255", timestamp("2010-07-09 15:42:55"));
    store.create_record("TestProject", TEST_USER, &older).await.unwrap();

    let public = Record::new("20111013-172503", timestamp("2011-10-13 17:25:03"));
    store.create_record("TestProject2", TEST_USER, &public).await.unwrap();
    store.grant_permission("TestProject2", ANONYMOUS).await.unwrap();

    store.get_or_create_project("OtherProject", OTHER_USER).await.unwrap();
}

/// Delegating store whose `find_project` sleeps before answering
struct SlowLookups {
    inner: Arc<MemoryStore>,
    delay: Duration,
}

#[async_trait]
impl Store for SlowLookups {
    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }

    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.inner.find_user(username).await
    }

    async fn create_user(&self, user: User) -> Result<(), StoreError> {
        self.inner.create_user(user).await
    }

    async fn list_users(&self) -> Result<Vec<String>, StoreError> {
        self.inner.list_users().await
    }

    async fn find_project(&self, id: &str) -> Result<Option<Project>, StoreError> {
        let found = self.inner.find_project(id).await;
        tokio::time::sleep(self.delay).await;
        found
    }

    async fn list_projects(&self) -> Result<Vec<ProjectSummary>, StoreError> {
        self.inner.list_projects().await
    }

    async fn get_or_create_project(&self, id: &str, creator: &str) -> Result<(Project, Created), StoreError> {
        self.inner.get_or_create_project(id, creator).await
    }

    async fn update_project(
        &self,
        id: &str,
        name: Option<String>,
        description: Option<String>,
    ) -> Result<Project, StoreError> {
        self.inner.update_project(id, name, description).await
    }

    async fn project_access(&self, project_id: &str) -> Result<Vec<String>, StoreError> {
        self.inner.project_access(project_id).await
    }

    async fn grant_permission(&self, project_id: &str, username: &str) -> Result<(), StoreError> {
        self.inner.grant_permission(project_id, username).await
    }

    async fn find_records(&self, project_id: &str, label: &str) -> Result<Vec<StoredRecord>, StoreError> {
        self.inner.find_records(project_id, label).await
    }

    async fn record_labels(&self, project_id: &str, tag_filter: Option<&str>) -> Result<Vec<String>, StoreError> {
        self.inner.record_labels(project_id, tag_filter).await
    }

    async fn create_record(
        &self,
        project_id: &str,
        creator: &str,
        record: &Record,
    ) -> Result<(StoredRecord, Created), StoreError> {
        self.inner.create_record(project_id, creator, record).await
    }

    async fn update_record(&self, project_id: &str, label: &str, update: &RecordUpdate) -> Result<(), StoreError> {
        self.inner.update_record(project_id, label, update).await
    }

    async fn delete_record(&self, project_id: &str, label: &str) -> Result<u64, StoreError> {
        self.inner.delete_record(project_id, label).await
    }
}

/// Request builder with the test host set
pub fn request(method: &str, uri: &str) -> Builder {
    Request::builder().method(method).uri(uri).header(header::HOST, HOST)
}

pub fn basic_auth(username: &str, password: &str) -> String {
    format!("Basic {}", BASE64_STANDARD.encode(format!("{}:{}", username, password)))
}

/// GET as `testuser` over Basic auth
pub fn get_as_testuser(uri: &str) -> Request<Body> {
    request("GET", uri)
        .header(header::AUTHORIZATION, basic_auth(TEST_USER, TEST_PASSWORD))
        .body(Body::empty())
        .unwrap()
}

pub fn get_anonymous(uri: &str) -> Request<Body> {
    request("GET", uri).body(Body::empty()).unwrap()
}

pub fn put_json_as_testuser(uri: &str, body: &Value) -> Request<Body> {
    put_json_as(TEST_USER, TEST_PASSWORD, uri, body)
}

pub fn put_json_as(username: &str, password: &str, uri: &str, body: &Value) -> Request<Body> {
    request("PUT", uri)
        .header(header::AUTHORIZATION, basic_auth(username, password))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Should read body");
    String::from_utf8(bytes.to_vec()).expect("Body should be UTF-8")
}

pub async fn body_json(response: Response<Body>) -> Value {
    let text = body_text(response).await;
    serde_json::from_str(&text).expect("Should parse JSON")
}

/// Media type of the response without parameters
pub fn mime_type(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .unwrap_or_default()
        .trim()
        .to_string()
}

pub fn header_value(response: &Response<Body>, name: header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
