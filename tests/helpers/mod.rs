#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Map, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use portal_gateway::aicore::client::HttpPlatform;
use portal_gateway::aicore::credentials::{
    CredentialResolver, PlatformCredential, StaticCredentialStore,
};
use portal_gateway::aicore::{AiCore, AiCoreSettings};
use portal_gateway::auth::middleware::Claims;
use portal_gateway::catalog::{CatalogUser, Directory};
use portal_gateway::config::{Config, DEFAULT_UPLOAD_MAX_BYTES};
use portal_gateway::store::AppState;

/// In-memory catalog: user name → ordered team list.
pub struct MemoryDirectory {
    users: HashMap<String, CatalogUser>,
}

impl MemoryDirectory {
    pub fn new(users: &[(&str, &[&str])]) -> Self {
        let users = users
            .iter()
            .map(|(name, teams)| {
                (
                    (*name).to_owned(),
                    CatalogUser {
                        id: Uuid::new_v4(),
                        name: (*name).to_owned(),
                        email: Some(format!("{name}@example.com")),
                        teams: teams.iter().map(|t| (*t).to_owned()).collect(),
                    },
                )
            })
            .collect();
        Self { users }
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn find_user(&self, identity: &str) -> anyhow::Result<Option<CatalogUser>> {
        Ok(self.users.get(identity).cloned())
    }
}

pub fn test_config() -> Config {
    Config {
        listen: "127.0.0.1:0".into(),
        database_url: "postgres://localhost/test".into(),
        db_max_connections: 2,
        ai_core_credentials: None,
        ai_core_credentials_file: None,
        upload_max_bytes: DEFAULT_UPLOAD_MAX_BYTES,
        inference_timeout: Duration::from_secs(5),
        upstream_connect_timeout: Duration::from_secs(2),
        fanout_concurrency: 4,
        cors_origins: vec![],
        trust_proxy_headers: false,
    }
}

/// Gateway wired to a mock AI platform.
///
/// Every credentialed team talks to the same mock server and is told apart by its resource
/// group, which equals the team name.
pub struct TestEnv {
    pub server: MockServer,
    pub app: Router,
}

impl TestEnv {
    pub async fn new(users: &[(&str, &[&str])], credentialed: &[&str]) -> Self {
        Self::with_config(users, credentialed, test_config()).await
    }

    pub async fn with_config(
        users: &[(&str, &[&str])],
        credentialed: &[&str],
        config: Config,
    ) -> Self {
        // Same provider main installs; ignore "already installed" across tests.
        let _ = rustls::crypto::ring::default_provider().install_default();
        let server = MockServer::start().await;
        mount_token(&server).await;

        let store: StaticCredentialStore = credentialed
            .iter()
            .map(|team| ((*team).to_owned(), credential(&server.uri(), team)))
            .collect();
        let platform =
            HttpPlatform::new(config.upstream_connect_timeout, config.inference_timeout)
                .expect("http platform");
        let ai_core = AiCore::new(
            CredentialResolver::new(Arc::new(MemoryDirectory::new(users)), Arc::new(store)),
            Arc::new(platform),
            AiCoreSettings {
                fanout_concurrency: config.fanout_concurrency,
                upload_max_bytes: config.upload_max_bytes,
            },
        );
        let state = AppState {
            ai_core,
            config: Arc::new(config),
        };
        Self {
            server,
            app: portal_gateway::api::app(state),
        }
    }

    /// Inference URL the mock server exposes for a deployment.
    pub fn deployment_url(&self, id: &str) -> String {
        format!("{}/v2/inference/deployments/{id}", self.server.uri())
    }
}

pub fn credential(base: &str, team: &str) -> PlatformCredential {
    PlatformCredential {
        client_id: format!("{team}-client"),
        client_secret: "secret".into(),
        auth_url: base.to_owned(),
        api_url: base.to_owned(),
        resource_group: team.to_owned(),
    }
}

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "test-token",
            "token_type": "bearer",
            "expires_in": 3600
        })))
        .mount(server)
        .await;
}

/// Platform deployment record as the mock upstream returns it.
pub fn deployment_json(id: &str, url: Option<&str>) -> Value {
    serde_json::json!({
        "id": id,
        "configurationId": "cfg-1",
        "status": if url.is_some() { "RUNNING" } else { "PENDING" },
        "targetStatus": "RUNNING",
        "lastOperation": "CREATE",
        "deploymentUrl": url.unwrap_or(""),
        "createdAt": "2026-03-01T10:00:00Z",
        "modifiedAt": "2026-03-01T10:05:00Z"
    })
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

pub fn claims_for(user: &str) -> Claims {
    let mut map = Map::new();
    map.insert("username".into(), Value::String(user.to_owned()));
    Claims(map)
}

fn builder(method: &str, path: &str, user: &str) -> axum::http::request::Builder {
    let builder = Request::builder().method(method).uri(path);
    if user.is_empty() {
        builder
    } else {
        builder.extension(claims_for(user))
    }
}

/// Send a GET request as `user` (no claims when empty).
pub async fn get_json(app: &Router, user: &str, path: &str) -> (StatusCode, Value) {
    let req = builder("GET", path, user).body(Body::empty()).unwrap();
    send(app, req).await
}

/// Send a POST request as `user` with a JSON body.
pub async fn post_json(app: &Router, user: &str, path: &str, body: Value) -> (StatusCode, Value) {
    let req = builder("POST", path, user)
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap();
    send(app, req).await
}

/// Send a PATCH request as `user` with a JSON body.
pub async fn patch_json(app: &Router, user: &str, path: &str, body: Value) -> (StatusCode, Value) {
    let req = builder("PATCH", path, user)
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap();
    send(app, req).await
}

/// Send a DELETE request as `user`.
pub async fn delete_json(app: &Router, user: &str, path: &str) -> (StatusCode, Value) {
    let req = builder("DELETE", path, user).body(Body::empty()).unwrap();
    send(app, req).await
}

/// POST a JSON body and return the raw response text with headers.
pub async fn post_raw(
    app: &Router,
    user: &str,
    path: &str,
    body: Value,
) -> (StatusCode, HeaderMap, String) {
    let req = builder("POST", path, user)
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap();
    send_raw(app, req).await
}

/// POST a multipart form. Each part is `(field, filename, content)`; an empty filename
/// makes a plain text field.
pub async fn post_multipart(
    app: &Router,
    user: &str,
    path: &str,
    parts: &[(&str, &str, Vec<u8>)],
) -> (StatusCode, Value) {
    let boundary = "portal-test-boundary";
    let mut body = Vec::new();
    for (field, filename, content) in parts {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        if filename.is_empty() {
            body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{field}\"\r\n\r\n").as_bytes(),
            );
        } else {
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

    let req = builder("POST", path, user)
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();
    send(app, req).await
}

pub async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = body_json(resp).await;
    (status, body)
}

pub async fn send_raw(app: &Router, req: Request<Body>) -> (StatusCode, HeaderMap, String) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    (status, headers, String::from_utf8_lossy(&bytes).into_owned())
}

/// Extract JSON body from a response.
async fn body_json(resp: axum::http::Response<Body>) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
}
