//! HTTP API driven through the router without a socket

use crate::fixtures;
use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE};
use axum::http::{Request, StatusCode};
use axum::Router;
use git_version_analyzer::config::AppConfig;
use git_version_analyzer::server::{router, AppState, SESSION_COOKIE};
use mockito::Server;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "gva-test-boundary";

fn test_config(work: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.storage.work_dir = work.join("work");
    config.storage.identity_file = Some(work.join("identity.json"));
    config
}

fn app(config: AppConfig) -> Router {
    router(AppState::new(config).unwrap())
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn multipart_upload(file_name: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"projectFile\"; filename=\"{}\"\r\n",
            file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/projects/upload")
        .header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let temp_dir = TempDir::new().unwrap();
    let app = app(test_config(temp_dir.path()));

    let (status, body) = send(&app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");
}

#[tokio::test]
async fn test_analyze_folder_validation_and_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let app = app(test_config(temp_dir.path()));

    let (status, body) = send(&app, post_json("/projects/analyze-folder", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
    assert!(body["details"].as_str().unwrap().contains("folderPath"));

    let missing = temp_dir.path().join("missing");
    let (status, _) = send(
        &app,
        post_json("/projects/analyze-folder", json!({ "folderPath": missing })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_analyze_folder_repository() {
    let temp_dir = TempDir::new().unwrap();
    let repo_dir = temp_dir.path().join("demo");
    fixtures::linear_history(&repo_dir, 3);
    let app = app(test_config(temp_dir.path()));

    let (status, body) = send(
        &app,
        post_json("/projects/analyze-folder", json!({ "folderPath": repo_dir })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let project = &body["project"];
    assert_eq!(project["name"], "demo");
    assert_eq!(project["isRepository"], true);
    assert_eq!(project["totalCommitCount"], 3);
    assert_eq!(project["commits"].as_array().unwrap().len(), 3);
    assert!(project["id"].is_string());
}

#[tokio::test]
async fn test_analyze_folder_of_repositories() {
    let temp_dir = TempDir::new().unwrap();
    let parent = temp_dir.path().join("workspace");
    fixtures::linear_history(&parent.join("a"), 1);
    fixtures::linear_history(&parent.join("b"), 1);
    let app = app(test_config(temp_dir.path()));

    let (status, body) = send(
        &app,
        post_json("/projects/analyze-folder", json!({ "folderPath": parent })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["project"]["isRepository"], false);
    assert_eq!(body["project"]["hasSubRepositories"], true);
    assert_eq!(body["project"]["subRepositories"][1]["name"], "b");
}

#[tokio::test]
async fn test_zip_upload() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("source");
    let repo = fixtures::linear_history(&source, 4);
    let expected = fixtures::reachable_commit_count(&repo);
    let zip = fixtures::zip_dir(&source, &temp_dir.path().join("project.zip"));
    let config = test_config(temp_dir.path());
    let uploads = config.storage.uploads_dir();
    let app = app(config);

    let (status, body) = send(&app, multipart_upload("project.zip", &fs::read(zip).unwrap())).await;

    assert_eq!(status, StatusCode::OK);
    let project = &body["project"];
    assert_eq!(project["originalFile"], "project.zip");
    assert_eq!(project["name"], "project");
    assert_eq!(project["totalCommitCount"], expected);
    assert!(Path::new(project["path"].as_str().unwrap()).exists());
    // The uploaded archive itself is discarded after extraction
    assert_eq!(fs::read_dir(uploads).unwrap().count(), 0);
}

#[tokio::test]
async fn test_upload_rejects_unsupported_type() {
    let temp_dir = TempDir::new().unwrap();
    let app = app(test_config(temp_dir.path()));

    let (status, body) = send(&app, multipart_upload("notes.txt", b"hello")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"].as_str().unwrap().contains("notes.txt"));
}

#[tokio::test]
async fn test_upload_over_limit_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(temp_dir.path());
    config.server.max_upload_bytes = 1024;
    let uploads = config.storage.uploads_dir();
    let app = app(config);

    let (status, body) = send(&app, multipart_upload("big.zip", &[0u8; 1025])).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body["details"].as_str().unwrap().contains("1 KB"));
    assert_eq!(fs::read_dir(&uploads).unwrap().count(), 0);

    // Exactly at the limit the file is accepted and reaches extraction
    let (status, body) = send(&app, multipart_upload("edge.zip", &[0u8; 1024])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Archive extraction failed");
}

#[tokio::test]
async fn test_protected_routes_require_credentials() {
    let temp_dir = TempDir::new().unwrap();
    let app = app(test_config(temp_dir.path()));

    for uri in ["/auth/user", "/auth/repositories", "/auth/repository/octo/hello"] {
        let (status, _) = send(&app, get(uri)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
    }
    let (status, _) = send(
        &app,
        post_json(
            "/auth/repository/clone-and-analyze",
            json!({ "cloneUrl": "https://github.com/o/r.git", "repoName": "r" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_guest_session_lifecycle() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());
    let identity_file = config.storage.identity_path();
    let app = app(config);

    let response = app
        .clone()
        .oneshot(post_json("/auth/login/guest", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();
    assert!(cookie.starts_with(SESSION_COOKIE));
    assert!(identity_file.exists());

    let request = Request::builder()
        .uri("/auth/user")
        .header(COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "guest");
    assert_eq!(body["loginType"], "guest");
    assert!(body.get("accessToken").is_none());

    // A guest session holds no GitHub token
    let request = Request::builder()
        .uri("/auth/repositories")
        .header(COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, post_json("/auth/logout", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!identity_file.exists());

    let request = Request::builder()
        .uri("/auth/user")
        .header(COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_manual_login_requires_some_identity() {
    let temp_dir = TempDir::new().unwrap();
    let app = app(test_config(temp_dir.path()));

    let (status, _) = send(&app, post_json("/auth/login/manual", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        post_json("/auth/login/manual", json!({ "email": "dev@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "dev");
    assert_eq!(body["loginType"], "manual");
}

#[tokio::test]
async fn test_bearer_token_lists_repositories() {
    let mut github = Server::new_async().await;
    github
        .mock("GET", "/user/repos")
        .match_header("authorization", "Bearer tok")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!([{
                "id": 9,
                "name": "hello",
                "full_name": "octo/hello",
                "html_url": "https://github.com/octo/hello",
                "clone_url": "https://github.com/octo/hello.git"
            }])
            .to_string(),
        )
        .create_async()
        .await;
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(temp_dir.path());
    config.github.api_base = github.url();
    let app = app(config);

    let request = Request::builder()
        .uri("/auth/repositories?page=1&perPage=5")
        .header(AUTHORIZATION, "Bearer tok")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["fullName"], "octo/hello");
}

#[tokio::test]
async fn test_clone_and_analyze_then_cleanup() {
    let temp_dir = TempDir::new().unwrap();
    let origin = temp_dir.path().join("origin");
    fixtures::linear_history(&origin, 2);
    let app = app(test_config(temp_dir.path()));

    let request = Request::builder()
        .method("POST")
        .uri("/auth/repository/clone-and-analyze")
        .header(CONTENT_TYPE, "application/json")
        .header(AUTHORIZATION, "Bearer tok")
        .body(Body::from(
            json!({ "cloneUrl": origin, "repoName": "origin", "fullClone": true }).to_string(),
        ))
        .unwrap();
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isGitHubRepo"], true);
    assert_eq!(body["repoName"], "origin");
    assert_eq!(body["totalCommitCount"], 2);
    assert!(body["cloneId"].is_string());
    let clone_path = body["clonePath"].as_str().unwrap().to_string();
    assert!(Path::new(&clone_path).exists());

    let (status, body) = send(&app, get("/auth/repository/cloned")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let request = Request::builder()
        .method("DELETE")
        .uri("/auth/repository/cleanup-all")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert!(!Path::new(&clone_path).exists());
}

#[tokio::test]
async fn test_cleanup_of_unknown_clone_is_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let app = app(test_config(temp_dir.path()));

    let request = Request::builder()
        .method("DELETE")
        .uri("/auth/repository/cleanup/nothing-here")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_oauth_start_and_forged_callback() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(temp_dir.path());
    config.github.client_id = "client".into();
    let failure_url = config.redirect.failure_url.clone();
    let app = app(config);

    let (status, body) = send(&app, get("/auth/github")).await;
    assert_eq!(status, StatusCode::OK);
    let url = body["url"].as_str().unwrap();
    assert!(url.contains("client_id=client"));
    assert!(url.contains("state="));

    let response = app
        .clone()
        .oneshot(get("/auth/github/callback?code=abc&state=forged"))
        .await
        .unwrap();
    assert!(response.status().is_redirection());
    let location = response.headers().get(LOCATION).unwrap().to_str().unwrap();
    assert_eq!(location, format!("{}?error=invalid_state", failure_url));
    assert!(response.headers().get(SET_COOKIE).is_none());
}

fn with_cookie(uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_oauth_callback_signs_in() {
    let mut github = Server::new_async().await;
    github
        .mock("POST", "/login/oauth/access_token")
        .match_body(mockito::Matcher::PartialJson(json!({ "code": "abc" })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"gho_token","token_type":"bearer"}"#)
        .create_async()
        .await;
    github
        .mock("GET", "/user")
        .match_header("authorization", "Bearer gho_token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "id": 42, "login": "octocat", "name": "The Octocat" }).to_string())
        .create_async()
        .await;
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(temp_dir.path());
    config.github.client_id = "client".into();
    config.github.oauth_base = github.url();
    config.github.api_base = github.url();
    let success_url = config.redirect.success_url.clone();
    let identity_file = config.storage.identity_path();
    let app = app(config);

    let (status, body) = send(&app, get("/auth/github")).await;
    assert_eq!(status, StatusCode::OK);
    let url = reqwest::Url::parse(body["url"].as_str().unwrap()).unwrap();
    let csrf_state = url
        .query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.into_owned())
        .unwrap();

    let callback = format!("/auth/github/callback?code=abc&state={}", csrf_state);
    let response = app.clone().oneshot(get(&callback)).await.unwrap();
    assert!(response.status().is_redirection());
    let location = response.headers().get(LOCATION).unwrap().to_str().unwrap();
    assert!(location.starts_with(&success_url), "{}", location);
    assert!(location.contains("user=octocat"), "{}", location);
    let cookie = response
        .headers()
        .get(SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();
    assert!(cookie.starts_with(SESSION_COOKIE));
    assert!(identity_file.exists());

    let (status, body) = send(&app, with_cookie("/auth/user", &cookie)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "octocat");
    assert_eq!(body["loginType"], "github");
    assert!(body.get("accessToken").is_none());
}

#[tokio::test]
async fn test_guest_cookie_wins_over_bearer_header() {
    let temp_dir = TempDir::new().unwrap();
    let app = app(test_config(temp_dir.path()));

    let response = app
        .clone()
        .oneshot(post_json("/auth/login/guest", json!({})))
        .await
        .unwrap();
    let cookie = response
        .headers()
        .get(SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();

    let request = Request::builder()
        .uri("/auth/repositories")
        .header(COOKIE, &cookie)
        .header(AUTHORIZATION, "Bearer tok")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["details"]
        .as_str()
        .unwrap()
        .contains("GitHub authentication required"));
}
