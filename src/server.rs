// src/server.rs

//! Local HTTP API consumed by the desktop front end.
//!
//! - `POST /projects/upload`, `POST /projects/analyze-folder`
//! - `GET /auth/github`, `GET /auth/github/callback`, `GET /auth/user`
//! - `POST /auth/logout`, `POST /auth/login/manual`, `POST /auth/login/guest`
//! - `GET /auth/repositories`, `GET /auth/repository/{owner}/{repo}[/commits]`
//! - `POST /auth/repository/clone-and-analyze`, `GET /auth/repository/cloned`
//! - `DELETE /auth/repository/cleanup/{clone_path}`, `DELETE /auth/repository/cleanup-all`
//! - `GET /health`

use crate::analyzer::AnalyzeOptions;
use crate::archive::{self, ArchiveExtractor};
use crate::callback::CallbackParams;
use crate::clone::{sanitize_name, CloneCache};
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::github::{GitHubClient, Page};
use crate::locator;
use crate::model::{AnalysisOutcome, PublicIdentity, UserIdentity};
use crate::session::{IdentityStore, SessionManager};
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, Path as UrlPath, Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "gva_session";
pub const UPLOAD_FIELD: &str = "projectFile";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub session: Arc<RwLock<SessionManager>>,
    pub github: Arc<GitHubClient>,
    pub clones: Arc<CloneCache>,
    pub extractor: Arc<ArchiveExtractor>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self> {
        let session = SessionManager::load(IdentityStore::new(config.storage.identity_path()))?;
        let github = GitHubClient::new(config.github.clone())?;
        let clones = CloneCache::new(config.storage.clones_dir());
        let extractor = ArchiveExtractor::new(config.storage.extracted_dir()).with_programs(
            config.extraction.unrar_program.clone(),
            config.extraction.sevenzip_program.clone(),
        );
        Ok(Self {
            config: Arc::new(config),
            session: Arc::new(RwLock::new(session)),
            github: Arc::new(github),
            clones: Arc::new(clones),
            extractor: Arc::new(extractor),
        })
    }

    fn analyze_options(&self) -> AnalyzeOptions {
        AnalyzeOptions::with_limit(self.config.analysis.commit_limit)
    }
}

pub fn router(state: AppState) -> Router {
    // Multipart framing on top of the file itself
    let upload_limit = state.config.server.max_upload_bytes + 64 * 1024;

    Router::new()
        .route("/health", get(health))
        .route(
            "/projects/upload",
            post(upload_project).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/projects/analyze-folder", post(analyze_folder))
        .route("/auth/github", get(github_login))
        .route("/auth/github/callback", get(github_callback))
        .route("/auth/user", get(current_user))
        .route("/auth/logout", post(logout))
        .route("/auth/login/manual", post(manual_login))
        .route("/auth/login/guest", post(guest_login))
        .route("/auth/repositories", get(list_repositories))
        .route("/auth/repository/clone-and-analyze", post(clone_and_analyze))
        .route("/auth/repository/cloned", get(list_clones))
        .route("/auth/repository/cleanup-all", delete(cleanup_all_clones))
        .route("/auth/repository/cleanup/{clone_path}", delete(cleanup_clone))
        .route("/auth/repository/{owner}/{repo}", get(get_repository))
        .route("/auth/repository/{owner}/{repo}/commits", get(list_commits))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves the API until Ctrl-C
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Git Version Analyzer API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;
    Ok(())
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            debug!("Request rejected: {}", self);
        }
        let body = json!({
            "error": self.label(),
            "details": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

fn multipart_error(err: MultipartError, max_bytes: usize) -> Error {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge(format!(
            "upload exceeds the {} limit",
            archive::format_file_size(max_bytes as u64)
        ))
    } else {
        Error::validation(format!("malformed upload: {}", err))
    }
}

/// Runs repository work off the async executor
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::upstream(format!("background task failed: {}", e)))?
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "OK",
        "message": "Git Version Analyzer API",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectReport {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_file: Option<String>,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub analysis: AnalysisOutcome,
}

#[derive(Debug, Serialize)]
pub struct ProjectResponse {
    pub success: bool,
    pub project: ProjectReport,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeFolderRequest {
    folder_path: Option<String>,
}

async fn analyze_folder(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeFolderRequest>,
) -> Result<Json<ProjectResponse>> {
    let folder = request
        .folder_path
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| Error::validation("folderPath is required"))?;
    if !folder.exists() {
        return Err(Error::not_found(format!("folder {}", folder.display())));
    }

    let options = state.analyze_options();
    let target = folder.clone();
    let analysis = blocking(move || locator::locate(&target, &options)).await?;
    info!("Analyzed {}: {} commits", folder.display(), analysis.commit_count());

    Ok(Json(ProjectResponse {
        success: true,
        project: ProjectReport {
            id: Uuid::new_v4(),
            name: folder
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| folder.display().to_string()),
            original_file: None,
            path: folder,
            created_at: Utc::now(),
            analysis,
        },
    }))
}

async fn upload_project(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ProjectResponse>> {
    let max_bytes = state.config.server.max_upload_bytes;
    let mut upload: Option<(String, PathBuf)> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let original = field
            .file_name()
            .map(String::from)
            .ok_or_else(|| Error::validation("uploaded file has no name"))?;
        if !archive::is_supported(&original) {
            return Err(Error::validation(format!("unsupported file type: {}", original)));
        }

        let uploads = state.config.storage.uploads_dir();
        tokio::fs::create_dir_all(&uploads).await?;
        let stored = uploads.join(format!("{}-{}", Uuid::new_v4(), sanitize_name(&original)));
        let mut file = tokio::fs::File::create(&stored).await?;
        let mut received = 0usize;
        loop {
            let failure = match field.chunk().await {
                Ok(Some(chunk)) => {
                    received += chunk.len();
                    if received > max_bytes {
                        Error::PayloadTooLarge(format!(
                            "{} exceeds the {} upload limit",
                            original,
                            archive::format_file_size(max_bytes as u64)
                        ))
                    } else {
                        file.write_all(&chunk).await?;
                        continue;
                    }
                }
                Ok(None) => break,
                Err(err) => multipart_error(err, max_bytes),
            };
            drop(file);
            let _ = tokio::fs::remove_file(&stored).await;
            return Err(failure);
        }
        file.flush().await?;
        upload = Some((original, stored));
        break;
    }

    let (original, stored) = upload.ok_or_else(|| {
        Error::validation(format!("no file provided in field {}", UPLOAD_FIELD))
    })?;
    info!("Received upload {} ({})", original, stored.display());

    let project_id = Uuid::new_v4();
    let extractor = state.extractor.clone();
    let options = state.analyze_options();
    let archive_path = stored.clone();
    let result = blocking(move || {
        let extraction = extractor.extract(&archive_path, &project_id.to_string())?;
        let analysis = locator::locate(&extraction.extracted_path, &options)?;
        Ok((extraction, analysis))
    })
    .await;

    if let Err(err) = tokio::fs::remove_file(&stored).await {
        warn!("Could not remove upload {}: {}", stored.display(), err);
    }
    let (extraction, analysis) = result?;

    Ok(Json(ProjectResponse {
        success: true,
        project: ProjectReport {
            id: project_id,
            name: Path::new(&original)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| original.clone()),
            original_file: Some(original),
            path: extraction.extracted_path,
            created_at: Utc::now(),
            analysis,
        },
    }))
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Token of the cookie session if one exists, otherwise the bearer token
async fn access_token(state: &AppState, jar: &CookieJar, headers: &HeaderMap) -> Result<String> {
    let session = state.session.read().await;
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if session.is_session(cookie.value()) {
            return session
                .access_token()
                .map(String::from)
                .ok_or_else(|| Error::authentication("GitHub authentication required"));
        }
    }
    bearer_token(headers).ok_or_else(|| Error::authentication("no session or bearer token"))
}

fn session_cookie(session_id: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session_id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

fn with_query(base: &str, key: &str, value: &str) -> String {
    match reqwest::Url::parse(base) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair(key, value);
            url.into()
        }
        Err(_) => base.to_string(),
    }
}

async fn github_login(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    if state.config.github.client_id.is_empty() {
        return Err(Error::Config("GitHub OAuth client id is not configured".to_string()));
    }
    let csrf_state = state.session.write().await.begin_github_login()?;
    let url = state.github.authorization_url(&csrf_state)?;
    info!("Starting GitHub authorization");
    Ok(Json(json!({ "url": url })))
}

async fn github_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> (CookieJar, Redirect) {
    let failure = |reason: &str| {
        Redirect::to(&with_query(&state.config.redirect.failure_url, "error", reason))
    };

    if let Err(err) = state.session.write().await.verify_callback(params.state.as_deref()) {
        warn!("Rejected OAuth callback: {}", err);
        return (jar, failure("invalid_state"));
    }
    if let Some(reason) = params.error.clone() {
        state.session.write().await.cancel_login();
        info!("GitHub authorization was not granted: {}", reason);
        return (jar, failure(&reason));
    }
    let code = match params.into_code() {
        Ok(code) => code,
        Err(_) => {
            state.session.write().await.cancel_login();
            return (jar, failure("no_code"));
        }
    };

    let exchanged = async {
        let token = state.github.exchange_code(&code).await?;
        let user = state.github.user(&token).await?;
        Ok::<_, Error>((token, user))
    }
    .await;

    let mut session = state.session.write().await;
    let established = exchanged.and_then(|(token, user)| {
        session
            .complete_github_login(token, user)
            .map(|identity| identity.username.clone())
    });
    match (established, session.session_id().map(String::from)) {
        (Ok(username), Some(session_id)) => {
            let url = with_query(&state.config.redirect.success_url, "user", &username);
            (jar.add(session_cookie(session_id)), Redirect::to(&url))
        }
        (result, _) => {
            if let Err(err) = result {
                warn!("GitHub login failed: {}", err);
            }
            session.cancel_login();
            (jar, failure("auth_failed"))
        }
    }
}

async fn current_user(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Result<Json<PublicIdentity>> {
    {
        let session = state.session.read().await;
        if let Some(cookie) = jar.get(SESSION_COOKIE) {
            let current = (session.is_session(cookie.value()), session.public_identity());
            if let (true, Some(identity)) = current {
                return Ok(Json(identity));
            }
        }
    }
    let token = bearer_token(&headers).ok_or_else(|| Error::authentication("not signed in"))?;
    let user = state.github.user(&token).await?;
    Ok(Json(PublicIdentity {
        id: user.id.to_string(),
        username: user.username,
        display_name: user.name,
        email: user.email,
        avatar_url: user.avatar,
        login_type: crate::model::LoginType::Github,
    }))
}

async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<serde_json::Value>)> {
    let previous = state.session.write().await.logout()?;
    let message = match previous {
        Some(identity) => format!("Signed out {}", identity.username),
        None => "No active session".to_string(),
    };
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    Ok((jar, Json(json!({ "message": message }))))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManualLoginRequest {
    email: Option<String>,
    github_username: Option<String>,
}

fn signed_in(
    jar: CookieJar,
    session: &SessionManager,
    identity: &UserIdentity,
) -> (CookieJar, Json<PublicIdentity>) {
    let jar = match session.session_id() {
        Some(id) => jar.add(session_cookie(id.to_string())),
        None => jar,
    };
    (jar, Json(PublicIdentity::from(identity)))
}

async fn manual_login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<ManualLoginRequest>,
) -> Result<(CookieJar, Json<PublicIdentity>)> {
    let mut session = state.session.write().await;
    let identity = session.login_manual(request.email, request.github_username)?.clone();
    Ok(signed_in(jar, &session, &identity))
}

async fn guest_login(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<PublicIdentity>)> {
    let mut session = state.session.write().await;
    let identity = session.login_guest()?.clone();
    Ok(signed_in(jar, &session, &identity))
}

// ---------------------------------------------------------------------------
// Remote repositories
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListingQuery {
    branch: Option<String>,
    page: Option<u32>,
    per_page: Option<u32>,
}

impl ListingQuery {
    fn page(&self) -> Page {
        let default = Page::default();
        Page {
            page: self.page.filter(|p| *p > 0).unwrap_or(default.page),
            per_page: self.per_page.filter(|p| *p > 0).unwrap_or(default.per_page),
        }
    }
}

async fn list_repositories(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    Query(query): Query<ListingQuery>,
) -> Result<Json<Vec<crate::github::RepositorySummary>>> {
    let token = access_token(&state, &jar, &headers).await?;
    let repos = state.github.repositories(&token, query.page()).await?;
    debug!("Listed {} remote repositories", repos.len());
    Ok(Json(repos))
}

async fn get_repository(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    UrlPath((owner, repo)): UrlPath<(String, String)>,
) -> Result<Json<crate::github::RepositorySummary>> {
    let token = access_token(&state, &jar, &headers).await?;
    Ok(Json(state.github.repository(&token, &owner, &repo).await?))
}

async fn list_commits(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    UrlPath((owner, repo)): UrlPath<(String, String)>,
    Query(query): Query<ListingQuery>,
) -> Result<Json<Vec<crate::github::RemoteCommit>>> {
    let token = access_token(&state, &jar, &headers).await?;
    let branch = query.branch.clone().unwrap_or_else(|| "main".to_string());
    let commits = state
        .github
        .commits(&token, &owner, &repo, &branch, query.page())
        .await?;
    Ok(Json(commits))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CloneRequest {
    clone_url: Option<String>,
    repo_name: Option<String>,
    #[serde(default)]
    full_clone: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneAnalysis {
    #[serde(flatten)]
    pub analysis: AnalysisOutcome,
    pub clone_id: Uuid,
    pub clone_path: PathBuf,
    #[serde(rename = "isGitHubRepo")]
    pub is_github_repo: bool,
    pub repo_name: String,
    pub shallow: bool,
}

async fn clone_and_analyze(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    Json(request): Json<CloneRequest>,
) -> Result<Json<CloneAnalysis>> {
    let token = access_token(&state, &jar, &headers).await?;
    let (clone_url, repo_name) = match (request.clone_url, request.repo_name) {
        (Some(url), Some(name)) if !url.is_empty() && !name.is_empty() => (url, name),
        _ => return Err(Error::validation("cloneUrl and repoName are required")),
    };
    let full = request.full_clone;

    let clones = state.clones.clone();
    let options = state.analyze_options();
    let name = repo_name.clone();
    let (handle, analysis) = blocking(move || {
        let handle = clones.clone_repository(&clone_url, &name, Some(&token), full)?;
        let analysis = locator::locate(&handle.local_path, &options)?;
        Ok((handle, analysis))
    })
    .await?;
    info!("Analyzed clone of {}: {} commits", repo_name, analysis.commit_count());

    Ok(Json(CloneAnalysis {
        analysis,
        clone_id: handle.id,
        clone_path: handle.local_path,
        is_github_repo: true,
        repo_name,
        shallow: handle.shallow,
    }))
}

async fn list_clones(
    State(state): State<AppState>,
) -> Result<Json<Vec<crate::clone::CachedClone>>> {
    let clones = state.clones.clone();
    Ok(Json(blocking(move || clones.list()).await?))
}

async fn cleanup_clone(
    State(state): State<AppState>,
    UrlPath(clone_path): UrlPath<String>,
) -> Result<Json<serde_json::Value>> {
    let clones = state.clones.clone();
    let target = match PathBuf::from(&clone_path) {
        p if p.is_absolute() => p,
        p => clones.root().join(p),
    };
    let removed = blocking(move || clones.cleanup(&target)).await?;
    if !removed {
        return Err(Error::not_found(format!("clone {}", clone_path)));
    }
    Ok(Json(json!({ "message": "Repository cleaned up" })))
}

async fn cleanup_all_clones(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let clones = state.clones.clone();
    let count = blocking(move || clones.cleanup_all()).await?;
    Ok(Json(json!({
        "message": format!("{} repositories cleaned up", count),
        "count": count,
    })))
}
