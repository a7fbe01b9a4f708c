// src/github.rs

//! Client for the hosted platform's HTTP API and OAuth endpoints.
//!
//! Every read operation requires a bearer token. A missing token or a `401`
//! from the platform is an [`Error::Authentication`]; other non-success
//! statuses become [`Error::Upstream`] with the response body as detail.

use crate::config::GitHubConfig;
use crate::error::{Error, Result};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const API_ACCEPT: &str = "application/vnd.github.v3+json";

/// Normalized user profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitHubUser {
    pub id: u64,
    pub username: String,
    pub name: String,
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub public_repos: u64,
    pub followers: u64,
    pub following: u64,
}

/// Normalized repository summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositorySummary {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub private: bool,
    pub url: String,
    pub clone_url: String,
    pub language: Option<String>,
    pub stars: u64,
    pub forks: u64,
    pub open_issues: u64,
    pub default_branch: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub pushed_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitAuthor {
    pub name: Option<String>,
    pub email: Option<String>,
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// Normalized commit listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCommit {
    pub sha: String,
    pub message: String,
    pub author: CommitAuthor,
    pub committer: CommitAuthor,
    pub url: Option<String>,
}

// Raw platform payloads, reduced to the fields that are normalized above.

#[derive(Debug, Deserialize)]
struct RawUser {
    id: u64,
    login: String,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
    bio: Option<String>,
    #[serde(default)]
    public_repos: u64,
    #[serde(default)]
    followers: u64,
    #[serde(default)]
    following: u64,
}

impl From<RawUser> for GitHubUser {
    fn from(raw: RawUser) -> Self {
        Self {
            id: raw.id,
            name: raw.name.unwrap_or_else(|| raw.login.clone()),
            username: raw.login,
            email: raw.email,
            avatar: raw.avatar_url,
            bio: raw.bio,
            public_repos: raw.public_repos,
            followers: raw.followers,
            following: raw.following,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    id: u64,
    name: String,
    full_name: String,
    description: Option<String>,
    #[serde(default)]
    private: bool,
    html_url: String,
    clone_url: String,
    language: Option<String>,
    #[serde(default)]
    stargazers_count: u64,
    #[serde(default)]
    forks_count: u64,
    #[serde(default)]
    open_issues_count: u64,
    default_branch: Option<String>,
    created_at: Option<String>,
    updated_at: Option<String>,
    pushed_at: Option<String>,
}

impl From<RawRepository> for RepositorySummary {
    fn from(raw: RawRepository) -> Self {
        Self {
            id: raw.id,
            name: raw.name,
            full_name: raw.full_name,
            description: raw.description,
            private: raw.private,
            url: raw.html_url,
            clone_url: raw.clone_url,
            language: raw.language,
            stars: raw.stargazers_count,
            forks: raw.forks_count,
            open_issues: raw.open_issues_count,
            default_branch: raw.default_branch,
            created_at: raw.created_at,
            updated_at: raw.updated_at,
            pushed_at: raw.pushed_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawSignature {
    name: Option<String>,
    email: Option<String>,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCommitDetail {
    message: String,
    author: Option<RawSignature>,
    committer: Option<RawSignature>,
}

#[derive(Debug, Deserialize)]
struct RawAccount {
    login: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCommit {
    sha: String,
    commit: RawCommitDetail,
    author: Option<RawAccount>,
    html_url: Option<String>,
}

fn signature(raw: Option<RawSignature>, account: Option<RawAccount>) -> CommitAuthor {
    let raw = raw.unwrap_or(RawSignature {
        name: None,
        email: None,
        date: None,
    });
    let (username, avatar) = account.map_or((None, None), |a| (a.login, a.avatar_url));
    CommitAuthor {
        name: raw.name,
        email: raw.email,
        date: raw.date,
        username,
        avatar,
    }
}

impl From<RawCommit> for RemoteCommit {
    fn from(raw: RawCommit) -> Self {
        Self {
            sha: raw.sha,
            message: raw.commit.message,
            author: signature(raw.commit.author, raw.author),
            committer: signature(raw.commit.committer, None),
            url: raw.html_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Page selection for listing endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    config: GitHubConfig,
}

impl GitHubClient {
    pub fn new(config: GitHubConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(format!("git-version-analyzer/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, config })
    }

    /// Authorization redirect URL carrying the given `state` nonce
    pub fn authorization_url(&self, state: &str) -> Result<String> {
        let mut url = self.endpoint(&self.config.oauth_base, "login/oauth/authorize")?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.callback_url)
            .append_pair("scope", &self.config.scopes)
            .append_pair("state", state);
        Ok(url.into())
    }

    /// Exchanges an authorization code for an access token
    pub async fn exchange_code(&self, code: &str) -> Result<String> {
        let url = self.endpoint(&self.config.oauth_base, "login/oauth/access_token")?;
        let response = self
            .http
            .post(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&serde_json::json!({
                "client_id": self.config.client_id,
                "client_secret": self.config.client_secret,
                "code": code,
                "redirect_uri": self.config.callback_url,
            }))
            .send()
            .await?;
        let body: TokenResponse = Self::decode(response).await?;
        match (body.access_token, body.error) {
            (Some(token), None) if !token.is_empty() => Ok(token),
            (_, error) => Err(Error::authentication(
                body.error_description
                    .or(error)
                    .unwrap_or_else(|| "no access token in response".to_string()),
            )),
        }
    }

    pub async fn user(&self, token: &str) -> Result<GitHubUser> {
        let raw: RawUser = self.get_json(token, "user", &[]).await?;
        Ok(raw.into())
    }

    /// Repositories of the authenticated user, most recently updated first
    pub async fn repositories(&self, token: &str, page: Page) -> Result<Vec<RepositorySummary>> {
        let query = [
            ("sort", "updated".to_string()),
            ("direction", "desc".to_string()),
            ("page", page.page.to_string()),
            ("per_page", page.per_page.to_string()),
        ];
        let raw: Vec<RawRepository> = self.get_json(token, "user/repos", &query).await?;
        Ok(raw.into_iter().map(Into::into).collect())
    }

    pub async fn repository(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
    ) -> Result<RepositorySummary> {
        let path = format!("repos/{}/{}", owner, repo);
        let raw: RawRepository = self.get_json(token, &path, &[]).await?;
        Ok(raw.into())
    }

    pub async fn commits(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        branch: &str,
        page: Page,
    ) -> Result<Vec<RemoteCommit>> {
        let path = format!("repos/{}/{}/commits", owner, repo);
        let query = [
            ("sha", branch.to_string()),
            ("page", page.page.to_string()),
            ("per_page", page.per_page.to_string()),
        ];
        let raw: Vec<RawCommit> = self.get_json(token, &path, &query).await?;
        Ok(raw.into_iter().map(Into::into).collect())
    }

    fn endpoint(&self, base: &str, path: &str) -> Result<Url> {
        let base = format!("{}/", base.trim_end_matches('/'));
        Url::parse(&base)
            .and_then(|b| b.join(path))
            .map_err(|e| Error::Config(format!("invalid GitHub URL {}: {}", base, e)))
    }

    fn authorized(&self, token: &str, path: &str) -> Result<RequestBuilder> {
        if token.trim().is_empty() {
            return Err(Error::authentication("a GitHub access token is required"));
        }
        let url = self.endpoint(&self.config.api_base, path)?;
        Ok(self
            .http
            .get(url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, API_ACCEPT))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        token: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let response = self.authorized(token, path)?.query(query).send().await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::authentication("GitHub rejected the access token"));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::upstream(format!("GitHub responded {}: {}", status, body.trim())));
        }
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
