// src/session.rs

//! Identity state machine over `anonymous -> authenticating -> authenticated`.
//!
//! The authenticated identity is persisted to a single JSON file. Manual and
//! guest identities carry no access token.

use crate::error::{Error, Result};
use crate::github::GitHubUser;
use crate::model::{LoginType, PublicIdentity, UserIdentity};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

/// Whole-file JSON store for the current identity
#[derive(Debug, Clone)]
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<UserIdentity>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Writes to a sibling temp file and renames it over the target
    pub fn save(&self, identity: &UserIdentity) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            restrict_permissions(&file)?;
            file.write_all(&serde_json::to_vec_pretty(identity)?)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(file: &fs::File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &fs::File) -> std::io::Result<()> {
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionState {
    Anonymous,
    /// Waiting for the OAuth callback that echoes `csrf_state`
    Authenticating { csrf_state: String },
    Authenticated { session_id: String, identity: UserIdentity },
}

#[derive(Debug)]
pub struct SessionManager {
    state: SessionState,
    store: IdentityStore,
}

impl SessionManager {
    /// Restores a persisted identity if one exists
    pub fn load(store: IdentityStore) -> Result<Self> {
        let state = match store.load() {
            Ok(Some(identity)) => {
                info!(
                    "Restored {} identity for {}",
                    login_label(identity.login_type),
                    identity.username
                );
                SessionState::Authenticated {
                    session_id: new_session_id(),
                    identity,
                }
            }
            Ok(None) => SessionState::Anonymous,
            Err(err) => {
                warn!("Ignoring unreadable identity file {}: {}", store.path().display(), err);
                SessionState::Anonymous
            }
        };
        Ok(Self { state, store })
    }

    /// Starts anonymous without reading the store.
    ///
    /// The stored identity stays in place until a new login succeeds and
    /// overwrites it.
    pub fn fresh(store: IdentityStore) -> Self {
        Self {
            state: SessionState::Anonymous,
            store,
        }
    }

    pub fn identity(&self) -> Option<&UserIdentity> {
        match &self.state {
            SessionState::Authenticated { identity, .. } => Some(identity),
            _ => None,
        }
    }

    pub fn public_identity(&self) -> Option<PublicIdentity> {
        self.identity().map(PublicIdentity::from)
    }

    pub fn access_token(&self) -> Option<&str> {
        self.identity().and_then(|i| i.access_token.as_deref())
    }

    pub fn session_id(&self) -> Option<&str> {
        match &self.state {
            SessionState::Authenticated { session_id, .. } => Some(session_id),
            _ => None,
        }
    }

    /// Whether `candidate` names the live session
    pub fn is_session(&self, candidate: &str) -> bool {
        self.session_id().is_some_and(|id| id == candidate)
    }

    /// `anonymous -> authenticating`; returns the `state` nonce for the redirect
    pub fn begin_github_login(&mut self) -> Result<String> {
        if let SessionState::Authenticated { identity, .. } = &self.state {
            return Err(Error::validation(format!(
                "already signed in as {}; log out first",
                identity.username
            )));
        }
        let csrf_state = Uuid::new_v4().simple().to_string();
        self.state = SessionState::Authenticating {
            csrf_state: csrf_state.clone(),
        };
        Ok(csrf_state)
    }

    /// Checks the callback's `state` against the pending login.
    ///
    /// A mismatch or a callback with no pending login cancels the attempt.
    pub fn verify_callback(&mut self, state: Option<&str>) -> Result<()> {
        let expected = match &self.state {
            SessionState::Authenticating { csrf_state } => csrf_state.clone(),
            _ => return Err(Error::authentication("no login in progress")),
        };
        if state != Some(expected.as_str()) {
            self.cancel_login();
            return Err(Error::authentication("OAuth state mismatch"));
        }
        Ok(())
    }

    /// `authenticating -> anonymous`; nothing is persisted
    pub fn cancel_login(&mut self) {
        if matches!(self.state, SessionState::Authenticating { .. }) {
            self.state = SessionState::Anonymous;
        }
    }

    /// `authenticating -> authenticated` after a successful token exchange
    pub fn complete_github_login(
        &mut self,
        token: String,
        user: GitHubUser,
    ) -> Result<&UserIdentity> {
        if !matches!(self.state, SessionState::Authenticating { .. }) {
            return Err(Error::authentication("no login in progress"));
        }
        let identity = UserIdentity {
            id: user.id.to_string(),
            username: user.username,
            display_name: user.name,
            email: user.email,
            avatar_url: user.avatar,
            access_token: Some(token),
            login_type: LoginType::Github,
        };
        self.establish(identity)
    }

    /// Manual entry: at least one of email or GitHub username
    pub fn login_manual(
        &mut self,
        email: Option<String>,
        github_username: Option<String>,
    ) -> Result<&UserIdentity> {
        let email = email.filter(|e| !e.trim().is_empty());
        let github_username = github_username.filter(|g| !g.trim().is_empty());
        let username = match (&github_username, &email) {
            (Some(user), _) => user.clone(),
            (None, Some(email)) => email.split('@').next().unwrap_or(email).to_string(),
            (None, None) => {
                return Err(Error::validation(
                    "provide at least an email or a GitHub username",
                ))
            }
        };
        let identity = UserIdentity {
            id: Uuid::new_v4().to_string(),
            display_name: username.clone(),
            username,
            email,
            avatar_url: None,
            access_token: None,
            login_type: LoginType::Manual,
        };
        self.establish(identity)
    }

    pub fn login_guest(&mut self) -> Result<&UserIdentity> {
        let identity = UserIdentity {
            id: "guest".to_string(),
            username: "guest".to_string(),
            display_name: "Guest".to_string(),
            email: None,
            avatar_url: None,
            access_token: None,
            login_type: LoginType::Guest,
        };
        self.establish(identity)
    }

    /// `authenticated -> anonymous`, discarding the file and the token
    pub fn logout(&mut self) -> Result<Option<UserIdentity>> {
        let previous = std::mem::replace(&mut self.state, SessionState::Anonymous);
        self.store.clear()?;
        match previous {
            SessionState::Authenticated { identity, .. } => {
                info!("Signed out {}", identity.username);
                Ok(Some(identity))
            }
            _ => Ok(None),
        }
    }

    fn establish(&mut self, identity: UserIdentity) -> Result<&UserIdentity> {
        self.store.save(&identity)?;
        info!("Signed in {} ({})", identity.username, login_label(identity.login_type));
        self.state = SessionState::Authenticated {
            session_id: new_session_id(),
            identity,
        };
        self.identity()
            .ok_or_else(|| Error::authentication("identity was not established"))
    }
}

fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

fn login_label(kind: LoginType) -> &'static str {
    match kind {
        LoginType::Github => "github",
        LoginType::Manual => "manual",
        LoginType::Guest => "guest",
    }
}
