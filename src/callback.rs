// src/callback.rs

//! Short-lived local listener that catches the OAuth redirect.
//!
//! Bound to a fixed local address, it answers the first request on the
//! callback path that carries a `code` or an `error`, then shuts down. It
//! also shuts down when the shell exits (Ctrl-C).

use crate::error::{Error, Result};
use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, info};

/// Query parameters of the OAuth redirect
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

impl CallbackParams {
    /// The authorization code, or why there is none
    pub fn into_code(self) -> Result<String> {
        if let Some(error) = self.error {
            return Err(Error::authentication(format!("authorization was not granted: {}", error)));
        }
        self.code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::authentication("callback carried no authorization code"))
    }
}

type Slot = Arc<Mutex<Option<oneshot::Sender<CallbackParams>>>>;

async fn handle_callback(
    State(slot): State<Slot>,
    Query(params): Query<CallbackParams>,
) -> Html<&'static str> {
    if params.code.is_none() && params.error.is_none() {
        return Html("<p>Waiting for authorization.</p>");
    }
    let sender = slot.lock().ok().and_then(|mut guard| guard.take());
    if let Some(sender) = sender {
        let _ = sender.send(params);
    }
    Html("<p>Authorization received. You can close this window.</p>")
}

/// Callback path of a configured redirect URL, e.g. `/auth/github/callback`
pub fn callback_path(callback_url: &str) -> Result<String> {
    let url = reqwest::Url::parse(callback_url)
        .map_err(|e| Error::Config(format!("invalid callback URL {}: {}", callback_url, e)))?;
    Ok(url.path().to_string())
}

/// Local socket address the callback URL points at
pub fn callback_addr(callback_url: &str) -> Result<SocketAddr> {
    let url = reqwest::Url::parse(callback_url)
        .map_err(|e| Error::Config(format!("invalid callback URL {}: {}", callback_url, e)))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| Error::Config(format!("callback URL {} has no port", callback_url)))?;
    Ok(SocketAddr::from(([127, 0, 0, 1], port)))
}

pub struct CallbackListener {
    listener: TcpListener,
    path: String,
}

impl CallbackListener {
    pub async fn bind(addr: SocketAddr, path: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        debug!("OAuth callback listener bound to {}", listener.local_addr()?);
        Ok(Self {
            listener,
            path: path.to_string(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves until the first callback arrives, then tears the listener down
    pub async fn wait(self) -> Result<CallbackParams> {
        let (tx, rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let slot: Slot = Arc::new(Mutex::new(Some(tx)));
        let app = Router::new()
            .route(&self.path, get(handle_callback))
            .with_state(slot);

        let server = axum::serve(self.listener, app).with_graceful_shutdown(async move {
            let _ = done_rx.await;
        });
        let server = tokio::spawn(async move { server.await });

        let outcome = tokio::select! {
            params = rx => params.map_err(|_| Error::authentication("callback listener closed")),
            _ = tokio::signal::ctrl_c() => Err(Error::authentication("login cancelled")),
        };

        let _ = done_tx.send(());
        if let Ok(Err(err)) = server.await {
            debug!("Callback listener stopped with error: {}", err);
        }
        info!("OAuth callback listener closed");
        outcome
    }
}
