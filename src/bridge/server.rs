use crate::bridge::lockfile::{
    IDE_NAME, Lockfile, LockfileError, lockfile_path, remove_lockfile, write_lockfile,
};
use crate::bridge::protocol::{
    BridgeRequest, ProtocolError, error_response, notification, parse_client_message, response,
};
use crate::infra::{normalize_path, spawn_detached};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{debug, info, warn};

const READY_ATTEMPTS: u32 = 40;
const READY_DELAY: Duration = Duration::from_millis(50);
const NOTIFICATION_BUFFER: usize = 64;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to bind IDE bridge: {0}")]
    Bind(#[source] io::Error),

    #[error(transparent)]
    Lockfile(#[from] LockfileError),

    #[error("IDE bridge not ready after {attempts} attempts")]
    NotReady { attempts: u32 },

    #[error("IDE bridge stopped during start-up")]
    Stopped,
}

#[derive(Clone, Debug)]
pub struct BridgeOptions {
    pub data_home: PathBuf,
    pub auth_token: String,
    pub open_command: String,
}

pub fn generate_auth_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

struct BridgeContext {
    auth_token: String,
    open_command: String,
    workspace: watch::Receiver<Vec<PathBuf>>,
}

impl BridgeContext {
    /// Resolves `raw` and rejects anything outside the current workspace
    /// folders.
    fn workspace_path(&self, raw: &str) -> Result<PathBuf, ProtocolError> {
        let raw = raw.strip_prefix("file://").unwrap_or(raw);
        if !Path::new(raw).is_absolute() {
            return Err(ProtocolError::invalid_params(format!(
                "{raw} is not an absolute path"
            )));
        }
        let path = normalize_path(raw, Path::new("/"), None)
            .map_err(|error| ProtocolError::invalid_params(error.to_string()))?;
        let folders = self.workspace.borrow();
        if folders.iter().any(|folder| path.starts_with(folder)) {
            Ok(path)
        } else {
            Err(ProtocolError::invalid_params(format!(
                "{} is outside the workspace",
                path.display()
            )))
        }
    }
}

pub struct BridgeHandle {
    port: u16,
    notifications: broadcast::Sender<String>,
    task: JoinHandle<()>,
}

impl BridgeHandle {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn notify_visible_files(&self, work_area: &Path, paths: &[String]) {
        let uris: Vec<String> = paths
            .iter()
            .map(|path| format!("file://{}", work_area.join(path).display()))
            .collect();
        let text = notification("visibleFilesDidChange", json!({ "uris": uris }));
        if self.notifications.send(text).is_err() {
            debug!("no IDE clients for visibleFilesDidChange");
        }
    }

    /// Waits for the server task to finish after shutdown was signalled.
    pub async fn stopped(self) {
        if let Err(error) = self.task.await {
            warn!(%error, "IDE bridge task failed");
        }
    }
}

/// Spawns the bridge on the current `LocalSet` and waits, a bounded number
/// of times, for it to bind and publish its lockfile.
pub async fn start_bridge(
    options: BridgeOptions,
    workspace: watch::Receiver<Vec<PathBuf>>,
    shutdown: watch::Receiver<bool>,
) -> Result<BridgeHandle, BridgeError> {
    let (notifications, _) = broadcast::channel(NOTIFICATION_BUFFER);
    let (ready_tx, mut ready_rx) = oneshot::channel();
    let context = Rc::new(BridgeContext {
        auth_token: options.auth_token,
        open_command: options.open_command,
        workspace: workspace.clone(),
    });
    let task = tokio::task::spawn_local(run_server(
        context,
        options.data_home,
        workspace,
        shutdown,
        notifications.clone(),
        ready_tx,
    ));

    for _ in 0..READY_ATTEMPTS {
        match ready_rx.try_recv() {
            Ok(Ok((port, lockfile))) => {
                info!(port, lockfile = %lockfile.display(), "IDE bridge listening");
                return Ok(BridgeHandle {
                    port,
                    notifications,
                    task,
                });
            }
            Ok(Err(error)) => return Err(error),
            Err(TryRecvError::Empty) => tokio::time::sleep(READY_DELAY).await,
            Err(TryRecvError::Closed) => return Err(BridgeError::Stopped),
        }
    }

    task.abort();
    Err(BridgeError::NotReady {
        attempts: READY_ATTEMPTS,
    })
}

async fn run_server(
    context: Rc<BridgeContext>,
    data_home: PathBuf,
    mut workspace: watch::Receiver<Vec<PathBuf>>,
    mut shutdown: watch::Receiver<bool>,
    notifications: broadcast::Sender<String>,
    ready: oneshot::Sender<Result<(u16, PathBuf), BridgeError>>,
) {
    let bound = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .await
        .and_then(|listener| Ok((listener.local_addr()?.port(), listener)));
    let (port, listener) = match bound {
        Ok(bound) => bound,
        Err(error) => {
            let _ = ready.send(Err(BridgeError::Bind(error)));
            return;
        }
    };

    let lockfile = lockfile_path(&data_home, port);
    let written = write_lockfile(
        &lockfile,
        &Lockfile::new(port, &context.auth_token, &workspace.borrow_and_update()),
    );
    if let Err(error) = written {
        let _ = ready.send(Err(error.into()));
        return;
    }
    if ready.send(Ok((port, lockfile.clone()))).is_err() {
        let _ = remove_lockfile(&lockfile);
        return;
    }

    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            changed = workspace.changed() => {
                if changed.is_err() {
                    break;
                }
                let folders = workspace.borrow_and_update().clone();
                match write_lockfile(&lockfile, &Lockfile::new(port, &context.auth_token, &folders)) {
                    Ok(()) => debug!(folders = folders.len(), "IDE lockfile updated"),
                    Err(error) => warn!(%error, "failed to update IDE lockfile"),
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::task::spawn_local(handle_connection(
                        stream,
                        peer,
                        context.clone(),
                        notifications.subscribe(),
                        shutdown.clone(),
                    ));
                }
                Err(error) => warn!(%error, "IDE bridge accept failed"),
            },
        }
    }

    if let Err(error) = remove_lockfile(&lockfile) {
        warn!(%error, lockfile = %lockfile.display(), "failed to remove IDE lockfile");
    }
    info!(port, "IDE bridge stopped");
}

fn query_has_token(query: Option<&str>, token: &str) -> bool {
    query
        .unwrap_or_default()
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .any(|(key, value)| key == "auth" && value == token)
}

fn unauthorized() -> ErrorResponse {
    let mut response = ErrorResponse::new(Some("unauthorized".to_string()));
    *response.status_mut() = StatusCode::UNAUTHORIZED;
    response
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    context: Rc<BridgeContext>,
    mut notifications: broadcast::Receiver<String>,
    mut shutdown: watch::Receiver<bool>,
) {
    let token = context.auth_token.clone();
    let check_auth = move |request: &Request, response: Response| {
        if token.is_empty() || query_has_token(request.uri().query(), &token) {
            Ok(response)
        } else {
            Err(unauthorized())
        }
    };
    let mut ws = match tokio_tungstenite::accept_hdr_async(stream, check_auth).await {
        Ok(ws) => ws,
        Err(error) => {
            debug!(%peer, %error, "IDE handshake rejected");
            return;
        }
    };
    info!(%peer, "IDE client connected");

    let metadata = notification(
        "pluginMetadata",
        json!({ "ideName": IDE_NAME, "version": env!("CARGO_PKG_VERSION") }),
    );
    if ws.send(Message::Text(metadata.into())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    let _ = ws.send(Message::Close(None)).await;
                    break;
                }
            }
            note = notifications.recv() => match note {
                Ok(text) => {
                    if ws.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => debug!(%peer, skipped, "IDE client lagging"),
                Err(RecvError::Closed) => break,
            },
            msg = ws.next() => {
                let Some(Ok(msg)) = msg else {
                    break;
                };
                match msg {
                    Message::Text(text) => {
                        if let Some(reply) = handle_text(&context, text.as_str()).await {
                            if ws.send(Message::Text(reply.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Message::Ping(bytes) => {
                        if ws.send(Message::Pong(bytes)).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }
    info!(%peer, "IDE client disconnected");
}

async fn handle_text(context: &BridgeContext, text: &str) -> Option<String> {
    let incoming = parse_client_message(text)?;
    let reply = match incoming.request {
        Ok(request) => {
            let method = request.method();
            debug!(method, "IDE request");
            match execute(context, request).await {
                Ok(payload) => response(&incoming.id, method, payload),
                Err(error) => error_response(&incoming.id, &error),
            }
        }
        Err(error) => error_response(&incoming.id, &error),
    };
    Some(reply)
}

async fn execute(context: &BridgeContext, request: BridgeRequest) -> Result<Value, ProtocolError> {
    match request {
        BridgeRequest::Ping { message } => Ok(json!({ "message": message })),
        BridgeRequest::Authenticate => Ok(json!({ "authenticated": true })),
        BridgeRequest::ReadFile { path } => {
            let path = context.workspace_path(&path)?;
            Ok(match tokio::fs::read_to_string(&path).await {
                Ok(content) => json!({ "success": true, "content": content, "encoding": "utf-8" }),
                Err(error) => json!({ "success": false, "message": error.to_string() }),
            })
        }
        BridgeRequest::EditFile { path, full_content } => {
            let path = context.workspace_path(&path)?;
            Ok(match tokio::fs::write(&path, full_content).await {
                Ok(()) => json!({
                    "success": true,
                    "message": format!("wrote {}", path.display()),
                    "appliedChanges": true,
                }),
                Err(error) => json!({ "success": false, "message": error.to_string() }),
            })
        }
        BridgeRequest::GetDiagnostics { path } => {
            context.workspace_path(&path)?;
            Ok(json!({ "entries": [] }))
        }
        BridgeRequest::OpenUri { uri } => Ok(match spawn_detached(&context.open_command, &uri) {
            Ok(()) => json!({ "success": true }),
            Err(error) => json!({ "success": false, "message": error.to_string() }),
        }),
    }
}
