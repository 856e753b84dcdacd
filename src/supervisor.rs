//! Accepts client connections, parses the session-open frame, and
//! constructs/registers Sessions.

use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::notifier::Notifier;
use crate::session;

const OPEN_FRAME_TIMEOUT: Duration = Duration::from_secs(5);
const OPEN_FRAME_MAX_BYTES: usize = 4096;

#[derive(Debug, Deserialize)]
struct OpenFrame {
    #[serde(default)]
    command: Vec<String>,
    #[serde(default)]
    timeout: Option<u64>,
}

/// Registry of in-flight sessions, swept by predicate on task completion.
pub struct SessionSupervisor {
    sessions: Arc<DashMap<Uuid, JoinHandle<()>>>,
    notifier: Notifier,
    socket_path: String,
}

impl SessionSupervisor {
    pub fn new(config: &Config) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            notifier: Notifier::new(config.ntfy_url.clone()),
            socket_path: config.socket_path.clone(),
        }
    }

    /// Binds the control socket (mode 0600, unlinking any stale file
    /// first) and runs the accept loop until SIGINT/SIGTERM, then
    /// unlinks the socket path before returning.
    pub async fn run(self) -> anyhow::Result<()> {
        let _ = std::fs::remove_file(&self.socket_path);
        let listener =
            UnixListener::bind(&self.socket_path).map_err(|source| crate::error::WatchdError::SocketBind {
                path: self.socket_path.clone(),
                source,
            })?;
        std::fs::set_permissions(&self.socket_path, std::fs::Permissions::from_mode(0o600))?;

        info!(socket = %self.socket_path, "watchd listening");

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _addr)) => self.spawn_session(stream),
                        Err(e) => warn!(error = %e, "accept error"),
                    }
                }
                _ = shutdown_signal() => {
                    info!("shutdown signal received, stopping accept loop");
                    break;
                }
            }

            self.sweep();
        }

        let _ = std::fs::remove_file(&self.socket_path);
        info!("watchd stopped");
        Ok(())
    }

    fn spawn_session(&self, mut stream: UnixStream) {
        let sessions = self.sessions.clone();
        let notifier = self.notifier.clone();
        let session_id = Uuid::new_v4();

        let handle = tokio::spawn(async move {
            let open_frame = match read_open_frame(&mut stream).await {
                Ok(frame) => frame,
                Err(e) => {
                    debug!(session_id = %session_id, error = %e, "client error during session setup");
                    return;
                }
            };

            if open_frame.command.is_empty() {
                debug!(session_id = %session_id, "open frame missing or empty command, closing");
                return;
            }

            info!(session_id = %session_id, command = ?open_frame.command, "starting session");

            session::run(
                session_id,
                open_frame.command,
                stream,
                notifier,
                open_frame.timeout.map(Duration::from_secs),
            )
            .await;
        });

        sessions.insert(session_id, handle);
    }

    fn sweep(&self) {
        self.sessions.retain(|_, handle| !handle.is_finished());
    }
}

async fn read_open_frame(stream: &mut UnixStream) -> Result<OpenFrame, crate::error::WatchdError> {
    use crate::error::WatchdError;

    let mut buf = vec![0u8; OPEN_FRAME_MAX_BYTES];
    let n = tokio::time::timeout(OPEN_FRAME_TIMEOUT, stream.read(&mut buf))
        .await
        .map_err(|_| WatchdError::OpenFrameTimeout)??;

    if n == 0 {
        return Err(WatchdError::EmptyCommand);
    }

    let frame: OpenFrame = serde_json::from_slice(&buf[..n])?;
    Ok(frame)
}

/// Races Ctrl+C against SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
