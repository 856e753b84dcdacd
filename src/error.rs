//! Error types for the daemon's fallible boundaries.

use thiserror::Error;

/// Errors surfaced from daemon setup and session bring-up.
#[derive(Error, Debug)]
pub enum WatchdError {
    #[error("failed to bind control socket at {path}: {source}")]
    SocketBind {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn PTY for command {command:?}: {source}")]
    PtySpawn {
        command: Vec<String>,
        #[source]
        source: anyhow::Error,
    },

    #[error("open frame missing or empty 'command' field")]
    EmptyCommand,

    #[error("open frame was not valid JSON: {0}")]
    MalformedOpenFrame(#[from] serde_json::Error),

    #[error("client did not send an open frame within the setup timeout")]
    OpenFrameTimeout,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
