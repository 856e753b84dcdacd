//! The per-client PTY session: owns the PTY, the client socket, and the
//! event loop multiplexing both.

use std::time::{Duration, Instant};

use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::control_frame::{self, ControlFrame, Directive};
use crate::event::Event;
use crate::notifier::Notifier;
use crate::pattern_detector::PatternDetector;
use crate::pty::{self, PtyMaster, SpawnOutcome};

const READ_CHUNK: usize = 4096;
const BASE_WAIT: Duration = Duration::from_secs(1);
const MIN_WAIT: Duration = Duration::from_millis(100);

/// Runs one session to completion: spawns the command under a PTY,
/// relays I/O with the client, and dispatches detector/watchdog/exit
/// events to the notifier. Consumes `client`; never panics on a
/// session-local fault.
pub async fn run(
    session_id: Uuid,
    command: Vec<String>,
    mut client: UnixStream,
    notifier: Notifier,
    inactivity_timeout: Option<Duration>,
) {
    let command_str = command.join(" ");

    let outcome = match pty::spawn(&command) {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(session_id = %session_id, error = %err, "failed to open PTY for session");
            let _ = client.shutdown().await;
            return;
        }
    };

    let (master, pid, _child) = match outcome {
        SpawnOutcome::Live { master, pid, child } => (master, pid, Some(child)),
        SpawnOutcome::ExecFailed => {
            info!(session_id = %session_id, command = %command_str, "exec failed, reporting exit 127");
            let event = Event::exit_code(127, command_str.clone());
            notifier.send(&event).await;
            let _ = send_frame(&mut client, "exit", "127").await;
            let _ = client.shutdown().await;
            return;
        }
    };

    info!(session_id = %session_id, command = %command_str, pid, "session started");

    let mut detector = PatternDetector::with_defaults();
    let mut last_activity = Instant::now();
    let mut inactivity_notified = false;
    let mut read_buf = [0u8; READ_CHUNK];
    let mut client_buf = [0u8; READ_CHUNK];

    loop {
        let wait_budget = match inactivity_timeout {
            Some(timeout) => {
                let remaining = timeout.saturating_sub(last_activity.elapsed());
                remaining.clamp(MIN_WAIT, BASE_WAIT)
            }
            None => BASE_WAIT,
        };

        tokio::select! {
            _ = tokio::time::sleep(wait_budget) => {}
            result = master.read(&mut read_buf) => {
                match result {
                    Ok(0) => {
                        debug!(session_id = %session_id, "PTY EOF");
                        break;
                    }
                    Ok(n) => {
                        last_activity = Instant::now();
                        inactivity_notified = false;

                        let text = String::from_utf8_lossy(&read_buf[..n]).into_owned();
                        if send_frame(&mut client, "output", &text).await.is_err() {
                            break;
                        }

                        for event in detector.feed(&text, &command_str) {
                            dispatch(&mut client, &notifier, event).await;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                    Err(e) => {
                        warn!(session_id = %session_id, error = %e, "PTY read error");
                        break;
                    }
                }
            }
            result = client.read(&mut client_buf) => {
                match result {
                    Ok(0) => {
                        debug!(session_id = %session_id, "client closed socket");
                        break;
                    }
                    Ok(n) => {
                        if let Err(e) = handle_client_chunk(&master, &client_buf[..n]).await {
                            warn!(session_id = %session_id, error = %e, "writing to PTY failed");
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                    Err(e) => {
                        debug!(session_id = %session_id, error = %e, "client read error");
                        break;
                    }
                }
            }
        }

        if let Some(timeout) = inactivity_timeout {
            if !inactivity_notified && last_activity.elapsed() > timeout {
                let event = Event::inactivity(timeout.as_secs(), command_str.clone());
                notifier.send(&event).await;
                let _ = send_frame(&mut client, "event", &serde_json::to_string(&event).unwrap_or_default()).await;
                inactivity_notified = true;
            }
        }

        match reap(pid) {
            ReapResult::StillRunning => {}
            ReapResult::Exited(code) => {
                info!(session_id = %session_id, code, "child exited");
                if code != 0 {
                    let event = Event::exit_code(code, command_str.clone());
                    notifier.send(&event).await;
                }
                let _ = send_frame(&mut client, "exit", &code.to_string()).await;
                break;
            }
            ReapResult::Gone => {
                debug!(session_id = %session_id, "child already reaped");
                break;
            }
        }
    }

    let _ = client.shutdown().await;
    info!(session_id = %session_id, "session closed");
}

async fn handle_client_chunk(master: &PtyMaster, chunk: &[u8]) -> std::io::Result<()> {
    match control_frame::classify(chunk) {
        Directive::RawInput(bytes) => master.write_all(&bytes).await,
        Directive::Control(ControlFrame::Input { data }) => master.write_all(data.as_bytes()).await,
        Directive::Control(ControlFrame::Resize { rows, cols }) => {
            let _ = master.resize(rows, cols);
            Ok(())
        }
    }
}

async fn dispatch(client: &mut UnixStream, notifier: &Notifier, event: Event) {
    notifier.send(&event).await;
    let payload = serde_json::to_string(&event).unwrap_or_default();
    let _ = send_frame(client, "event", &payload).await;
}

async fn send_frame(client: &mut UnixStream, msg_type: &str, data: &str) -> std::io::Result<()> {
    let line = json!({ "type": msg_type, "data": data }).to_string();
    client.write_all(line.as_bytes()).await?;
    client.write_all(b"\n").await
}

enum ReapResult {
    StillRunning,
    Exited(i32),
    Gone,
}

fn reap(pid: i32) -> ReapResult {
    match waitpid(Pid::from_raw(pid), Some(WaitPidFlag::WNOHANG)) {
        Ok(WaitStatus::StillAlive) => ReapResult::StillRunning,
        Ok(WaitStatus::Exited(_, code)) => ReapResult::Exited(code),
        Ok(WaitStatus::Signaled(_, signal, _)) => ReapResult::Exited(128 + signal as i32),
        Ok(_other) => ReapResult::Exited(1),
        Err(nix::errno::Errno::ECHILD) => ReapResult::Gone,
        Err(_) => ReapResult::StillRunning,
    }
}
