//! `watchd`: runs a command under a PTY, relays its I/O to a single
//! control-socket client, and pushes HTTP notifications when the output
//! matches a failure pattern, goes quiet too long, or the command exits.

pub mod config;
pub mod control_frame;
pub mod error;
pub mod event;
pub mod logging;
pub mod notifier;
pub mod pattern_detector;
pub mod pty;
pub mod session;
pub mod supervisor;
