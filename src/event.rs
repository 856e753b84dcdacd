//! The `Event` record: something worth notifying about.

use serde::{Deserialize, Serialize};

/// What kind of thing happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PatternMatch,
    Inactivity,
    ExitCode,
}

impl EventKind {
    /// The string used in the `Notifier`'s `Title` header and log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PatternMatch => "pattern_match",
            EventKind::Inactivity => "inactivity",
            EventKind::ExitCode => "exit_code",
        }
    }
}

/// Push-notification urgency. Maps to ntfy.sh's numeric `Priority` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Default,
    High,
    Urgent,
}

impl Priority {
    /// Numeric push level, 2..5. Unknown priorities (not representable
    /// here since the enum is closed) would map to 3 per spec; this
    /// mapping is exhaustive so that branch never triggers in practice.
    pub fn as_numeric(&self) -> &'static str {
        match self {
            Priority::Low => "2",
            Priority::Default => "3",
            Priority::High => "4",
            Priority::Urgent => "5",
        }
    }
}

/// An immutable record describing something worth notifying about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub message: String,
    pub priority: Priority,
    pub tags: Vec<String>,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub context: String,
    #[serde(default)]
    pub command: String,
}

impl Event {
    pub fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    pub fn pattern_match(pattern_source: &str, context: String, command: String) -> Self {
        Self {
            kind: EventKind::PatternMatch,
            message: format!("Matched: {}", pattern_source),
            priority: Priority::High,
            tags: vec!["warning".to_string()],
            timestamp: Self::now(),
            context,
            command,
        }
    }

    pub fn inactivity(timeout_secs: u64, command: String) -> Self {
        Self {
            kind: EventKind::Inactivity,
            message: format!("No output for {}s", timeout_secs),
            priority: Priority::Default,
            tags: vec!["hourglass_done".to_string()],
            timestamp: Self::now(),
            context: String::new(),
            command,
        }
    }

    pub fn exit_code(code: i32, command: String) -> Self {
        Self {
            kind: EventKind::ExitCode,
            message: format!("Exited with code {}", code),
            priority: Priority::High,
            tags: vec!["x".to_string()],
            timestamp: Self::now(),
            context: String::new(),
            command,
        }
    }
}
