//! Rate-limited HTTP push notifications.
//!
//! A guarded map tracks last-seen timestamps per key, and the outbound
//! network call never happens while holding the lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::event::{Event, EventKind};

const RATE_LIMIT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Sends `Event`s to a push endpoint over HTTP, deduplicating bursts.
#[derive(Clone)]
pub struct Notifier {
    client: reqwest::Client,
    url: String,
    last_notify: Arc<RwLock<HashMap<(EventKind, String), Instant>>>,
}

impl Notifier {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client builds with default TLS backend");

        Self {
            client,
            url: url.into(),
            last_notify: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// POST `event` to the endpoint, returning whether it was accepted.
    ///
    /// Keyed by `(kind, command)`: if the last attempted or successful
    /// delivery for that key happened within the rate-limit window, this
    /// returns `false` without issuing a request. The timestamp is
    /// updated before the request is attempted regardless of outcome,
    /// which intentionally suppresses retry storms when the endpoint is
    /// unavailable (at the cost of losing events during an outage).
    pub async fn send(&self, event: &Event) -> bool {
        let key = (event.kind, event.command.clone());
        let now = Instant::now();

        {
            let mut last_notify = self.last_notify.write().await;
            if let Some(&last) = last_notify.get(&key) {
                if now.duration_since(last) < RATE_LIMIT {
                    debug!(kind = event.kind.as_str(), command = %event.command, "rate-limited, skipping notification");
                    return false;
                }
            }
            last_notify.insert(key, now);
        }

        self.deliver(event).await
    }

    async fn deliver(&self, event: &Event) -> bool {
        let title = format!("[watchd] {}", event.kind.as_str());
        let mut body = format!("{}\nCommand: {}", event.message, event.command);
        if !event.context.is_empty() {
            body.push_str("\n\n");
            body.push_str(last_bytes_as_str(&event.context, 500));
        }

        let result = self
            .client
            .post(&self.url)
            .header("Title", title)
            .header("Priority", event.priority.as_numeric())
            .header("Tags", event.tags.join(","))
            .body(body)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status() == reqwest::StatusCode::OK => {
                debug!(kind = event.kind.as_str(), "notification delivered");
                true
            }
            Ok(resp) => {
                warn!(kind = event.kind.as_str(), status = %resp.status(), "notification rejected");
                false
            }
            Err(err) => {
                warn!(kind = event.kind.as_str(), error = %err, "notification failed");
                false
            }
        }
    }
}

/// Returns the trailing `max_len` bytes of `s`, widened backward to the
/// nearest UTF-8 character boundary so the slice is always valid `str`.
fn last_bytes_as_str(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut start = s.len() - max_len;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Priority;

    fn sample_event(command: &str) -> Event {
        Event {
            kind: EventKind::PatternMatch,
            message: "Matched: error".to_string(),
            priority: Priority::High,
            tags: vec!["warning".to_string()],
            timestamp: 0,
            context: String::new(),
            command: command.to_string(),
        }
    }

    #[tokio::test]
    async fn rate_limits_same_key_within_window() {
        let notifier = Notifier::new("http://127.0.0.1:0/unreachable");
        let event = sample_event("sh -c true");

        // First call updates the timestamp and attempts delivery (which
        // will fail since nothing is listening); the bucket is populated
        // either way.
        let _ = notifier.send(&event).await;

        // Second call within the window must be dropped before any
        // network attempt is made.
        let second = notifier.send(&event).await;
        assert!(!second);
    }

    #[tokio::test]
    async fn distinct_commands_are_independent_keys() {
        let notifier = Notifier::new("http://127.0.0.1:0/unreachable");
        let _ = notifier.send(&sample_event("cmd-a")).await;
        let _ = notifier.send(&sample_event("cmd-b")).await;

        {
            let map = notifier.last_notify.read().await;
            assert_eq!(map.len(), 2);
        }
    }
}
