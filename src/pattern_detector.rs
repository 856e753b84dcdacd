//! Line-buffered scanner producing `pattern_match` events with context.

use std::collections::HashSet;

use regex::{Regex, RegexBuilder};

use crate::event::Event;

/// Default whole-word, case-insensitive failure-signal patterns.
pub const DEFAULT_PATTERNS: &[&str] = &[
    r"\berror\b",
    r"\bfailed\b",
    r"\bfailure\b",
    r"\btraceback\b",
    r"\bpanic\b",
    r"\bfatal\b",
    r"\bexception\b",
    r"\bsegmentation fault\b",
    r"\bkilled\b",
    r"\boom\b",
];

const LINE_HISTORY_LIMIT: usize = 500;
const LINE_HISTORY_KEEP: usize = 250;

/// Scans output line-by-line for configured patterns, capturing a
/// trailing-context snippet per match and deduplicating by line index.
pub struct PatternDetector {
    patterns: Vec<Regex>,
    lines: Vec<String>,
    partial: String,
    seen: HashSet<usize>,
}

impl PatternDetector {
    pub fn new(pattern_sources: &[&str]) -> Self {
        let patterns: Vec<Regex> = pattern_sources
            .iter()
            .map(|src| {
                RegexBuilder::new(src)
                    .case_insensitive(true)
                    .build()
                    .unwrap_or_else(|e| panic!("invalid built-in pattern {:?}: {}", src, e))
            })
            .collect();

        Self {
            patterns,
            lines: Vec::new(),
            partial: String::new(),
            seen: HashSet::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_PATTERNS)
    }

    /// Appends `chunk` to the partial-line buffer, completes any newline-
    /// terminated lines, and returns one `Event` per line that matches at
    /// least one pattern (never more than one event per line, regardless
    /// of how many patterns match it).
    pub fn feed(&mut self, chunk: &str, command: &str) -> Vec<Event> {
        let mut events = Vec::new();
        self.partial.push_str(chunk);

        while let Some(pos) = self.partial.find('\n') {
            let line: String = self.partial.drain(..=pos).collect();
            let line = line.trim_end_matches(['\n', '\r']).to_string();

            self.lines.push(line);
            let idx = self.lines.len() - 1;

            for pattern in &self.patterns {
                if self.seen.contains(&idx) {
                    break;
                }
                if pattern.is_match(&self.lines[idx]) {
                    self.seen.insert(idx);
                    let ctx_start = idx.saturating_sub(2);
                    let context = self.lines[ctx_start..=idx].join("\n");
                    events.push(Event::pattern_match(
                        pattern.as_str(),
                        context,
                        command.to_string(),
                    ));
                }
            }

            if self.lines.len() > LINE_HISTORY_LIMIT {
                let drop_count = self.lines.len() - LINE_HISTORY_KEEP;
                self.lines.drain(..drop_count);
                // `seen` indices below the new base become permanently
                // stale but harmless: later lines receive fresh indices
                // strictly greater than any retained or stale entry, so
                // no false negatives are possible. The set is left
                // unbounded rather than garbage-collected.
            }
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_whole_word_error() {
        let mut detector = PatternDetector::with_defaults();
        let events = detector.feed("an error occurred\n", "cmd");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message, r"Matched: \berror\b");
    }

    #[test]
    fn does_not_match_substring() {
        let mut detector = PatternDetector::with_defaults();
        let events = detector.feed("errorless run\n", "cmd");
        assert!(events.is_empty());
    }

    #[test]
    fn one_event_per_line_even_with_multiple_pattern_hits() {
        let mut detector = PatternDetector::with_defaults();
        let events = detector.feed("fatal error: panic\n", "cmd");
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn partial_line_without_newline_yields_no_events() {
        let mut detector = PatternDetector::with_defaults();
        let events = detector.feed("error without newline yet", "cmd");
        assert!(events.is_empty());
        assert_eq!(detector.partial, "error without newline yet");
    }

    #[test]
    fn context_includes_up_to_two_preceding_lines() {
        let mut detector = PatternDetector::with_defaults();
        detector.feed("line one\nline two\n", "cmd");
        let events = detector.feed("fatal crash\n", "cmd");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].context, "line one\nline two\nfatal crash");
    }

    #[test]
    fn byte_at_a_time_feed_matches_whole_blob_feed() {
        let input = "normal line\nfatal error here\nok\n";

        let mut whole = PatternDetector::with_defaults();
        let whole_events = whole.feed(input, "cmd");

        let mut incremental = PatternDetector::with_defaults();
        let mut incremental_events = Vec::new();
        for ch in input.chars() {
            let mut buf = [0u8; 4];
            incremental_events.extend(incremental.feed(ch.encode_utf8(&mut buf), "cmd"));
        }

        assert_eq!(whole_events.len(), incremental_events.len());
        for (a, b) in whole_events.iter().zip(incremental_events.iter()) {
            assert_eq!(a.message, b.message);
            assert_eq!(a.context, b.context);
        }
    }

    #[test]
    fn truncates_history_beyond_limit_without_losing_match_ordering() {
        let mut detector = PatternDetector::with_defaults();
        for i in 0..520 {
            detector.feed(&format!("line {}\n", i), "cmd");
        }
        assert_eq!(detector.lines.len(), LINE_HISTORY_KEEP);

        let events = detector.feed("fatal issue\n", "cmd");
        assert_eq!(events.len(), 1);
    }
}
