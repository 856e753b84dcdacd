//! Recognizes JSON control frames embedded in client-to-session bytes.
//!
//! A chunk is a control frame iff, after trimming trailing whitespace, it
//! parses as a JSON object with a recognized `type`. Anything else —
//! malformed JSON, an object with an unknown `type`, or plain typed
//! input — is raw input bound for the PTY. The parser holds no state
//! across calls; it does not reassemble frames split across reads (the
//! wire protocol is newline-delimited, so callers should accumulate by
//! line before handing a chunk here).

use serde::Deserialize;

/// A decoded control frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlFrame {
    Resize { rows: u16, cols: u16 },
    Input { data: String },
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawFrame {
    Resize {
        #[serde(default = "default_rows")]
        rows: u16,
        #[serde(default = "default_cols")]
        cols: u16,
    },
    Input {
        data: String,
    },
}

fn default_rows() -> u16 {
    24
}

fn default_cols() -> u16 {
    80
}

/// What forwarding a client-to-session chunk should do.
pub enum Directive {
    Control(ControlFrame),
    RawInput(Vec<u8>),
}

/// Classify one client read. A chunk is trimmed of trailing whitespace
/// before the JSON parse is attempted; any failure to parse as a
/// recognized frame falls back to raw input over the *original* bytes
/// (untrimmed), preserving exact pasted/typed content.
pub fn classify(chunk: &[u8]) -> Directive {
    let trimmed = trim_trailing_whitespace(chunk);

    match serde_json::from_slice::<RawFrame>(trimmed) {
        Ok(RawFrame::Resize { rows, cols }) => {
            Directive::Control(ControlFrame::Resize { rows, cols })
        }
        Ok(RawFrame::Input { data }) => Directive::Control(ControlFrame::Input { data }),
        Err(_) => Directive::RawInput(chunk.to_vec()),
    }
}

fn trim_trailing_whitespace(chunk: &[u8]) -> &[u8] {
    let mut end = chunk.len();
    while end > 0 && chunk[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    &chunk[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_resize_frame() {
        let frame = classify(br#"{"type":"resize","rows":40,"cols":120}"#);
        match frame {
            Directive::Control(ControlFrame::Resize { rows, cols }) => {
                assert_eq!(rows, 40);
                assert_eq!(cols, 120);
            }
            _ => panic!("expected resize frame"),
        }
    }

    #[test]
    fn resize_frame_defaults_missing_fields() {
        let frame = classify(br#"{"type":"resize"}"#);
        match frame {
            Directive::Control(ControlFrame::Resize { rows, cols }) => {
                assert_eq!(rows, 24);
                assert_eq!(cols, 80);
            }
            _ => panic!("expected resize frame"),
        }
    }

    #[test]
    fn parses_input_frame() {
        let frame = classify(br#"{"type":"input","data":"ls\n"}"#);
        match frame {
            Directive::Control(ControlFrame::Input { data }) => assert_eq!(data, "ls\n"),
            _ => panic!("expected input frame"),
        }
    }

    #[test]
    fn malformed_json_is_raw_input() {
        let frame = classify(b"{not json");
        match frame {
            Directive::RawInput(bytes) => assert_eq!(bytes, b"{not json"),
            _ => panic!("expected raw input"),
        }
    }

    #[test]
    fn unknown_type_is_raw_input() {
        let frame = classify(br#"{"type":"frobnicate"}"#);
        assert!(matches!(frame, Directive::RawInput(_)));
    }

    #[test]
    fn typed_text_is_raw_input() {
        let frame = classify(b"ls -la\n");
        match frame {
            Directive::RawInput(bytes) => assert_eq!(bytes, b"ls -la\n"),
            _ => panic!("expected raw input"),
        }
    }

    #[test]
    fn control_frame_write_matches_raw_equivalent_write() {
        // A {"type":"input","data":X} frame must produce the same PTY
        // write as writing X raw.
        let via_frame = match classify(br#"{"type":"input","data":"echo hi\n"}"#) {
            Directive::Control(ControlFrame::Input { data }) => data.into_bytes(),
            _ => panic!("expected input frame"),
        };
        let via_raw = match classify(b"echo hi\n") {
            Directive::RawInput(bytes) => bytes,
            _ => panic!("expected raw input"),
        };
        assert_eq!(via_frame, via_raw);
    }
}
