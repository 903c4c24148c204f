//! Response-body framing shared by the HTTP adapters.
//!
//! Hosted APIs stream Server-Sent Events (`data:` payloads separated by
//! `\n\n`); the local Ollama daemon streams newline-delimited JSON. Both
//! are handled the same way: buffer chunks, drain complete frames, and
//! feed each frame to a provider-specific parser returning
//! `Vec<Result<StreamEvent>>`.

use crate::util::from_reqwest;
use fa_domain::error::Result;
use fa_domain::stream::{BoxStream, StreamEvent};

/// How frames are delimited in a streaming response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Framing {
    /// Server-Sent Events; only `data:` lines are surfaced.
    Sse,
    /// One JSON document per line.
    Ndjson,
}

impl Framing {
    fn drain(self, buffer: &mut String) -> Vec<String> {
        match self {
            Framing::Sse => drain_data_lines(buffer),
            Framing::Ndjson => drain_json_lines(buffer),
        }
    }

    /// Terminator appended to the buffer when the body closes, so a
    /// trailing unterminated frame is still drained.
    fn terminator(self) -> &'static str {
        match self {
            Framing::Sse => "\n\n",
            Framing::Ndjson => "\n",
        }
    }
}

/// Extract complete `data:` payloads from an SSE buffer.
///
/// Consumed bytes are removed; a trailing partial event stays in the
/// buffer for the next call.
pub(crate) fn drain_data_lines(buffer: &mut String) -> Vec<String> {
    let mut data_lines = Vec::new();

    while let Some(pos) = buffer.find("\n\n") {
        let block: String = buffer.drain(..pos).collect();
        buffer.drain(..2);

        for line in block.lines() {
            if let Some(data) = line.trim().strip_prefix("data:") {
                let data = data.trim();
                if !data.is_empty() {
                    data_lines.push(data.to_string());
                }
            }
        }
    }

    data_lines
}

/// Extract complete, non-blank lines from an NDJSON buffer.
pub(crate) fn drain_json_lines(buffer: &mut String) -> Vec<String> {
    let mut lines = Vec::new();

    while let Some(pos) = buffer.find('\n') {
        let line: String = buffer.drain(..=pos).collect();
        let line = line.trim();
        if !line.is_empty() {
            lines.push(line.to_string());
        }
    }

    lines
}

/// Append `bytes` to `buffer` as text.
///
/// A multi-byte character cut off at the end of a chunk is held in
/// `pending` until the next chunk completes it. Invalid sequences become
/// U+FFFD.
pub(crate) fn push_utf8(buffer: &mut String, pending: &mut Vec<u8>, bytes: &[u8]) {
    pending.extend_from_slice(bytes);
    let mut start = 0;
    loop {
        match std::str::from_utf8(&pending[start..]) {
            Ok(text) => {
                buffer.push_str(text);
                pending.clear();
                return;
            }
            Err(e) => {
                let valid = start + e.valid_up_to();
                buffer.push_str(std::str::from_utf8(&pending[start..valid]).unwrap_or_default());
                match e.error_len() {
                    Some(len) => {
                        buffer.push(char::REPLACEMENT_CHARACTER);
                        start = valid + len;
                    }
                    None => {
                        pending.drain(..valid);
                        return;
                    }
                }
            }
        }
    }
}

/// Build a [`BoxStream`] from a streaming `reqwest::Response` and a
/// provider-specific frame parser.
///
/// The stream emits a fallback `Done` if the parser never produced one,
/// and stops after the first transport error.
pub(crate) fn framed_response_stream<F>(
    response: reqwest::Response,
    framing: Framing,
    mut parse_frame: F,
) -> BoxStream<'static, Result<StreamEvent>>
where
    F: FnMut(&str) -> Vec<Result<StreamEvent>> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut response = response;
        let mut buffer = String::new();
        let mut pending = Vec::new();
        let mut done_emitted = false;
        let mut failed = false;

        loop {
            let closed = match response.chunk().await {
                Ok(Some(bytes)) => {
                    push_utf8(&mut buffer, &mut pending, &bytes);
                    false
                }
                Ok(None) => {
                    if !pending.is_empty() {
                        buffer.push_str(&String::from_utf8_lossy(&pending));
                        pending.clear();
                    }
                    if !buffer.trim().is_empty() {
                        buffer.push_str(framing.terminator());
                    }
                    true
                }
                Err(e) => {
                    failed = true;
                    yield Err(from_reqwest(e));
                    break;
                }
            };

            for frame in framing.drain(&mut buffer) {
                for event in parse_frame(&frame) {
                    match &event {
                        Ok(StreamEvent::Done { .. }) => done_emitted = true,
                        Ok(StreamEvent::Error { .. }) => failed = true,
                        _ => {}
                    }
                    yield event;
                }
            }

            if closed || done_emitted || failed {
                break;
            }
        }

        if !done_emitted && !failed {
            yield Ok(StreamEvent::Done {
                usage: None,
                stop_reason: None,
            });
        }
    };

    Box::pin(stream)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_multiple_events_and_partial_tail() {
        let mut buf = String::from("event: message\ndata: first\n\ndata: second\n\ndata: part");
        let lines = drain_data_lines(&mut buf);
        assert_eq!(lines, vec!["first", "second"]);
        assert_eq!(buf, "data: part");
    }

    #[test]
    fn sse_ignores_non_data_and_empty_lines() {
        let mut buf = String::from("event: ping\nid: 42\ndata: \n\nretry: 5\ndata:  {\"k\":1}  \n\n");
        let lines = drain_data_lines(&mut buf);
        assert_eq!(lines, vec!["{\"k\":1}"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn sse_incremental_buffering() {
        let mut buf = String::from("data: [DO");
        assert!(drain_data_lines(&mut buf).is_empty());
        buf.push_str("NE]\n\n");
        assert_eq!(drain_data_lines(&mut buf), vec!["[DONE]"]);
    }

    #[test]
    fn ndjson_splits_lines_and_keeps_tail() {
        let mut buf = String::from("{\"a\":1}\n\n{\"b\":2}\r\n{\"c\":");
        let lines = drain_json_lines(&mut buf);
        assert_eq!(lines, vec!["{\"a\":1}", "{\"b\":2}"]);
        assert_eq!(buf, "{\"c\":");

        buf.push_str("3}");
        buf.push_str(Framing::Ndjson.terminator());
        assert_eq!(Framing::Ndjson.drain(&mut buf), vec!["{\"c\":3}"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn split_multibyte_character_is_reassembled() {
        let line = "{\"message\":{\"content\":\"cost €5\"}}\n".as_bytes();
        let cut = line.iter().position(|&b| b == 0xE2).unwrap() + 1;

        let mut buf = String::new();
        let mut pending = Vec::new();
        push_utf8(&mut buf, &mut pending, &line[..cut]);
        assert_eq!(pending, vec![0xE2]);
        assert!(Framing::Ndjson.drain(&mut buf).is_empty());

        push_utf8(&mut buf, &mut pending, &line[cut..]);
        assert!(pending.is_empty());
        let frames = Framing::Ndjson.drain(&mut buf);
        assert_eq!(frames, vec!["{\"message\":{\"content\":\"cost €5\"}}"]);
    }

    #[test]
    fn invalid_bytes_are_replaced_and_decoding_continues() {
        let mut buf = String::new();
        let mut pending = Vec::new();
        push_utf8(&mut buf, &mut pending, b"data: \xFFok\n\n");
        assert!(pending.is_empty());
        assert_eq!(drain_data_lines(&mut buf), vec!["\u{FFFD}ok"]);
    }
}
