//! Tool-Call Extractor & Stream Filter.
//!
//! The **extractor** (batch) pulls `{name, arguments}` records out of a
//! complete text blob, accepting the `<tool_call>{json}</tool_call>` wire
//! form plus fenced and bare inline JSON with the same shape. The
//! **stream filter** (incremental) runs ahead of the extractor: it watches
//! a token stream for `<tool_call>` regions and holds clean text back from
//! its caller until it can prove a given suffix is not the start of an open
//! tag, the way the donor's `SseParser` holds a partial SSE line until a
//! newline confirms it.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// One tool invocation recovered from model text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedToolCall {
    pub name: String,
    pub arguments: serde_json::Value,
}

fn tool_call_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<tool_call>(.*?)</tool_call>").unwrap())
}

fn fenced_json_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").unwrap())
}

/// A span of `text` recognized as a tool-call candidate, plus the raw JSON
/// text (without surrounding tag/fence markers) to attempt parsing on.
struct Candidate {
    start: usize,
    end: usize,
    json_text: String,
}

fn tool_call_shape(value: &serde_json::Value) -> Option<ParsedToolCall> {
    let name = value.get("name")?.as_str()?.to_string();
    let arguments = value.get("arguments")?.clone();
    if !arguments.is_object() {
        return None;
    }
    Some(ParsedToolCall { name, arguments })
}

/// Find bare `{ ... }` JSON objects in `text` via balanced-brace scanning,
/// skipping any byte range already covered by `exclude`.
fn find_bare_json_candidates(text: &str, exclude: &[(usize, usize)]) -> Vec<Candidate> {
    let bytes = text.as_bytes();
    let mut candidates = Vec::new();
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i] != b'{' || exclude.iter().any(|(s, e)| i >= *s && i < *e) {
            i += 1;
            continue;
        }
        let mut depth = 0i32;
        let mut j = i;
        let mut closed = false;
        while j < bytes.len() {
            match bytes[j] {
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        closed = true;
                        j += 1;
                        break;
                    }
                }
                _ => {}
            }
            j += 1;
        }
        if closed && text.is_char_boundary(i) && text.is_char_boundary(j) {
            candidates.push(Candidate {
                start: i,
                end: j,
                json_text: text[i..j].to_string(),
            });
            i = j;
        } else {
            i += 1;
        }
    }
    candidates
}

/// Extract every recognized tool call from a complete text blob, in textual
/// order. Malformed candidates (tag or fence present but JSON invalid or
/// missing `name`/`arguments`) are skipped, never raised as an error.
pub fn extract_tool_calls(text: &str) -> Vec<ParsedToolCall> {
    let mut candidates: Vec<Candidate> = Vec::new();
    let mut covered: Vec<(usize, usize)> = Vec::new();

    for m in tool_call_tag_regex().captures_iter(text) {
        let whole = m.get(0).unwrap();
        let inner = m.get(1).unwrap();
        covered.push((whole.start(), whole.end()));
        candidates.push(Candidate {
            start: whole.start(),
            end: whole.end(),
            json_text: inner.as_str().to_string(),
        });
    }

    for m in fenced_json_regex().captures_iter(text) {
        let whole = m.get(0).unwrap();
        if covered.iter().any(|(s, e)| whole.start() < *e && whole.end() > *s) {
            continue;
        }
        let inner = m.get(1).unwrap();
        covered.push((whole.start(), whole.end()));
        candidates.push(Candidate {
            start: whole.start(),
            end: whole.end(),
            json_text: inner.as_str().to_string(),
        });
    }

    for candidate in find_bare_json_candidates(text, &covered) {
        covered.push((candidate.start, candidate.end));
        candidates.push(candidate);
    }

    candidates.sort_by_key(|c| c.start);

    candidates
        .into_iter()
        .filter_map(|c| {
            serde_json::from_str::<serde_json::Value>(&c.json_text)
                .ok()
                .and_then(|v| tool_call_shape(&v))
        })
        .collect()
}

/// Strip every recognized tool-call region from `text`, returning the
/// remaining clean text. Idempotent: `remove_tool_calls(remove_tool_calls(t))
/// == remove_tool_calls(t)`.
pub fn remove_tool_calls(text: &str) -> String {
    let mut covered: Vec<(usize, usize)> = Vec::new();

    for m in tool_call_tag_regex().find_iter(text) {
        covered.push((m.start(), m.end()));
    }
    for m in fenced_json_regex().find_iter(text) {
        if covered.iter().any(|(s, e)| m.start() < *e && m.end() > *s) {
            continue;
        }
        // Only treat the fence as a tool-call region if its body parses as
        // one; otherwise leave ordinary code fences untouched.
        if let Some(caps) = fenced_json_regex().captures(&text[m.start()..m.end()]) {
            let body = caps.get(1).unwrap().as_str();
            if serde_json::from_str::<serde_json::Value>(body)
                .ok()
                .and_then(|v| tool_call_shape(&v))
                .is_some()
            {
                covered.push((m.start(), m.end()));
            }
        }
    }
    for candidate in find_bare_json_candidates(text, &covered) {
        if serde_json::from_str::<serde_json::Value>(&candidate.json_text)
            .ok()
            .and_then(|v| tool_call_shape(&v))
            .is_some()
        {
            covered.push((candidate.start, candidate.end));
        }
    }

    covered.sort();
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;
    for (start, end) in covered {
        if start < cursor {
            continue;
        }
        out.push_str(&text[cursor..start]);
        cursor = end;
    }
    out.push_str(&text[cursor..]);
    out
}

// ---------------------------------------------------------------------------
// Stream Filter (incremental)
// ---------------------------------------------------------------------------

const TOOL_CALL_OPEN: &str = "<tool_call>";
const TOOL_CALL_CLOSE: &str = "</tool_call>";

#[derive(Debug, PartialEq, Eq)]
enum Mode {
    Clean,
    InToolCall,
}

/// Incremental token filter that separates clean (user-visible) text from
/// `<tool_call>` regions while a response is still streaming in.
pub struct StreamFilter {
    mode: Mode,
    pending: String,
    full_text: String,
}

impl Default for StreamFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamFilter {
    pub fn new() -> Self {
        Self {
            mode: Mode::Clean,
            pending: String::new(),
            full_text: String::new(),
        }
    }

    /// Feed the next chunk of streamed text. `on_clean` is invoked zero or
    /// more times with clean-text fragments safe to show the user now.
    pub fn push(&mut self, token: &str, mut on_clean: impl FnMut(&str)) {
        self.full_text.push_str(token);
        self.pending.push_str(token);
        self.drain(&mut on_clean);
    }

    /// Flush any buffered-but-safe text at end of stream. Must be called
    /// once the stream is exhausted.
    pub fn flush(&mut self, mut on_clean: impl FnMut(&str)) {
        self.drain(&mut on_clean);
        if self.mode == Mode::Clean && !self.pending.is_empty() {
            on_clean(&self.pending);
            self.pending.clear();
        }
    }

    /// The full text seen so far, including raw tool-call regions — used
    /// for post-stream extraction via [`extract_tool_calls`].
    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    fn drain(&mut self, on_clean: &mut impl FnMut(&str)) {
        loop {
            match self.mode {
                Mode::Clean => {
                    if let Some(pos) = self.pending.find(TOOL_CALL_OPEN) {
                        let before = self.pending[..pos].to_string();
                        if !before.is_empty() {
                            on_clean(&before);
                        }
                        self.pending = self.pending[pos + TOOL_CALL_OPEN.len()..].to_string();
                        self.mode = Mode::InToolCall;
                        continue;
                    }
                    let safe_len = safe_emit_len(&self.pending, TOOL_CALL_OPEN);
                    if safe_len > 0 {
                        let emit = self.pending[..safe_len].to_string();
                        on_clean(&emit);
                        self.pending = self.pending[safe_len..].to_string();
                    }
                    break;
                }
                Mode::InToolCall => {
                    if let Some(pos) = self.pending.find(TOOL_CALL_CLOSE) {
                        self.pending = self.pending[pos + TOOL_CALL_CLOSE.len()..].to_string();
                        self.mode = Mode::Clean;
                        continue;
                    }
                    // Nothing safe to emit while inside a tool-call region;
                    // keep buffering until the close tag appears.
                    break;
                }
            }
        }
    }
}

/// Number of leading bytes of `buf` that are guaranteed not to be part of an
/// occurrence of `marker` starting later in the stream — i.e. `buf` minus
/// its longest suffix that is a proper prefix of `marker`.
fn safe_emit_len(buf: &str, marker: &str) -> usize {
    let n = buf.len();
    let max_check = marker.len().saturating_sub(1).min(n);
    for len in (1..=max_check).rev() {
        if !buf.is_char_boundary(n - len) {
            continue;
        }
        let suffix = &buf[n - len..];
        if marker.starts_with(suffix) {
            return n - len;
        }
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_tag_form() {
        let text = r#"Reading file... <tool_call>{"name":"read_file","arguments":{"path":"README.md"}}</tool_call>"#;
        let calls = extract_tool_calls(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "read_file");
        assert_eq!(calls[0].arguments["path"], "README.md");
    }

    #[test]
    fn extracts_fenced_json_form() {
        let text = "Let me check.\n```json\n{\"name\": \"list_files\", \"arguments\": {}}\n```\n";
        let calls = extract_tool_calls(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "list_files");
    }

    #[test]
    fn extracts_bare_inline_json_form() {
        let text = r#"ok {"name": "write_file", "arguments": {"path": "a", "content": "b"}} done"#;
        let calls = extract_tool_calls(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "write_file");
    }

    #[test]
    fn skips_malformed_candidates_without_erroring() {
        let text = "<tool_call>not json at all</tool_call> plain text";
        let calls = extract_tool_calls(text);
        assert!(calls.is_empty());
    }

    #[test]
    fn multiple_calls_preserve_order() {
        let text = r#"<tool_call>{"name":"a","arguments":{}}</tool_call> then <tool_call>{"name":"b","arguments":{}}</tool_call>"#;
        let calls = extract_tool_calls(text);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "a");
        assert_eq!(calls[1].name, "b");
    }

    #[test]
    fn remove_tool_calls_strips_tag_region() {
        let text = r#"before <tool_call>{"name":"a","arguments":{}}</tool_call> after"#;
        assert_eq!(remove_tool_calls(text), "before  after");
    }

    #[test]
    fn extractor_idempotence_invariant() {
        let text = r#"before <tool_call>{"name":"a","arguments":{}}</tool_call> after"#;
        let cleaned = remove_tool_calls(text);
        assert!(extract_tool_calls(&cleaned).is_empty());
        assert_eq!(remove_tool_calls(&cleaned), cleaned);
    }

    #[test]
    fn stream_filter_hides_tool_call_region_incrementally() {
        let mut filter = StreamFilter::new();
        let mut clean = String::new();
        let chunks = [
            "Reading file... ",
            "<tool_call>{\"name\":\"read_",
            "file\",\"arguments\":{\"path\":\"README.md\"}}</tool_",
            "call>",
            "\nDone.",
        ];
        for chunk in chunks {
            filter.push(chunk, |text| clean.push_str(text));
        }
        filter.flush(|text| clean.push_str(text));

        assert!(!clean.contains("<tool_call>"));
        assert_eq!(clean, "Reading file... \nDone.");
        assert!(filter.full_text().contains("<tool_call>"));
    }

    #[test]
    fn stream_filter_buffers_partial_open_tag_across_chunks() {
        let mut filter = StreamFilter::new();
        let mut clean = String::new();
        filter.push("hello <tool_", |text| clean.push_str(text));
        // Nothing unsafe should have leaked yet.
        assert_eq!(clean, "hello ");
        filter.push("call>{}</tool_call> world", |text| clean.push_str(text));
        filter.flush(|text| clean.push_str(text));
        assert_eq!(clean, "hello  world");
    }

    #[test]
    fn stream_filter_flush_emits_remaining_safe_buffer() {
        let mut filter = StreamFilter::new();
        let mut clean = String::new();
        filter.push("no tags here", |text| clean.push_str(text));
        filter.flush(|text| clean.push_str(text));
        assert_eq!(clean, "no tags here");
    }
}
