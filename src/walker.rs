use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::payload::{ContentBlock, MessageContent, RequestPayload, SystemPrompt, ToolResultContent};
use crate::redact::{redact_bytes, redact_text};
use crate::scanner::{ScanResult, Scanner};

/// Which strategy produced a [`WalkOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkMode {
    /// Field-by-field walk of the decoded payload.
    Structured,
    /// Scan of the undecoded body (or its raw `messages` text) with a
    /// body-wide literal replace.
    Raw,
}

#[derive(Debug)]
pub struct WalkOutcome {
    pub result: ScanResult,
    /// Body to forward. On `error` this is the original, untouched body.
    pub body: Vec<u8>,
    pub mode: WalkMode,
    /// Tool inputs whose secrets were reported but could not be removed.
    pub unredacted_fields: usize,
    /// Re-serialization of the rewritten payload failed.
    pub error: Option<serde_json::Error>,
}

/// Result of the serialize → replace → re-parse step on a tool input.
#[derive(Debug)]
pub enum ToolInputRewrite {
    Unchanged,
    Rewritten(Value),
    /// The replaced text no longer parses; the original input must be kept.
    Unparseable(serde_json::Error),
}

/// Replace `secrets` inside the serialized form of a tool input and parse
/// the result back.
pub fn rewrite_tool_input<'a, I>(serialized: &str, secrets: I, sentinel: &str) -> ToolInputRewrite
where
    I: IntoIterator<Item = &'a str>,
{
    let replaced = redact_text(serialized, secrets, sentinel);
    if replaced == serialized {
        return ToolInputRewrite::Unchanged;
    }
    match serde_json::from_str(&replaced) {
        Ok(value) => ToolInputRewrite::Rewritten(value),
        Err(e) => ToolInputRewrite::Unparseable(e),
    }
}

/// Scan a request body and replace every detected secret with `sentinel`.
///
/// Decodes the body as a messages payload and scans text, tool input,
/// tool result text and system fields. Falls back to [`scan_raw`] when the
/// body does not decode or holds no scannable text. Never returns a
/// partially rewritten body.
pub fn scan_and_replace(scanner: &Scanner, body: &[u8], sentinel: &str) -> WalkOutcome {
    let mut payload: RequestPayload = match serde_json::from_slice(body) {
        Ok(payload) => payload,
        Err(e) => {
            debug!(error = %e, "failed to parse payload, using raw scan");
            return scan_raw(scanner, body, sentinel);
        }
    };

    let mut walk = Walk::new(scanner, sentinel);
    walk.payload(&mut payload);

    if walk.scanned == 0 {
        debug!("no structured content found, falling back to raw scan");
        return scan_raw(scanner, body, sentinel);
    }

    debug!(
        text_scanned = walk.scanned,
        total_secrets = walk.result.len(),
        "structured scan complete"
    );

    match serde_json::to_vec(&payload) {
        Ok(encoded) => WalkOutcome {
            result: walk.result,
            body: encoded,
            mode: WalkMode::Structured,
            unredacted_fields: walk.unredacted,
            error: None,
        },
        Err(e) => {
            error!(error = %e, "failed to serialize rewritten payload");
            WalkOutcome {
                result: walk.result,
                body: body.to_vec(),
                mode: WalkMode::Structured,
                unredacted_fields: walk.unredacted,
                error: Some(e),
            }
        }
    }
}

#[derive(Deserialize)]
struct Envelope<'a> {
    #[serde(borrow, default)]
    messages: Option<&'a RawValue>,
}

/// Text the raw scan looks at: the raw `messages` array when the body is a
/// JSON object that has one, otherwise the whole body.
fn raw_scan_target(body: &[u8]) -> Option<&str> {
    let first = body.iter().find(|b| !b.is_ascii_whitespace())?;
    if *first != b'{' {
        return None;
    }
    let envelope: Envelope = serde_json::from_slice(body).ok()?;
    let raw = envelope.messages?.get();
    raw.starts_with('[').then_some(raw)
}

/// Raw mode: scan once, then replace each secret everywhere in the body.
pub fn scan_raw(scanner: &Scanner, body: &[u8], sentinel: &str) -> WalkOutcome {
    let result = match raw_scan_target(body) {
        Some(messages) => {
            debug!(length = messages.len(), "scanning messages field");
            scanner.scan(messages)
        }
        None => {
            debug!(length = body.len(), "no messages field, scanning entire body");
            scanner.scan_bytes(body)
        }
    };

    let body = if result.is_empty() {
        body.to_vec()
    } else {
        redact_bytes(body, result.secrets(), sentinel)
    };

    WalkOutcome {
        result,
        body,
        mode: WalkMode::Raw,
        unredacted_fields: 0,
        error: None,
    }
}

struct Walk<'s> {
    scanner: &'s Scanner,
    sentinel: &'s str,
    result: ScanResult,
    scanned: usize,
    unredacted: usize,
}

impl<'s> Walk<'s> {
    fn new(scanner: &'s Scanner, sentinel: &'s str) -> Self {
        Walk {
            scanner,
            sentinel,
            result: ScanResult::default(),
            scanned: 0,
            unredacted: 0,
        }
    }

    fn payload(&mut self, payload: &mut RequestPayload) {
        for (i, message) in payload.messages.iter_mut().enumerate() {
            debug!(index = i, role = %message.role, "processing message");
            match &mut message.content {
                MessageContent::Text(text) => self.text(text),
                MessageContent::Blocks(blocks) => {
                    for block in blocks.iter_mut() {
                        self.block(block);
                    }
                }
            }
        }

        match &mut payload.system {
            Some(SystemPrompt::Text(text)) => self.text(text),
            Some(SystemPrompt::Entries(entries)) => {
                for entry in entries.iter_mut() {
                    self.text(&mut entry.text);
                }
            }
            None => {}
        }
    }

    fn block(&mut self, block: &mut ContentBlock) {
        match block {
            ContentBlock::Text(text) => self.text(&mut text.text),
            ContentBlock::ToolUse(tool_use) => {
                if tool_use.input.is_null() {
                    return;
                }
                if let Some(rewritten) = self.tool_input(&tool_use.input) {
                    tool_use.input = rewritten;
                }
            }
            ContentBlock::ToolResult(tool_result) => match &mut tool_result.content {
                Some(ToolResultContent::Text(text)) => self.text(text),
                Some(ToolResultContent::Blocks(nested)) => {
                    for inner in nested.iter_mut() {
                        if let ContentBlock::Text(text) = inner {
                            self.text(&mut text.text);
                        }
                    }
                }
                None => {}
            },
            ContentBlock::Other(_) => debug!(kind = block.kind(), "block not scanned"),
        }
    }

    fn text(&mut self, text: &mut String) {
        if text.is_empty() {
            return;
        }
        self.scanned += text.len();
        let found = self.scanner.scan(text);
        if !found.is_empty() {
            *text = redact_text(text, found.secrets(), self.sentinel);
        }
        debug!(length = text.len(), secrets_found = found.len(), "scanned text");
        self.result.extend(found);
    }

    /// Returns the replacement input, if one could be built.
    fn tool_input(&mut self, input: &Value) -> Option<Value> {
        let serialized = match serde_json::to_string(input) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to serialize tool input, skipping");
                return None;
            }
        };
        self.scanned += serialized.len();
        let found = self.scanner.scan(&serialized);
        debug!(
            length = serialized.len(),
            secrets_found = found.len(),
            "scanned tool_use input"
        );

        let rewritten = if found.is_empty() {
            None
        } else {
            match rewrite_tool_input(&serialized, found.secrets(), self.sentinel) {
                ToolInputRewrite::Rewritten(value) => Some(value),
                ToolInputRewrite::Unchanged => None,
                ToolInputRewrite::Unparseable(e) => {
                    warn!(
                        error = %e,
                        secrets = found.len(),
                        "redacted tool input no longer parses, leaving it unmodified"
                    );
                    self.unredacted += 1;
                    None
                }
            }
        };
        self.result.extend(found);
        rewritten
    }
}
