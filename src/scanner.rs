use std::sync::Arc;

use tracing::{debug, info, info_span, Span};

/// A single detected secret: the matched value and the rule that found it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub secret: String,
    pub rule_id: String,
}

/// Findings from one or more scans, in detection order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    pub findings: Vec<Finding>,
}

impl ScanResult {
    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn extend(&mut self, other: ScanResult) {
        self.findings.extend(other.findings);
    }

    pub fn secrets(&self) -> impl Iterator<Item = &str> {
        self.findings.iter().map(|f| f.secret.as_str())
    }
}

/// Matching capability behind the scanner. Implementations are shared by
/// every request task and must not mutate themselves while detecting.
pub trait Detector: Send + Sync {
    fn detect(&self, text: &str) -> Vec<Finding>;
}

/// Thin facade over a [`Detector`] that logs every finding as a preview.
pub struct Scanner {
    detector: Arc<dyn Detector>,
    span: Span,
}

impl Scanner {
    /// `span` is the component span this scanner reports under. Each scan
    /// opens a child of the caller's current span that follows from it, so
    /// findings stay attached to the request that produced them.
    pub fn new(detector: Arc<dyn Detector>, span: Span) -> Self {
        Scanner { detector, span }
    }

    /// Scan a text fragment. Never mutates the input and never fails.
    pub fn scan(&self, text: &str) -> ScanResult {
        let span = info_span!(parent: Span::current(), "scan", length = text.len());
        span.follows_from(&self.span);
        let _enter = span.enter();
        debug!("scanning text");

        let findings = self.detector.detect(text);
        for finding in &findings {
            info!(
                rule = %finding.rule_id,
                secret = %preview(&finding.secret),
                "leak detected"
            );
        }
        ScanResult { findings }
    }

    /// Scan raw bytes. Invalid UTF-8 sequences are replaced before matching.
    pub fn scan_bytes(&self, bytes: &[u8]) -> ScanResult {
        self.scan(&String::from_utf8_lossy(bytes))
    }
}

/// Fixed-width preview of a secret that is safe to log.
///
/// Shorter than 8 characters: `********`. Otherwise the first two and last
/// two characters around `****`. Counts characters, not bytes.
pub fn preview(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() < 8 {
        return "********".to_string();
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}****{}", head, tail)
}
