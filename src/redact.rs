use aho_corasick::{AhoCorasick, MatchKind};
use tracing::warn;

/// Replacement token for every redacted secret.
pub const SENTINEL: &str = "<REDACTED_KEY>";

/// Distinct non-empty secrets, longest first so an overlapping shorter
/// secret never splits a longer one.
fn distinct<'a, I>(secrets: I) -> Vec<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut secrets: Vec<&str> = secrets.into_iter().filter(|s| !s.is_empty()).collect();
    secrets.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    secrets.dedup();
    secrets
}

fn automaton(secrets: &[&str]) -> Option<AhoCorasick> {
    match AhoCorasick::builder()
        .match_kind(MatchKind::LeftmostLongest)
        .build(secrets)
    {
        Ok(ac) => Some(ac),
        Err(e) => {
            warn!(secrets = secrets.len(), error = %e, "redaction automaton build failed, replacing one secret at a time");
            None
        }
    }
}

/// Replace every literal occurrence of the secrets in one pass over `text`.
/// Case-sensitive, no re-scan of the output. Empty secrets are skipped.
pub fn redact_text<'a, I>(text: &str, secrets: I, replacement: &str) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let secrets = distinct(secrets);
    if secrets.is_empty() {
        return text.to_string();
    }
    match automaton(&secrets) {
        Some(ac) => {
            let mut out = String::with_capacity(text.len());
            ac.replace_all_with(text, &mut out, |_, _, dst| {
                dst.push_str(replacement);
                true
            });
            out
        }
        None => secrets
            .iter()
            .fold(text.to_string(), |acc, secret| acc.replace(secret, replacement)),
    }
}

/// Byte-level variant of [`redact_text`] for bodies that may not be UTF-8.
pub fn redact_bytes<'a, I>(bytes: &[u8], secrets: I, replacement: &str) -> Vec<u8>
where
    I: IntoIterator<Item = &'a str>,
{
    let secrets = distinct(secrets);
    if secrets.is_empty() {
        return bytes.to_vec();
    }
    match automaton(&secrets) {
        Some(ac) => {
            let mut out = Vec::with_capacity(bytes.len());
            ac.replace_all_with_bytes(bytes, &mut out, |_, _, dst| {
                dst.extend_from_slice(replacement.as_bytes());
                true
            });
            out
        }
        None => {
            let mut out = bytes.to_vec();
            for secret in &secrets {
                let finder = memchr::memmem::Finder::new(secret.as_bytes());
                let mut next = Vec::with_capacity(out.len());
                let mut last = 0;
                for pos in finder.find_iter(&out) {
                    next.extend_from_slice(&out[last..pos]);
                    next.extend_from_slice(replacement.as_bytes());
                    last = pos + secret.len();
                }
                next.extend_from_slice(&out[last..]);
                out = next;
            }
            out
        }
    }
}
