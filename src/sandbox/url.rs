//! Preview-URL detection over streamed process output.
//!
//! Dev servers print their address in many forms: a full URL, or a bare
//! `host:port` for local addresses. The detector accumulates decoded output
//! in a sliding buffer, reports the first match, and resets the buffer so
//! the same printed line is surfaced exactly once per distinct detection.

use regex::Regex;

/// Scans accumulated output for an embedded server URL.
pub struct UrlDetector {
    url: Regex,
    host_port: Regex,
    buffer: String,
}

impl UrlDetector {
    pub fn new() -> Self {
        Self {
            url: Regex::new(
                r"(?i)https?://(?:127\.0\.0\.1:\d+|localhost:\d+|[^\s/]+(?:/[^\s]*)?)",
            )
            .expect("url pattern is valid"),
            host_port: Regex::new(r"(?i)(?:127\.0\.0\.1|localhost):\d+").expect("host:port pattern is valid"),
            buffer: String::new(),
        }
    }

    /// Append a chunk of decoded output. Returns a URL when one is first
    /// seen; the buffer resets after each report.
    pub fn push(&mut self, text: &str) -> Option<String> {
        self.buffer.push_str(text);
        let found = Self::detect(&self.url, &self.host_port, &self.buffer)?;
        self.buffer.clear();
        Some(found)
    }

    /// First-match scan of a complete text.
    pub fn detect_in(&self, text: &str) -> Option<String> {
        Self::detect(&self.url, &self.host_port, text)
    }

    fn detect(url: &Regex, host_port: &Regex, text: &str) -> Option<String> {
        if let Some(m) = url.find(text) {
            return Some(normalize(m.as_str()));
        }
        host_port
            .find(text)
            .map(|m| normalize(&format!("http://{}", m.as_str())))
    }
}

impl Default for UrlDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Origin-only URLs gain a trailing slash, matching how browsers resolve
/// them; trailing closing punctuation from log prose is dropped.
fn normalize(raw: &str) -> String {
    let trimmed = raw.trim_end_matches(['.', ',', ';', ')', ']', '"', '\'']);
    match trimmed.split_once("://") {
        Some((_, rest)) if !rest.contains('/') => format!("{}/", trimmed),
        _ => trimmed.to_string(),
    }
}
