//! Forwarding link extraction from agent output.
//!
//! The agent prints several URLs (web inspector, local upstream, the public
//! tunnel). Only a URL under the ngrok domain counts as the forwarding link.

use std::sync::LazyLock;

use regex::Regex;

static LINK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(https?)://(\w[\w.-]+[a-z]|\d+\.\d+\.\d+\.\d+)(?::(\d+))?")
        .expect("link pattern is a valid regex")
});

/// Marker a URL must contain to be the public forwarding link.
const NGROK_DOMAIN_MARKER: &str = ".ngrok";

/// Keep this much unmatched output between chunks so a link split across
/// two reads is still seen whole.
const CARRY_OVER_BYTES: usize = 512;

/// Extract the public forwarding link from a chunk of agent output.
///
/// Returns the first `scheme://host[:port]` URL in `chunk` that lies under
/// the ngrok domain.
pub fn extract_forwarding_link(chunk: &str) -> Option<String> {
    find_link(chunk, true)
}

fn is_host_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '-' | ':')
}

/// With `complete == false`, a URL running into the end of `text` is skipped:
/// the next chunk may extend its host or port.
fn find_link(text: &str, complete: bool) -> Option<String> {
    LINK_PATTERN
        .find_iter(text)
        .filter(|m| complete || text[m.end()..].chars().any(|c| !is_host_char(c)))
        .map(|m| m.as_str())
        .find(|link| link.contains(NGROK_DOMAIN_MARKER))
        .map(str::to_string)
}

/// Incremental link search over a stream of output chunks.
#[derive(Debug, Default)]
pub struct LinkScanner {
    pending: String,
}

impl LinkScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk; returns the link once one is complete.
    pub fn push(&mut self, chunk: &str) -> Option<String> {
        self.pending.push_str(chunk);
        let found = find_link(&self.pending, false);
        if found.is_none() {
            self.trim();
        }
        found
    }

    /// Whether the buffered output ends in a complete-looking link that is
    /// only held back because more output could extend it.
    pub fn holds_link(&self) -> bool {
        find_link(&self.pending, true).is_some()
    }

    /// The stream ended or went quiet; accept a link that runs to the end of
    /// the output.
    pub fn finish(&mut self) -> Option<String> {
        let found = find_link(&self.pending, true);
        self.pending.clear();
        found
    }

    fn trim(&mut self) {
        if self.pending.len() <= CARRY_OVER_BYTES {
            return;
        }
        let mut cut = self.pending.len() - CARRY_OVER_BYTES;
        while !self.pending.is_char_boundary(cut) {
            cut += 1;
        }
        self.pending.drain(..cut);
    }
}
