//! Malicious link detection.
//!
//! The list is a newline separated file: one domain or text fragment per line,
//! blank lines and `#` comments skipped. A message is blocked when a listed entry
//! occurs in its normalized text, or when a URL in it points at a listed domain
//! or one of its subdomains.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context as _, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};
use unicode_normalization::UnicodeNormalization;
use url::Url;

static RE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(?:https?://|www\.)[^\s<>()"']+"#).expect("static url regex")
});

#[derive(Debug, Clone, Default)]
pub struct LinkFilter {
    entries: Vec<String>,
    domains: HashSet<String>,
}

/// NFKC + lowercase; folds fullwidth and other compatibility forms onto ASCII.
pub fn normalize(text: &str) -> String {
    text.nfkc().collect::<String>().to_lowercase()
}

impl LinkFilter {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = Self::default();
        for raw in entries {
            let line = raw.as_ref().trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let entry = normalize(line);
            if let Some(domain) = as_domain(&entry) {
                out.domains.insert(domain);
            }
            if !out.entries.contains(&entry) {
                out.entries.push(entry);
            }
        }
        out
    }

    pub fn parse(contents: &str) -> Self {
        Self::new(contents.lines())
    }

    /// Missing file = empty filter (nothing blocked).
    pub fn load(path: Option<&str>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !Path::new(path).exists() {
            debug!(path, "link list missing, link filter empty");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
        let filter = Self::parse(&raw);
        info!(path, entries = filter.len(), "link list loaded");
        Ok(filter)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First listed entry the text hits, if any.
    pub fn find(&self, text: &str) -> Option<&str> {
        if self.entries.is_empty() {
            return None;
        }
        let text = normalize(text);

        if let Some(hit) = self.entries.iter().find(|e| text.contains(e.as_str())) {
            return Some(hit);
        }

        for m in RE_URL.find_iter(&text) {
            let Some(host) = url_host(m.as_str()) else {
                continue;
            };
            let mut candidate = host.as_str();
            loop {
                if let Some(d) = self.domains.get(candidate) {
                    return Some(d);
                }
                match candidate.split_once('.') {
                    Some((_, rest)) if rest.contains('.') => candidate = rest,
                    _ => break,
                }
            }
        }
        None
    }

    pub fn is_blocked(&self, text: &str) -> bool {
        self.find(text).is_some()
    }
}

fn url_host(raw: &str) -> Option<String> {
    let with_scheme = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };
    let host = Url::parse(&with_scheme).ok()?.host_str()?.trim_end_matches('.').to_string();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}

/// Entries that look like a bare domain also match by host.
fn as_domain(entry: &str) -> Option<String> {
    if entry.contains('/') || entry.contains(char::is_whitespace) {
        return None;
    }
    let host = url_host(entry)?;
    host.contains('.').then_some(host)
}
