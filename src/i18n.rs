//! Keyed translation lookup.
//!
//! Tables are nested JSON objects addressed with dotted keys (`warnings.punished`).
//! Placeholders are written `{name}`. Lookups fall back to the default language,
//! then to the key itself, so a missing string never breaks a reply.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use serde_json::Value;
use tracing::{debug, warn};

const BUILTIN_EN: &str = include_str!("../langs/en.json");

#[derive(Debug, Clone)]
pub struct Translator {
    tables: HashMap<String, Value>,
    default_lang: String,
}

impl Translator {
    /// Built-in English table only.
    pub fn builtin() -> Self {
        let mut tables = HashMap::new();
        // include_str! – plik jest częścią repo, parsowanie nie może się nie udać w testach
        if let Ok(en) = serde_json::from_str::<Value>(BUILTIN_EN) {
            tables.insert("en".to_string(), en);
        }
        Self {
            tables,
            default_lang: "en".to_string(),
        }
    }

    /// Built-in table plus every `<lang>.json` in `dir` (files override the built-in table).
    pub fn load(dir: Option<&str>, default_lang: &str) -> Result<Arc<Self>> {
        let mut this = Self::builtin();
        this.default_lang = default_lang.to_string();

        if let Some(dir) = dir {
            let path = Path::new(dir);
            if path.is_dir() {
                for entry in std::fs::read_dir(path).with_context(|| format!("reading {dir}"))? {
                    let p = entry?.path();
                    if p.extension().and_then(|e| e.to_str()) != Some("json") {
                        continue;
                    }
                    let Some(lang) = p.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                        continue;
                    };
                    let raw = std::fs::read_to_string(&p).with_context(|| format!("reading {}", p.display()))?;
                    match serde_json::from_str::<Value>(&raw) {
                        Ok(table) => {
                            debug!(lang, "translation table loaded");
                            this.tables.insert(lang, table);
                        }
                        Err(e) => warn!(error=%e, file=%p.display(), "invalid translation file skipped"),
                    }
                }
            } else {
                debug!(dir, "translation dir missing, built-in table only");
            }
        }
        Ok(Arc::new(this))
    }

    pub fn languages(&self) -> Vec<&str> {
        let mut langs: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        langs.sort_unstable();
        langs
    }

    pub fn has_language(&self, lang: &str) -> bool {
        self.tables.contains_key(lang)
    }

    fn lookup(&self, lang: &str, key: &str) -> Option<&str> {
        let mut node = self.tables.get(lang)?;
        for seg in key.split('.') {
            node = node.get(seg)?;
        }
        node.as_str()
    }

    /// Translates `key` and fills `{placeholders}` from `args`.
    pub fn t(&self, lang: &str, key: &str, args: &[(&str, &str)]) -> String {
        let template = self
            .lookup(lang, key)
            .or_else(|| self.lookup(&self.default_lang, key));
        let Some(template) = template else {
            warn!(lang, key, "missing translation");
            return key.to_string();
        };
        format_template(template, args)
    }
}

/// Replaces `{name}` with the matching arg; unknown placeholders are left as-is.
/// Only placeholders of the template are expanded, never text coming from a value.
pub fn format_template(template: &str, args: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let name = &after[..close];
        match args.iter().find(|(n, _)| *n == name) {
            Some((_, value)) => out.push_str(value),
            None => {
                out.push('{');
                out.push_str(name);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}
