// src/notice.rs
//! Normalized NOTAM record shared by every source adapter, plus the
//! identifier policy used when an upstream record has no stable id.

use serde::{Deserialize, Serialize};

/// How a notice's `id` was obtained. Only `Native` and `Content` ids are
/// deterministic across polls; an `Ephemeral` id changes every fetch, so
/// such a notice is always classified as new.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdKind {
    Native,
    Content,
    Ephemeral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub id: String,
    pub text: String,
    /// Human-facing reference code, e.g. `10/123`. Independent of `id`.
    pub number: Option<String>,
    /// Location designator reported by the upstream, if any.
    pub location: Option<String>,
    /// Original upstream record, for diagnostics only.
    #[serde(default)]
    pub raw: serde_json::Value,
    pub id_kind: IdKind,
}

impl Notice {
    /// Build a notice whose id is resolved from an optional native id and
    /// fallback content fields (see [`resolve_id`]).
    pub fn new(native_id: Option<&str>, content_fields: &[&str], text: impl Into<String>) -> Self {
        let (id, id_kind) = resolve_id(native_id, content_fields);
        Self {
            id,
            text: text.into(),
            number: None,
            location: None,
            raw: serde_json::Value::Null,
            id_kind,
        }
    }

    pub fn with_number(mut self, number: Option<String>) -> Self {
        self.number = number.filter(|n| !n.trim().is_empty());
        self
    }

    pub fn with_location(mut self, location: Option<String>) -> Self {
        self.location = location.filter(|l| !l.trim().is_empty());
        self
    }

    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = raw;
        self
    }

    /// Whether two polls of the same upstream record produce the same id.
    pub fn is_stable(&self) -> bool {
        self.id_kind != IdKind::Ephemeral
    }
}

/// Resolve a notice identifier:
/// 1) trimmed, non-empty native id;
/// 2) `content:` + non-empty content fields joined by `|`;
/// 3) `ephemeral:<unix-nanos>-<random>`, unique per call.
pub fn resolve_id(native: Option<&str>, content_fields: &[&str]) -> (String, IdKind) {
    if let Some(n) = native.map(str::trim).filter(|n| !n.is_empty()) {
        return (n.to_string(), IdKind::Native);
    }

    let parts: Vec<&str> = content_fields
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .collect();
    if !parts.is_empty() {
        return (format!("content:{}", parts.join("|")), IdKind::Content);
    }

    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let salt: u32 = rand::random();
    (format!("ephemeral:{nanos}-{salt:08x}"), IdKind::Ephemeral)
}
