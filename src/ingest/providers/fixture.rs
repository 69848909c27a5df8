//! Static notices from a JSON file or string, for dry runs and tests.
//!
//! Format: an array of `{ "id"?, "text", "number"?, "location"?, "start"?, "end"? }`.
//! Records with a `location` that differs from the polled airport, or with
//! no text after normalization, are skipped.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;

use crate::ingest::normalize_text;
use crate::ingest::types::SourceAdapter;
use crate::notice::Notice;

#[derive(Debug, Deserialize)]
struct FixtureRecord {
    id: Option<String>,
    #[serde(default)]
    text: String,
    number: Option<String>,
    location: Option<String>,
    start: Option<String>,
    end: Option<String>,
}

pub struct FixtureProvider {
    mode: Mode,
}

enum Mode {
    Inline(String),
    // Re-read on every fetch so the file can be edited while running.
    File(PathBuf),
}

impl FixtureProvider {
    pub fn from_fixture_str(s: &str) -> Self {
        Self {
            mode: Mode::Inline(s.to_string()),
        }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            mode: Mode::File(path.into()),
        }
    }

    pub fn parse_items_from_str(s: &str, airport_code: &str) -> Result<Vec<Notice>> {
        let records: Vec<serde_json::Value> =
            serde_json::from_str(s).context("parsing fixture json")?;

        let mut out = Vec::with_capacity(records.len());
        for raw in records {
            let rec: FixtureRecord =
                serde_json::from_value(raw.clone()).context("fixture record")?;
            if let Some(loc) = rec.location.as_deref() {
                if !loc.eq_ignore_ascii_case(airport_code) {
                    continue;
                }
            }
            let text = normalize_text(&rec.text);
            if text.is_empty() {
                continue;
            }
            let notice = Notice::new(
                rec.id.as_deref(),
                &[
                    rec.location.as_deref().unwrap_or_default(),
                    text.as_str(),
                    rec.start.as_deref().unwrap_or_default(),
                    rec.end.as_deref().unwrap_or_default(),
                ],
                text.clone(),
            )
            .with_number(rec.number)
            .with_location(rec.location)
            .with_raw(raw);
            out.push(notice);
        }
        Ok(out)
    }
}

#[async_trait]
impl SourceAdapter for FixtureProvider {
    async fn fetch(&self, airport_code: &str) -> Result<Vec<Notice>> {
        match &self.mode {
            Mode::Inline(s) => Self::parse_items_from_str(s, airport_code),
            Mode::File(path) => {
                let s = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("reading fixture {}", path.display()))?;
                Self::parse_items_from_str(&s, airport_code)
            }
        }
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}
