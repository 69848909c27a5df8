// src/ingest/mod.rs
pub mod providers;
pub mod types;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use metrics::counter;
use once_cell::sync::OnceCell;

use crate::config::SourceConfig;
use crate::ingest::providers::{
    faa_api::FaaApiProvider, fixture::FixtureProvider, notam_search::NotamSearchProvider,
};
use crate::ingest::types::SourceAdapter;

/// Normalize upstream notice text: decode HTML entities, strip tags,
/// collapse horizontal whitespace, keep line structure, trim.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags (<br> becomes a line break first)
    static RE_BR: OnceCell<regex::Regex> = OnceCell::new();
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    if let Ok(re_br) = RE_BR.get_or_try_init(|| regex::Regex::new(r"(?i)<br\s*/?>")) {
        out = re_br.replace_all(&out, "\n").to_string();
    }
    if let Ok(re_tags) = RE_TAGS.get_or_try_init(|| regex::Regex::new(r"(?is)</?[a-z][^>]*>")) {
        out = re_tags.replace_all(&out, "").to_string();
    }

    // 3) Line endings + non-breaking spaces
    out = out.replace("\r\n", "\n").replace(['\r'], "\n").replace('\u{00A0}', " ");

    // 4) Collapse horizontal whitespace per line
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    if let Ok(re_ws) = RE_WS.get_or_try_init(|| regex::Regex::new(r"[ \t\x0B\x0C]+")) {
        out = re_ws.replace_all(&out, " ").to_string();
    }
    out = out
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n");

    out.trim().to_string()
}

/// Run `op` up to `max_attempts` times with exponential backoff
/// (500ms, 1s, 2s, ...). The last error is returned with context.
pub(crate) async fn with_retries<T, F, Fut>(
    provider: &'static str,
    max_attempts: u8,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt: u8 = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < max_attempts => {
                tracing::warn!(provider, attempt, error = format!("{e:#}"), "fetch attempt failed, retrying");
                tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
            }
            Err(e) => {
                counter!("notam_provider_errors_total", "provider" => provider).increment(1);
                return Err(e).with_context(|| format!("{provider}: giving up after {attempt} attempt(s)"));
            }
        }
    }
}

pub fn build_source(cfg: &SourceConfig) -> Result<Arc<dyn SourceAdapter>> {
    let source: Arc<dyn SourceAdapter> = match cfg {
        SourceConfig::FaaApi(c) => Arc::new(FaaApiProvider::new(c.clone())?),
        SourceConfig::NotamSearch(c) => Arc::new(NotamSearchProvider::new(c.clone())?),
        SourceConfig::Fixture { path } => Arc::new(FixtureProvider::from_path(path.clone())),
    };
    Ok(source)
}
