//! Public NOTAM search form (url-encoded POST, JSON `notamList`).
//! Records do not always carry a usable `transactionID`; those get a
//! content-derived id.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use metrics::counter;
use serde::Deserialize;

use crate::config::NotamSearchConfig;
use crate::ingest::types::SourceAdapter;
use crate::ingest::{normalize_text, with_retries};
use crate::notice::Notice;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    notam_list: Vec<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SearchItem {
    #[serde(rename = "transactionID")]
    transaction_id: Option<serde_json::Value>,
    notam_number: Option<String>,
    facility_designator: Option<String>,
    icao_id: Option<String>,
    keyword: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    traditional_message: Option<String>,
    icao_message: Option<String>,
    cancelled_or_expired: bool,
}

impl SearchItem {
    /// `transactionID` arrives as a number or a string; 0 means "none".
    fn native_id(&self) -> Option<String> {
        match self.transaction_id.as_ref()? {
            serde_json::Value::Number(n) if n.as_u64() != Some(0) => Some(n.to_string()),
            serde_json::Value::String(s) if !s.trim().is_empty() && s.trim() != "0" => {
                Some(s.trim().to_string())
            }
            _ => None,
        }
    }
}

pub struct NotamSearchProvider {
    cfg: NotamSearchConfig,
    client: reqwest::Client,
}

impl NotamSearchProvider {
    pub fn new(cfg: NotamSearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .context("building notam-search http client")?;
        Ok(Self { cfg, client })
    }

    async fn fetch_body(&self, airport_code: &str) -> Result<String> {
        let form = [
            ("searchType", "0"),
            ("designatorsForLocation", airport_code),
            ("offset", "0"),
            ("notamsOnly", "false"),
            ("radius", "10"),
            ("sortColumns", "5 false"),
            ("sortDirection", "true"),
        ];
        let rsp = self
            .client
            .post(&self.cfg.url)
            .form(&form)
            .send()
            .await
            .context("notam-search request")?;
        let status = rsp.status();
        if !status.is_success() {
            bail!("notam-search returned {status}");
        }
        rsp.text().await.context("notam-search .text()")
    }

    pub fn parse_response(body: &str) -> Result<Vec<Notice>> {
        let rsp: SearchResponse =
            serde_json::from_str(body).context("parsing notam-search json")?;
        if let Some(err) = rsp.error.as_deref().filter(|e| !e.trim().is_empty()) {
            bail!("notam-search error: {err}");
        }

        let mut out = Vec::with_capacity(rsp.notam_list.len());
        for raw in rsp.notam_list {
            let item: SearchItem = match serde_json::from_value(raw.clone()) {
                Ok(i) => i,
                Err(e) => {
                    tracing::warn!(provider = "notam-search", error = %e, "skipping malformed item");
                    continue;
                }
            };
            if item.cancelled_or_expired {
                continue;
            }

            let text = item
                .traditional_message
                .as_deref()
                .filter(|t| !t.trim().is_empty())
                .or(item.icao_message.as_deref())
                .map(normalize_text)
                .unwrap_or_default();
            if text.is_empty() {
                continue;
            }

            let location = item.icao_id.clone().or(item.facility_designator.clone());
            let native = item.native_id();
            let notice = Notice::new(
                native.as_deref(),
                &[
                    location.as_deref().unwrap_or_default(),
                    item.notam_number.as_deref().unwrap_or_default(),
                    item.keyword.as_deref().unwrap_or_default(),
                    item.start_date.as_deref().unwrap_or_default(),
                    item.end_date.as_deref().unwrap_or_default(),
                ],
                text,
            )
            .with_number(item.notam_number.clone())
            .with_location(location)
            .with_raw(raw);
            out.push(notice);
        }

        counter!("notam_fetched_total", "provider" => "notam-search").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl SourceAdapter for NotamSearchProvider {
    async fn fetch(&self, airport_code: &str) -> Result<Vec<Notice>> {
        let body =
            with_retries("notam-search", self.cfg.retries, || self.fetch_body(airport_code)).await?;
        Self::parse_response(&body)
    }

    fn name(&self) -> &'static str {
        "notam-search"
    }
}
