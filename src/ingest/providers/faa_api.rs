//! FAA NOTAM API (authenticated REST, GeoJSON).

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use metrics::counter;
use serde::Deserialize;

use crate::config::FaaApiConfig;
use crate::ingest::types::SourceAdapter;
use crate::ingest::{normalize_text, with_retries};
use crate::notice::Notice;

#[derive(Debug, Deserialize)]
struct FaaResponse {
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Feature {
    properties: Properties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Properties {
    #[serde(rename = "coreNOTAMData")]
    core: CoreData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoreData {
    notam: FaaNotam,
    #[serde(default, rename = "notamTranslation")]
    translations: Vec<Translation>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FaaNotam {
    id: Option<String>,
    series: Option<String>,
    number: Option<String>,
    location: Option<String>,
    icao_location: Option<String>,
    effective_start: Option<String>,
    effective_end: Option<String>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Translation {
    #[serde(rename = "type")]
    kind: Option<String>,
    simple_text: Option<String>,
}

pub struct FaaApiProvider {
    cfg: FaaApiConfig,
    client: reqwest::Client,
}

impl FaaApiProvider {
    pub fn new(cfg: FaaApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .context("building faa-api http client")?;
        Ok(Self { cfg, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/notamapi/v1/notams", self.cfg.base_url.trim_end_matches('/'))
    }

    async fn fetch_body(&self, airport_code: &str) -> Result<String> {
        let page_size = self.cfg.page_size.to_string();
        let rsp = self
            .client
            .get(self.endpoint())
            .query(&[
                ("icaoLocation", airport_code),
                ("pageSize", page_size.as_str()),
                ("sortBy", "effectiveStartDate"),
                ("sortOrder", "Desc"),
            ])
            .header("client_id", &self.cfg.client_id)
            .header("client_secret", &self.cfg.client_secret)
            .send()
            .await
            .context("faa-api request")?;

        let status = rsp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            bail!("faa-api rejected credentials ({status})");
        }
        if !status.is_success() {
            bail!("faa-api returned {status}");
        }
        rsp.text().await.context("faa-api .text()")
    }

    /// Parse one response page. Items that do not look like NOTAM features
    /// are skipped with a warning rather than failing the whole page.
    pub fn parse_response(body: &str) -> Result<Vec<Notice>> {
        let page: FaaResponse = serde_json::from_str(body).context("parsing faa-api json")?;

        let mut out = Vec::with_capacity(page.items.len());
        for item in page.items {
            let feature: Feature = match serde_json::from_value(item.clone()) {
                Ok(f) => f,
                Err(e) => {
                    tracing::warn!(provider = "faa-api", error = %e, "skipping malformed item");
                    continue;
                }
            };
            let CoreData { notam, translations } = feature.properties.core;

            let text = notam
                .text
                .as_deref()
                .filter(|t| !t.trim().is_empty())
                .or_else(|| {
                    translations
                        .iter()
                        .find(|t| t.kind.as_deref() == Some("LOCAL_FORMAT"))
                        .and_then(|t| t.simple_text.as_deref())
                })
                .map(normalize_text)
                .unwrap_or_default();
            if text.is_empty() {
                continue;
            }

            let location = notam.icao_location.clone().or(notam.location.clone());
            let number = notam.number.as_deref().map(|n| match notam.series.as_deref() {
                Some(s) if !s.trim().is_empty() && !n.starts_with(s) => format!("{s}{n}"),
                _ => n.to_string(),
            });

            let notice = Notice::new(
                notam.id.as_deref(),
                &[
                    location.as_deref().unwrap_or_default(),
                    text.as_str(),
                    notam.effective_start.as_deref().unwrap_or_default(),
                    notam.effective_end.as_deref().unwrap_or_default(),
                ],
                text.clone(),
            )
            .with_number(number)
            .with_location(location)
            .with_raw(item);
            out.push(notice);
        }

        counter!("notam_fetched_total", "provider" => "faa-api").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl SourceAdapter for FaaApiProvider {
    async fn fetch(&self, airport_code: &str) -> Result<Vec<Notice>> {
        let body = with_retries("faa-api", self.cfg.retries, || self.fetch_body(airport_code)).await?;
        Self::parse_response(&body)
    }

    fn name(&self) -> &'static str {
        "faa-api"
    }
}
