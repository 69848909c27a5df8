// src/notify/mod.rs
//! Delivery transports: one formatted message to one destination.

pub mod log;
pub mod pager;

use std::sync::Arc;

use serde::Serialize;

use crate::config::TransportConfig;

pub const DEFAULT_MAX_CHARS: usize = 240;

/// Outcome of one send. Transports report failures here instead of erroring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub success: bool,
    pub error: Option<String>,
}

impl DeliveryReport {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, destination: &str, message: &str) -> DeliveryReport;
    fn name(&self) -> &'static str;
}

/// Cut `message` to at most `limit` chars, marking the cut with `...`.
pub fn truncate_chars(message: &str, limit: usize) -> String {
    if message.chars().count() <= limit {
        return message.to_string();
    }
    if limit <= 3 {
        return message.chars().take(limit).collect();
    }
    let mut out: String = message.chars().take(limit - 3).collect();
    out.push_str("...");
    out
}

pub fn build_transport(cfg: &TransportConfig) -> Arc<dyn Transport> {
    match cfg {
        TransportConfig::Pager(p) => Arc::new(pager::PagerTransport::new(p.clone())),
        TransportConfig::Log { max_chars } => Arc::new(log::LogTransport::new(*max_chars)),
    }
}
