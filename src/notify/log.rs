use super::{truncate_chars, DeliveryReport, Transport};

/// Dry-run transport: logs the message that would have been paged.
#[derive(Debug, Clone)]
pub struct LogTransport {
    max_chars: usize,
}

impl LogTransport {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }
}

#[async_trait::async_trait]
impl Transport for LogTransport {
    async fn send(&self, destination: &str, message: &str) -> DeliveryReport {
        let body = truncate_chars(message, self.max_chars);
        tracing::info!(target: "pager", %destination, chars = body.chars().count(), "\n{body}");
        DeliveryReport::ok()
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
