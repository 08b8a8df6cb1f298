use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use crate::error::MetricsResult;
use crate::graph::MetricsReport;

/// Destination for collected reports.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn submit(&self, report: &MetricsReport) -> MetricsResult<()>;
}

/// Writes each report as a JSON line through `tracing`.
#[derive(Clone, Debug)]
pub struct LogSink {
    endpoint: String,
}

impl LogSink {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl MetricsSink for LogSink {
    async fn submit(&self, report: &MetricsReport) -> MetricsResult<()> {
        let json = report.to_json()?;
        info!(target: "ess::metrics", endpoint = %self.endpoint, report = %json, "metrics report");
        Ok(())
    }
}

/// Keeps every submitted report in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    reports: Mutex<Vec<MetricsReport>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<MetricsReport> {
        self.reports.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }
}

#[async_trait]
impl MetricsSink for MemorySink {
    async fn submit(&self, report: &MetricsReport) -> MetricsResult<()> {
        self.reports.lock().push(report.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;

    #[tokio::test]
    async fn memory_sink_records_reports() {
        let sink = MemorySink::new();
        assert!(sink.is_empty());
        sink.submit(&MetricsReport::new(vec![Graph::new("Locale")]))
            .await
            .unwrap();
        sink.submit(&MetricsReport::new(vec![])).await.unwrap();
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.reports()[0].graphs[0].name, "Locale");
    }

    #[tokio::test]
    async fn log_sink_accepts_reports() {
        let sink = LogSink::new("http://localhost");
        assert_eq!(sink.endpoint(), "http://localhost");
        sink.submit(&MetricsReport::new(vec![])).await.unwrap();
    }
}
