use async_trait::async_trait;

use crate::report::TaskReport;

/// Delivers finished task reports (webhook, file, stdout...).
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn send_report(&self, report: &TaskReport) -> anyhow::Result<()>;
}
