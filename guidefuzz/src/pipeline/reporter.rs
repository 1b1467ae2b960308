use std::sync::Arc;

use async_trait::async_trait;
use slog::{Logger, info};
use tokio::sync::mpsc::UnboundedReceiver;

use super::{EventBus, Listener, TaskFinishEvent};
use crate::error::{FuzzError, Result};
use crate::report::TaskReport;
use crate::services::{ReportSink, Store};

/// Builds the report of a finished task and hands it to the sink.
pub struct ReporterListener {
    store: Arc<dyn Store>,
    sink: Arc<dyn ReportSink>,
    bus: Arc<EventBus>,
    logger: Logger,
}

impl ReporterListener {
    pub fn new(
        store: Arc<dyn Store>,
        sink: Arc<dyn ReportSink>,
        bus: Arc<EventBus>,
        logger: Logger,
    ) -> Self {
        Self {
            store,
            sink,
            bus,
            logger,
        }
    }
}

#[async_trait]
impl Listener for ReporterListener {
    type Event = TaskFinishEvent;

    fn name(&self) -> &'static str {
        "reporter"
    }

    fn subscribe(&self) -> UnboundedReceiver<TaskFinishEvent> {
        self.bus.task_finish.subscribe()
    }

    async fn handle(&self, event: TaskFinishEvent) -> Result<()> {
        let task = self.store.get_task(event.task_id)?;
        let contract = self.store.find_contract_by_task(task.id)?;
        let transactions = self.store.transactions_by_task(task.id)?;

        let report = TaskReport::build(&task, &contract, &transactions);
        self.sink
            .send_report(&report)
            .await
            .map_err(|e| FuzzError::external("report sink", e))?;
        info!(self.logger, "report sent";
            "task_id" => %task.id,
            "coverage" => report.coverage,
            "min_distance" => report.min_distance,
            "transactions" => report.transactions.len(),
            "weaknesses" => report.detected_weaknesses.len());
        Ok(())
    }
}
