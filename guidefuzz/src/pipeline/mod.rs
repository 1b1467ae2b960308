//! The event-driven campaign pipeline.
//!
//! Each stage is a [`Listener`] bound to one topic of the [`EventBus`]:
//!
//! * [`DeployerListener`] reacts to `TaskStart`: it deploys the contract,
//!   analyzes it and asks for the first inputs.
//! * [`FuzzerListener`] reacts to `TaskInputRequest`: it generates a batch of
//!   transactions with the task's strategy and submits it.
//! * [`ReporterListener`] reacts to `TaskFinish` and delivers the task report.
//!
//! The [`ExecutionRecorder`] closes the loop: once every transaction of a
//! batch has been executed, it requests the next inputs.
//!
//! Events are processed one at a time per listener. A failing event is logged
//! and dropped.

mod bus;
mod deployer;
mod execution;
mod fuzzer;
mod reporter;

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use slog::{Logger, debug, error, o};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use bus::{EventBus, TaskFinishEvent, TaskInputRequestEvent, TaskStartEvent, Topic};
pub use deployer::DeployerListener;
pub use execution::ExecutionRecorder;
pub use fuzzer::FuzzerListener;
pub use reporter::ReporterListener;

use crate::error::Result;

#[async_trait]
pub trait Listener: Send + Sync + 'static {
    type Event: Debug + Send + 'static;

    fn name(&self) -> &'static str;

    /// Opens this listener's queue on its topic.
    fn subscribe(&self) -> UnboundedReceiver<Self::Event>;

    async fn handle(&self, event: Self::Event) -> Result<()>;
}

/// Subscribes `listener` right away and processes its events on a new task
/// until `cancel` fires or the topic goes away.
pub fn start_listening<L: Listener>(
    listener: Arc<L>,
    cancel: CancellationToken,
    logger: &Logger,
) -> JoinHandle<()> {
    let logger = logger.new(o!("listener" => listener.name()));
    let mut events = listener.subscribe();
    tokio::spawn(async move {
        debug!(logger, "listening");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => {
                    let Some(event) = event else { break };
                    let description = format!("{event:?}");
                    if let Err(err) = listener.handle(event).await {
                        error!(logger, "dropping event";
                            "event" => description,
                            "error" => %err,
                            "retryable" => err.is_retryable());
                    }
                }
            }
        }
        debug!(logger, "stopped listening");
    })
}
