use parking_lot::Mutex;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::model::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskStartEvent {
    pub task_id: TaskId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskInputRequestEvent {
    pub task_id: TaskId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskFinishEvent {
    pub task_id: TaskId,
}

/// A publish/subscribe channel for one event type.
///
/// Every subscriber owns a queue and sees the events in publication order.
/// Dropping the receiver unsubscribes.
pub struct Topic<E> {
    subscribers: Mutex<Vec<UnboundedSender<E>>>,
}

impl<E> Default for Topic<E> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<E: Clone> Topic<E> {
    pub fn subscribe(&self) -> UnboundedReceiver<E> {
        let (tx, rx) = unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Queues `event` for every live subscriber and returns how many there
    /// were.
    pub fn publish(&self, event: E) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }
}

/// The topics the pipeline stages talk through.
#[derive(Default)]
pub struct EventBus {
    pub task_start: Topic<TaskStartEvent>,
    pub task_input_request: Topic<TaskInputRequestEvent>,
    pub task_finish: Topic<TaskFinishEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }
}
