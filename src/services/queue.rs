use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::models::job::{JobSummary, QueueItem};

/// Bounded in-process FIFO of pending browser jobs.
///
/// Shared between request handlers (producers) and the single browser
/// worker (consumer). Rejects new work at capacity instead of growing.
pub struct JobQueue {
    items: Mutex<VecDeque<QueueItem>>,
    capacity: usize,
    available: Notify,
}

impl JobQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            available: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<QueueItem>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an item to the tail. Fails without touching the queue when it
    /// is already at capacity.
    pub fn enqueue(&self, item: QueueItem) -> Result<(), QueueError> {
        let depth = {
            let mut items = self.lock();
            if items.len() >= self.capacity {
                return Err(QueueError::Full {
                    capacity: self.capacity,
                });
            }
            items.push_back(item);
            items.len()
        };
        metrics::gauge!("generation_queue_depth").set(depth as f64);
        self.available.notify_one();
        Ok(())
    }

    /// Remove and return the head item.
    pub fn dequeue(&self) -> Result<QueueItem, QueueError> {
        let (item, depth) = {
            let mut items = self.lock();
            let item = items.pop_front().ok_or(QueueError::Empty)?;
            (item, items.len())
        };
        metrics::gauge!("generation_queue_depth").set(depth as f64);
        Ok(item)
    }

    /// Wait until an item is available and remove it.
    pub async fn next(&self) -> QueueItem {
        loop {
            if let Ok(item) = self.dequeue() {
                return item;
            }
            // A notify_one issued between the failed dequeue and this await
            // leaves a stored permit, so no wakeup is lost.
            self.available.notified().await;
        }
    }

    pub fn size(&self) -> usize {
        self.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.size() >= self.capacity
    }

    /// Summaries of the waiting jobs in delivery order.
    pub fn pending(&self) -> Vec<(String, JobSummary)> {
        self.lock()
            .iter()
            .map(|item| (item.id.clone(), item.data.clone()))
            .collect()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue is full ({capacity} jobs waiting)")]
    Full { capacity: usize },

    #[error("Queue is empty")]
    Empty,
}
