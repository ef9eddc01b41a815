use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tokio::sync::{Mutex, mpsc};

use crate::models::QueueEntry;

/// FIFO dispatch channel between job producers and the worker. Entries are
/// lightweight references only; the authoritative record lives in the store.
#[derive(Clone)]
pub struct DispatchQueue {
  tx: mpsc::UnboundedSender<QueueEntry>,
  rx: Arc<Mutex<mpsc::UnboundedReceiver<QueueEntry>>>,
}

impl DispatchQueue {
  pub fn new() -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self { tx, rx: Arc::new(Mutex::new(rx)) }
  }

  /// Never blocks; fails only if the consuming side has shut down.
  pub fn push(&self, entry: QueueEntry) -> Result<()> {
    self.tx
      .send(entry)
      .map_err(|_| anyhow!("Dispatch queue is closed"))
  }

  /// Blocks up to `timeout` for the next entry; `None` on expiry so the
  /// worker can re-check its shutdown flag without busy-waiting.
  pub async fn pop(&self, timeout: Duration) -> Option<QueueEntry> {
    let mut rx = self.rx.lock().await;
    tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
  }
}

impl Default for DispatchQueue {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use uuid::Uuid;

  fn entry(job_type: &str) -> QueueEntry {
    QueueEntry { job_id: Uuid::new_v4(), job_type: job_type.to_string() }
  }

  #[tokio::test]
  async fn pop_preserves_fifo_order() {
    let queue = DispatchQueue::new();
    let first = entry("video_convert");
    let second = entry("video_trim");
    queue.push(first.clone()).unwrap();
    queue.push(second.clone()).unwrap();

    let popped = queue.pop(Duration::from_millis(100)).await.unwrap();
    assert_eq!(popped.job_id, first.job_id);
    let popped = queue.pop(Duration::from_millis(100)).await.unwrap();
    assert_eq!(popped.job_id, second.job_id);
  }

  #[tokio::test]
  async fn pop_times_out_on_empty_queue() {
    let queue = DispatchQueue::new();
    assert!(queue.pop(Duration::from_millis(20)).await.is_none());
  }

  #[tokio::test]
  async fn concurrent_pushes_are_not_lost() {
    let queue = DispatchQueue::new();
    let mut tasks = Vec::new();
    for _ in 0..16 {
      let queue = queue.clone();
      tasks.push(tokio::spawn(async move {
        queue.push(entry("video_convert")).unwrap();
      }));
    }
    for task in tasks {
      task.await.unwrap();
    }
    for _ in 0..16 {
      assert!(queue.pop(Duration::from_millis(100)).await.is_some());
    }
  }
}
