use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::ProgressEvent;

const TOPIC_CAPACITY: usize = 64;

/// Per-job publish/subscribe topics for live status deltas. Delivery is
/// fire-and-forget: a late subscriber misses prior events and must re-read
/// the store for the current snapshot.
#[derive(Clone, Default)]
pub struct ProgressHub {
  topics: Arc<Mutex<HashMap<Uuid, broadcast::Sender<ProgressEvent>>>>,
}

impl ProgressHub {
  pub fn new() -> Self {
    Self::default()
  }

  /// Broadcasts to current subscribers, if any. Terminal events also tear
  /// the topic down; subscribers hold their own receivers and still drain
  /// the final event.
  pub fn publish(&self, event: ProgressEvent) {
    let mut topics = self.topics.lock().unwrap();
    let terminal = event.is_terminal();
    let job_id = event.job_id;
    if let Some(tx) = topics.get(&job_id) {
      if tx.send(event).is_err() {
        topics.remove(&job_id);
        return;
      }
    }
    if terminal {
      topics.remove(&job_id);
    }
  }

  /// Also reclaims topics whose subscribers have all gone away (streams
  /// that ended without a terminal publish, e.g. lookups of unknown or
  /// already-terminal jobs), so abandoned entries cannot accumulate.
  pub fn subscribe(&self, job_id: Uuid) -> broadcast::Receiver<ProgressEvent> {
    let mut topics = self.topics.lock().unwrap();
    topics.retain(|_, tx| tx.receiver_count() > 0);
    topics
      .entry(job_id)
      .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
      .subscribe()
  }

  #[cfg(test)]
  fn topic_count(&self) -> usize {
    self.topics.lock().unwrap().len()
  }
}
