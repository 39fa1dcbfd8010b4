use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chatline_persist::{PersistenceClient, SessionPatch};
use serde::Serialize;
use tokio::sync::{mpsc, Semaphore};

const TITLE_MAX_CHARS: usize = 50;

/// Title derived from a session's first user message
pub fn derive_title(first_message: &str) -> String {
    let trimmed = first_message.trim();
    let mut chars = trimmed.chars();
    let head: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

#[derive(Debug, Clone)]
pub struct TitleJob {
    pub session_id: String,
    pub user_id: i64,
    pub first_message: String,
}

#[derive(Debug, Default)]
struct Counters {
    completed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TitleQueueStats {
    pub completed: u64,
    pub failed: u64,
    pub dropped: u64,
}

/// Bounded background queue that renames sessions after their first message
///
/// At most `workers` title updates run at once. When the queue is full new
/// jobs are dropped and counted rather than blocking the chat path.
#[derive(Clone)]
pub struct TitleQueue {
    tx: mpsc::Sender<TitleJob>,
    counters: Arc<Counters>,
}

impl TitleQueue {
    /// Start the dispatcher; must be called inside a tokio runtime
    pub fn spawn(persist: Arc<dyn PersistenceClient>, workers: usize, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<TitleJob>(capacity.max(1));
        let counters = Arc::new(Counters::default());
        let semaphore = Arc::new(Semaphore::new(workers.max(1)));

        let task_counters = Arc::clone(&counters);
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let permit = match Arc::clone(&semaphore).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        tracing::debug!("title worker pool closed, stopping dispatcher");
                        break;
                    }
                };

                let persist = Arc::clone(&persist);
                let counters = Arc::clone(&task_counters);
                tokio::spawn(async move {
                    let _permit = permit;
                    let title = derive_title(&job.first_message);
                    match persist
                        .update_session(&job.session_id, job.user_id, SessionPatch::title(title))
                        .await
                    {
                        Ok(_) => {
                            counters.completed.fetch_add(1, Ordering::Relaxed);
                            tracing::debug!(session_id = %job.session_id, "session title updated");
                        }
                        Err(e) => {
                            counters.failed.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(session_id = %job.session_id, error = %e, "failed to update session title");
                        }
                    }
                });
            }
        });

        Self { tx, counters }
    }

    /// Queue a job without waiting; returns false when it was dropped
    pub fn enqueue(&self, job: TitleJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(e) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "title queue rejected job");
                false
            }
        }
    }

    pub fn stats(&self) -> TitleQueueStats {
        TitleQueueStats {
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}
