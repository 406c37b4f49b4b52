//! Queue writer: drains the submission hand-off into the store.
//!
//! Single consumer, one message at a time, which preserves first-write-wins
//! per job_id under retry. The insert is idempotent, so replays under
//! at-least-once delivery acknowledge silently. Transient store failures
//! back off exponentially; a message that exhausts its retry budget is
//! diverted to the dead-letter sink and never blocks the queue behind it.

use drover_protocol::JobMessage;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::store::{DeadLetterStore, JobStore};

/// Backoff base for store-write retries.
const BACKOFF_BASE_MS: u64 = 50;
/// Backoff cap for store-write retries.
const BACKOFF_MAX_MS: u64 = 5_000;

pub struct QueueWriter {
    rx: mpsc::Receiver<JobMessage>,
    jobs: JobStore,
    dead_letters: DeadLetterStore,
    retry_budget: u32,
}

impl QueueWriter {
    pub fn new(
        rx: mpsc::Receiver<JobMessage>,
        jobs: JobStore,
        dead_letters: DeadLetterStore,
        retry_budget: u32,
    ) -> Self {
        Self {
            rx,
            jobs,
            dead_letters,
            retry_budget,
        }
    }

    /// Drain until the hand-off closes, then stop.
    pub async fn run(mut self) {
        info!("Queue writer started (retry budget {})", self.retry_budget);
        while let Some(message) = self.rx.recv().await {
            self.persist(message).await;
        }
        info!("Queue writer stopped");
    }

    async fn persist(&self, message: JobMessage) {
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            match self.jobs.insert_if_absent(&message).await {
                Ok(true) => {
                    debug!("Job {} persisted", message.job_id);
                    return;
                }
                Ok(false) => {
                    debug!("Job {} already persisted, acknowledging replay", message.job_id);
                    return;
                }
                Err(err) if attempts < self.retry_budget => {
                    let delay = backoff_delay(attempts);
                    warn!(
                        "Job {}: store write failed (attempt {}), retrying in {:?}: {}",
                        message.job_id, attempts, delay, err
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    if let Err(sink_err) = self
                        .dead_letters
                        .insert(&message, &err.to_string(), attempts)
                        .await
                    {
                        error!(
                            "Job {}: dead-letter sink unavailable, submission dropped: {}",
                            message.job_id, sink_err
                        );
                    }
                    return;
                }
            }
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(10);
    Duration::from_millis((BACKOFF_BASE_MS << exp).min(BACKOFF_MAX_MS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use drover_db::{create_pool, init_schema, DbConfig};
    use drover_ids::JobId;
    use drover_protocol::JobStatus;
    use serde_json::json;

    fn message() -> JobMessage {
        JobMessage {
            job_id: JobId::generate(),
            job_type: "csv_ingest".into(),
            config: json!({"path": "/data/in.csv"}),
            max_retries: 3,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_delay(1), Duration::from_millis(50));
        assert_eq!(backoff_delay(2), Duration::from_millis(100));
        assert_eq!(backoff_delay(3), Duration::from_millis(200));
        assert_eq!(backoff_delay(30), Duration::from_millis(5_000));
    }

    #[tokio::test]
    async fn writer_persists_and_acknowledges_replays() {
        let pool = create_pool(DbConfig::sqlite_memory()).await.unwrap();
        init_schema(&pool).await.unwrap();
        let jobs = JobStore::new(pool.clone());

        let (tx, rx) = mpsc::channel(8);
        let writer = QueueWriter::new(
            rx,
            jobs.clone(),
            DeadLetterStore::new(pool.clone()),
            5,
        );

        let msg = message();
        tx.send(msg.clone()).await.unwrap();
        tx.send(msg.clone()).await.unwrap(); // replay
        drop(tx);
        writer.run().await;

        let jobs_in_store = jobs.list(None, 100).await.unwrap();
        assert_eq!(jobs_in_store.len(), 1);
        assert_eq!(jobs_in_store[0].status, JobStatus::Pending);
        assert_eq!(jobs_in_store[0].job_id, msg.job_id);
    }

    #[tokio::test]
    async fn unwritable_store_diverts_to_dead_letters() {
        let pool = create_pool(DbConfig::sqlite_memory()).await.unwrap();
        init_schema(&pool).await.unwrap();
        // Sabotage the jobs table so every insert fails.
        sqlx::query("ALTER TABLE jobs RENAME TO jobs_gone")
            .execute(&pool)
            .await
            .unwrap();

        let dead_letters = DeadLetterStore::new(pool.clone());
        let (tx, rx) = mpsc::channel(8);
        let writer = QueueWriter::new(rx, JobStore::new(pool.clone()), dead_letters.clone(), 2);

        tx.send(message()).await.unwrap();
        drop(tx);
        writer.run().await;

        let letters = dead_letters.list(10).await.unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].attempts, 2);
    }
}
