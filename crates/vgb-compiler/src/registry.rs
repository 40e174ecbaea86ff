//! In-memory compilation status registry.
//!
//! One writer per job, any number of polling readers. Progress updates go
//! through [`CompilationJob::set_progress`], so a reader never sees progress
//! go backwards and never sees 100 before completion.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;
use vgb_models::{CompilationJob, CompilationStatus, EventId};

#[derive(Debug, Clone, Default)]
pub struct StatusRegistry {
    jobs: Arc<RwLock<HashMap<EventId, CompilationJob>>>,
    /// Finished entries older than this are dropped when a new run starts.
    retention: Option<Duration>,
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that forgets completed and failed jobs after `retention`.
    pub fn with_retention(retention: Duration) -> Self {
        Self {
            retention: Some(retention),
            ..Self::default()
        }
    }

    /// Current status. Events never submitted report `pending`.
    pub async fn get(&self, event_id: &EventId) -> CompilationJob {
        self.jobs
            .read()
            .await
            .get(event_id)
            .cloned()
            .unwrap_or_else(|| CompilationJob::pending(event_id.clone()))
    }

    /// Record a new run as `processing` at 0%, returning the entry it replaced.
    pub async fn start(&self, event_id: &EventId) -> Option<CompilationJob> {
        let mut jobs = self.jobs.write().await;
        if let Some(retention) = self.retention {
            prune_finished(&mut jobs, retention);
        }
        jobs.insert(event_id.clone(), CompilationJob::processing(event_id.clone()))
    }

    /// Put back the entry a refused run replaced; `None` makes the event pending.
    pub async fn restore(&self, event_id: &EventId, previous: Option<CompilationJob>) {
        let mut jobs = self.jobs.write().await;
        match previous {
            Some(job) => jobs.insert(event_id.clone(), job),
            None => jobs.remove(event_id),
        };
    }

    /// Raise progress of a running job. Returns the stored value.
    pub async fn progress(&self, event_id: &EventId, progress: u8) -> Option<u8> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(event_id)?;
        job.set_progress(progress);
        job.progress
    }

    pub async fn complete(&self, event_id: &EventId, output_key: &str, output_url: &str) {
        let mut jobs = self.jobs.write().await;
        jobs.entry(event_id.clone())
            .or_insert_with(|| CompilationJob::processing(event_id.clone()))
            .complete(output_key, output_url);
    }

    pub async fn fail(&self, event_id: &EventId, error: &str) {
        let mut jobs = self.jobs.write().await;
        jobs.entry(event_id.clone())
            .or_insert_with(|| CompilationJob::processing(event_id.clone()))
            .fail(error);
    }

    /// Drop the entry for `event_id`; it reads `pending` again.
    pub async fn forget(&self, event_id: &EventId) -> Option<CompilationJob> {
        self.jobs.write().await.remove(event_id)
    }

    /// Events currently `processing`.
    pub async fn processing_ids(&self) -> Vec<EventId> {
        let mut ids: Vec<EventId> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|j| j.status == CompilationStatus::Processing)
            .map(|j| j.event_id.clone())
            .collect();
        ids.sort();
        ids
    }
}

fn prune_finished(jobs: &mut HashMap<EventId, CompilationJob>, retention: Duration) {
    let Ok(retention) = chrono::Duration::from_std(retention) else {
        return;
    };
    let cutoff = Utc::now() - retention;
    let before = jobs.len();
    jobs.retain(|_, job| !job.is_terminal() || job.completed_at.map_or(true, |at| at > cutoff));
    if jobs.len() < before {
        debug!(pruned = before - jobs.len(), "Dropped finished compilation statuses");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_event_is_pending() {
        let registry = StatusRegistry::new();
        let job = registry.get(&EventId::new("never")).await;
        assert_eq!(job.status, CompilationStatus::Pending);
        assert_eq!(job.progress, None);

        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json, serde_json::json!({"eventId": "never", "status": "pending"}));
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let registry = StatusRegistry::new();
        let id = EventId::new("E1");

        registry.start(&id).await;
        assert_eq!(registry.processing_ids().await, vec![id.clone()]);
        assert_eq!(registry.progress(&id, 40).await, Some(40));
        assert_eq!(registry.progress(&id, 20).await, Some(40));
        assert_eq!(registry.progress(&id, 100).await, Some(99));

        registry.complete(&id, "compilations/E1/a.mp4", "https://cdn/a").await;
        let job = registry.get(&id).await;
        assert_eq!(job.status, CompilationStatus::Completed);
        assert_eq!(job.progress, Some(100));
        assert_eq!(job.output_url.as_deref(), Some("https://cdn/a"));
        assert!(registry.processing_ids().await.is_empty());

        assert!(registry.forget(&id).await.is_some());
        assert_eq!(registry.get(&id).await.status, CompilationStatus::Pending);
    }

    #[tokio::test]
    async fn test_restore_undoes_start() {
        let registry = StatusRegistry::new();
        let id = EventId::new("E1");

        assert!(registry.start(&id).await.is_none());
        registry.fail(&id, "no messages").await;

        let previous = registry.start(&id).await;
        assert_eq!(registry.get(&id).await.status, CompilationStatus::Processing);
        assert_eq!(previous.as_ref().map(|j| j.status), Some(CompilationStatus::Failed));

        registry.restore(&id, previous).await;
        let job = registry.get(&id).await;
        assert_eq!(job.status, CompilationStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("no messages"));

        let other = EventId::new("E2");
        let previous = registry.start(&other).await;
        registry.restore(&other, previous).await;
        assert_eq!(registry.get(&other).await.status, CompilationStatus::Pending);
    }

    #[tokio::test]
    async fn test_finished_jobs_expire_after_retention() {
        let registry = StatusRegistry::with_retention(Duration::from_millis(20));
        let done = EventId::new("E1");
        let running = EventId::new("E2");

        registry.start(&done).await;
        registry.complete(&done, "compilations/E1/a.mp4", "https://cdn/a").await;
        registry.start(&running).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        registry.start(&EventId::new("E3")).await;
        assert_eq!(registry.get(&done).await.status, CompilationStatus::Pending);
        assert_eq!(registry.get(&running).await.status, CompilationStatus::Processing);
    }

    #[tokio::test]
    async fn test_progress_ignored_for_unknown_or_finished_jobs() {
        let registry = StatusRegistry::new();
        let id = EventId::new("E1");
        assert_eq!(registry.progress(&id, 10).await, None);

        registry.start(&id).await;
        registry.progress(&id, 30).await;
        registry.fail(&id, "boom").await;
        assert_eq!(registry.progress(&id, 80).await, Some(30));

        let job = registry.get(&id).await;
        assert_eq!(job.status, CompilationStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_concurrent_readers_never_see_progress_drop() {
        let registry = StatusRegistry::new();
        let id = EventId::new("E1");
        registry.start(&id).await;

        let writer = {
            let registry = registry.clone();
            let id = id.clone();
            tokio::spawn(async move {
                for p in [5u8, 20, 10, 40, 35, 60, 80, 70, 90] {
                    registry.progress(&id, p).await;
                    tokio::task::yield_now().await;
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                let id = id.clone();
                tokio::spawn(async move {
                    let mut last = 0u8;
                    for _ in 0..50 {
                        let p = registry.get(&id).await.progress.unwrap_or(0);
                        assert!(p >= last, "progress dropped from {} to {}", last, p);
                        last = p;
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
        assert_eq!(registry.get(&id).await.progress, Some(90));
    }
}
