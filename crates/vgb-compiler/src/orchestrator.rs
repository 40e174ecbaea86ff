//! Compilation state machine.
//!
//! `pending -> processing -> completed | failed`. A run holds the event's
//! [`EventLease`] from start to finish and is recorded as `processing` before
//! any I/O. Guard failures (unknown event, already compiled) put back the
//! status the event had before; every other failure marks the job failed,
//! notifies and cleans up.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::{StreamExt, TryFutureExt, TryStreamExt};
use tokio::task::JoinHandle;
use tracing::Instrument;
use url::Url;
use vgb_firestore::{EventUpdate, MetadataStore};
use vgb_media::overlay::text_file_for;
use vgb_media::{MediaClip, NormalizedClip};
use vgb_models::{CompilationJob, EventId, WebhookPayload};
use vgb_storage::ObjectStore;

use crate::config::CompilerConfig;
use crate::error::{CompileError, CompileResult};
use crate::fetcher::MediaFetcher;
use crate::locks::{EventLease, EventLocks};
use crate::logging::JobLogger;
use crate::metrics::{record_finished, record_phase, record_started};
use crate::pipeline::MediaPipeline;
use crate::publisher::Publisher;
use crate::registry::StatusRegistry;
use crate::scratch::ScratchSpace;
use crate::webhook::WebhookNotifier;

/// Progress after the message list is loaded.
pub const PROGRESS_METADATA: u8 = 20;
/// Progress after all blobs are local.
pub const PROGRESS_FETCHED: u8 = 40;
/// Progress after every clip is normalized.
pub const PROGRESS_NORMALIZED: u8 = 80;
pub const PROGRESS_CONCATENATED: u8 = 90;
pub const PROGRESS_PUBLISHED: u8 = 95;

/// Progress after `done` of `total` clips are normalized.
pub fn normalize_progress(done: usize, total: usize) -> u8 {
    if total == 0 {
        return PROGRESS_NORMALIZED;
    }
    let span = (PROGRESS_NORMALIZED - PROGRESS_FETCHED) as usize;
    PROGRESS_FETCHED + (span * done.min(total) / total) as u8
}

/// Result of a successful compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledOutput {
    pub event_id: EventId,
    pub key: String,
    pub url: String,
    pub clips: usize,
}

pub struct CompilationOrchestrator {
    config: CompilerConfig,
    metadata: Arc<dyn MetadataStore>,
    fetcher: MediaFetcher,
    pipeline: Arc<dyn MediaPipeline>,
    publisher: Publisher,
    notifier: WebhookNotifier,
    registry: StatusRegistry,
    locks: EventLocks,
}

impl CompilationOrchestrator {
    pub fn new(
        config: CompilerConfig,
        metadata: Arc<dyn MetadataStore>,
        store: Arc<dyn ObjectStore>,
        pipeline: Arc<dyn MediaPipeline>,
        registry: StatusRegistry,
        locks: EventLocks,
    ) -> CompileResult<Self> {
        let notifier = WebhookNotifier::new(config.webhook_timeout, config.webhook_secret.clone())?;
        Ok(Self {
            fetcher: MediaFetcher::new(store.clone()),
            publisher: Publisher::new(store, metadata.clone(), config.output_url_ttl),
            config,
            metadata,
            pipeline,
            notifier,
            registry,
            locks,
        })
    }

    pub fn registry(&self) -> &StatusRegistry {
        &self.registry
    }

    pub fn locks(&self) -> &EventLocks {
        &self.locks
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    /// Take the event lock, failing with [`CompileError::InProgress`] when a
    /// compilation already holds it.
    pub fn reserve(&self, event_id: &EventId) -> CompileResult<EventLease> {
        self.locks
            .try_acquire(event_id)
            .ok_or_else(|| CompileError::InProgress(event_id.clone()))
    }

    /// Start a background compilation.
    ///
    /// The event lock is taken and `processing` recorded before returning,
    /// so a poll right after sees the new run.
    pub async fn start(
        self: &Arc<Self>,
        event_id: EventId,
        webhook: Option<Url>,
    ) -> CompileResult<JoinHandle<CompileResult<CompiledOutput>>> {
        let lease = self.reserve(&event_id)?;
        Ok(self.start_reserved(lease, webhook).await)
    }

    /// Start a background compilation under a lease from [`reserve`](Self::reserve).
    pub async fn start_reserved(
        self: &Arc<Self>,
        lease: EventLease,
        webhook: Option<Url>,
    ) -> JoinHandle<CompileResult<CompiledOutput>> {
        let previous = self.registry.start(lease.event_id()).await;
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run(lease, previous, webhook).await })
    }

    /// Compile in the caller's task.
    pub async fn compile(
        &self,
        event_id: &EventId,
        webhook: Option<Url>,
    ) -> CompileResult<CompiledOutput> {
        let lease = self.reserve(event_id)?;
        let previous = self.registry.start(event_id).await;
        self.run(lease, previous, webhook).await
    }

    /// Current status of `event_id`.
    pub async fn status(&self, event_id: &EventId) -> vgb_models::CompilationJob {
        self.registry.get(event_id).await
    }

    /// Fresh access URL for the event's compiled video.
    pub async fn output_url(&self, event_id: &EventId) -> CompileResult<String> {
        self.publisher.access_url(event_id).await
    }

    /// Delete the event's compiled video so it can be compiled again.
    ///
    /// Refused with [`CompileError::InProgress`] while a compilation holds the
    /// event lock. The event's status entry is dropped and reads `pending`
    /// afterwards.
    pub async fn remove_output(&self, event_id: &EventId) -> CompileResult<()> {
        let _lease = self
            .locks
            .try_acquire(event_id)
            .ok_or_else(|| CompileError::InProgress(event_id.clone()))?;
        self.publisher.remove(event_id).await?;
        self.registry.forget(event_id).await;
        Ok(())
    }

    async fn run(
        &self,
        lease: EventLease,
        previous: Option<CompilationJob>,
        webhook: Option<Url>,
    ) -> CompileResult<CompiledOutput> {
        let event_id = lease.event_id().clone();
        let logger = JobLogger::new(&event_id, "compile");
        let span = logger.create_span();

        async move {
            if let Err(e) = self.guard(&event_id).await {
                if e.is_guard_failure() {
                    self.registry.restore(&event_id, previous).await;
                    logger.log_warning(&format!("Refusing to compile: {}", e));
                    return Err(e);
                }
                // The lookup itself failed; report it like any other failure.
                record_started();
                self.finish_failed(&event_id, &e, webhook.as_ref(), &logger).await;
                return Err(e);
            }

            record_started();
            logger.log_start("Compiling guestbook");

            let mut scratch = None;
            let outcome = self.execute(&event_id, &mut scratch, &logger).await;

            match &outcome {
                Ok(output) => {
                    self.registry
                        .complete(&event_id, &output.key, &output.url)
                        .await;
                    record_finished("completed");
                    logger.log_completion(&format!("{} clips compiled into {}", output.clips, output.key));
                    if let Some(url) = &webhook {
                        let payload = WebhookPayload::completed(event_id.clone(), &output.url);
                        self.notifier.notify(url, &payload).await;
                    }
                }
                Err(e) => self.finish_failed(&event_id, e, webhook.as_ref(), &logger).await,
            }

            if let Some(scratch) = scratch {
                let leftover = scratch.cleanup().await;
                if !leftover.is_empty() {
                    logger.log_warning(&format!("{} scratch paths left behind", leftover.len()));
                }
            }

            drop(lease);
            outcome
        }
        .instrument(span)
        .await
    }

    async fn finish_failed(
        &self,
        event_id: &EventId,
        error: &CompileError,
        webhook: Option<&Url>,
        logger: &JobLogger,
    ) {
        let message = error.to_string();
        self.registry.fail(event_id, &message).await;
        record_finished("failed");
        logger.log_error(&message);
        if let Some(url) = webhook {
            let payload = WebhookPayload::failed(event_id.clone(), &message);
            self.notifier.notify(url, &payload).await;
        }
    }

    async fn guard(&self, event_id: &EventId) -> CompileResult<()> {
        let event = self
            .metadata
            .get_event(event_id)
            .await?
            .ok_or_else(|| CompileError::EventNotFound(event_id.clone()))?;
        if event.is_compiled() {
            return Err(CompileError::AlreadyCompiled(event_id.clone()));
        }
        Ok(())
    }

    async fn execute(
        &self,
        event_id: &EventId,
        slot: &mut Option<ScratchSpace>,
        logger: &JobLogger,
    ) -> CompileResult<CompiledOutput> {
        let messages = self.metadata.list_messages(event_id).await?;
        if messages.is_empty() {
            return Err(CompileError::NoMessages(event_id.clone()));
        }
        self.advance(event_id, PROGRESS_METADATA, logger, "messages listed").await;

        let scratch = slot.insert(ScratchSpace::create(&self.config.work_dir, event_id).await?);

        let clips = self
            .phase("fetch", self.fetcher.fetch_all(&messages, scratch))
            .await?;
        self.advance(event_id, PROGRESS_FETCHED, logger, "media fetched").await;

        let outputs: Vec<PathBuf> = (0..clips.len())
            .map(|i| {
                let output = scratch.file(format!("norm-{:03}.mp4", i));
                scratch.track(text_file_for(&output));
                output
            })
            .collect();

        let total = clips.len();
        let done = AtomicUsize::new(0);
        let concurrency = self.config.normalize_concurrency.clamp(1, total);
        let pending: Vec<_> = clips
            .iter()
            .zip(&outputs)
            .map(|(clip, output)| self.normalize_one(event_id, clip, output, &done, total, logger))
            .collect();
        let normalized: Vec<NormalizedClip> = futures::stream::iter(pending)
            .buffered(concurrency)
            .try_collect()
            .await?;
        self.advance(event_id, PROGRESS_NORMALIZED, logger, "clips normalized").await;

        let manifest = scratch.file("concat.txt");
        let final_path = scratch.file("final.mp4");
        self.phase(
            "concatenate",
            self.pipeline
                .concatenate(&normalized, &manifest, &final_path)
                .err_into::<CompileError>(),
        )
        .await?;
        self.advance(event_id, PROGRESS_CONCATENATED, logger, "clips concatenated").await;

        let published = self
            .phase("publish", self.publisher.publish(event_id, &final_path))
            .await?;
        self.advance(event_id, PROGRESS_PUBLISHED, logger, "output published").await;

        let persisted = self
            .phase(
                "persist",
                self.metadata
                    .update_event(event_id, EventUpdate::set_final_video_key(&published.key))
                    .err_into::<CompileError>(),
            )
            .await;
        if let Err(e) = persisted {
            self.publisher.discard(&published.key).await;
            return Err(e);
        }

        Ok(CompiledOutput {
            event_id: event_id.clone(),
            key: published.key,
            url: published.url,
            clips: total,
        })
    }

    /// Normalize one clip and report progress by clips finished so far.
    async fn normalize_one(
        &self,
        event_id: &EventId,
        clip: &MediaClip,
        output: &Path,
        done: &AtomicUsize,
        total: usize,
        logger: &JobLogger,
    ) -> CompileResult<NormalizedClip> {
        let normalized = self
            .phase(
                "normalize",
                self.pipeline.normalize(clip, output).err_into::<CompileError>(),
            )
            .await?;
        let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
        self.advance(
            event_id,
            normalize_progress(finished, total),
            logger,
            &format!("normalized {}/{}", finished, total),
        )
        .await;
        Ok(normalized)
    }

    async fn advance(&self, event_id: &EventId, progress: u8, logger: &JobLogger, message: &str) {
        if let Some(current) = self.registry.progress(event_id, progress).await {
            logger.log_progress(current, message);
        }
    }

    /// Run one phase, applying the configured timeout and recording its duration.
    async fn phase<T, F>(&self, name: &'static str, fut: F) -> CompileResult<T>
    where
        F: Future<Output = CompileResult<T>>,
    {
        let start = Instant::now();
        let result = match self.config.phase_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .unwrap_or_else(|_| Err(CompileError::Timeout(name, limit))),
            None => fut.await,
        };
        record_phase(name, start.elapsed().as_secs_f64());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use tempfile::TempDir;
    use vgb_firestore::InMemoryMetadataStore;
    use vgb_media::{FfmpegRunner, MediaError, MediaResult, TimingAnalyzer};
    use vgb_models::{CompilationStatus, Event, MediaKind, Message};
    use vgb_storage::InMemoryObjectStore;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::error::ErrorKind;

    /// Writes the guest name as the "normalized" clip and joins files on concat.
    #[derive(Default)]
    struct FakePipeline {
        fail_on: Option<String>,
        delay: Option<Duration>,
        /// Slower for earlier clips, to shuffle completion order.
        staggered: bool,
        /// Runs trim detection on video clips, as the real normalizer does.
        analyzer: Option<TimingAnalyzer>,
        trims: Mutex<Vec<f64>>,
        normalized: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MediaPipeline for FakePipeline {
        async fn normalize(&self, clip: &MediaClip, output: &Path) -> MediaResult<NormalizedClip> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.staggered {
                let rank = clip.message_id.trim_start_matches('m').parse::<u64>().unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(40u64.saturating_sub(rank * 10))).await;
            }
            if let (Some(analyzer), MediaKind::Video) = (&self.analyzer, clip.kind) {
                let trim = analyzer.trim_start(&clip.path).await;
                self.trims.lock().unwrap().push(trim);
            }
            tokio::task::yield_now().await;
            if self.fail_on.as_deref() == Some(clip.message_id.as_str()) {
                return Err(MediaError::ffmpeg_failed("simulated transcode failure", None, Some(1)));
            }
            tokio::fs::write(text_file_for(output), &clip.guest_name).await?;
            tokio::fs::write(output, format!("{}\n", clip.guest_name)).await?;
            self.normalized.lock().unwrap().push(clip.message_id.clone());
            Ok(NormalizedClip {
                message_id: clip.message_id.clone(),
                path: output.to_path_buf(),
            })
        }

        async fn concatenate(
            &self,
            clips: &[NormalizedClip],
            manifest: &Path,
            output: &Path,
        ) -> MediaResult<PathBuf> {
            let paths: Vec<&Path> = clips.iter().map(|c| c.path.as_path()).collect();
            tokio::fs::write(manifest, vgb_media::concat::render_manifest(&paths)).await?;
            let mut joined = Vec::new();
            for clip in clips {
                joined.extend(tokio::fs::read(&clip.path).await?);
            }
            tokio::fs::write(output, joined).await?;
            Ok(output.to_path_buf())
        }
    }

    struct Harness {
        _root: TempDir,
        work_dir: PathBuf,
        store: Arc<InMemoryObjectStore>,
        metadata: Arc<InMemoryMetadataStore>,
        pipeline: Arc<FakePipeline>,
        orchestrator: Arc<CompilationOrchestrator>,
    }

    impl Harness {
        async fn new(pipeline: FakePipeline, tweak: impl FnOnce(&mut CompilerConfig)) -> Self {
            let root = TempDir::new().unwrap();
            let work_dir = root.path().join("work");
            let mut config = CompilerConfig {
                work_dir: work_dir.clone(),
                webhook_timeout: Duration::from_secs(2),
                ..CompilerConfig::default()
            };
            tweak(&mut config);

            let store = Arc::new(InMemoryObjectStore::new());
            let metadata = Arc::new(InMemoryMetadataStore::new());
            let pipeline = Arc::new(pipeline);
            let orchestrator = Arc::new(
                CompilationOrchestrator::new(
                    config,
                    metadata.clone(),
                    store.clone(),
                    pipeline.clone(),
                    StatusRegistry::new(),
                    EventLocks::new(),
                )
                .unwrap(),
            );

            Self {
                _root: root,
                work_dir,
                store,
                metadata,
                pipeline,
                orchestrator,
            }
        }

        /// Event `id` with one message per (guest, kind), created in list order.
        async fn seed(&self, id: &str, guests: &[(&str, MediaKind)]) {
            self.metadata.insert_event(Event::new(id)).await;
            let base = Utc::now();
            // Insert newest first so ordering has to come from createdAt.
            for (i, (guest, kind)) in guests.iter().enumerate().rev() {
                let message_id = format!("m{}", i + 1);
                let key = format!("uploads/{}/{}", id, message_id);
                self.store.insert(key.clone(), guest.as_bytes().to_vec()).await;
                self.metadata
                    .insert_message(Message {
                        id: message_id,
                        event_id: EventId::new(id),
                        guest_name: guest.to_string(),
                        media_type: *kind,
                        media_key: key,
                        created_at: base + chrono::Duration::seconds(i as i64),
                    })
                    .await;
            }
        }

        fn scratch_is_empty(&self) -> bool {
            match std::fs::read_dir(&self.work_dir) {
                Ok(mut entries) => entries.next().is_none(),
                Err(_) => true,
            }
        }

        fn normalize_calls(&self) -> usize {
            self.pipeline.normalized.lock().unwrap().len()
        }
    }

    fn e1_guests() -> Vec<(&'static str, MediaKind)> {
        vec![
            ("Ann", MediaKind::Video),
            ("Bo", MediaKind::Audio),
            ("Cy", MediaKind::Video),
        ]
    }

    #[test]
    fn test_normalize_progress_bounds() {
        assert_eq!(normalize_progress(0, 3), 40);
        assert_eq!(normalize_progress(1, 4), 50);
        assert_eq!(normalize_progress(3, 3), 80);
        assert_eq!(normalize_progress(0, 0), 80);
    }

    #[tokio::test]
    async fn test_compiles_clips_in_message_order() {
        let h = Harness::new(FakePipeline::default(), |_| {}).await;
        h.seed("E1", &e1_guests()).await;
        let id = EventId::new("E1");

        let output = h.orchestrator.compile(&id, None).await.unwrap();

        assert_eq!(output.clips, 3);
        assert_eq!(h.store.get(&output.key).await.unwrap(), b"Ann\nBo\nCy\n");
        assert_eq!(
            h.metadata.event(&id).await.unwrap().final_video_key,
            Some(output.key.clone())
        );

        let job = h.orchestrator.status(&id).await;
        assert_eq!(job.status, CompilationStatus::Completed);
        assert_eq!(job.progress, Some(100));
        assert!(!job.output_url.unwrap().is_empty());
        assert!(h.scratch_is_empty());
        assert!(!h.orchestrator.locks().is_locked(&id));
    }

    #[tokio::test]
    async fn test_already_compiled_is_refused_without_media_work() {
        let h = Harness::new(FakePipeline::default(), |_| {}).await;
        h.seed("E2", &e1_guests()).await;
        let id = EventId::new("E2");
        h.metadata
            .update_event(&id, EventUpdate::set_final_video_key("compilations/E2/old.mp4"))
            .await
            .unwrap();

        for _ in 0..2 {
            let err = h.orchestrator.compile(&id, None).await.unwrap_err();
            assert!(matches!(err, CompileError::AlreadyCompiled(_)));
            assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        }

        assert_eq!(h.orchestrator.status(&id).await.status, CompilationStatus::Pending);
        assert_eq!(h.normalize_calls(), 0);
        assert!(h.store.keys_with_prefix("compilations/").await.is_empty());
    }

    #[tokio::test]
    async fn test_recompiles_after_output_removed() {
        let h = Harness::new(FakePipeline::default(), |_| {}).await;
        h.seed("E1", &e1_guests()).await;
        let id = EventId::new("E1");

        let first = h.orchestrator.compile(&id, None).await.unwrap();
        h.orchestrator.remove_output(&id).await.unwrap();
        assert!(!h.store.contains(&first.key).await);
        assert_eq!(h.orchestrator.status(&id).await.status, CompilationStatus::Pending);

        let second = h.orchestrator.compile(&id, None).await.unwrap();
        assert_ne!(first.key, second.key);
    }

    #[tokio::test]
    async fn test_remove_output_refused_while_compiling() {
        let pipeline = FakePipeline {
            delay: Some(Duration::from_millis(20)),
            ..FakePipeline::default()
        };
        let h = Harness::new(pipeline, |_| {}).await;
        h.seed("E1", &e1_guests()).await;
        let id = EventId::new("E1");

        let handle = h.orchestrator.start(id.clone(), None).await.unwrap();
        let err = h.orchestrator.remove_output(&id).await.unwrap_err();
        assert!(matches!(err, CompileError::InProgress(_)));

        let output = handle.await.unwrap().unwrap();
        assert!(h.store.contains(&output.key).await);
        assert!(h.orchestrator.output_url(&id).await.unwrap().contains(&output.key));
    }

    #[tokio::test]
    async fn test_output_url_without_compilation_is_not_found() {
        let h = Harness::new(FakePipeline::default(), |_| {}).await;
        h.seed("E1", &e1_guests()).await;

        let err = h.orchestrator.output_url(&EventId::new("E1")).await.unwrap_err();
        assert!(matches!(err, CompileError::NoOutput(_)));
        let err = h.orchestrator.remove_output(&EventId::new("ghost")).await.unwrap_err();
        assert!(matches!(err, CompileError::EventNotFound(_)));
    }

    #[tokio::test]
    async fn test_unknown_event_leaves_status_pending() {
        let h = Harness::new(FakePipeline::default(), |_| {}).await;
        let id = EventId::new("ghost");

        let err = h.orchestrator.compile(&id, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(h.orchestrator.status(&id).await.status, CompilationStatus::Pending);
    }

    #[tokio::test]
    async fn test_zero_messages_fails_at_zero_progress() {
        let h = Harness::new(FakePipeline::default(), |_| {}).await;
        h.metadata.insert_event(Event::new("E3")).await;
        let id = EventId::new("E3");

        let err = h.orchestrator.compile(&id, None).await.unwrap_err();
        assert!(matches!(err, CompileError::NoMessages(_)));
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

        let job = h.orchestrator.status(&id).await;
        assert_eq!(job.status, CompilationStatus::Failed);
        assert_eq!(job.progress, Some(0));
        assert!(h.scratch_is_empty());
    }

    #[tokio::test]
    async fn test_second_fetch_failure_fails_job_and_cleans_up() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"eventId": "E1", "status": "failed"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let h = Harness::new(FakePipeline::default(), |_| {}).await;
        h.seed("E1", &e1_guests()).await;
        h.store.fail_on("uploads/E1/m2").await;
        let id = EventId::new("E1");
        let webhook = Url::parse(&server.uri()).unwrap();

        let err = h.orchestrator.compile(&id, Some(webhook)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransientIo);

        let job = h.orchestrator.status(&id).await;
        assert_eq!(job.status, CompilationStatus::Failed);
        assert!(!job.error.unwrap().is_empty());
        assert!(job.progress.unwrap() < 100);
        assert!(h.metadata.event(&id).await.unwrap().final_video_key.is_none());
        assert!(h.scratch_is_empty());
        assert_eq!(h.normalize_calls(), 0);
    }

    #[tokio::test]
    async fn test_transcode_failure_publishes_nothing() {
        let pipeline = FakePipeline {
            fail_on: Some("m3".into()),
            ..FakePipeline::default()
        };
        let h = Harness::new(pipeline, |_| {}).await;
        h.seed("E1", &e1_guests()).await;
        let id = EventId::new("E1");

        assert!(h.orchestrator.compile(&id, None).await.is_err());
        assert!(h.store.keys_with_prefix("compilations/").await.is_empty());
        assert_eq!(h.orchestrator.status(&id).await.status, CompilationStatus::Failed);
        assert!(h.scratch_is_empty());
    }

    #[tokio::test]
    async fn test_persist_failure_discards_upload() {
        let h = Harness::new(FakePipeline::default(), |_| {}).await;
        h.seed("E1", &e1_guests()).await;
        h.metadata.fail_on("update_event").await;
        let id = EventId::new("E1");

        assert!(h.orchestrator.compile(&id, None).await.is_err());
        assert!(h.store.keys_with_prefix("compilations/").await.is_empty());
        assert_eq!(h.orchestrator.status(&id).await.status, CompilationStatus::Failed);
    }

    #[tokio::test]
    async fn test_completed_webhook_carries_output_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"eventId": "E1", "status": "completed"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let h = Harness::new(FakePipeline::default(), |_| {}).await;
        h.seed("E1", &e1_guests()).await;
        let webhook = Url::parse(&server.uri()).unwrap();

        let output = h
            .orchestrator
            .compile(&EventId::new("E1"), Some(webhook))
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["outputUrl"], output.url.as_str());
    }

    #[tokio::test]
    async fn test_failing_webhook_does_not_change_outcome() {
        let h = Harness::new(FakePipeline::default(), |_| {}).await;
        h.seed("E1", &e1_guests()).await;
        let webhook = Url::parse("http://127.0.0.1:9/hook").unwrap();

        assert!(h.orchestrator.compile(&EventId::new("E1"), Some(webhook)).await.is_ok());
        assert_eq!(
            h.orchestrator.status(&EventId::new("E1")).await.status,
            CompilationStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_start_holds_event_lock_until_done() {
        let pipeline = FakePipeline {
            delay: Some(Duration::from_millis(20)),
            ..FakePipeline::default()
        };
        let h = Harness::new(pipeline, |_| {}).await;
        h.seed("E1", &e1_guests()).await;
        let id = EventId::new("E1");

        let handle = h.orchestrator.start(id.clone(), None).await.unwrap();
        let err = h.orchestrator.start(id.clone(), None).await.unwrap_err();
        assert!(matches!(err, CompileError::InProgress(_)));

        handle.await.unwrap().unwrap();
        assert!(!h.orchestrator.locks().is_locked(&id));
    }

    #[tokio::test]
    async fn test_progress_never_decreases_while_polled() {
        let pipeline = FakePipeline {
            delay: Some(Duration::from_millis(5)),
            ..FakePipeline::default()
        };
        let h = Harness::new(pipeline, |_| {}).await;
        h.seed("E1", &e1_guests()).await;
        let id = EventId::new("E1");

        let handle = h.orchestrator.start(id.clone(), None).await.unwrap();
        let registry = h.orchestrator.registry().clone();
        let mut seen = Vec::new();
        loop {
            let job = registry.get(&id).await;
            if let Some(p) = job.progress {
                seen.push(p);
            }
            if job.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        handle.await.unwrap().unwrap();

        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress went backwards: {:?}", seen);
        assert_eq!(seen.last(), Some(&100));
        assert_eq!(seen.iter().filter(|p| **p == 100).count(), 1);
    }

    #[tokio::test]
    async fn test_phase_timeout_fails_job() {
        let pipeline = FakePipeline {
            delay: Some(Duration::from_secs(5)),
            ..FakePipeline::default()
        };
        let h = Harness::new(pipeline, |c| {
            c.phase_timeout = Some(Duration::from_millis(50));
        })
        .await;
        h.seed("E1", &e1_guests()).await;
        let id = EventId::new("E1");

        let err = h.orchestrator.compile(&id, None).await.unwrap_err();
        assert!(matches!(err, CompileError::Timeout("normalize", _)));
        assert_eq!(h.orchestrator.status(&id).await.status, CompilationStatus::Failed);
        assert!(h.scratch_is_empty());
    }

    #[tokio::test]
    async fn test_parallel_normalization_keeps_order() {
        let pipeline = FakePipeline {
            staggered: true,
            ..FakePipeline::default()
        };
        let h = Harness::new(pipeline, |c| c.normalize_concurrency = 3).await;
        h.seed("E1", &e1_guests()).await;

        let output = h.orchestrator.compile(&EventId::new("E1"), None).await.unwrap();

        assert_eq!(h.store.get(&output.key).await.unwrap(), b"Ann\nBo\nCy\n");
        // Later clips finished first.
        assert_eq!(*h.pipeline.normalized.lock().unwrap(), vec!["m3", "m2", "m1"]);
    }

    #[tokio::test]
    async fn test_status_is_processing_right_after_start() {
        let pipeline = FakePipeline {
            delay: Some(Duration::from_millis(10)),
            ..FakePipeline::default()
        };
        let h = Harness::new(pipeline, |_| {}).await;
        h.metadata.insert_event(Event::new("E1")).await;
        let id = EventId::new("E1");
        assert!(matches!(
            h.orchestrator.compile(&id, None).await,
            Err(CompileError::NoMessages(_))
        ));
        assert_eq!(h.orchestrator.status(&id).await.status, CompilationStatus::Failed);

        h.seed("E1", &e1_guests()).await;
        let handle = h.orchestrator.start(id.clone(), None).await.unwrap();

        let job = h.orchestrator.status(&id).await;
        assert_eq!(job.status, CompilationStatus::Processing);
        assert_eq!(job.error, None);

        handle.await.unwrap().unwrap();
        assert_eq!(h.orchestrator.status(&id).await.status, CompilationStatus::Completed);
    }

    #[tokio::test]
    async fn test_refused_start_restores_previous_status() {
        let h = Harness::new(FakePipeline::default(), |_| {}).await;
        h.seed("E1", &e1_guests()).await;
        h.store.fail_on("uploads/E1/m2").await;
        let id = EventId::new("E1");
        assert!(h.orchestrator.compile(&id, None).await.is_err());
        let failed = h.orchestrator.status(&id).await;

        h.metadata
            .update_event(&id, EventUpdate::set_final_video_key("compilations/E1/old.mp4"))
            .await
            .unwrap();
        let handle = h.orchestrator.start(id.clone(), None).await.unwrap();
        assert!(matches!(handle.await.unwrap(), Err(CompileError::AlreadyCompiled(_))));

        assert_eq!(h.orchestrator.status(&id).await, failed);
        assert!(!h.orchestrator.locks().is_locked(&id));
    }

    #[tokio::test]
    async fn test_background_parallel_normalization_keeps_order() {
        let pipeline = FakePipeline {
            staggered: true,
            ..FakePipeline::default()
        };
        let h = Harness::new(pipeline, |c| c.normalize_concurrency = 3).await;
        h.seed("E1", &e1_guests()).await;
        let id = EventId::new("E1");

        let handle = h.orchestrator.start(id.clone(), None).await.unwrap();
        let mut seen = Vec::new();
        loop {
            let job = h.orchestrator.status(&id).await;
            seen.extend(job.progress);
            if job.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        let output = handle.await.unwrap().unwrap();

        assert_eq!(h.store.get(&output.key).await.unwrap(), b"Ann\nBo\nCy\n");
        assert_eq!(*h.pipeline.normalized.lock().unwrap(), vec!["m3", "m2", "m1"]);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress went backwards: {:?}", seen);
        assert_eq!(seen.last(), Some(&100));
        assert!(h.scratch_is_empty());
    }

    #[tokio::test]
    async fn test_failed_trim_detection_does_not_fail_job() {
        let runner = FfmpegRunner::new().with_binary("/nonexistent/bin/ffmpeg");
        let pipeline = FakePipeline {
            analyzer: Some(TimingAnalyzer::new(runner)),
            ..FakePipeline::default()
        };
        let h = Harness::new(pipeline, |_| {}).await;
        h.seed("E1", &e1_guests()).await;
        let id = EventId::new("E1");

        h.orchestrator.compile(&id, None).await.unwrap();

        assert_eq!(h.orchestrator.status(&id).await.status, CompilationStatus::Completed);
        assert_eq!(
            *h.pipeline.trims.lock().unwrap(),
            vec![
                vgb_media::black_detect::FALLBACK_TRIM_SECS,
                vgb_media::black_detect::FALLBACK_TRIM_SECS
            ]
        );
    }
}
