//! Scheduler integration tests.
//!
//! Uses a manually-driven runner: each run reports in over a channel and
//! blocks until the test decides its outcome, so admission, completion,
//! and cancellation can be observed step by step.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::time::timeout;

use vcast_models::{
    Job, JobError, JobId, JobOutput, JobPayload, JobStatus, JobType, OutputFile, ProgressEvent,
};
use vcast_queue::{JobRunner, ProgressHub, RunContext, Scheduler, SchedulerConfig};
use vcast_store::JobStore;

const WAIT: Duration = Duration::from_secs(2);

/// A run observed by the test harness.
struct RunHandle {
    job: Job,
    done: oneshot::Sender<Result<JobOutput, JobError>>,
}

/// Runner that hands control to the test for every job.
struct ManualRunner {
    started: mpsc::UnboundedSender<RunHandle>,
}

#[async_trait]
impl JobRunner for ManualRunner {
    async fn run(&self, job: Job, _ctx: RunContext) -> Result<JobOutput, JobError> {
        let (done, outcome) = oneshot::channel();
        self.started.send(RunHandle { job, done }).ok();
        match outcome.await {
            Ok(result) => result,
            Err(_) => Err(JobError::new("test harness dropped")),
        }
    }
}

struct TestQueue {
    scheduler: Arc<Scheduler>,
    store: Arc<JobStore>,
    started: mpsc::UnboundedReceiver<RunHandle>,
    _dir: TempDir,
}

fn manual_queue(max_concurrent: usize) -> TestQueue {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(JobStore::open(dir.path().join("jobs.json")));
    let hub = Arc::new(ProgressHub::new());
    let (tx, rx) = mpsc::unbounded_channel();
    let scheduler = Scheduler::new(
        SchedulerConfig {
            max_concurrent,
            ..SchedulerConfig::default()
        },
        Arc::clone(&store),
        hub,
        Arc::new(ManualRunner { started: tx }),
    );
    TestQueue {
        scheduler,
        store,
        started: rx,
        _dir: dir,
    }
}

fn payload() -> JobPayload {
    JobPayload::text("And God said, Let there be light", "en-grace")
}

async fn submit(q: &TestQueue, owner: &str) -> Job {
    // Keep created_at strictly ordered for deterministic FIFO.
    tokio::time::sleep(Duration::from_millis(3)).await;
    q.scheduler
        .submit(JobType::TextToSpeech, owner, payload())
        .await
        .unwrap()
}

async fn next_run(q: &mut TestQueue) -> RunHandle {
    timeout(WAIT, q.started.recv())
        .await
        .expect("timed out waiting for a run to start")
        .expect("runner channel closed")
}

fn ok_output() -> Result<JobOutput, JobError> {
    Ok(JobOutput::new(vec![OutputFile::audio("out/final.mp3")]))
}

#[tokio::test]
async fn capacity_cap_and_queue_positions() {
    let mut q = manual_queue(3);

    let jobs: Vec<Job> = {
        let mut v = Vec::new();
        for i in 0..5 {
            v.push(submit(&q, &format!("user{}", i)).await);
        }
        v
    };

    // J1..J3 admitted immediately, J4 and J5 queued at positions 1 and 2.
    for job in &jobs[..3] {
        assert_eq!(q.store.get(&job.id).unwrap().status, JobStatus::Processing);
    }
    for job in &jobs[3..] {
        assert_eq!(q.store.get(&job.id).unwrap().status, JobStatus::Pending);
    }

    let overview = q.scheduler.overview(None);
    assert_eq!(overview.active.len(), 3);
    assert_eq!(overview.pending.len(), 2);
    assert_eq!(overview.pending[0].job.id, jobs[3].id);
    assert_eq!(overview.pending[0].queue_position, 1);
    assert_eq!(overview.pending[1].job.id, jobs[4].id);
    assert_eq!(overview.pending[1].queue_position, 2);

    let stats = q.scheduler.stats();
    assert_eq!(stats.processing, 3);
    assert_eq!(stats.pending, 2);
    assert_eq!(stats.max_concurrent, 3);

    // Complete J2: J4 is admitted and J5 moves up to position 1.
    let mut handles = Vec::new();
    for _ in 0..3 {
        handles.push(next_run(&mut q).await);
    }
    // Extract J2 without dropping the other handles: a dropped handle
    // closes its oneshot and the runner reports a failure.
    let j2_idx = handles
        .iter()
        .position(|h| h.job.id == jobs[1].id)
        .unwrap();
    let j2 = handles.remove(j2_idx);
    j2.done.send(ok_output()).unwrap();

    let admitted = next_run(&mut q).await;
    assert_eq!(admitted.job.id, jobs[3].id);

    assert_eq!(q.store.get(&jobs[1].id).unwrap().status, JobStatus::Completed);
    assert_eq!(q.store.get(&jobs[3].id).unwrap().status, JobStatus::Processing);

    let overview = q.scheduler.overview(None);
    assert_eq!(overview.pending.len(), 1);
    assert_eq!(overview.pending[0].job.id, jobs[4].id);
    assert_eq!(overview.pending[0].queue_position, 1);

    assert_eq!(q.scheduler.stats().processing, 3);
}

#[tokio::test]
async fn fifo_admission_order() {
    let mut q = manual_queue(2);

    let mut submitted = Vec::new();
    for i in 0..6 {
        submitted.push(submit(&q, &format!("user{}", i)).await);
    }

    // Runs start in submission order; processing never exceeds the cap.
    for job in &submitted {
        assert!(q.scheduler.stats().processing <= 2);
        let run = next_run(&mut q).await;
        assert_eq!(run.job.id, job.id);
        run.done.send(ok_output()).unwrap();
    }
}

#[tokio::test]
async fn completion_persists_result() {
    let mut q = manual_queue(1);
    let job = submit(&q, "alice").await;

    let run = next_run(&mut q).await;
    run.done.send(ok_output()).unwrap();

    // Wait for the terminal transition to land.
    timeout(WAIT, async {
        loop {
            if q.store.get(&job.id).unwrap().is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let done = q.store.get(&job.id).unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.result.unwrap().outputs[0].path, "out/final.mp3");
    assert!(done.error.is_none());
}

#[tokio::test]
async fn cancel_pending_job() {
    let mut q = manual_queue(1);

    let j1 = submit(&q, "alice").await;
    let j2 = submit(&q, "bob").await;
    let _run1 = next_run(&mut q).await;

    assert_eq!(q.store.get(&j2.id).unwrap().status, JobStatus::Pending);
    assert!(q.scheduler.cancel(&j2.id).await);

    let cancelled = q.store.get(&j2.id).unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert!(cancelled.error.is_none());

    // Running slot untouched, no other job affected.
    let stats = q.scheduler.stats();
    assert_eq!(stats.processing, 1);
    assert_eq!(stats.pending, 0);
    assert_eq!(q.store.get(&j1.id).unwrap().status, JobStatus::Processing);
}

#[tokio::test]
async fn cancel_terminal_job_is_noop() {
    let mut q = manual_queue(1);

    let j1 = submit(&q, "alice").await;
    let j2 = submit(&q, "bob").await;
    let _run1 = next_run(&mut q).await;

    assert!(q.scheduler.cancel(&j2.id).await);
    let after_cancel = q.store.get(&j2.id).unwrap();

    // Second cancel: no-op, updated_at and status untouched.
    assert!(!q.scheduler.cancel(&j2.id).await);
    let after_second = q.store.get(&j2.id).unwrap();
    assert_eq!(after_second.status, JobStatus::Cancelled);
    assert_eq!(after_second.updated_at, after_cancel.updated_at);

    // Unknown ids report no cancellation.
    assert!(!q.scheduler.cancel(&JobId::from_string("missing")).await);
}

#[tokio::test]
async fn cancel_running_job_frees_slot_and_ignores_late_outcome() {
    let mut q = manual_queue(1);

    let j1 = submit(&q, "alice").await;
    let run1 = next_run(&mut q).await;

    assert!(q.scheduler.cancel(&j1.id).await);
    assert_eq!(q.store.get(&j1.id).unwrap().status, JobStatus::Cancelled);
    assert_eq!(q.scheduler.stats().processing, 0);

    // Slot already freed: the next submission is admitted immediately.
    let j2 = submit(&q, "bob").await;
    let _run2 = next_run(&mut q).await;
    assert_eq!(q.store.get(&j2.id).unwrap().status, JobStatus::Processing);

    // The abandoned runner finishing later must not overwrite the
    // cancellation or free a second slot.
    run1.done.send(ok_output()).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(q.store.get(&j1.id).unwrap().status, JobStatus::Cancelled);
    assert!(q.store.get(&j1.id).unwrap().result.is_none());
    assert_eq!(q.scheduler.stats().processing, 1);
}

#[tokio::test]
async fn failed_run_records_error_and_frees_slot() {
    let mut q = manual_queue(1);

    let j1 = submit(&q, "alice").await;
    let j2 = submit(&q, "alice").await;

    let run1 = next_run(&mut q).await;
    run1.done
        .send(Err(JobError::with_hints(
            "synthesis backend unreachable",
            vec!["Check that the TTS service is running".to_string()],
        )))
        .unwrap();

    // The freed slot cascades into exactly one admission.
    let run2 = next_run(&mut q).await;
    assert_eq!(run2.job.id, j2.id);

    let failed = q.store.get(&j1.id).unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    let err = failed.error.unwrap();
    assert!(!err.message.is_empty());
    assert_eq!(err.troubleshooting.len(), 1);
    assert_eq!(q.scheduler.stats().processing, 1);
}

/// Runner that emits two progress events, then fails mid-chunk.
struct ChunkedFailRunner {
    release: Arc<Notify>,
}

#[async_trait]
impl JobRunner for ChunkedFailRunner {
    async fn run(&self, _job: Job, ctx: RunContext) -> Result<JobOutput, JobError> {
        self.release.notified().await;
        ctx.progress.progress(1, 4).await;
        ctx.progress.progress(2, 4).await;
        Err(JobError::new("chunk 3 of 4 failed: connection reset"))
    }
}

#[tokio::test]
async fn progress_stream_ends_with_error_event() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(JobStore::open(dir.path().join("jobs.json")));
    let hub = Arc::new(ProgressHub::new());
    let release = Arc::new(Notify::new());
    let scheduler = Scheduler::new(
        SchedulerConfig::default(),
        Arc::clone(&store),
        Arc::clone(&hub),
        Arc::new(ChunkedFailRunner {
            release: Arc::clone(&release),
        }),
    );

    let job = scheduler
        .submit(JobType::TextToSpeech, "alice", payload())
        .await
        .unwrap();

    // Subscribe before letting the runner emit anything.
    let mut rx = hub.subscribe(&job.id).await;
    release.notify_one();

    assert_eq!(
        timeout(WAIT, rx.recv()).await.unwrap().unwrap(),
        ProgressEvent::progress(1, 4)
    );
    assert_eq!(
        timeout(WAIT, rx.recv()).await.unwrap().unwrap(),
        ProgressEvent::progress(2, 4)
    );

    let terminal = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    match terminal {
        ProgressEvent::Error { error, .. } => assert!(error.contains("chunk 3")),
        other => panic!("expected error event, got {:?}", other),
    }

    // Terminal event closes the stream.
    assert!(timeout(WAIT, rx.recv()).await.unwrap().is_err());

    let failed = store.get(&job.id).unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(!failed.error.unwrap().message.is_empty());
    // Slot freed exactly once.
    assert_eq!(scheduler.stats().processing, 0);
}

#[tokio::test]
async fn restart_recovery_refills_capacity() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("jobs.json");

    // Simulate a previous process that crashed with one job in flight.
    {
        let store = JobStore::open(&path);
        let a = store
            .create(JobType::TextToSpeech, "alice", payload())
            .unwrap();
        store.update(&a.id, |j| j.start()).unwrap();
        store
            .create(JobType::PassageToSpeech, "bob", payload())
            .unwrap();
    }

    let store = Arc::new(JobStore::open(&path));
    let hub = Arc::new(ProgressHub::new());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let scheduler = Scheduler::new(
        SchedulerConfig::default(),
        Arc::clone(&store),
        hub,
        Arc::new(ManualRunner { started: tx }),
    );

    // The interrupted job came back as pending; fill_capacity restarts
    // everything from scratch.
    assert_eq!(scheduler.stats().pending, 2);
    scheduler.fill_capacity().await;

    let first = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    let second = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_ne!(first.job.id, second.job.id);

    let stats = scheduler.stats();
    assert_eq!(stats.processing, 2);
    assert_eq!(stats.pending, 0);
}

#[tokio::test]
async fn retention_sweep_removes_only_old_terminal_jobs() {
    let q = manual_queue(1);

    let old_done = q.store.create(JobType::TextToSpeech, "alice", payload()).unwrap();
    let fresh_done = q.store.create(JobType::TextToSpeech, "alice", payload()).unwrap();
    let old_pending = q.store.create(JobType::TextToSpeech, "bob", payload()).unwrap();

    let stale = chrono::Utc::now() - chrono::Duration::hours(25);
    q.store
        .update(&old_done.id, |j| {
            j.complete(JobOutput::default());
            j.updated_at = stale;
        })
        .unwrap();
    q.store
        .update(&fresh_done.id, |j| j.complete(JobOutput::default()))
        .unwrap();
    q.store
        .update(&old_pending.id, |j| j.updated_at = stale)
        .unwrap();

    assert_eq!(q.scheduler.cleanup(), 1);
    assert!(q.store.get(&old_done.id).is_none());
    assert!(q.store.get(&fresh_done.id).is_some());
    // Non-terminal jobs are never swept, however old.
    assert!(q.store.get(&old_pending.id).is_some());
}

#[tokio::test]
async fn submit_returns_admitted_record() {
    let mut q = manual_queue(1);

    let j1 = submit(&q, "alice").await;
    assert_eq!(j1.status, JobStatus::Processing);
    assert!(j1.started_at.is_some());
    let _run = next_run(&mut q).await;

    let j2 = submit(&q, "alice").await;
    assert_eq!(j2.status, JobStatus::Pending);
    assert!(j2.started_at.is_none());
}
