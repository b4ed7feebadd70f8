//! Bounded concurrent dispatch of chunks to a synthesizer.
//!
//! One tokio task per chunk, spawned in index order once a semaphore permit
//! is free. The permit is held across every attempt of that chunk, so at most
//! `concurrency_limit` chunks are in flight. Results are fanned back in by
//! joining each task and keying its result by chunk index.

use crate::defaults;
use crate::error::{ReadaloudError, Result};
use crate::pipeline::progress::{ProgressEmitter, ProgressEvent, ProgressStatus};
use crate::pipeline::types::{ChunkResult, DispatchReport, RunStatus};
use crate::synth::Synthesizer;
use crate::text::Chunk;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, info, warn};

/// Cooperative cancellation signal shared between a caller and a run.
///
/// Raising it stops new submissions and new attempts; calls already in
/// flight finish or time out on their own.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the flag is raised.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// How failed calls are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per chunk, including the first.
    pub max_attempts: u32,
    /// Base delay; doubles after every failed attempt.
    pub backoff_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::MAX_ATTEMPTS,
            backoff_delay: defaults::backoff(),
        }
    }
}

impl RetryPolicy {
    /// Delay before `attempt` (2-based; the first attempt has no delay).
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 2);
        self.backoff_delay.saturating_mul(factor)
    }
}

/// Dispatcher tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    pub concurrency_limit: usize,
    pub retry: RetryPolicy,
    /// Upper bound on a single synthesis call.
    pub per_call_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: defaults::CONCURRENCY_LIMIT,
            retry: RetryPolicy::default(),
            per_call_timeout: defaults::timeout(),
        }
    }
}

impl DispatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.concurrency_limit == 0 {
            return Err(ReadaloudError::invalid_config(
                "concurrency_limit",
                "must be at least 1",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ReadaloudError::invalid_config(
                "max_attempts",
                "must be at least 1",
            ));
        }
        if self.per_call_timeout.is_zero() {
            return Err(ReadaloudError::invalid_config(
                "timeout",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Live counters shared by the workers of one run.
#[derive(Debug)]
struct RunState {
    total: usize,
    finished: AtomicUsize,
    failed: AtomicUsize,
    cancel_observed: AtomicBool,
}

impl RunState {
    fn new(total: usize) -> Self {
        Self {
            total,
            finished: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            cancel_observed: AtomicBool::new(false),
        }
    }

    fn record_terminal(&self, success: bool) -> usize {
        if !success {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
        self.finished.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Fans chunks out to a synthesizer and collects one result per chunk.
pub struct Dispatcher {
    synth: Arc<dyn Synthesizer>,
    config: DispatchConfig,
    progress: Option<ProgressEmitter>,
}

impl Dispatcher {
    /// Create a dispatcher, rejecting unusable configuration.
    pub fn new(synth: Arc<dyn Synthesizer>, config: DispatchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            synth,
            config,
            progress: None,
        })
    }

    /// Publish progress events through `emitter`.
    pub fn with_progress(mut self, emitter: ProgressEmitter) -> Self {
        self.progress = Some(emitter);
        self
    }

    /// Run every chunk through the synthesizer.
    ///
    /// Returns once every submitted task has finished. Chunks never
    /// submitted because of cancellation have no entry in the report.
    pub async fn run(&self, chunks: Vec<Chunk>, cancel: &CancelFlag) -> DispatchReport {
        let chunk_count = chunks.len();
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency_limit));
        let state = Arc::new(RunState::new(chunk_count));
        let mut status = RunStatus::Finished;
        let mut handles = Vec::with_capacity(chunk_count);

        debug!(
            "dispatching {chunk_count} chunks to {} (concurrency {})",
            self.synth.name(),
            self.config.concurrency_limit
        );

        for chunk in chunks {
            if cancel.is_cancelled() {
                status = RunStatus::Cancelled;
                break;
            }

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                status = RunStatus::Cancelled;
                break;
            };
            if cancel.is_cancelled() {
                status = RunStatus::Cancelled;
                break;
            }

            let index = chunk.index;
            let worker = Worker {
                synth: self.synth.clone(),
                config: self.config.clone(),
                progress: self.progress.clone(),
                state: state.clone(),
                cancel: cancel.clone(),
            };
            let handle = tokio::spawn(async move {
                let _permit = permit;
                worker.process(chunk).await
            });
            handles.push((index, handle));
        }

        let submitted = handles.len();
        let mut results = BTreeMap::new();
        for (index, handle) in handles {
            match handle.await {
                Ok(Some(result)) => {
                    results.insert(index, result);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(chunk = index, "worker task failed: {e}");
                    let completed = state.record_terminal(false);
                    if let Some(progress) = &self.progress {
                        progress.emit(ProgressEvent::new(
                            index,
                            ProgressStatus::Failed,
                            0,
                            completed,
                            chunk_count,
                        ));
                    }
                    let reason = format!("worker task failed: {e}");
                    results.insert(index, ChunkResult::failure(index, 0, reason));
                }
            }
        }

        if state.cancel_observed.load(Ordering::SeqCst) {
            status = RunStatus::Cancelled;
        }

        let report = DispatchReport {
            status,
            chunk_count,
            submitted,
            results,
        };
        info!(
            "dispatch {}: {submitted}/{chunk_count} submitted, {} succeeded, {} failed",
            if report.is_cancelled() { "cancelled" } else { "finished" },
            report.succeeded(),
            state.failed.load(Ordering::SeqCst)
        );
        report
    }
}

/// Everything one chunk's task needs.
struct Worker {
    synth: Arc<dyn Synthesizer>,
    config: DispatchConfig,
    progress: Option<ProgressEmitter>,
    state: Arc<RunState>,
    cancel: CancelFlag,
}

impl Worker {
    /// Attempt `chunk` until it succeeds, retries run out, or the run is
    /// cancelled. `None` means cancellation came before the first attempt.
    async fn process(self, chunk: Chunk) -> Option<ChunkResult> {
        let index = chunk.index;
        let retry = self.config.retry;
        let mut last_reason = String::new();

        for attempt in 1..=retry.max_attempts {
            if attempt > 1 {
                let delay = retry.delay_before(attempt);
                warn!(chunk = index, attempt, "retrying in {delay:?}: {last_reason}");
                self.emit(index, ProgressStatus::Retrying, attempt);

                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            if self.cancel.is_cancelled() {
                self.state.cancel_observed.store(true, Ordering::SeqCst);
                if attempt == 1 {
                    return None;
                }
                let reason = format!("cancelled after {} attempts: {last_reason}", attempt - 1);
                return Some(self.fail(index, attempt - 1, reason));
            }

            if attempt == 1 {
                self.emit(index, ProgressStatus::Started, attempt);
            }
            debug!(chunk = index, attempt, "synthesizing {} chars", chunk.char_len());

            let call = self.synth.synthesize(&chunk.text);
            match tokio::time::timeout(self.config.per_call_timeout, call).await {
                Ok(Ok(audio)) => {
                    let completed = self.state.record_terminal(true);
                    self.emit_with(index, ProgressStatus::Completed, attempt, completed);
                    debug!(chunk = index, attempt, "synthesized {} bytes", audio.len());
                    return Some(ChunkResult::success(index, attempt, audio));
                }
                Ok(Err(e)) => last_reason = failure_reason(e),
                Err(_) => {
                    last_reason = format!("timed out after {:?}", self.config.per_call_timeout);
                }
            }
        }

        Some(self.fail(index, retry.max_attempts, last_reason))
    }

    fn fail(&self, index: usize, attempts: u32, reason: String) -> ChunkResult {
        let completed = self.state.record_terminal(false);
        warn!(chunk = index, attempts, "chunk failed: {reason}");
        self.emit_with(index, ProgressStatus::Failed, attempts, completed);
        ChunkResult::failure(index, attempts, reason)
    }

    fn emit(&self, index: usize, status: ProgressStatus, attempt: u32) {
        let completed = self.state.finished.load(Ordering::SeqCst);
        self.emit_with(index, status, attempt, completed);
    }

    fn emit_with(&self, index: usize, status: ProgressStatus, attempt: u32, completed: usize) {
        if let Some(progress) = &self.progress {
            progress.emit(ProgressEvent::new(
                index,
                status,
                attempt,
                completed,
                self.state.total,
            ));
        }
    }
}

fn failure_reason(error: ReadaloudError) -> String {
    match error {
        ReadaloudError::Synthesis { reason } => reason,
        other => other.to_string(),
    }
}
