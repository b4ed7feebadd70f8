//! Mock synthesizer for testing.
//!
//! Produces valid WAV payloads without a backend and records how it was
//! called, so tests can check concurrency limits, retries and cancellation.

use crate::audio::wav::{self, AudioFormat};
use crate::error::{ReadaloudError, Result};
use crate::synth::Synthesizer;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type TextPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;
type SampleFn = Arc<dyn Fn(&str) -> Vec<i32> + Send + Sync>;

/// Mock synthesizer with scripted failures and call instrumentation.
pub struct MockSynthesizer {
    name: String,
    format: AudioFormat,
    delay: Duration,
    samples: SampleFn,
    fail_when: Option<TextPredicate>,
    transient_failures: u32,
    failures_so_far: Mutex<HashMap<String, u32>>,
    texts_seen: Mutex<HashSet<String>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockSynthesizer {
    /// Create a mock that succeeds for every text.
    ///
    /// The default payload holds one sample (value 1) per character of text.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            format: AudioFormat::default(),
            delay: Duration::ZERO,
            samples: Arc::new(|text: &str| vec![1; text.chars().count()]),
            fail_when: None,
            transient_failures: 0,
            failures_so_far: Mutex::new(HashMap::new()),
            texts_seen: Mutex::new(HashSet::new()),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Configure the samples returned for a given text.
    pub fn with_samples(mut self, f: impl Fn(&str) -> Vec<i32> + Send + Sync + 'static) -> Self {
        self.samples = Arc::new(f);
        self
    }

    /// Configure the WAV format of returned payloads.
    pub fn with_format(mut self, format: AudioFormat) -> Self {
        self.format = format;
        self
    }

    /// Sleep this long inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail every call whose text matches `predicate`.
    pub fn with_failure_when(mut self, predicate: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.fail_when = Some(Arc::new(predicate));
        self
    }

    /// Fail the first `n` calls for each distinct text, then succeed.
    pub fn with_transient_failures(mut self, n: u32) -> Self {
        self.transient_failures = n;
        self
    }

    /// Total number of calls made.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of distinct texts that reached the mock.
    pub fn distinct_texts(&self) -> usize {
        self.texts_seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Calls currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn should_fail(&self, text: &str) -> bool {
        if self.fail_when.as_ref().is_some_and(|p| p(text)) {
            return true;
        }
        if self.transient_failures == 0 {
            return false;
        }
        let mut failures = self
            .failures_so_far
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let count = failures.entry(text.to_string()).or_insert(0);
        if *count < self.transient_failures {
            *count += 1;
            true
        } else {
            false
        }
    }
}

/// Decrements the in-flight counter when a call ends, even if it is dropped.
struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts_seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(text.to_string());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.should_fail(text) {
            return Err(ReadaloudError::synthesis("mock synthesis failure"));
        }

        let samples = (self.samples)(text);
        wav::encode(self.format, &samples)
            .map_err(|e| ReadaloudError::synthesis(format!("mock encode failed: {e}")))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
