//! Default configuration constants for readaloud.
//!
//! Shared by the config file types, the CLI and the pipeline so every entry
//! point starts from the same values.

use std::time::Duration;

/// Default maximum chunk length in characters.
pub const MAX_CHUNK_CHARS: usize = 400;

/// Default number of synthesis requests in flight at once.
pub const CONCURRENCY_LIMIT: usize = 12;

/// Default number of attempts per chunk (first try included).
pub const MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry, in milliseconds.
///
/// Doubles for every further retry of the same chunk.
pub const BACKOFF_MS: u64 = 500;

/// Default per-call timeout in seconds.
pub const TIMEOUT_SECS: u64 = 60;

/// Default synthesis backend base URL.
pub const API_URL: &str = "http://127.0.0.1:5100";

/// Route on the backend that turns text into WAV audio.
pub const SYNTHESIZE_ROUTE: &str = "/synthesize";

/// Default capacity of the progress event buffer. Overflowing events are dropped.
pub const PROGRESS_BUFFER: usize = 256;

/// Sample rate of the default Piper voices (medium quality).
pub const SAMPLE_RATE: u32 = 22050;

/// Channel count of synthesized speech.
pub const CHANNELS: u16 = 1;

/// Bit depth of synthesized speech.
pub const BITS_PER_SAMPLE: u16 = 16;

/// Per-call timeout as a [`Duration`].
pub fn timeout() -> Duration {
    Duration::from_secs(TIMEOUT_SECS)
}

/// Initial retry backoff as a [`Duration`].
pub fn backoff() -> Duration {
    Duration::from_millis(BACKOFF_MS)
}
