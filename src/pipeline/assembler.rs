//! Reassembly of synthesized fragments into one audio stream.
//!
//! Fragments are decoded to raw samples, concatenated strictly by chunk
//! index and framed once with a single WAV header.

use crate::audio::wav::{self, AudioFormat, Fragment};
use crate::error::{ReadaloudError, Result};
use crate::pipeline::types::{ChunkOutcome, ChunkResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// What to do when some chunks failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartialFailurePolicy {
    /// Refuse to produce output, naming the failed chunks.
    #[default]
    Abort,
    /// Produce output from the chunks that succeeded.
    BestEffort,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssemblyConfig {
    pub policy: PartialFailurePolicy,
    /// Silence inserted in place of a failed chunk under
    /// [`PartialFailurePolicy::BestEffort`]; 0 omits the chunk entirely.
    pub failed_segment_silence_ms: u32,
}

/// Where one chunk's samples live in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub index: usize,
    /// Offset of the first sample.
    pub start: usize,
    /// Number of interleaved samples.
    pub len: usize,
    /// True when this segment is silence standing in for a failed chunk.
    pub silence: bool,
}

/// Ordered audio for a whole document.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioStream {
    pub format: AudioFormat,
    pub samples: Vec<i32>,
    pub segments: Vec<Segment>,
    /// Failed chunks left out of (or silenced in) the stream, ascending.
    pub omitted: Vec<usize>,
}

impl AudioStream {
    pub fn empty(format: AudioFormat) -> Self {
        Self {
            format,
            samples: Vec::new(),
            segments: Vec::new(),
            omitted: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        self.format.duration_of(self.samples.len())
    }

    /// Encode the stream as a single WAV file in memory.
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>> {
        wav::encode(self.format, &self.samples).map_err(audio_error)
    }

    /// Write the stream as a WAV file; never leaves a truncated file at `path`.
    pub fn write_wav(&self, path: &Path) -> Result<()> {
        wav::write_file(path, self.format, &self.samples).map_err(audio_error)
    }

    /// Samples belonging to chunk `index`, if it is part of the stream.
    pub fn segment_samples(&self, index: usize) -> Option<&[i32]> {
        self.segments
            .iter()
            .find(|s| s.index == index)
            .map(|s| &self.samples[s.start..s.start + s.len])
    }
}

fn audio_error(error: hound::Error) -> ReadaloudError {
    match error {
        hound::Error::IoError(e) => ReadaloudError::Io(e),
        other => ReadaloudError::Other(format!("Failed to encode audio: {other}")),
    }
}

/// Build the output stream for chunks `0..chunk_count`.
///
/// # Errors
/// - [`ReadaloudError::IncompleteResults`] if any index has no result.
/// - [`ReadaloudError::PartialFailure`] if any chunk failed under
///   [`PartialFailurePolicy::Abort`].
/// - [`ReadaloudError::MalformedAudio`] / [`ReadaloudError::AudioFormatMismatch`]
///   if a payload cannot be decoded or does not match the first fragment.
pub fn assemble(
    chunk_count: usize,
    results: &BTreeMap<usize, ChunkResult>,
    config: &AssemblyConfig,
) -> Result<AudioStream> {
    let missing: Vec<usize> = (0..chunk_count)
        .filter(|i| !results.contains_key(i))
        .collect();
    if !missing.is_empty() {
        return Err(ReadaloudError::IncompleteResults { missing });
    }

    let failed: Vec<usize> = (0..chunk_count)
        .filter(|i| results.get(i).is_some_and(|r| !r.is_success()))
        .collect();
    if !failed.is_empty() && config.policy == PartialFailurePolicy::Abort {
        return Err(ReadaloudError::PartialFailure { failed });
    }

    let fragments = decode_all(chunk_count, results)?;
    let format = fragments
        .values()
        .next()
        .map(|f| f.format)
        .unwrap_or_default();

    let silence_len = format.samples_for_ms(config.failed_segment_silence_ms);
    let total: usize = fragments.values().map(|f| f.samples.len()).sum::<usize>()
        + failed.len() * silence_len;

    let mut stream = AudioStream::empty(format);
    stream.samples.reserve_exact(total);
    stream.omitted = failed;

    for index in 0..chunk_count {
        let start = stream.samples.len();
        if let Some(fragment) = fragments.get(&index) {
            stream.samples.extend_from_slice(&fragment.samples);
            stream.segments.push(Segment {
                index,
                start,
                len: fragment.samples.len(),
                silence: false,
            });
        } else if silence_len > 0 {
            stream.samples.resize(start + silence_len, 0);
            stream.segments.push(Segment {
                index,
                start,
                len: silence_len,
                silence: true,
            });
        }
    }

    tracing::debug!(
        "assembled {} segments, {} samples ({:.1}s), {} omitted",
        stream.segments.len(),
        stream.samples.len(),
        stream.duration().as_secs_f64(),
        stream.omitted.len()
    );
    Ok(stream)
}

/// Decode every successful payload, checking they share one format.
fn decode_all(
    chunk_count: usize,
    results: &BTreeMap<usize, ChunkResult>,
) -> Result<BTreeMap<usize, Fragment>> {
    let mut fragments = BTreeMap::new();
    let mut expected: Option<AudioFormat> = None;

    for (&index, result) in results.range(..chunk_count) {
        let ChunkOutcome::Success(bytes) = &result.outcome else {
            continue;
        };
        let fragment = wav::decode(bytes).map_err(|e| ReadaloudError::MalformedAudio {
            index,
            message: e.to_string(),
        })?;

        match expected {
            None => expected = Some(fragment.format),
            Some(format) if format != fragment.format => {
                return Err(ReadaloudError::AudioFormatMismatch {
                    index,
                    expected: format.to_string(),
                    actual: fragment.format.to_string(),
                });
            }
            Some(_) => {}
        }
        fragments.insert(index, fragment);
    }
    Ok(fragments)
}
