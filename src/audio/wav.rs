//! WAV decoding and encoding for synthesized speech fragments.
//!
//! Fragments returned by the backend are complete WAV files, each with its
//! own header. Concatenation happens on decoded samples and the result is
//! framed once, so the output never contains stacked headers.

use crate::defaults::{BITS_PER_SAMPLE, CHANNELS, SAMPLE_RATE};
use std::fmt;
use std::io::Cursor;
use std::path::Path;

/// Sample layout shared by every fragment of one output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            channels: CHANNELS,
            bits_per_sample: BITS_PER_SAMPLE,
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz, {} ch, {} bit",
            self.sample_rate, self.channels, self.bits_per_sample
        )
    }
}

impl AudioFormat {
    fn to_spec(self) -> hound::WavSpec {
        hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: self.bits_per_sample,
            sample_format: hound::SampleFormat::Int,
        }
    }

    fn from_spec(spec: hound::WavSpec) -> hound::Result<Self> {
        if spec.sample_format != hound::SampleFormat::Int {
            return Err(hound::Error::Unsupported);
        }
        Ok(Self {
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            bits_per_sample: spec.bits_per_sample,
        })
    }

    /// Number of interleaved samples covering `ms` milliseconds.
    pub fn samples_for_ms(&self, ms: u32) -> usize {
        let frames = self.sample_rate as u64 * ms as u64 / 1000;
        frames as usize * self.channels as usize
    }

    /// Duration of `samples` interleaved samples in this format.
    pub fn duration_of(&self, samples: usize) -> std::time::Duration {
        if self.sample_rate == 0 || self.channels == 0 {
            return std::time::Duration::ZERO;
        }
        let frames = samples as f64 / self.channels as f64;
        std::time::Duration::from_secs_f64(frames / self.sample_rate as f64)
    }
}

/// A decoded WAV payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub format: AudioFormat,
    /// Interleaved integer samples.
    pub samples: Vec<i32>,
}

/// Decodes a complete WAV payload into raw samples.
///
/// Only integer PCM is accepted; float WAVs return [`hound::Error::Unsupported`].
pub fn decode(bytes: &[u8]) -> hound::Result<Fragment> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let format = AudioFormat::from_spec(reader.spec())?;
    let samples = reader
        .samples::<i32>()
        .collect::<hound::Result<Vec<_>>>()?;
    Ok(Fragment { format, samples })
}

/// Encodes samples as a single WAV file in memory.
pub fn encode(format: AudioFormat, samples: &[i32]) -> hound::Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, format.to_spec())?;
        for &s in samples {
            writer.write_sample(s)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Writes samples as a WAV file at `path`.
///
/// The file is written next to `path` with a `.partial` suffix and renamed
/// into place once finalized, so a failed write never leaves a truncated
/// file under the requested name.
pub fn write_file(path: &Path, format: AudioFormat, samples: &[i32]) -> hound::Result<()> {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".partial");
    let partial = std::path::PathBuf::from(partial);

    let result = (|| {
        let mut writer = hound::WavWriter::create(&partial, format.to_spec())?;
        for &s in samples {
            writer.write_sample(s)?;
        }
        writer.finalize()
    })();

    match result {
        Ok(()) => std::fs::rename(&partial, path).map_err(hound::Error::IoError),
        Err(e) => {
            if let Err(cleanup) = std::fs::remove_file(&partial) {
                tracing::debug!("could not remove {}: {cleanup}", partial.display());
            }
            Err(e)
        }
    }
}
