mod decode;
mod filter;
mod level;
mod normalizer;
mod resample;
mod wav;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use decode::{decode_bytes, decode_file, AudioDecoder, DecodeError};
pub use filter::{ButterworthHighPass, DEFAULT_CUTOFF_HZ, DEFAULT_ORDER};
pub use level::{normalize_peak_in_place, trim_silence, DEFAULT_TOP_DB, FRAME_LENGTH, HOP_LENGTH};
pub use normalizer::AudioNormalizer;
pub use resample::resample;
pub use wav::{encode_wav_f32, encode_wav_i16, write_wav_f32};

/// Mono samples at a known rate.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// The sentinel the normalizer returns on failure.
    pub fn empty(sample_rate: u32) -> Self {
        Self::new(Vec::new(), sample_rate)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn duration(&self) -> Duration {
        duration_from_sample_count(self.sample_rate, 1, self.samples.len())
    }
}

/// Decoder output before channel collapse.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedAudio {
    /// Interleaved frames.
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl DecodedAudio {
    /// Averages all channels of each frame.
    pub fn into_mono(self) -> Waveform {
        let channels = usize::from(self.channels.max(1));
        if channels == 1 {
            return Waveform::new(self.samples, self.sample_rate);
        }
        let scale = 1.0 / channels as f32;
        let mono = self
            .samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() * scale)
            .collect();
        Waveform::new(mono, self.sample_rate)
    }
}

#[derive(Clone, Debug)]
pub enum AudioSource {
    Path(PathBuf),
    Bytes(bytes::Bytes),
}

impl From<PathBuf> for AudioSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<bytes::Bytes> for AudioSource {
    fn from(bytes: bytes::Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for AudioSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes.into())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AudioError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("resample from {from} Hz to {to} Hz failed: {details}")]
    Resample { from: u32, to: u32, details: String },

    #[error("invalid filter: {0}")]
    Filter(String),
}

pub fn duration_from_sample_count(
    sample_rate_hz: u32,
    channels: u16,
    sample_count: usize,
) -> Duration {
    if sample_rate_hz == 0 || channels == 0 {
        return Duration::from_secs(0);
    }
    let frames = sample_count / usize::from(channels);
    let micros = (frames as u128 * 1_000_000u128) / u128::from(sample_rate_hz);
    Duration::from_micros(micros.min(u128::from(u64::MAX)) as u64)
}
