use crate::audio::Waveform;
use crate::features::{ensure_finite, ExtractionError, FeatureExtractor};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

const DEFAULT_N_FFT: usize = 2048;
const DEFAULT_HOP: usize = 512;
const ROLLOFF_FRACTION: f32 = 0.85;
const POWER_FLOOR: f32 = 1e-10;

/// Layout of the vector produced by [`SpectralFeatureExtractor`]: the mean
/// and standard deviation of six per-frame descriptors.
pub const SPECTRAL_FEATURE_NAMES: [&str; 12] = [
    "rms_mean",
    "rms_std",
    "zcr_mean",
    "zcr_std",
    "centroid_mean",
    "centroid_std",
    "bandwidth_mean",
    "bandwidth_std",
    "rolloff_mean",
    "rolloff_std",
    "flatness_mean",
    "flatness_std",
];

#[derive(Clone, Copy, Debug, Default)]
struct FrameStats {
    rms: f32,
    zcr: f32,
    centroid: f32,
    bandwidth: f32,
    rolloff: f32,
    flatness: f32,
}

impl FrameStats {
    fn as_array(&self) -> [f32; 6] {
        [
            self.rms,
            self.zcr,
            self.centroid,
            self.bandwidth,
            self.rolloff,
            self.flatness,
        ]
    }
}

/// In-process acoustic summary: Hann-windowed STFT descriptors pooled over
/// the clip.
#[derive(Clone)]
pub struct SpectralFeatureExtractor {
    n_fft: usize,
    hop: usize,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
}

impl std::fmt::Debug for SpectralFeatureExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectralFeatureExtractor")
            .field("n_fft", &self.n_fft)
            .field("hop", &self.hop)
            .finish()
    }
}

impl Default for SpectralFeatureExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_N_FFT, DEFAULT_HOP)
    }
}

impl SpectralFeatureExtractor {
    pub fn new(n_fft: usize, hop: usize) -> Self {
        let n_fft = n_fft.max(2);
        let window = (0..n_fft)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / n_fft as f32;
                0.5 - 0.5 * phase.cos()
            })
            .collect();
        let fft = FftPlanner::new().plan_fft_forward(n_fft);
        Self {
            n_fft,
            hop: hop.max(1),
            window,
            fft,
        }
    }

    pub fn feature_len(&self) -> usize {
        SPECTRAL_FEATURE_NAMES.len()
    }

    fn frame_stats(&self, frame: &[f32], sample_rate: u32) -> FrameStats {
        let n = frame.len().max(1) as f32;
        let rms = (frame.iter().map(|x| x * x).sum::<f32>() / n).sqrt();
        let zcr = if frame.len() < 2 {
            0.0
        } else {
            frame
                .windows(2)
                .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
                .count() as f32
                / (frame.len() - 1) as f32
        };

        let mut buffer: Vec<Complex<f32>> = self
            .window
            .iter()
            .enumerate()
            .map(|(i, w)| Complex {
                re: frame.get(i).copied().unwrap_or(0.0) * w,
                im: 0.0,
            })
            .collect();
        self.fft.process(&mut buffer);

        let bins = self.n_fft / 2 + 1;
        let bin_hz = sample_rate as f32 / self.n_fft as f32;
        let magnitudes: Vec<f32> = buffer[..bins].iter().map(|c| c.norm()).collect();
        let mag_sum: f32 = magnitudes.iter().sum();

        let (centroid, bandwidth) = if mag_sum > 0.0 {
            let centroid = magnitudes
                .iter()
                .enumerate()
                .map(|(k, m)| k as f32 * bin_hz * m)
                .sum::<f32>()
                / mag_sum;
            let spread = magnitudes
                .iter()
                .enumerate()
                .map(|(k, m)| {
                    let d = k as f32 * bin_hz - centroid;
                    m * d * d
                })
                .sum::<f32>()
                / mag_sum;
            (centroid, spread.sqrt())
        } else {
            (0.0, 0.0)
        };

        let power: Vec<f32> = magnitudes.iter().map(|m| m * m).collect();
        let power_sum: f32 = power.iter().sum();
        let rolloff = if power_sum > 0.0 {
            let threshold = ROLLOFF_FRACTION * power_sum;
            let mut acc = 0.0;
            let bin = power
                .iter()
                .position(|p| {
                    acc += p;
                    acc >= threshold
                })
                .unwrap_or(bins - 1);
            bin as f32 * bin_hz
        } else {
            0.0
        };

        let log_mean = power
            .iter()
            .map(|p| (p + POWER_FLOOR).ln())
            .sum::<f32>()
            / bins as f32;
        let arith_mean = power_sum / bins as f32 + POWER_FLOOR;
        let flatness = (log_mean.exp() / arith_mean).clamp(0.0, 1.0);

        FrameStats {
            rms,
            zcr,
            centroid,
            bandwidth,
            rolloff,
            flatness,
        }
    }
}

impl FeatureExtractor for SpectralFeatureExtractor {
    fn extract(&self, waveform: &Waveform) -> Result<Vec<f32>, ExtractionError> {
        if waveform.is_empty() || waveform.sample_rate == 0 {
            return Err(ExtractionError::EmptyInput);
        }

        let samples = &waveform.samples;
        let mut frames = Vec::new();
        let mut start = 0usize;
        loop {
            let end = (start + self.n_fft).min(samples.len());
            frames.push(self.frame_stats(&samples[start..end], waveform.sample_rate));
            if end == samples.len() {
                break;
            }
            start += self.hop;
        }

        let count = frames.len() as f32;
        let mut features = Vec::with_capacity(self.feature_len());
        for d in 0..6 {
            let mean = frames.iter().map(|f| f.as_array()[d]).sum::<f32>() / count;
            let var = frames
                .iter()
                .map(|f| {
                    let x = f.as_array()[d] - mean;
                    x * x
                })
                .sum::<f32>()
                / count;
            features.push(mean);
            features.push(var.sqrt());
        }

        ensure_finite(features)
    }
}
