use crate::audio::AudioError;
use rubato::{FftFixedIn, Resampler};

const CHUNK_SIZE: usize = 1024;

/// Band-limited resampling of a whole mono clip.
///
/// The output is aligned for the resampler's delay and holds exactly
/// `round(len * to / from)` samples.
pub fn resample(samples: &[f32], from: u32, to: u32) -> Result<Vec<f32>, AudioError> {
    if from == to || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    if from == 0 || to == 0 {
        return Err(resample_error(from, to, "sample rate must be > 0"));
    }

    let mut resampler = FftFixedIn::<f32>::new(from as usize, to as usize, CHUNK_SIZE, 2, 1)
        .map_err(|e| resample_error(from, to, e))?;

    let expected = expected_len(samples.len(), from, to);
    let delay = resampler.output_delay();
    let wanted = expected + delay;

    let mut out = Vec::with_capacity(wanted + CHUNK_SIZE);
    let mut chunk = Vec::with_capacity(CHUNK_SIZE);
    let mut pos = 0usize;
    while out.len() < wanted {
        let needed = resampler.input_frames_next();
        chunk.clear();
        chunk.resize(needed, 0.0f32);
        if pos < samples.len() {
            let end = (pos + needed).min(samples.len());
            chunk[..end - pos].copy_from_slice(&samples[pos..end]);
        }
        pos += needed;

        let frames = resampler
            .process(&[&chunk], None)
            .map_err(|e| resample_error(from, to, e))?;
        if let Some(channel) = frames.first() {
            out.extend_from_slice(channel);
        }
    }

    Ok(out.into_iter().skip(delay).take(expected).collect())
}

fn expected_len(len: usize, from: u32, to: u32) -> usize {
    let num = len as u64 * u64::from(to) + u64::from(from) / 2;
    (num / u64::from(from)) as usize
}

fn resample_error(from: u32, to: u32, details: impl ToString) -> AudioError {
    AudioError::Resample {
        from,
        to,
        details: details.to_string(),
    }
}
