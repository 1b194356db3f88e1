pub const DEFAULT_TOP_DB: f32 = 20.0;
pub const FRAME_LENGTH: usize = 2048;
pub const HOP_LENGTH: usize = 512;

const POWER_FLOOR: f32 = 1e-10;

/// Scales so the largest absolute sample is 1.0. Silent input is left alone.
pub fn normalize_peak_in_place(samples: &mut [f32]) {
    let peak = samples.iter().fold(0.0f32, |m, &s| m.max(s.abs()));
    if peak <= f32::MIN_POSITIVE || !peak.is_finite() {
        return;
    }
    let scale = 1.0 / peak;
    for s in samples.iter_mut() {
        *s *= scale;
    }
}

/// Drops leading and trailing frames quieter than `top_db` below the loudest
/// frame. Frames are centered (`FRAME_LENGTH` wide, `HOP_LENGTH` apart), so
/// the kept region always starts and ends on a hop boundary.
pub fn trim_silence(samples: &[f32], top_db: f32) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }
    let power = frame_power(samples, FRAME_LENGTH, HOP_LENGTH);
    let reference = power.iter().fold(0.0f32, |m, &p| m.max(p));
    if reference <= POWER_FLOOR {
        // every frame sits at the reference level
        return samples.to_vec();
    }
    let ref_db = 10.0 * reference.max(POWER_FLOOR).log10();

    let loud = |p: f32| 10.0 * p.max(POWER_FLOOR).log10() - ref_db > -top_db;
    let first = power.iter().position(|&p| loud(p));
    let last = power.iter().rposition(|&p| loud(p));

    match (first, last) {
        (Some(first), Some(last)) => {
            let start = (first * HOP_LENGTH).min(samples.len());
            let end = ((last + 1) * HOP_LENGTH).min(samples.len());
            samples[start..end].to_vec()
        }
        _ => Vec::new(),
    }
}

/// Mean square per centered frame, zero-padded at both ends.
fn frame_power(samples: &[f32], frame_length: usize, hop: usize) -> Vec<f32> {
    let half = frame_length / 2;
    let n_frames = 1 + samples.len() / hop;
    (0..n_frames)
        .map(|t| {
            let center = t * hop;
            let lo = center.saturating_sub(half);
            let hi = (center + half).min(samples.len());
            let sum: f32 = samples[lo..hi].iter().map(|x| x * x).sum();
            sum / frame_length as f32
        })
        .collect()
}
