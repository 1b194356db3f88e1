use crate::audio::AudioError;
use std::f64::consts::PI;

pub const DEFAULT_CUTOFF_HZ: f64 = 100.0;
pub const DEFAULT_ORDER: usize = 5;

/// One section of the cascade, transposed direct form II.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Section {
    b: [f64; 3],
    a: [f64; 3],
}

impl Section {
    /// Bilinear transform of `s^2 / (s^2 + s/q + 1)` with `k = tan(pi fc / fs)`.
    fn second_order(k: f64, q: f64) -> Self {
        let k2 = k * k;
        let norm = 1.0 / (1.0 + k / q + k2);
        Self {
            b: [norm, -2.0 * norm, norm],
            a: [1.0, 2.0 * (k2 - 1.0) * norm, (1.0 - k / q + k2) * norm],
        }
    }

    /// Bilinear transform of `s / (s + 1)`.
    fn first_order(k: f64) -> Self {
        let norm = 1.0 / (1.0 + k);
        Self {
            b: [norm, -norm, 0.0],
            a: [1.0, (k - 1.0) * norm, 0.0],
        }
    }

    fn run(&self, samples: &mut [f64]) {
        let (mut z1, mut z2) = (0.0f64, 0.0f64);
        for x in samples.iter_mut() {
            let input = *x;
            let y = self.b[0] * input + z1;
            z1 = self.b[1] * input - self.a[1] * y + z2;
            z2 = self.b[2] * input - self.a[2] * y;
            *x = y;
        }
    }
}

/// Digital Butterworth high-pass, designed like `scipy.signal.butter` (bilinear
/// transform with pre-warping) and run from zero state like `lfilter`.
///
/// The transfer function is factored into second-order sections plus one
/// first-order section for odd orders, which keeps a 5th-order design at a
/// 100 Hz cutoff numerically stable at audio rates.
#[derive(Clone, Debug, PartialEq)]
pub struct ButterworthHighPass {
    sections: Vec<Section>,
}

impl ButterworthHighPass {
    pub fn new(order: usize, cutoff_hz: f64, sample_rate: u32) -> Result<Self, AudioError> {
        if order == 0 {
            return Err(AudioError::Filter("order must be > 0".to_owned()));
        }
        let nyquist = f64::from(sample_rate) / 2.0;
        if !(cutoff_hz > 0.0 && cutoff_hz < nyquist) {
            return Err(AudioError::Filter(format!(
                "cutoff {cutoff_hz} Hz must lie in (0, {nyquist}) Hz"
            )));
        }

        let k = (PI * cutoff_hz / f64::from(sample_rate)).tan();
        let mut sections = Vec::with_capacity(order.div_ceil(2));
        for i in 0..order / 2 {
            // Conjugate pole pair at angle phi from the imaginary axis.
            let phi = PI * (2 * i + 1) as f64 / (2 * order) as f64;
            let q = 1.0 / (2.0 * phi.sin());
            sections.push(Section::second_order(k, q));
        }
        if order % 2 == 1 {
            sections.push(Section::first_order(k));
        }
        Ok(Self { sections })
    }

    pub fn apply(&self, samples: &[f32]) -> Vec<f32> {
        let mut work: Vec<f64> = samples.iter().map(|&s| f64::from(s)).collect();
        for section in &self.sections {
            section.run(&mut work);
        }
        work.into_iter().map(|s| s as f32).collect()
    }

    /// Magnitude response at `freq_hz`.
    pub fn gain_at(&self, freq_hz: f64, sample_rate: u32) -> f64 {
        let w = 2.0 * PI * freq_hz / f64::from(sample_rate);
        let (cos1, sin1) = (w.cos(), -w.sin());
        let (cos2, sin2) = ((2.0 * w).cos(), -(2.0 * w).sin());
        self.sections.iter().fold(1.0, |acc, s| {
            let num_re = s.b[0] + s.b[1] * cos1 + s.b[2] * cos2;
            let num_im = s.b[1] * sin1 + s.b[2] * sin2;
            let den_re = s.a[0] + s.a[1] * cos1 + s.a[2] * cos2;
            let den_im = s.a[1] * sin1 + s.a[2] * sin2;
            acc * (num_re.hypot(num_im) / den_re.hypot(den_im))
        })
    }
}
