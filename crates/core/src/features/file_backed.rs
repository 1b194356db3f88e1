use crate::audio::Waveform;
use crate::features::{ExtractionError, FeatureExtractor, FileFeatureExtractor};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::BufWriter;

const LOG_TARGET: &str = "features::tempfile";

/// Bridges a disk-bound extractor: each call writes the waveform to a
/// temporary WAV that is deleted when the call returns, on every path.
#[derive(Clone, Debug)]
pub struct TempFileExtractor<E> {
    inner: E,
}

impl<E> TempFileExtractor<E> {
    pub fn new(inner: E) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }
}

impl<E: FileFeatureExtractor> FeatureExtractor for TempFileExtractor<E> {
    fn extract(&self, waveform: &Waveform) -> Result<Vec<f32>, ExtractionError> {
        if waveform.is_empty() {
            return Err(ExtractionError::EmptyInput);
        }

        let tmp = tempfile::Builder::new()
            .prefix("aac-voice-")
            .suffix(".wav")
            .tempfile()
            .map_err(ExtractionError::TempFile)?;

        {
            let spec = WavSpec {
                channels: 1,
                sample_rate: waveform.sample_rate,
                bits_per_sample: 32,
                sample_format: SampleFormat::Float,
            };
            let file = tmp.reopen().map_err(ExtractionError::TempFile)?;
            let mut writer = WavWriter::new(BufWriter::new(file), spec)?;
            for &s in &waveform.samples {
                writer.write_sample(s)?;
            }
            writer.finalize()?;
        }

        tracing::debug!(target: LOG_TARGET, path = %tmp.path().display(), samples = waveform.len(), "wrote temporary wav");
        // `tmp` is dropped (and unlinked) after this call whatever it returns.
        self.inner.extract_file(tmp.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Option<PathBuf>>,
        fail: bool,
    }

    impl FileFeatureExtractor for Recording {
        fn extract_file(&self, wav_path: &Path) -> Result<Vec<f32>, ExtractionError> {
            assert!(wav_path.exists());
            *self.seen.lock().unwrap() = Some(wav_path.to_path_buf());
            if self.fail {
                return Err(ExtractionError::Process("boom".to_owned()));
            }
            let reader = hound::WavReader::open(wav_path).unwrap();
            Ok(vec![reader.spec().sample_rate as f32, reader.len() as f32])
        }
    }

    fn waveform() -> Waveform {
        Waveform::new(vec![0.1, -0.2, 0.3, 0.0], 16_000)
    }

    #[test]
    fn extractor_sees_wav_and_file_is_removed() {
        let adapter = TempFileExtractor::new(Recording::default());
        let features = adapter.extract(&waveform()).unwrap();
        assert_eq!(features, vec![16_000.0, 4.0]);

        let path = adapter.inner().seen.lock().unwrap().clone().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn file_is_removed_when_extraction_fails() {
        let adapter = TempFileExtractor::new(Recording {
            fail: true,
            ..Default::default()
        });
        let err = adapter.extract(&waveform()).unwrap_err();
        assert!(matches!(err, ExtractionError::Process(_)));

        let path = adapter.inner().seen.lock().unwrap().clone().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn empty_waveform_is_rejected_before_touching_disk() {
        let adapter = TempFileExtractor::new(Recording::default());
        let err = adapter.extract(&Waveform::empty(22_050)).unwrap_err();
        assert!(matches!(err, ExtractionError::EmptyInput));
        assert!(adapter.inner().seen.lock().unwrap().is_none());
    }
}
