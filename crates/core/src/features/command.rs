use crate::features::{ensure_finite, ExtractionError, FileFeatureExtractor};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Runs `program [args..] <wav_path>` and reads a JSON array of numbers from
/// its stdout, e.g. a Python script wrapping a librosa feature pipeline.
#[derive(Clone, Debug)]
pub struct CommandFeatureExtractor {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandFeatureExtractor {
    #[must_use]
    pub fn new(program: PathBuf, args: Vec<String>) -> Self {
        Self { program, args }
    }

    fn parse_output(stdout: &[u8]) -> Result<Vec<f32>, ExtractionError> {
        let text = std::str::from_utf8(stdout)
            .map_err(|e| ExtractionError::InvalidOutput(format!("stdout is not utf-8: {e}")))?;
        let values: Vec<f32> = serde_json::from_str(text.trim()).map_err(|e| {
            ExtractionError::InvalidOutput(format!("expected a JSON array of numbers: {e}"))
        })?;
        if values.is_empty() {
            return Err(ExtractionError::InvalidOutput(
                "extractor returned no features".into(),
            ));
        }
        ensure_finite(values)
    }
}

impl FileFeatureExtractor for CommandFeatureExtractor {
    fn extract_file(&self, wav_path: &Path) -> Result<Vec<f32>, ExtractionError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(wav_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                let path = self.program.display();
                ExtractionError::Process(format!("failed to spawn extractor at {path}: {e}"))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let status = output.status;
            return Err(ExtractionError::Process(format!(
                "extractor exited with {status}: {}",
                stderr.trim()
            )));
        }

        Self::parse_output(&output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_array() {
        let v = CommandFeatureExtractor::parse_output(b" [1.5, -2, 3e-1]\n").unwrap();
        assert_eq!(v, vec![1.5, -2.0, 0.3]);
    }

    #[test]
    fn rejects_empty_and_malformed_output() {
        assert!(CommandFeatureExtractor::parse_output(b"[]").is_err());
        assert!(CommandFeatureExtractor::parse_output(b"1 2 3").is_err());
    }

    #[test]
    fn missing_program_is_process_error() {
        let ex = CommandFeatureExtractor::new(PathBuf::from("/no/such/extractor"), vec![]);
        let err = ex.extract_file(Path::new("/tmp/x.wav")).unwrap_err();
        assert!(matches!(err, ExtractionError::Process(_)));
    }

    #[cfg(unix)]
    #[test]
    fn runs_program_with_wav_path_argument() {
        // the wav path lands in `$0` of `sh -c` and is ignored
        let ex = CommandFeatureExtractor::new(
            PathBuf::from("sh"),
            vec!["-c".to_owned(), "echo '[0.25, 4]'".to_owned()],
        );
        let v = ex.extract_file(Path::new("/tmp/ignored.wav")).unwrap();
        assert_eq!(v, vec![0.25, 4.0]);
    }
}
