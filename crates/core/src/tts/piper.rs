use crate::audio::encode_wav_i16;
use crate::tts::{SpeechAudio, SpeechSynthesizer, SynthesisError, MIME_WAV};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

const PIPER_SAMPLE_RATE: u32 = 22_050;
const PIPER_CHANNELS: u16 = 1;
const WAV_HEADER_BYTES: usize = 44;

/// Local Piper voice. The binary is spawned per sentence with `--output_raw`
/// and its 16-bit PCM is wrapped into a WAV container.
#[derive(Clone, Debug)]
pub struct PiperSynthesizer {
    piper_binary: PathBuf,
    model_path: PathBuf,
}

impl PiperSynthesizer {
    #[must_use]
    pub fn new(piper_binary: PathBuf, model_path: PathBuf) -> Self {
        Self {
            piper_binary,
            model_path,
        }
    }

    async fn run(&self, sentence: &str) -> Result<Vec<u8>, SynthesisError> {
        let mut child = Command::new(&self.piper_binary)
            .arg("--model")
            .arg(&self.model_path)
            .arg("--output_raw")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                let path = self.piper_binary.display();
                SynthesisError::Other(format!("failed to spawn piper at {path}: {e}"))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(sentence.as_bytes())
                .await
                .map_err(|e| SynthesisError::Other(format!("piper stdin write failed: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| SynthesisError::Other(format!("piper process failed: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let status = output.status;
            return Err(SynthesisError::Other(format!(
                "piper exited with {status}: {}",
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }
}

/// Piper sometimes prefixes its raw stream with a RIFF header; strip it and
/// re-wrap the samples.
fn raw_pcm_to_wav(raw: &[u8]) -> Result<Vec<u8>, SynthesisError> {
    let pcm_bytes = if raw.len() > WAV_HEADER_BYTES && raw.starts_with(b"RIFF") {
        &raw[WAV_HEADER_BYTES..]
    } else {
        raw
    };

    let pcm: Vec<i16> = pcm_bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect();
    if pcm.is_empty() {
        return Err(SynthesisError::Other("piper produced no audio".into()));
    }

    Ok(encode_wav_i16(&pcm, PIPER_CHANNELS, PIPER_SAMPLE_RATE)?)
}

impl SpeechSynthesizer for PiperSynthesizer {
    fn synthesize(&self, sentence: String) -> BoxFuture<'_, Result<SpeechAudio, SynthesisError>> {
        async move {
            let raw = self.run(&sentence).await?;
            let wav = raw_pcm_to_wav(&raw)?;
            tracing::debug!(bytes = wav.len(), "piper synthesized sentence");
            Ok(SpeechAudio::new(wav, MIME_WAV))
        }
        .boxed()
    }
}
