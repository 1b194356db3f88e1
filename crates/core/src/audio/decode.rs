use crate::audio::DecodedAudio;
use std::io::{Cursor, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

const LOG_TARGET: &str = "audio::decode";

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported audio format: {0}")]
    Unsupported(String),

    #[error("no decodable audio track")]
    NoTrack,

    #[error("corrupt audio stream: {0}")]
    Corrupt(String),

    #[error("audio contains no samples")]
    Empty,

    #[error("ffmpeg unavailable: {0}")]
    FfmpegUnavailable(String),

    #[error("ffmpeg failed: {0}")]
    FfmpegFailed(String),

    #[error("invalid pcm output: {0}")]
    InvalidPcm(String),
}

pub type Result<T> = std::result::Result<T, DecodeError>;

impl From<SymphoniaError> for DecodeError {
    fn from(e: SymphoniaError) -> Self {
        match e {
            SymphoniaError::IoError(io) => DecodeError::Io(io),
            SymphoniaError::Unsupported(what) => DecodeError::Unsupported(what.to_owned()),
            other => DecodeError::Corrupt(other.to_string()),
        }
    }
}

/// Decodes an in-memory clip at its native rate and channel layout.
pub fn decode_bytes(bytes: &[u8]) -> Result<DecodedAudio> {
    let source = Box::new(Cursor::new(bytes.to_vec()));
    let mss = MediaSourceStream::new(source, Default::default());
    decode_stream(mss, &Hint::new())
}

pub fn decode_file(path: &Path) -> Result<DecodedAudio> {
    let file = std::fs::File::open(path)?;
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    decode_stream(mss, &hint)
}

fn decode_stream(mss: MediaSourceStream, hint: &Hint) -> Result<DecodedAudio> {
    let probed = symphonia::default::get_probe().format(
        hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoTrack)?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count() as u16;
                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::warn!(target: LOG_TARGET, error = %e, "skipping undecodable packet");
            }
            Err(e) => return Err(e.into()),
        }
    }

    if samples.is_empty() || sample_rate == 0 || channels == 0 {
        return Err(DecodeError::Empty);
    }

    Ok(DecodedAudio {
        samples,
        channels,
        sample_rate,
    })
}

/// Symphonia first, optionally ffmpeg for containers it cannot read (webm/opus
/// from browser recorders).
#[derive(Clone, Debug, Default)]
pub struct AudioDecoder {
    ffmpeg_fallback: bool,
    fallback_rate: u32,
    ffmpeg_program: Option<PathBuf>,
}

impl AudioDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// ffmpeg output is resampled to `sample_rate` mono.
    pub fn with_ffmpeg_fallback(mut self, sample_rate: u32) -> Self {
        self.ffmpeg_fallback = true;
        self.fallback_rate = sample_rate;
        self
    }

    /// Runs `program` instead of the sidecar-managed ffmpeg binary.
    pub fn with_ffmpeg_program(mut self, program: PathBuf) -> Self {
        self.ffmpeg_program = Some(program);
        self
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<DecodedAudio> {
        match decode_bytes(bytes) {
            Ok(audio) => Ok(audio),
            Err(e @ (DecodeError::Unsupported(_) | DecodeError::NoTrack))
                if self.ffmpeg_fallback =>
            {
                tracing::debug!(target: LOG_TARGET, error = %e, "symphonia rejected input, trying ffmpeg");
                self.decode_with_ffmpeg(bytes)
            }
            Err(e) => Err(e),
        }
    }

    fn decode_with_ffmpeg(&self, bytes: &[u8]) -> Result<DecodedAudio> {
        let program = match &self.ffmpeg_program {
            Some(program) => program.clone(),
            None => sidecar_ffmpeg()?,
        };
        let raw = run_ffmpeg(&program, bytes, self.fallback_rate)?;
        let samples = parse_f32le(&raw)?;
        if samples.is_empty() {
            return Err(DecodeError::Empty);
        }
        Ok(DecodedAudio {
            samples,
            channels: 1,
            sample_rate: self.fallback_rate,
        })
    }
}

#[cfg(feature = "ffmpeg-sidecar")]
fn sidecar_ffmpeg() -> Result<PathBuf> {
    ffmpeg_sidecar::download::auto_download()
        .map_err(|e| DecodeError::FfmpegUnavailable(e.to_string()))?;
    Ok(ffmpeg_sidecar::paths::ffmpeg_path())
}

#[cfg(not(feature = "ffmpeg-sidecar"))]
fn sidecar_ffmpeg() -> Result<PathBuf> {
    Err(DecodeError::FfmpegUnavailable(
        "built without the ffmpeg-sidecar feature".to_owned(),
    ))
}

/// Pipes `input` through ffmpeg and returns its f32le mono stdout. stdin,
/// stdout and stderr are serviced concurrently so a chatty stderr cannot
/// stall the pipe.
fn run_ffmpeg(program: &Path, input: &[u8], sample_rate: u32) -> Result<Vec<u8>> {
    let rate = sample_rate.to_string();
    let mut child = Command::new(program)
        .args([
            "-hide_banner",
            "-nostdin",
            "-loglevel",
            "error",
            "-i",
            "pipe:0",
            "-vn",
            "-sn",
            "-dn",
            "-ac",
            "1",
            "-ar",
            rate.as_str(),
            "-f",
            "f32le",
            "-acodec",
            "pcm_f32le",
            "pipe:1",
        ])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| DecodeError::FfmpegFailed(format!("{}: {e}", program.display())))?;

    let mut stdin = child.stdin.take().ok_or_else(|| {
        DecodeError::FfmpegFailed("ffmpeg stdin unavailable (pipe not created)".to_owned())
    })?;
    let mut stdout = child.stdout.take().ok_or_else(|| {
        DecodeError::FfmpegFailed("ffmpeg stdout unavailable (pipe not created)".to_owned())
    })?;
    let mut stderr = child.stderr.take().ok_or_else(|| {
        DecodeError::FfmpegFailed("ffmpeg stderr unavailable (pipe not created)".to_owned())
    })?;

    let input = input.to_vec();
    let stdin_task = thread::spawn(move || stdin.write_all(&input));
    let stderr_task = thread::spawn(move || {
        let mut buf = Vec::new();
        stderr.read_to_end(&mut buf).map(|_| buf)
    });

    let mut stdout_bytes = Vec::new();
    let stdout_read = stdout.read_to_end(&mut stdout_bytes);

    let status = child
        .wait()
        .map_err(|e| DecodeError::FfmpegFailed(e.to_string()))?;
    let stderr_bytes = stderr_task
        .join()
        .map_err(|_| DecodeError::FfmpegFailed("ffmpeg stderr reader panicked".to_owned()))?
        .map_err(|e| DecodeError::FfmpegFailed(e.to_string()))?;
    let written = stdin_task
        .join()
        .map_err(|_| DecodeError::FfmpegFailed("ffmpeg stdin writer panicked".to_owned()))?;

    // An early exit breaks the stdin pipe; the exit status and stderr say why.
    if !status.success() {
        let stderr_s = String::from_utf8_lossy(&stderr_bytes).trim().to_owned();
        return Err(DecodeError::FfmpegFailed(format!(
            "exit_code={:?} stderr={stderr_s}",
            status.code()
        )));
    }
    if let Err(e) = written {
        if e.kind() != ErrorKind::BrokenPipe {
            return Err(e.into());
        }
    }
    stdout_read?;
    Ok(stdout_bytes)
}

fn parse_f32le(raw: &[u8]) -> Result<Vec<f32>> {
    if raw.len() % 4 != 0 {
        return Err(DecodeError::InvalidPcm(format!(
            "f32le byte length must be multiple of 4, got {}",
            raw.len()
        )));
    }
    Ok(raw
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::encode_wav_i16;

    #[test]
    fn decodes_stereo_wav_at_native_rate() {
        let frames: Vec<i16> = (0..800).flat_map(|i| [i as i16, -(i as i16)]).collect();
        let wav = encode_wav_i16(&frames, 2, 8_000).expect("encode");

        let audio = decode_bytes(&wav).expect("decode");
        assert_eq!(audio.sample_rate, 8_000);
        assert_eq!(audio.channels, 2);
        assert_eq!(audio.samples.len(), 1_600);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let err = decode_bytes(b"definitely not audio").unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Unsupported(_) | DecodeError::Corrupt(_) | DecodeError::Io(_)
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = decode_file(Path::new("/nonexistent/clip.wav")).unwrap_err();
        assert!(matches!(err, DecodeError::Io(_)));
    }

    #[test]
    fn parse_f32le_rejects_non_multiple_of_4() {
        let err = parse_f32le(&[0, 1, 2]).unwrap_err();
        assert!(err.to_string().contains("multiple of 4"));
    }

    #[test]
    fn decoder_without_fallback_propagates_error() {
        let decoder = AudioDecoder::new();
        assert!(decoder.decode(b"RIFF....junk").is_err());
    }

    #[cfg(unix)]
    fn stub_ffmpeg(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("ffmpeg");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Decodes on a worker so a stalled pipe fails the test instead of hanging it.
    #[cfg(unix)]
    fn decode_with_deadline(decoder: AudioDecoder, bytes: Vec<u8>) -> Result<DecodedAudio> {
        let (tx, rx) = std::sync::mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(decoder.decode(&bytes));
        });
        rx.recv_timeout(std::time::Duration::from_secs(30))
            .expect("ffmpeg decode did not finish")
    }

    /// EBML magic: a webm/matroska container symphonia is not built to read.
    #[cfg(unix)]
    fn webm_clip(len: usize) -> Vec<u8> {
        let mut clip = vec![0x1A, 0x45, 0xDF, 0xA3];
        clip.resize(len, 0x42);
        clip
    }

    #[cfg(unix)]
    #[test]
    fn ffmpeg_fallback_survives_noisy_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let program = stub_ffmpeg(
            dir.path(),
            "cat > /dev/null\nhead -c 200000 /dev/zero | tr '\\000' 'x' >&2\nhead -c 400 /dev/zero",
        );
        let decoder = AudioDecoder::new()
            .with_ffmpeg_fallback(22_050)
            .with_ffmpeg_program(program);

        let audio = decode_with_deadline(decoder, webm_clip(4 * 1024 * 1024)).unwrap();
        assert_eq!(audio.sample_rate, 22_050);
        assert_eq!(audio.channels, 1);
        assert_eq!(audio.samples.len(), 100);
    }

    #[cfg(unix)]
    #[test]
    fn ffmpeg_early_exit_reports_status_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let program = stub_ffmpeg(
            dir.path(),
            "echo 'Invalid data found when processing input' >&2\nexit 1",
        );
        let decoder = AudioDecoder::new()
            .with_ffmpeg_fallback(16_000)
            .with_ffmpeg_program(program);

        let err = decode_with_deadline(decoder, webm_clip(4 * 1024 * 1024)).unwrap_err();
        match err {
            DecodeError::FfmpegFailed(msg) => {
                assert!(msg.contains("exit_code=Some(1)"), "{msg}");
                assert!(msg.contains("Invalid data found"), "{msg}");
            }
            other => panic!("expected FfmpegFailed, got {other:?}"),
        }
    }
}
