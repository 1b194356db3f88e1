use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_SAMPLE_RATE: u32 = 22_050;
pub const DEFAULT_SCALER_PATH: &str = "models/scaler.json";
pub const DEFAULT_MODEL_PATH: &str = "models/emotion_model.json";
pub const DEFAULT_PIPER_BINARY: &str = "piper";
pub const DEFAULT_CORS_ORIGINS: &str = "*";
pub const ENV_BIND_ADDR: &str = "AAC_BIND";
pub const ENV_SCALER_PATH: &str = "AAC_SCALER_PATH";
pub const ENV_MODEL_PATH: &str = "AAC_MODEL_PATH";
pub const ENV_EXTRACTOR_COMMAND: &str = "AAC_EXTRACTOR_COMMAND";
pub const ENV_TTS_BACKEND: &str = "AAC_TTS_BACKEND";
pub const ENV_PHRASES_PATH: &str = "AAC_PHRASES_PATH";
pub const ENV_CORS_ORIGINS: &str = "AAC_CORS_ORIGINS";
pub const ENV_ELEVENLABS_API_KEY: &str = "ELEVENLABS_API_KEY";
pub const ENV_ELEVENLABS_VOICE_ID: &str = "ELEVENLABS_VOICE_ID";
pub const ENV_PIPER_BINARY: &str = "PIPER_BINARY";
pub const ENV_PIPER_MODEL: &str = "PIPER_MODEL";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SampleRate(u32);

impl SampleRate {
    pub fn new(hz: u32) -> Result<Self, ConfigError> {
        if hz == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        Ok(Self(hz))
    }

    pub fn hz(&self) -> u32 {
        self.0
    }
}

impl Default for SampleRate {
    fn default() -> Self {
        Self(DEFAULT_SAMPLE_RATE)
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new<S: Into<String>>(value: S) -> Result<Self, ConfigError> {
        let v = value.into();
        if v.trim().is_empty() {
            return Err(ConfigError::EmptyApiKey);
        }
        Ok(Self(v))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(**redacted**)")
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelPaths {
    pub scaler: PathBuf,
    pub classifier: PathBuf,
}

impl Default for ModelPaths {
    fn default() -> Self {
        Self {
            scaler: PathBuf::from(DEFAULT_SCALER_PATH),
            classifier: PathBuf::from(DEFAULT_MODEL_PATH),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ExtractorConfig {
    #[default]
    Builtin,
    /// External program invoked with a WAV path; prints a JSON array of floats.
    Command { program: PathBuf, args: Vec<String> },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AudioConfig {
    pub sample_rate: SampleRate,
    /// Run the normalizer before feature extraction on the analyze path.
    pub preprocess: bool,
    /// Retry decoding through ffmpeg when symphonia cannot read the container.
    pub ffmpeg_fallback: bool,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum TtsBackend {
    #[default]
    Unavailable,
    Tone,
    Piper,
    ElevenLabs,
    Fallback,
}

impl std::str::FromStr for TtsBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unavailable" | "none" => Ok(Self::Unavailable),
            "tone" => Ok(Self::Tone),
            "piper" => Ok(Self::Piper),
            "elevenlabs" => Ok(Self::ElevenLabs),
            "fallback" => Ok(Self::Fallback),
            other => Err(ConfigError::UnknownTtsBackend(other.to_owned())),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PiperConfig {
    pub binary: PathBuf,
    pub model: Option<PathBuf>,
}

impl Default for PiperConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_PIPER_BINARY),
            model: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TtsConfig {
    pub backend: TtsBackend,
    pub elevenlabs_api_key: Option<ApiKey>,
    /// Overrides the stock ElevenLabs voice.
    pub elevenlabs_voice_id: Option<String>,
    pub piper: PiperConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: String,
    pub models: ModelPaths,
    pub audio: AudioConfig,
    pub extractor: ExtractorConfig,
    pub tts: TtsConfig,
    pub phrases_path: Option<PathBuf>,
    pub cors_origins: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_owned(),
            models: ModelPaths::default(),
            audio: AudioConfig::default(),
            extractor: ExtractorConfig::default(),
            tts: TtsConfig::default(),
            phrases_path: None,
            cors_origins: DEFAULT_CORS_ORIGINS.to_owned(),
        }
    }
}

impl TtsConfig {
    /// Checks that the selected backend has what it needs to start.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let needs_key = matches!(self.backend, TtsBackend::ElevenLabs | TtsBackend::Fallback);
        if needs_key && self.elevenlabs_api_key.is_none() {
            return Err(ConfigError::MissingElevenLabsKey);
        }
        let needs_piper = matches!(self.backend, TtsBackend::Piper | TtsBackend::Fallback);
        if needs_piper && self.piper.model.is_none() {
            return Err(ConfigError::MissingPiperModel);
        }
        Ok(())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("sample rate must be > 0 Hz")]
    ZeroSampleRate,
    #[error("api key must not be empty")]
    EmptyApiKey,
    #[error("unknown tts backend: {0}")]
    UnknownTtsBackend(String),
    #[error("elevenlabs backend requires an api key")]
    MissingElevenLabsKey,
    #[error("piper backend requires a voice model path")]
    MissingPiperModel,
    #[error("command extractor requires a program")]
    MissingExtractorCommand,
}

pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StdEnv;

impl Env for StdEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapEnv {
    vars: std::collections::BTreeMap<String, String>,
}

impl MapEnv {
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl Env for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn resolve_api_key(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
) -> Result<Option<ApiKey>, ConfigError> {
    match cli_value {
        Some(v) => Ok(Some(ApiKey::new(v)?)),
        None => match env.var(env_key) {
            Some(v) => Ok(Some(ApiKey::new(v)?)),
            None => Ok(None),
        },
    }
}

pub fn resolve_string_with_default(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
    default: &str,
) -> String {
    match cli_value {
        Some(v) => v,
        None => env.var(env_key).unwrap_or_else(|| default.to_owned()),
    }
}

pub fn resolve_optional_string(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
) -> Option<String> {
    match cli_value {
        Some(v) => Some(v),
        None => env.var(env_key),
    }
}

pub fn resolve_path_with_default(
    cli_value: Option<PathBuf>,
    env_key: &str,
    env: &impl Env,
    default: &str,
) -> PathBuf {
    match cli_value {
        Some(v) => v,
        None => env
            .var(env_key)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(default)),
    }
}

/// Splits an extractor command line such as `python extract.py --mfcc` into
/// program and arguments.
pub fn parse_extractor_command(command: &str) -> Result<ExtractorConfig, ConfigError> {
    let mut parts = command.split_whitespace();
    let program = parts.next().ok_or(ConfigError::MissingExtractorCommand)?;
    Ok(ExtractorConfig::Command {
        program: PathBuf::from(program),
        args: parts.map(str::to_owned).collect(),
    })
}
