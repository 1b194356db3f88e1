use aac_voice_core::api::{router, AnalyzeResponse, AppState};
use aac_voice_core::audio::{write_wav_f32, AudioDecoder, AudioNormalizer, AudioSource};
use aac_voice_core::compose::{PhraseTable, SentenceComposer};
use aac_voice_core::config::{
    parse_extractor_command, resolve_api_key, resolve_optional_string, resolve_path_with_default,
    resolve_string_with_default, AppConfig, AudioConfig, ConfigError, Env, ExtractorConfig,
    ModelPaths, PiperConfig, SampleRate, StdEnv, TtsBackend, TtsConfig, DEFAULT_BIND_ADDR,
    DEFAULT_CORS_ORIGINS, DEFAULT_MODEL_PATH, DEFAULT_PIPER_BINARY, DEFAULT_SAMPLE_RATE,
    DEFAULT_SCALER_PATH, ENV_BIND_ADDR, ENV_CORS_ORIGINS, ENV_ELEVENLABS_API_KEY,
    ENV_ELEVENLABS_VOICE_ID,
    ENV_EXTRACTOR_COMMAND, ENV_MODEL_PATH, ENV_PHRASES_PATH, ENV_PIPER_BINARY, ENV_PIPER_MODEL,
    ENV_SCALER_PATH, ENV_TTS_BACKEND,
};
use aac_voice_core::emotion::EmotionClassifier;
use aac_voice_core::tts::{build_synthesizer, SpeechSynthesizer};
use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "aac-voice")]
#[command(about = "Emotion-aware AAC voice service (classify -> compose -> speak)")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    #[arg(long, global = true)]
    bind: Option<String>,

    #[arg(long, global = true)]
    scaler_path: Option<PathBuf>,

    #[arg(long, global = true)]
    model_path: Option<PathBuf>,

    #[arg(long, global = true, default_value_t = DEFAULT_SAMPLE_RATE)]
    sample_rate: u32,

    /// Resample, trim and high-pass clips before feature extraction.
    #[arg(long, global = true)]
    preprocess: bool,

    #[arg(long, global = true, value_enum, default_value_t = ExtractorKind::Builtin)]
    extractor: ExtractorKind,

    /// Program and arguments; the WAV path is appended.
    #[arg(long, global = true)]
    extractor_command: Option<String>,

    /// unavailable | tone | piper | elevenlabs | fallback
    #[arg(long, global = true)]
    tts: Option<String>,

    #[arg(long, global = true)]
    elevenlabs_api_key: Option<String>,

    #[arg(long, global = true)]
    elevenlabs_voice_id: Option<String>,

    #[arg(long, global = true)]
    piper_binary: Option<PathBuf>,

    #[arg(long, global = true)]
    piper_model: Option<PathBuf>,

    /// JSON object of extra `{ "icon id": "phrase" }` entries.
    #[arg(long, global = true)]
    phrases: Option<PathBuf>,

    #[arg(long, global = true)]
    cors_origins: Option<String>,

    /// Decode unsupported containers (webm, opus) through ffmpeg.
    #[arg(long, global = true)]
    ffmpeg_fallback: bool,

    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Run the HTTP service (default).
    Serve,
    /// Classify one audio file and print the result as JSON.
    Analyze { file: PathBuf },
    /// Print the composed sentence; with --out, also synthesize it.
    Compose {
        #[arg(long)]
        emotion: String,
        #[arg(long = "choice")]
        choices: Vec<String>,
        #[arg(long, short)]
        out: Option<PathBuf>,
    },
    /// Normalize an audio file into a mono float WAV at the target rate.
    Normalize { input: PathBuf, output: PathBuf },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ExtractorKind {
    Builtin,
    Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let command = args.command.clone().unwrap_or(Command::Serve);
    let env = StdEnv;
    let cfg = build_config(args, &env)?;

    tracing::debug!(?cfg, "config loaded");

    match command {
        Command::Serve => serve(cfg).await,
        Command::Analyze { file } => analyze(&cfg, file).await,
        Command::Compose {
            emotion,
            choices,
            out,
        } => compose(&cfg, &emotion, &choices, out).await,
        Command::Normalize { input, output } => normalize(&cfg, input, output),
    }
}

async fn serve(cfg: AppConfig) -> anyhow::Result<()> {
    let state = AppState::from_config(&cfg).context("failed to initialize service")?;
    let app = router(Arc::new(state), &cfg.cors_origins);

    let listener = TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.bind_addr))?;
    tracing::info!(addr = %cfg.bind_addr, tts = ?cfg.tts.backend, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn analyze(cfg: &AppConfig, file: PathBuf) -> anyhow::Result<()> {
    let classifier = EmotionClassifier::from_config(cfg)?;
    let audio = tokio::fs::read(&file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let prediction = tokio::task::spawn_blocking(move || classifier.classify(&audio)).await??;

    let response = AnalyzeResponse {
        emotion: prediction.simplified(),
        raw_emotion: prediction.raw_label,
        confidence: prediction.confidence,
    };
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn compose(
    cfg: &AppConfig,
    emotion: &str,
    choices: &[String],
    out: Option<PathBuf>,
) -> anyhow::Result<()> {
    let table = match &cfg.phrases_path {
        Some(path) => PhraseTable::default().load_overrides(path)?,
        None => PhraseTable::default(),
    };
    let sentence = SentenceComposer::new(table).compose(emotion, choices);
    println!("{sentence}");

    if let Some(out) = out {
        let synthesizer = build_synthesizer(&cfg.tts)?;
        let audio = synthesizer.synthesize(sentence).await?;
        tokio::fs::write(&out, &audio.bytes)
            .await
            .with_context(|| format!("failed to write {}", out.display()))?;
        tracing::info!(path = %out.display(), mime = %audio.mime_type, bytes = audio.bytes.len(), "wrote speech");
    }
    Ok(())
}

fn normalize(cfg: &AppConfig, input: PathBuf, output: PathBuf) -> anyhow::Result<()> {
    let rate = cfg.audio.sample_rate;
    let mut normalizer = AudioNormalizer::new(rate);
    if cfg.audio.ffmpeg_fallback {
        normalizer = normalizer.with_decoder(AudioDecoder::new().with_ffmpeg_fallback(rate.hz()));
    }
    let waveform = normalizer.normalize_and_trim(&AudioSource::from(input.clone()));
    if waveform.is_empty() {
        anyhow::bail!("no usable audio in {}", input.display());
    }
    write_wav_f32(&output, &waveform.samples, waveform.sample_rate)?;
    tracing::info!(
        path = %output.display(),
        seconds = waveform.duration().as_secs_f32(),
        "wrote normalized audio"
    );
    Ok(())
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            level
                .parse()
                .with_context(|| format!("invalid --log-level: {level}"))?,
        )
        .from_env_lossy();

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn build_config(args: Args, env: &impl Env) -> anyhow::Result<AppConfig> {
    let extractor = match args.extractor {
        ExtractorKind::Builtin => ExtractorConfig::Builtin,
        ExtractorKind::Command => {
            let command =
                resolve_optional_string(args.extractor_command, ENV_EXTRACTOR_COMMAND, env)
                    .ok_or(ConfigError::MissingExtractorCommand)?;
            parse_extractor_command(&command)?
        }
    };

    let backend = match resolve_optional_string(args.tts, ENV_TTS_BACKEND, env) {
        Some(name) => name.parse::<TtsBackend>()?,
        None => TtsBackend::default(),
    };

    let tts = TtsConfig {
        backend,
        elevenlabs_api_key: resolve_api_key(
            args.elevenlabs_api_key,
            ENV_ELEVENLABS_API_KEY,
            env,
        )?,
        elevenlabs_voice_id: resolve_optional_string(
            args.elevenlabs_voice_id,
            ENV_ELEVENLABS_VOICE_ID,
            env,
        ),
        piper: PiperConfig {
            binary: resolve_path_with_default(
                args.piper_binary,
                ENV_PIPER_BINARY,
                env,
                DEFAULT_PIPER_BINARY,
            ),
            model: args
                .piper_model
                .or_else(|| env.var(ENV_PIPER_MODEL).map(PathBuf::from)),
        },
    };
    tts.validate()?;

    Ok(AppConfig {
        bind_addr: resolve_string_with_default(args.bind, ENV_BIND_ADDR, env, DEFAULT_BIND_ADDR),
        models: ModelPaths {
            scaler: resolve_path_with_default(
                args.scaler_path,
                ENV_SCALER_PATH,
                env,
                DEFAULT_SCALER_PATH,
            ),
            classifier: resolve_path_with_default(
                args.model_path,
                ENV_MODEL_PATH,
                env,
                DEFAULT_MODEL_PATH,
            ),
        },
        audio: AudioConfig {
            sample_rate: SampleRate::new(args.sample_rate)?,
            preprocess: args.preprocess,
            ffmpeg_fallback: args.ffmpeg_fallback,
        },
        extractor,
        tts,
        phrases_path: args
            .phrases
            .or_else(|| env.var(ENV_PHRASES_PATH).map(PathBuf::from)),
        cors_origins: resolve_string_with_default(
            args.cors_origins,
            ENV_CORS_ORIGINS,
            env,
            DEFAULT_CORS_ORIGINS,
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use aac_voice_core::config::MapEnv;

    fn parse(argv: &[&str]) -> Args {
        Args::parse_from(std::iter::once("aac-voice").chain(argv.iter().copied()))
    }

    #[test]
    fn defaults_without_flags_or_env() {
        let cfg = build_config(parse(&[]), &MapEnv::default()).unwrap();
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn flags_beat_env() {
        let env = MapEnv::default()
            .with_var(ENV_BIND_ADDR, "127.0.0.1:9000")
            .with_var(ENV_TTS_BACKEND, "piper")
            .with_var(ENV_PIPER_MODEL, "voices/amy.onnx");
        let cfg = build_config(parse(&["--bind", "127.0.0.1:7000", "--tts", "tone"]), &env).unwrap();
        assert_eq!(cfg.bind_addr, "127.0.0.1:7000");
        assert_eq!(cfg.tts.backend, TtsBackend::Tone);
    }

    #[test]
    fn env_fills_missing_flags() {
        let env = MapEnv::default()
            .with_var(ENV_MODEL_PATH, "/srv/models/m.json")
            .with_var(ENV_EXTRACTOR_COMMAND, "python3 extract.py --mfcc")
            .with_var(ENV_CORS_ORIGINS, "http://localhost:3000");
        let cfg = build_config(parse(&["--extractor", "command"]), &env).unwrap();
        assert_eq!(cfg.models.classifier, PathBuf::from("/srv/models/m.json"));
        assert_eq!(cfg.cors_origins, "http://localhost:3000");
        assert_eq!(cfg.tts.elevenlabs_voice_id, None);
        assert_eq!(
            cfg.extractor,
            ExtractorConfig::Command {
                program: PathBuf::from("python3"),
                args: vec!["extract.py".to_owned(), "--mfcc".to_owned()],
            }
        );
    }

    #[test]
    fn elevenlabs_voice_comes_from_flag_or_env() {
        let env = MapEnv::default()
            .with_var(ENV_ELEVENLABS_API_KEY, "k")
            .with_var(ENV_ELEVENLABS_VOICE_ID, "env-voice");
        let cfg = build_config(parse(&["--tts", "elevenlabs"]), &env).unwrap();
        assert_eq!(cfg.tts.elevenlabs_voice_id.as_deref(), Some("env-voice"));

        let cfg = build_config(
            parse(&["--tts", "elevenlabs", "--elevenlabs-voice-id", "flag-voice"]),
            &env,
        )
        .unwrap();
        assert_eq!(cfg.tts.elevenlabs_voice_id.as_deref(), Some("flag-voice"));
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let env = MapEnv::default();
        assert!(build_config(parse(&["--sample-rate", "0"]), &env).is_err());
        assert!(build_config(parse(&["--tts", "robot"]), &env).is_err());
        assert!(build_config(parse(&["--tts", "elevenlabs"]), &env).is_err());
        assert!(build_config(parse(&["--extractor", "command"]), &env).is_err());
    }

    #[test]
    fn subcommand_options_parse_after_the_subcommand() {
        let args = parse(&[
            "compose",
            "--emotion",
            "happy",
            "--choice",
            "pizza",
            "--choice",
            "park",
            "--tts",
            "tone",
        ]);
        assert_eq!(args.tts.as_deref(), Some("tone"));
        assert_eq!(
            args.command,
            Some(Command::Compose {
                emotion: "happy".into(),
                choices: vec!["pizza".into(), "park".into()],
                out: None,
            })
        );
    }
}
