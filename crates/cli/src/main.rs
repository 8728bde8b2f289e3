#![deny(warnings)]

mod repl;

use anyhow::Context;
use bytes::Bytes;
use clap::Parser;
use repl::Command;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use voice_assistant_core::asr::{OpenAiTranscriber, SherpaOnnxTranscriber, Transcriber};
use voice_assistant_core::assistant::{Action, Assistant, Outcome};
use voice_assistant_core::audio::WorkDir;
use voice_assistant_core::capture::{AudioCapture, MicrophoneCapture};
use voice_assistant_core::config::{
    resolve_api_key, resolve_base_url, resolve_parsed_with_default, resolve_string_with_default,
    ApiKey, ApiKeys, AppConfig, AsrBackendKind, AsrConfig, Env, LanguageCode, LlmConfig,
    RecordingDuration, SampleRate, SherpaConfig, StdEnv, TtsBackendKind, DEFAULT_ASR_MODEL_DIR,
    DEFAULT_LLM_MODEL, DEFAULT_LLM_TEMPERATURE, DEFAULT_RECORDING_SECS, DEFAULT_SAMPLE_RATE_HZ,
    DEFAULT_SHERPA_ONNX_BIN, DEFAULT_TTS_LANG, ENV_ASR_MODEL_DIR, ENV_LLM_MODEL,
    ENV_LLM_TEMPERATURE, ENV_OPENAI_API_KEY, ENV_OPENAI_BASE_URL, ENV_SAMPLE_RATE,
    ENV_SHERPA_ONNX_BIN, ENV_TTS_LANG,
};
#[cfg(feature = "ffmpeg-sidecar")]
use voice_assistant_core::decode::FfmpegAudioDecoder;
use voice_assistant_core::llm::{GenerationError, OpenAiChatClient};
use voice_assistant_core::playback::{AudioPlaybackSink, NullPlaybackSink, PlaybackSink};
use voice_assistant_core::profile::Mode;
use voice_assistant_core::session::SessionState;
use voice_assistant_core::tts::{
    FallbackSynthesizer, GoogleTranslateTts, OpenAiTts, SpeechSynthesizer,
};
use voice_assistant_core::turn::{TurnConfig, TurnOrchestrator};
use voice_assistant_core::util::RetryConfig;

#[derive(Parser, Debug)]
#[command(name = "voice-assistant")]
#[command(about = "Voice chat assistant for customer service and lead generation (ASR->LLM->TTS)")]
struct Args {
    #[arg(long)]
    openai_api_key: Option<String>,

    #[arg(long)]
    openai_base_url: Option<String>,

    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    temperature: Option<f32>,

    /// Cap on reply length in tokens; unset leaves it to the model.
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Attempts per chat request, counting the first one.
    #[arg(long, default_value_t = 3)]
    llm_attempts: u32,

    #[arg(long)]
    sample_rate: Option<u32>,

    #[arg(long, default_value_t = DEFAULT_RECORDING_SECS)]
    duration: u8,

    #[arg(long, default_value = "customer_service")]
    mode: String,

    #[arg(long)]
    tts_lang: Option<String>,

    /// google | openai (openai falls back to google when its quota runs out)
    #[arg(long, default_value = "google")]
    tts_backend: String,

    #[arg(long, default_value = "alloy")]
    tts_voice: String,

    #[arg(long, default_value = "tts-1")]
    tts_model: String,

    /// openai speech rate, clamped to 0.25..=4.0
    #[arg(long, default_value_t = 1.0)]
    tts_speed: f32,

    /// openai | sherpa
    #[arg(long, default_value = "openai")]
    asr_backend: String,

    #[arg(long, default_value = "whisper-1")]
    asr_model: String,

    /// ISO-639-1 hint for the openai transcriber; unset lets it detect.
    #[arg(long)]
    asr_language: Option<String>,

    #[arg(long)]
    sherpa_bin: Option<String>,

    #[arg(long)]
    asr_model_dir: Option<String>,

    #[arg(long)]
    input_device: Option<String>,

    #[arg(long)]
    output_device: Option<String>,

    #[arg(long)]
    no_playback: bool,

    /// Send a one-token request at startup to check the API key and quota.
    #[arg(long)]
    check_api: bool,

    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let mode: Mode = args.mode.parse()?;
    let check_api = args.check_api;
    let backends = BackendOptions::from_args(&args);
    let playback = build_playback(args.no_playback, args.output_device.clone());

    let env = StdEnv;
    let cfg = build_config(args, &env)?;

    tracing::info!(
        model = %cfg.llm.model,
        sample_rate_hz = cfg.sample_rate.hz(),
        tts_lang = %cfg.tts_lang,
        tts_backend = ?cfg.tts_backend,
        asr_backend = ?cfg.asr.backend,
        "config loaded"
    );

    run(cfg, mode, check_api, backends, playback).await
}

/// Per-backend knobs that are not part of [`AppConfig`].
#[derive(Clone, Debug, PartialEq)]
struct BackendOptions {
    max_tokens: Option<u32>,
    llm_attempts: u32,
    tts_voice: String,
    tts_model: String,
    tts_speed: f32,
    asr_model: String,
    asr_language: Option<String>,
    input_device: Option<String>,
}

impl BackendOptions {
    fn from_args(args: &Args) -> Self {
        Self {
            max_tokens: args.max_tokens,
            llm_attempts: args.llm_attempts,
            tts_voice: args.tts_voice.clone(),
            tts_model: args.tts_model.clone(),
            tts_speed: args.tts_speed,
            asr_model: args.asr_model.clone(),
            asr_language: args.asr_language.clone(),
            input_device: args.input_device.clone(),
        }
    }

    fn retry(&self) -> RetryConfig {
        RetryConfig::new(self.llm_attempts, Duration::from_millis(500))
    }
}

fn build_chat_client(
    cfg: &AppConfig,
    api_key: ApiKey,
    opts: &BackendOptions,
) -> OpenAiChatClient {
    let client = OpenAiChatClient::new(api_key, cfg.openai_base_url.clone(), cfg.llm.clone())
        .with_retry(opts.retry());
    match opts.max_tokens {
        Some(max) => client.with_max_tokens(max),
        None => client,
    }
}

fn build_capture(cfg: &AppConfig, opts: &BackendOptions) -> MicrophoneCapture {
    let mic = MicrophoneCapture::new(cfg.sample_rate);
    match opts.input_device.as_deref() {
        Some(name) => mic.with_input_device_name(name),
        None => mic,
    }
}

async fn run(
    cfg: AppConfig,
    mode: Mode,
    check_api: bool,
    opts: BackendOptions,
    playback: Arc<dyn PlaybackSink>,
) -> anyhow::Result<()> {
    let api_key = cfg
        .api_keys
        .openai
        .clone()
        .with_context(|| format!("please set {ENV_OPENAI_API_KEY} in .env or pass --openai-api-key"))?;

    let chat = Arc::new(build_chat_client(&cfg, api_key.clone(), &opts));

    if check_api {
        match chat.verify().await {
            Ok(()) => tracing::info!(model = chat.model(), "api key verified"),
            Err(GenerationError::QuotaExceeded(details)) => anyhow::bail!(
                "API quota exceeded. Please check your OpenAI plan and billing details ({details})"
            ),
            Err(e) => return Err(e).context("API verification error"),
        }
    }

    let workdir = Arc::new(WorkDir::new().context("failed to create working directory")?);

    let transcriber: Arc<dyn Transcriber> = match cfg.asr.backend {
        AsrBackendKind::OpenAi => {
            let asr = OpenAiTranscriber::new(api_key.clone(), cfg.openai_base_url.clone())
                .with_model(opts.asr_model.clone());
            match opts.asr_language.clone() {
                Some(lang) => Arc::new(asr.with_language(lang)),
                None => Arc::new(asr),
            }
        }
        AsrBackendKind::SherpaOnnx => {
            let sherpa = SherpaOnnxTranscriber::new(cfg.asr.sherpa.clone(), workdir.clone());
            #[cfg(feature = "ffmpeg-sidecar")]
            let sherpa = sherpa.with_decoder(Arc::new(FfmpegAudioDecoder::new()));
            Arc::new(sherpa)
        }
    };

    let synthesizer: Arc<dyn SpeechSynthesizer> = match cfg.tts_backend {
        TtsBackendKind::Google => Arc::new(GoogleTranslateTts::new()),
        TtsBackendKind::OpenAi => Arc::new(FallbackSynthesizer::new(
            OpenAiTts::new(api_key, cfg.openai_base_url.clone())
                .with_model(opts.tts_model.clone())
                .with_voice(opts.tts_voice.clone())
                .with_speed(opts.tts_speed),
            GoogleTranslateTts::new(),
        )),
    };

    let capture: Arc<dyn AudioCapture> = Arc::new(build_capture(&cfg, &opts));

    let orchestrator = TurnOrchestrator::new(
        capture,
        transcriber,
        chat,
        synthesizer,
        TurnConfig::from_app(&cfg),
    );
    let mut assistant = Assistant::new(
        orchestrator,
        SessionState::new(mode, cfg.recording_duration),
    );

    println!("Intelligent voice chat assistant ({}).", mode.label());
    println!("{}", repl::HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().context("failed to flush stdout")?;

        let Some(line) = lines.next_line().await.context("failed to read stdin")? else {
            break;
        };

        let action = match repl::parse_line(&line) {
            Ok(Command::Dispatch(action)) => action,
            Ok(Command::Upload(path)) => match read_upload(&path).await {
                Ok(action) => action,
                Err(e) => {
                    eprintln!("[error] {e:#}");
                    continue;
                }
            },
            Ok(Command::Help) => {
                println!("{}", repl::HELP);
                continue;
            }
            Ok(Command::Quit) => break,
            Ok(Command::Nothing) => continue,
            Err(usage) => {
                eprintln!("[error] {usage}");
                continue;
            }
        };

        if action == Action::StartRecording {
            println!(
                "Recording for {}s...",
                assistant.session().recording_duration().secs()
            );
        }

        let outcome = assistant.dispatch(action).await;
        match &outcome {
            Outcome::Notice(_) => eprintln!("{}", repl::render(&outcome)),
            _ => println!("{}", repl::render(&outcome)),
        }

        if let Outcome::Reply(result) = outcome {
            if let Some(audio) = result.reply_audio {
                if let Err(e) = playback.play(audio).await {
                    tracing::warn!(error = %e, "playback failed");
                }
            }
        }
    }

    tracing::info!(
        messages = assistant.session().history().len(),
        "session ended"
    );
    Ok(())
}

async fn read_upload(path: &Path) -> anyhow::Result<Action> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_owned();
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(Action::UploadAudio {
        bytes: Bytes::from(bytes),
        extension,
    })
}

fn build_playback(disabled: bool, output_device: Option<String>) -> Arc<dyn PlaybackSink> {
    if disabled {
        return Arc::new(NullPlaybackSink::new());
    }
    match output_device {
        Some(name) => Arc::new(AudioPlaybackSink::new().with_output_device_name(name)),
        None => Arc::new(AudioPlaybackSink::new()),
    }
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            level
                .parse()
                .with_context(|| format!("invalid --log-level: {level}"))?,
        )
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn build_config(args: Args, env: &impl Env) -> anyhow::Result<AppConfig> {
    let openai = resolve_api_key(args.openai_api_key, ENV_OPENAI_API_KEY, env)?;
    let openai_base_url = resolve_base_url(args.openai_base_url, ENV_OPENAI_BASE_URL, env)?;

    let llm = LlmConfig {
        model: resolve_string_with_default(args.model, ENV_LLM_MODEL, env, DEFAULT_LLM_MODEL),
        temperature: resolve_parsed_with_default(
            args.temperature,
            ENV_LLM_TEMPERATURE,
            env,
            DEFAULT_LLM_TEMPERATURE,
        )?,
    };

    let sample_rate = SampleRate::new(resolve_parsed_with_default(
        args.sample_rate,
        ENV_SAMPLE_RATE,
        env,
        DEFAULT_SAMPLE_RATE_HZ,
    )?)?;

    let tts_lang = LanguageCode::new(resolve_string_with_default(
        args.tts_lang,
        ENV_TTS_LANG,
        env,
        DEFAULT_TTS_LANG,
    ))?;

    let asr = AsrConfig {
        backend: args.asr_backend.parse::<AsrBackendKind>()?,
        sherpa: SherpaConfig {
            binary: PathBuf::from(resolve_string_with_default(
                args.sherpa_bin,
                ENV_SHERPA_ONNX_BIN,
                env,
                DEFAULT_SHERPA_ONNX_BIN,
            )),
            model_dir: PathBuf::from(resolve_string_with_default(
                args.asr_model_dir,
                ENV_ASR_MODEL_DIR,
                env,
                DEFAULT_ASR_MODEL_DIR,
            )),
        },
    };

    Ok(AppConfig {
        api_keys: ApiKeys { openai },
        openai_base_url,
        llm,
        sample_rate,
        recording_duration: RecordingDuration::new(args.duration)?,
        tts_lang,
        tts_backend: args.tts_backend.parse::<TtsBackendKind>()?,
        asr,
        start_time: SystemTime::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_assistant_core::config::MapEnv;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["voice-assistant"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn backend_flags_reach_options() {
        let args = parse(&[
            "--input-device",
            "USB Mic",
            "--tts-voice",
            "nova",
            "--tts-speed",
            "1.25",
            "--asr-language",
            "zh",
            "--max-tokens",
            "256",
            "--llm-attempts",
            "1",
        ]);
        let opts = BackendOptions::from_args(&args);
        assert_eq!(opts.input_device.as_deref(), Some("USB Mic"));
        assert_eq!(opts.tts_voice, "nova");
        assert_eq!(opts.tts_model, "tts-1");
        assert_eq!(opts.tts_speed, 1.25);
        assert_eq!(opts.asr_model, "whisper-1");
        assert_eq!(opts.asr_language.as_deref(), Some("zh"));
        assert_eq!(opts.max_tokens, Some(256));
        assert_eq!(opts.retry().max_attempts, 1);
    }

    #[test]
    fn config_prefers_flags_over_env() {
        let env = MapEnv::default()
            .with_var(ENV_OPENAI_API_KEY, "sk-env")
            .with_var(ENV_LLM_MODEL, "gpt-4o-mini")
            .with_var(ENV_TTS_LANG, "en");
        let cfg = build_config(parse(&["--model", "gpt-4o", "--duration", "10"]), &env).unwrap();
        assert_eq!(cfg.llm.model, "gpt-4o");
        assert_eq!(cfg.tts_lang.as_str(), "en");
        assert_eq!(cfg.recording_duration.secs(), 10);
        assert_eq!(cfg.api_keys.openai.as_ref().map(|k| k.expose()), Some("sk-env"));

        let opts = BackendOptions::from_args(&parse(&[]));
        let client = build_chat_client(&cfg, ApiKey::new("sk").unwrap(), &opts);
        assert_eq!(client.model(), "gpt-4o");
    }

    #[test]
    fn out_of_range_duration_is_rejected() {
        assert!(build_config(parse(&["--duration", "20"]), &MapEnv::default()).is_err());
    }
}
