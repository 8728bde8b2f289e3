use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, str::FromStr, time::Duration, time::SystemTime};
use url::Url;

pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 16_000;
pub const DEFAULT_LLM_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_LLM_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_TTS_LANG: &str = "zh";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_SHERPA_ONNX_BIN: &str = "sherpa-onnx-offline";
pub const DEFAULT_ASR_MODEL_DIR: &str = "asr_models/omnilingual_1b";

pub const MIN_RECORDING_SECS: u8 = 3;
pub const MAX_RECORDING_SECS: u8 = 15;
pub const DEFAULT_RECORDING_SECS: u8 = 5;

pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";
pub const ENV_SAMPLE_RATE: &str = "SAMPLE_RATE";
pub const ENV_LLM_MODEL: &str = "LLM_MODEL";
pub const ENV_LLM_TEMPERATURE: &str = "LLM_TEMPERATURE";
pub const ENV_TTS_LANG: &str = "TTS_LANG";
pub const ENV_SHERPA_ONNX_BIN: &str = "SHERPA_ONNX_BIN";
pub const ENV_ASR_MODEL_DIR: &str = "ASR_MODEL_DIR";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LanguageCode(String);

impl LanguageCode {
    pub fn new<S: Into<String>>(value: S) -> Result<Self, ConfigError> {
        let v = value.into();
        if v.trim().is_empty() {
            return Err(ConfigError::EmptyLanguage);
        }
        Ok(Self(v.trim().to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LanguageCode {
    fn default() -> Self {
        Self(DEFAULT_TTS_LANG.to_owned())
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
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

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiKeys {
    pub openai: Option<ApiKey>,
}

/// How long a single voice recording runs. Bounded to the range the
/// duration control offers.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct RecordingDuration {
    secs: u8,
}

impl RecordingDuration {
    pub fn new(secs: u8) -> Result<Self, ConfigError> {
        if !(MIN_RECORDING_SECS..=MAX_RECORDING_SECS).contains(&secs) {
            return Err(ConfigError::RecordingDurationOutOfRange(secs));
        }
        Ok(Self { secs })
    }

    pub fn secs(&self) -> u8 {
        self.secs
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.secs))
    }

    pub fn frames_for_sample_rate(&self, sample_rate_hz: u32) -> usize {
        let frames = u64::from(self.secs).saturating_mul(u64::from(sample_rate_hz));
        usize::try_from(frames).unwrap_or(usize::MAX)
    }
}

impl Default for RecordingDuration {
    fn default() -> Self {
        Self {
            secs: DEFAULT_RECORDING_SECS,
        }
    }
}

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
        Self(DEFAULT_SAMPLE_RATE_HZ)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LlmConfig {
    pub model: String,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_LLM_MODEL.to_owned(),
            temperature: DEFAULT_LLM_TEMPERATURE,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum AsrBackendKind {
    #[default]
    OpenAi,
    SherpaOnnx,
}

impl FromStr for AsrBackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "whisper" => Ok(Self::OpenAi),
            "sherpa" | "sherpa-onnx" | "omni" => Ok(Self::SherpaOnnx),
            other => Err(ConfigError::UnknownBackend(other.to_owned())),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum TtsBackendKind {
    #[default]
    Google,
    OpenAi,
}

impl FromStr for TtsBackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" | "gtts" => Ok(Self::Google),
            "openai" => Ok(Self::OpenAi),
            other => Err(ConfigError::UnknownBackend(other.to_owned())),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SherpaConfig {
    pub binary: PathBuf,
    pub model_dir: PathBuf,
}

impl SherpaConfig {
    pub fn model_path(&self) -> PathBuf {
        self.model_dir.join("model.onnx")
    }

    pub fn tokens_path(&self) -> PathBuf {
        self.model_dir.join("tokens.txt")
    }
}

impl Default for SherpaConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_SHERPA_ONNX_BIN),
            model_dir: PathBuf::from(DEFAULT_ASR_MODEL_DIR),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AsrConfig {
    pub backend: AsrBackendKind,
    pub sherpa: SherpaConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub api_keys: ApiKeys,
    pub openai_base_url: Url,
    pub llm: LlmConfig,
    pub sample_rate: SampleRate,
    pub recording_duration: RecordingDuration,
    pub tts_lang: LanguageCode,
    pub tts_backend: TtsBackendKind,
    pub asr: AsrConfig,
    pub start_time: SystemTime,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("language code must not be empty")]
    EmptyLanguage,
    #[error("api key must not be empty")]
    EmptyApiKey,
    #[error("sample rate must be > 0 Hz")]
    ZeroSampleRate,
    #[error("recording duration must be between 3 and 15 seconds, got {0}")]
    RecordingDurationOutOfRange(u8),
    #[error("unknown backend: {0}")]
    UnknownBackend(String),
    #[error("invalid url {0}")]
    InvalidUrl(String),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
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

/// Like [`resolve_string_with_default`] but parses the env value, so a
/// malformed `SAMPLE_RATE=abc` is reported instead of silently defaulted.
pub fn resolve_parsed_with_default<T: FromStr>(
    cli_value: Option<T>,
    env_key: &str,
    env: &impl Env,
    default: T,
) -> Result<T, ConfigError> {
    if let Some(v) = cli_value {
        return Ok(v);
    }
    match env.var(env_key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue {
                key: env_key.to_owned(),
                value: raw,
            }),
        None => Ok(default),
    }
}

pub fn resolve_base_url(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
) -> Result<Url, ConfigError> {
    let raw = resolve_string_with_default(cli_value, env_key, env, DEFAULT_OPENAI_BASE_URL);
    let trimmed = raw.trim().trim_end_matches('/');
    Url::parse(trimmed).map_err(|e| ConfigError::InvalidUrl(format!("{trimmed}: {e}")))
}

/// Joins an endpoint path onto a base such as `https://api.openai.com/v1`
/// without dropping the base's last path segment.
pub fn endpoint(base: &Url, path: &str) -> String {
    format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_cli_takes_precedence_over_env() {
        let env = MapEnv::default().with_var(ENV_OPENAI_API_KEY, "env-key");
        let key = resolve_api_key(Some("cli-key".to_owned()), ENV_OPENAI_API_KEY, &env)
            .expect("valid key")
            .expect("present");
        assert_eq!(key.expose(), "cli-key");
    }

    #[test]
    fn api_key_env_used_when_cli_missing() {
        let env = MapEnv::default().with_var(ENV_OPENAI_API_KEY, "env-key");
        let key = resolve_api_key(None, ENV_OPENAI_API_KEY, &env)
            .expect("valid key")
            .expect("present");
        assert_eq!(key.expose(), "env-key");
    }

    #[test]
    fn api_key_debug_is_redacted() {
        let key = ApiKey::new("sk-secret").unwrap();
        assert!(!format!("{key:?}").contains("sk-secret"));
    }

    #[test]
    fn recording_duration_bounds() {
        assert!(RecordingDuration::new(2).is_err());
        assert!(RecordingDuration::new(16).is_err());
        assert_eq!(RecordingDuration::new(3).unwrap().secs(), 3);
        assert_eq!(RecordingDuration::new(15).unwrap().secs(), 15);
        assert_eq!(RecordingDuration::default().secs(), 5);
    }

    #[test]
    fn recording_duration_frames() {
        let d = RecordingDuration::new(3).unwrap();
        assert_eq!(d.frames_for_sample_rate(16_000), 48_000);
    }

    #[test]
    fn parsed_env_value_is_validated() {
        let env = MapEnv::default().with_var(ENV_SAMPLE_RATE, "abc");
        let err = resolve_parsed_with_default(None, ENV_SAMPLE_RATE, &env, 16_000u32).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let env = MapEnv::default().with_var(ENV_SAMPLE_RATE, "44100");
        let v = resolve_parsed_with_default(None, ENV_SAMPLE_RATE, &env, 16_000u32).unwrap();
        assert_eq!(v, 44_100);

        let v = resolve_parsed_with_default(Some(8_000u32), ENV_SAMPLE_RATE, &env, 16_000).unwrap();
        assert_eq!(v, 8_000);
    }

    #[test]
    fn resolve_string_with_default_default_used_when_both_missing() {
        let env = MapEnv::default();
        let v = resolve_string_with_default(None, ENV_LLM_MODEL, &env, DEFAULT_LLM_MODEL);
        assert_eq!(v, "gpt-3.5-turbo");
    }

    #[test]
    fn endpoint_keeps_version_segment() {
        let env = MapEnv::default();
        let base = resolve_base_url(None, ENV_OPENAI_BASE_URL, &env).unwrap();
        assert_eq!(
            endpoint(&base, "/chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );

        let env = MapEnv::default().with_var(ENV_OPENAI_BASE_URL, "http://localhost:8080/v1/");
        let base = resolve_base_url(None, ENV_OPENAI_BASE_URL, &env).unwrap();
        assert_eq!(endpoint(&base, "audio/speech"), "http://localhost:8080/v1/audio/speech");
    }

    #[test]
    fn backend_kinds_parse() {
        assert_eq!("sherpa".parse::<AsrBackendKind>().unwrap(), AsrBackendKind::SherpaOnnx);
        assert_eq!("OpenAI".parse::<TtsBackendKind>().unwrap(), TtsBackendKind::OpenAi);
        assert!("azure".parse::<TtsBackendKind>().is_err());
    }
}
