use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::catalog::{default_directions, Direction, Quota, Tier};

/// Root configuration, deserialized from `config.toml`.
///
/// Every section has defaults, so an empty file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    /// Supported interface languages, in menu order.
    pub ui_languages: Vec<String>,
    /// Translation directions, in menu order.
    pub directions: Vec<Direction>,
    /// Access tiers and their daily quotas.
    pub tiers: Vec<TierConfig>,
    /// Shared-secret access code → tier name.
    pub access_codes: HashMap<String, String>,
    pub access: AccessConfig,
    pub pipeline: PipelineConfig,
    pub services: ServicesConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            ui_languages: ["ru", "en", "de", "tr", "ro", "pl", "ar"]
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            directions: default_directions(),
            tiers: default_tiers(),
            access_codes: HashMap::new(),
            access: AccessConfig::default(),
            pipeline: PipelineConfig::default(),
            services: ServicesConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Session defaults and accounting time zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct GeneralConfig {
    /// Direction new sessions start with.
    pub default_direction: String,
    /// Interface language new sessions start with.
    pub default_ui_language: String,
    /// Tier new sessions start in.
    pub default_tier: String,
    /// IANA time zone that defines the quota day (e.g. "UTC", "Europe/Berlin").
    pub timezone: String,
    /// Remind users that text messages count toward the daily quota.
    pub text_charge_notice: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_direction: "ru_de".into(),
            default_ui_language: "ru".into(),
            default_tier: "free".into(),
            timezone: "UTC".into(),
            text_charge_notice: true,
        }
    }
}

/// One `[[tiers]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TierConfig {
    pub name: String,
    /// Display label; defaults to the upper-cased name.
    #[serde(default)]
    pub label: Option<String>,
    /// Requests per day. Omit for an unlimited tier.
    #[serde(default)]
    pub daily_quota: Option<u32>,
}

impl TierConfig {
    pub fn new(name: &str, label: &str, daily_quota: Option<u32>) -> Self {
        Self {
            name: name.into(),
            label: Some(label.into()),
            daily_quota,
        }
    }

    pub fn to_tier(&self) -> Tier {
        Tier {
            name: self.name.clone(),
            label: self
                .label
                .clone()
                .unwrap_or_else(|| self.name.to_uppercase()),
            quota: match self.daily_quota {
                Some(n) => Quota::Limited(n),
                None => Quota::Unlimited,
            },
        }
    }
}

fn default_tiers() -> Vec<TierConfig> {
    vec![
        TierConfig::new("free", "Free (DEMO)", Some(30)),
        TierConfig::new("a1", "A1", Some(30)),
        TierConfig::new("a2", "A2", Some(60)),
        TierConfig::new("b1", "B1", Some(100)),
        TierConfig::new("pro", "PRO", None),
    ]
}

/// Per-user overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AccessConfig {
    /// Users exempt from quota accounting regardless of tier.
    pub unlimited_users: Vec<String>,
    /// Users allowed to inspect other users' status.
    pub admins: Vec<String>,
}

/// Translation pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PipelineConfig {
    /// Timeout applied to each stage's external call.
    pub stage_timeout_secs: u64,
    /// Speak translations back. When false, replies are text-only.
    pub synthesis_enabled: bool,
    /// ffmpeg executable used for transcoding voice messages.
    pub ffmpeg_path: String,
    /// Sample rate of the PCM audio handed to the recognizer.
    pub recognition_sample_rate: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage_timeout_secs: 8,
            synthesis_enabled: true,
            ffmpeg_path: "ffmpeg".into(),
            recognition_sample_rate: 16_000,
        }
    }
}

/// External speech / translation services (Google Cloud REST APIs).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ServicesConfig {
    /// API key for all Google endpoints. Can be set via `DOLMETSCHER_GOOGLE_API_KEY`.
    pub google_api_key: Option<String>,
    pub speech_url: String,
    pub translate_url: String,
    pub tts_url: String,
    /// Audio encoding requested from the synthesis service.
    pub synthesis_encoding: SynthesisEncoding,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            google_api_key: None,
            speech_url: "https://speech.googleapis.com/v1/speech:recognize".into(),
            translate_url: "https://translation.googleapis.com/language/translate/v2".into(),
            tts_url: "https://texttospeech.googleapis.com/v1/text:synthesize".into(),
            synthesis_encoding: SynthesisEncoding::default(),
        }
    }
}

/// Audio encodings the synthesis service can return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SynthesisEncoding {
    #[default]
    Mp3,
    OggOpus,
    Linear16,
}

impl SynthesisEncoding {
    /// Wire name expected by the synthesis API.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mp3 => "MP3",
            Self::OggOpus => "OGG_OPUS",
            Self::Linear16 => "LINEAR16",
        }
    }

    /// File extension for audio in this encoding.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::OggOpus => "ogg",
            Self::Linear16 => "wav",
        }
    }
}

/// Where per-user sessions are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// SQLite database file (sqlite backend only). `~` and `$VAR` are expanded.
    pub sqlite_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            sqlite_path: "~/.dolmetscher/sessions.db".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-lifetime sessions.
    #[default]
    Memory,
    /// Sessions survive restarts in a SQLite file.
    Sqlite,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
}

/// Log verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Tracing filter directive for this crate.
    pub fn as_directive(self) -> &'static str {
        match self {
            Self::Error => "dolmetscher=error",
            Self::Warn => "dolmetscher=warn",
            Self::Info => "dolmetscher=info",
            Self::Debug => "dolmetscher=debug",
            Self::Trace => "dolmetscher=trace",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Some(Self::Error),
            "warn" | "warning" => Some(Self::Warn),
            "info" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            "trace" => Some(Self::Trace),
            _ => None,
        }
    }
}
