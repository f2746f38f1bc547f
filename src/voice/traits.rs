//! Stage traits and the audio/text values passed between stages.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::SynthesisEncoding;

// ── Stage ────────────────────────────────────────────────────────

/// One step of the translation pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Transcode,
    Recognize,
    Translate,
    Synthesize,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transcode => "transcode",
            Self::Recognize => "recognize",
            Self::Translate => "translate",
            Self::Synthesize => "synthesize",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Audio values ─────────────────────────────────────────────────

/// Compressed container of an inbound voice message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    /// Ogg/Opus, what chat voice notes use.
    #[default]
    Ogg,
    Mp3,
    Wav,
    M4a,
    Webm,
}

impl ContainerFormat {
    /// ffmpeg demuxer name. `None` lets ffmpeg probe the input.
    pub fn ffmpeg_demuxer(self) -> Option<&'static str> {
        match self {
            Self::Ogg => Some("ogg"),
            Self::Mp3 => Some("mp3"),
            Self::Wav => Some("wav"),
            Self::Webm => Some("webm"),
            Self::M4a => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Ogg => "ogg",
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::M4a => "m4a",
            Self::Webm => "webm",
        }
    }

    /// Guess the container from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "ogg" | "oga" | "opus" => Some(Self::Ogg),
            "mp3" => Some(Self::Mp3),
            "wav" => Some(Self::Wav),
            "m4a" | "mp4" | "aac" => Some(Self::M4a),
            "webm" => Some(Self::Webm),
            _ => None,
        }
    }
}

impl std::str::FromStr for ContainerFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s.trim_start_matches('.'))
            .ok_or_else(|| anyhow::anyhow!("Unsupported audio container '{s}'"))
    }
}

/// Inbound audio as received from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioInput {
    pub bytes: Vec<u8>,
    pub format: ContainerFormat,
}

/// 16-bit mono linear PCM in a WAV container, ready for recognition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmAudio {
    pub wav: Vec<u8>,
    pub sample_rate: u32,
}

/// Result of speech recognition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recognition {
    Text(String),
    /// The service found no speech. A valid empty result, not a failure.
    NoSpeech,
}

/// Spoken rendition of a translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedAudio {
    pub bytes: Vec<u8>,
    pub encoding: SynthesisEncoding,
}

// ── Stage traits ─────────────────────────────────────────────────

/// Converts compressed voice audio to PCM.
#[async_trait]
pub trait AudioTranscoder: Send + Sync {
    fn name(&self) -> &str;

    async fn transcode(&self, audio: &AudioInput) -> anyhow::Result<PcmAudio>;
}

/// Speech-to-text.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    fn name(&self) -> &str;

    /// Recognize `audio` spoken in `locale` (e.g. "ru-RU").
    async fn recognize(&self, audio: &PcmAudio, locale: &str) -> anyhow::Result<Recognition>;
}

/// Text translation.
#[async_trait]
pub trait Translator: Send + Sync {
    fn name(&self) -> &str;

    async fn translate(&self, text: &str, source: &str, target: &str) -> anyhow::Result<String>;
}

/// Text-to-speech.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    fn name(&self) -> &str;

    async fn synthesize(&self, text: &str, language: &str) -> anyhow::Result<SynthesizedAudio>;
}
