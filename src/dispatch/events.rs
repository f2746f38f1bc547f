//! Tagged inbound/outbound events exchanged with the messaging gateway.
//!
//! Events are JSON objects tagged by `type`; audio travels base64-encoded.

use serde::{Deserialize, Serialize};

use crate::billing::StatusReport;
use crate::catalog::Quota;
use crate::config::SynthesisEncoding;
use crate::session::UserId;
use crate::voice::{ContainerFormat, Stage};

// ── Inbound ──────────────────────────────────────────────────────

/// Everything a user can send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    TextMessage {
        user_id: UserId,
        text: String,
    },
    VoiceMessage {
        user_id: UserId,
        #[serde(with = "base64_bytes")]
        audio: Vec<u8>,
        #[serde(default)]
        format: ContainerFormat,
    },
    DirectionSelect {
        user_id: UserId,
        code: String,
    },
    LanguageSelect {
        user_id: UserId,
        code: String,
    },
    CodeSubmit {
        user_id: UserId,
        code: String,
    },
    /// Usage summary. Admins may name another user in `target`.
    StatusRequest {
        user_id: UserId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<UserId>,
    },
}

impl InboundEvent {
    pub fn user_id(&self) -> &UserId {
        match self {
            Self::TextMessage { user_id, .. }
            | Self::VoiceMessage { user_id, .. }
            | Self::DirectionSelect { user_id, .. }
            | Self::LanguageSelect { user_id, .. }
            | Self::CodeSubmit { user_id, .. }
            | Self::StatusRequest { user_id, .. } => user_id,
        }
    }

    /// Short kind name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TextMessage { .. } => "text_message",
            Self::VoiceMessage { .. } => "voice_message",
            Self::DirectionSelect { .. } => "direction_select",
            Self::LanguageSelect { .. } => "language_select",
            Self::CodeSubmit { .. } => "code_submit",
            Self::StatusRequest { .. } => "status_request",
        }
    }
}

// ── Outbound ─────────────────────────────────────────────────────

/// Everything the assistant can reply with, in delivery order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// What was recognized from a voice message.
    Transcript { text: String, language: String },
    /// The translation.
    TextReply { text: String, language: String },
    /// The spoken translation.
    VoiceReply {
        #[serde(with = "base64_bytes")]
        audio: Vec<u8>,
        format: SynthesisEncoding,
    },
    Notice(Notice),
    Status(StatusReport),
}

/// User-facing notices. The gateway localizes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    QuotaExceeded { tier: String, limit: u32 },
    PasswordInvalid,
    TierChanged { tier: String, label: String, limit: Quota },
    DirectionChanged { direction: String, label: String },
    DirectionUnchanged { direction: String },
    UiLanguageChanged { language: String },
    UiLanguageUnchanged { language: String },
    /// A selection code from a stale menu.
    UnknownSelection { code: String },
    NotRecognized,
    ServiceUnavailable { stage: Stage },
    SynthesisFailed,
    /// Reminder that text messages are charged like voice messages.
    TextCountsTowardQuota { used: u32, limit: u32 },
    AdminOnly,
}

impl From<Notice> for OutboundEvent {
    fn from(notice: Notice) -> Self {
        Self::Notice(notice)
    }
}

/// One line of `serve` output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub user_id: UserId,
    #[serde(default)]
    pub events: Vec<OutboundEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
