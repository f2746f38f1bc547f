//! Single entry point from the messaging gateway into the core.
//!
//! ## Design
//! - Inbound events are a closed set of tagged variants; `Assistant::handle`
//!   is one exhaustive match over them
//! - Chargeable messages go quota first, pipeline second; the pipeline
//!   works on the session snapshot taken at admission
//! - Every user-visible outcome is an `OutboundEvent`; only session store
//!   failures surface as `Err`
//! - Session store calls run on the blocking pool: backends do file I/O
//! - Menu rendering, localization and delivery stay in the gateway

pub mod events;

pub use events::{Envelope, InboundEvent, Notice, OutboundEvent};

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;

use crate::billing::{QuotaManager, TierResolver};
use crate::catalog::{Catalogs, Quota};
use crate::config::{Config, StorageBackend};
use crate::session::{
    Change, MemoryBackend, SessionBackend, SessionError, SessionStore, SqliteBackend, UserId,
};
use crate::util::ZonedClock;
use crate::voice::{
    AudioInput, ContainerFormat, FfmpegTranscoder, GoogleRecognizer, GoogleSynthesizer,
    GoogleTranslator, PipelineInput, PipelineOutcome, SpeechSynthesizer, TranslationPipeline,
};

/// The assembled core: session state, quota policy, tier codes, pipeline.
pub struct Assistant {
    store: Arc<SessionStore>,
    quota: Arc<QuotaManager>,
    tiers: Arc<TierResolver>,
    pipeline: TranslationPipeline,
    text_charge_notice: bool,
}

impl Assistant {
    pub fn new(
        quota: QuotaManager,
        tiers: TierResolver,
        pipeline: TranslationPipeline,
        text_charge_notice: bool,
    ) -> Self {
        Self {
            store: Arc::clone(quota.store()),
            quota: Arc::new(quota),
            tiers: Arc::new(tiers),
            pipeline,
            text_charge_notice,
        }
    }

    /// Wire up the production backends described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let catalogs = Arc::new(Catalogs::from_config(config)?);
        let clock = Arc::new(ZonedClock::new(config.timezone()?));

        let backend: Arc<dyn SessionBackend> = match config.storage.backend {
            StorageBackend::Memory => Arc::new(MemoryBackend::new()),
            StorageBackend::Sqlite => Arc::new(SqliteBackend::open(&config.sqlite_path()?)?),
        };
        tracing::info!(backend = backend.name(), "Session storage ready");

        let store = Arc::new(SessionStore::new(backend, catalogs, clock));
        let quota = QuotaManager::new(
            Arc::clone(&store),
            config.access.unlimited_users.iter().map(|u| UserId::from(u.as_str())),
            config.access.admins.iter().map(|u| UserId::from(u.as_str())),
        );
        let tiers = TierResolver::new(Arc::clone(&store));

        let client = reqwest::Client::builder()
            .timeout(config.stage_timeout())
            .build()
            .context("Failed to build HTTP client")?;
        let services = &config.services;

        let synthesizer: Option<Arc<dyn SpeechSynthesizer>> = if config.pipeline.synthesis_enabled {
            Some(Arc::new(GoogleSynthesizer::from_config(client.clone(), services)?))
        } else {
            None
        };

        let pipeline = TranslationPipeline::new(
            Arc::new(FfmpegTranscoder::new(
                config.pipeline.ffmpeg_path.clone(),
                config.pipeline.recognition_sample_rate,
            )),
            Arc::new(GoogleRecognizer::from_config(client.clone(), services)?),
            Arc::new(GoogleTranslator::from_config(client, services)?),
            synthesizer,
            config.stage_timeout(),
        );

        Ok(Self::new(quota, tiers, pipeline, config.general.text_charge_notice))
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn catalogs(&self) -> &Arc<Catalogs> {
        self.store.catalogs()
    }

    /// Handle one inbound event and return the replies in delivery order.
    ///
    /// Errors only when the session backend fails; callers should treat
    /// that as an infrastructure fault rather than a user-facing outcome.
    pub async fn handle(&self, event: InboundEvent) -> Result<Vec<OutboundEvent>> {
        tracing::debug!(user_id = %event.user_id(), kind = event.kind(), "Inbound event");

        match event {
            InboundEvent::TextMessage { user_id, text } => {
                self.translate(&user_id, PipelineInput::Text(text)).await
            }
            InboundEvent::VoiceMessage {
                user_id,
                audio,
                format,
            } => {
                let input = PipelineInput::Audio(AudioInput {
                    bytes: audio,
                    format,
                });
                self.translate(&user_id, input).await
            }
            InboundEvent::DirectionSelect { user_id, code } => {
                self.select_direction(user_id, code).await
            }
            InboundEvent::LanguageSelect { user_id, code } => {
                self.select_ui_language(user_id, code).await
            }
            InboundEvent::CodeSubmit { user_id, code } => self.submit_code(user_id, code).await,
            InboundEvent::StatusRequest { user_id, target } => self.status(user_id, target).await,
        }
    }

    // ── Translation ──────────────────────────────────────────────

    async fn translate(&self, user_id: &UserId, input: PipelineInput) -> Result<Vec<OutboundEvent>> {
        let quota = Arc::clone(&self.quota);
        let user = user_id.clone();
        let admission = off_worker(move || quota.try_consume(&user)).await??;
        let outcome = admission.outcome;

        if !outcome.allowed {
            let limit = outcome.limit.limit().unwrap_or(outcome.used);
            return Ok(vec![Notice::QuotaExceeded {
                tier: outcome.tier,
                limit,
            }
            .into()]);
        }

        let is_text = matches!(input, PipelineInput::Text(_));
        let direction = self
            .catalogs()
            .direction_or_default(&admission.session.direction)
            .clone();

        let start = Instant::now();
        let result = self.pipeline.run(&direction, input).await;
        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let mut replies: Vec<OutboundEvent> = Vec::new();
        match result {
            PipelineOutcome::Translated(translation) => {
                tracing::info!(
                    user_id = %user_id,
                    direction = %direction.code,
                    voice = !is_text,
                    elapsed_ms,
                    "Translation delivered"
                );

                if let Some(text) = translation.recognized {
                    replies.push(OutboundEvent::Transcript {
                        text,
                        language: translation.source_language.clone(),
                    });
                }
                replies.push(OutboundEvent::TextReply {
                    text: translation.text,
                    language: translation.target_language,
                });

                if is_text && self.text_charge_notice {
                    if let Quota::Limited(limit) = outcome.limit {
                        replies.push(
                            Notice::TextCountsTowardQuota {
                                used: outcome.used,
                                limit,
                            }
                            .into(),
                        );
                    }
                }

                if let Some(audio) = translation.audio {
                    replies.push(OutboundEvent::VoiceReply {
                        audio: audio.bytes,
                        format: audio.encoding,
                    });
                } else if translation.synthesis_error.is_some() {
                    replies.push(Notice::SynthesisFailed.into());
                }
            }
            PipelineOutcome::NotRecognized => {
                replies.push(Notice::NotRecognized.into());
            }
            PipelineOutcome::Failed { recognized, error } => {
                tracing::warn!(
                    user_id = %user_id,
                    direction = %direction.code,
                    stage = error.stage().as_str(),
                    elapsed_ms,
                    "Translation failed: {error}"
                );
                if let Some(text) = recognized {
                    replies.push(OutboundEvent::Transcript {
                        text,
                        language: direction.source.clone(),
                    });
                }
                replies.push(
                    Notice::ServiceUnavailable {
                        stage: error.stage(),
                    }
                    .into(),
                );
            }
        }

        Ok(replies)
    }

    // ── Selections ───────────────────────────────────────────────

    async fn select_direction(&self, user_id: UserId, code: String) -> Result<Vec<OutboundEvent>> {
        let store = Arc::clone(&self.store);
        let selected = code.clone();
        let result = off_worker(move || store.set_direction(&user_id, &selected)).await?;
        let notice = match result {
            Ok(Change::Updated) => {
                let label = self.catalogs().direction_or_default(&code).label.clone();
                Notice::DirectionChanged {
                    direction: code,
                    label,
                }
            }
            Ok(Change::Unchanged) => Notice::DirectionUnchanged { direction: code },
            Err(e) => return unknown_selection(e, code),
        };
        Ok(vec![notice.into()])
    }

    async fn select_ui_language(&self, user_id: UserId, code: String) -> Result<Vec<OutboundEvent>> {
        let store = Arc::clone(&self.store);
        let selected = code.clone();
        let result = off_worker(move || store.set_ui_language(&user_id, &selected)).await?;
        let notice = match result {
            Ok(Change::Updated) => Notice::UiLanguageChanged { language: code },
            Ok(Change::Unchanged) => Notice::UiLanguageUnchanged { language: code },
            Err(e) => return unknown_selection(e, code),
        };
        Ok(vec![notice.into()])
    }

    async fn submit_code(&self, user_id: UserId, code: String) -> Result<Vec<OutboundEvent>> {
        let tiers = Arc::clone(&self.tiers);
        let notice = match off_worker(move || tiers.apply_code(&user_id, &code)).await? {
            Ok(change) => Notice::TierChanged {
                tier: change.tier.name,
                label: change.tier.label,
                limit: change.tier.quota,
            },
            Err(SessionError::Store(e)) => return Err(e),
            Err(_) => Notice::PasswordInvalid,
        };
        Ok(vec![notice.into()])
    }

    // ── Status ───────────────────────────────────────────────────

    async fn status(&self, user_id: UserId, target: Option<UserId>) -> Result<Vec<OutboundEvent>> {
        let quota = Arc::clone(&self.quota);
        let report = match target {
            Some(other) if other != user_id => {
                if !self.quota.is_admin(&user_id) {
                    tracing::info!(user_id = %user_id, target = %other, "Status of another user denied");
                    return Ok(vec![Notice::AdminOnly.into()]);
                }
                off_worker(move || quota.peek_status(&other)).await?
            }
            _ => off_worker(move || quota.status(&user_id)).await?,
        };
        Ok(vec![OutboundEvent::Status(report)])
    }
}

/// Run a session store operation on the blocking pool.
async fn off_worker<T, F>(op: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .context("Session store task failed")
}

/// Selection codes come from menus the gateway rendered earlier; an unknown
/// one means a stale menu, not a user mistake.
fn unknown_selection(err: SessionError, code: String) -> Result<Vec<OutboundEvent>> {
    match err {
        SessionError::Store(e) => Err(e),
        other => {
            tracing::debug!("Ignoring stale selection: {other}");
            Ok(vec![Notice::UnknownSelection { code }.into()])
        }
    }
}

/// Container format for a voice file, from its extension.
pub fn format_for_path(path: &std::path::Path) -> Option<ContainerFormat> {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(ContainerFormat::from_extension)
}
