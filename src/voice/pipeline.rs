//! Ordered, partially failure-tolerant translation pipeline.
//!
//! Runs the stages strictly in order:
//!
//! 1. **Transcode** (voice only): container audio → PCM
//! 2. **Recognize** (voice only): PCM → text, or "no speech"
//! 3. **Translate**: source text → target text
//! 4. **Synthesize** (optional): target text → audio
//!
//! A failure in stages 1-3 stops the run. A failure in stage 4 is attached
//! to the finished translation instead of replacing it.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::traits::{
    AudioInput, AudioTranscoder, Recognition, SpeechRecognizer, SpeechSynthesizer, Stage,
    SynthesizedAudio, Translator,
};
use crate::catalog::Direction;

// ── Inputs and outcomes ──────────────────────────────────────────

/// What the user sent.
#[derive(Debug, Clone)]
pub enum PipelineInput {
    Text(String),
    Audio(AudioInput),
}

/// Stage failure, recovered at the pipeline boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("audio transcoding failed: {0}")]
    Transcode(String),

    #[error("speech recognition service failed: {0}")]
    RecognitionService(String),

    #[error("translation service failed: {0}")]
    TranslationService(String),

    #[error("speech synthesis failed: {0}")]
    Synthesis(String),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            Self::Transcode(_) => Stage::Transcode,
            Self::RecognitionService(_) => Stage::Recognize,
            Self::TranslationService(_) => Stage::Translate,
            Self::Synthesis(_) => Stage::Synthesize,
        }
    }

    fn at(stage: Stage, message: String) -> Self {
        match stage {
            Stage::Transcode => Self::Transcode(message),
            Stage::Recognize => Self::RecognitionService(message),
            Stage::Translate => Self::TranslationService(message),
            Stage::Synthesize => Self::Synthesis(message),
        }
    }
}

/// A completed translation.
#[derive(Debug, Clone)]
pub struct Translation {
    /// Recognized source text (voice input only).
    pub recognized: Option<String>,
    pub text: String,
    pub source_language: String,
    pub target_language: String,
    /// Spoken translation, when synthesis is enabled and succeeded.
    pub audio: Option<SynthesizedAudio>,
    /// Set when synthesis was attempted and failed.
    pub synthesis_error: Option<PipelineError>,
}

/// Result of one pipeline run.
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    Translated(Translation),
    /// Recognition found no speech; nothing after it ran.
    NotRecognized,
    /// A required stage failed. `recognized` keeps any text recognized
    /// before the failure so it can still be shown.
    Failed {
        recognized: Option<String>,
        error: PipelineError,
    },
}

// ── Pipeline ─────────────────────────────────────────────────────

/// Orchestrates the four stage backends.
pub struct TranslationPipeline {
    transcoder: Arc<dyn AudioTranscoder>,
    recognizer: Arc<dyn SpeechRecognizer>,
    translator: Arc<dyn Translator>,
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    stage_timeout: Duration,
}

impl TranslationPipeline {
    pub fn new(
        transcoder: Arc<dyn AudioTranscoder>,
        recognizer: Arc<dyn SpeechRecognizer>,
        translator: Arc<dyn Translator>,
        synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
        stage_timeout: Duration,
    ) -> Self {
        Self {
            transcoder,
            recognizer,
            translator,
            synthesizer,
            stage_timeout,
        }
    }

    pub fn synthesis_enabled(&self) -> bool {
        self.synthesizer.is_some()
    }

    /// Run `input` through the stages for `direction`.
    ///
    /// Never fails as a whole: stage errors are reported in the outcome.
    pub async fn run(&self, direction: &Direction, input: PipelineInput) -> PipelineOutcome {
        let (recognized, source_text) = match input {
            PipelineInput::Text(text) => (None, text),
            PipelineInput::Audio(audio) => match self.recognize_audio(direction, &audio).await {
                Ok(Some(text)) => (Some(text.clone()), text),
                Ok(None) => return PipelineOutcome::NotRecognized,
                Err(error) => {
                    return PipelineOutcome::Failed {
                        recognized: None,
                        error,
                    }
                }
            },
        };

        let text = if source_text.trim().is_empty() {
            String::new()
        } else {
            let call = self
                .translator
                .translate(&source_text, &direction.source, &direction.target);
            match self.timed(Stage::Translate, &direction.code, call).await {
                Ok(text) => text,
                Err(error) => return PipelineOutcome::Failed { recognized, error },
            }
        };

        let (audio, synthesis_error) = self.synthesize(direction, &text).await;

        PipelineOutcome::Translated(Translation {
            recognized,
            text,
            source_language: direction.source.clone(),
            target_language: direction.target.clone(),
            audio,
            synthesis_error,
        })
    }

    /// Stages 1 and 2. `Ok(None)` means no speech was found.
    async fn recognize_audio(
        &self,
        direction: &Direction,
        audio: &AudioInput,
    ) -> Result<Option<String>, PipelineError> {
        let pcm = self
            .timed(Stage::Transcode, &direction.code, self.transcoder.transcode(audio))
            .await?;

        let call = self
            .recognizer
            .recognize(&pcm, &direction.recognition_locale);
        match self.timed(Stage::Recognize, &direction.code, call).await? {
            Recognition::Text(text) if !text.trim().is_empty() => Ok(Some(text)),
            Recognition::Text(_) | Recognition::NoSpeech => {
                tracing::info!(
                    direction = %direction.code,
                    locale = %direction.recognition_locale,
                    "No speech recognized"
                );
                Ok(None)
            }
        }
    }

    /// Stage 4, best effort.
    async fn synthesize(
        &self,
        direction: &Direction,
        text: &str,
    ) -> (Option<SynthesizedAudio>, Option<PipelineError>) {
        let Some(synthesizer) = &self.synthesizer else {
            return (None, None);
        };
        if text.trim().is_empty() {
            return (None, None);
        }

        let call = synthesizer.synthesize(text, &direction.synthesis_language);
        match self.timed(Stage::Synthesize, &direction.code, call).await {
            Ok(audio) => (Some(audio), None),
            Err(error) => (None, Some(error)),
        }
    }

    /// Await one stage call under the stage timeout, logging its latency.
    async fn timed<T>(
        &self,
        stage: Stage,
        direction: &str,
        call: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<T, PipelineError> {
        let start = Instant::now();
        let result = tokio::time::timeout(self.stage_timeout, call).await;
        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let message = match result {
            Ok(Ok(value)) => {
                tracing::debug!(stage = stage.as_str(), direction, elapsed_ms, "Stage completed");
                return Ok(value);
            }
            Ok(Err(e)) => format!("{e:#}"),
            Err(_) => format!("timed out after {}s", self.stage_timeout.as_secs_f32()),
        };

        tracing::warn!(
            stage = stage.as_str(),
            direction,
            elapsed_ms,
            error = %message,
            "Stage failed"
        );
        Err(PipelineError::at(stage, message))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::SynthesisEncoding;
    use crate::voice::traits::{ContainerFormat, PcmAudio};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Scripted behaviour of one fake stage.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum Script {
        Ok,
        Fail,
        /// Recognizer only: report no speech.
        Silent,
        Hang,
    }

    /// One fake backend for all four stages; records the calls it gets.
    pub(crate) struct FakeStages {
        pub calls: Mutex<Vec<Stage>>,
        pub on_transcode: Script,
        pub on_recognize: Script,
        pub on_translate: Script,
        pub on_synthesize: Script,
        pub recognized_text: String,
    }

    impl Default for FakeStages {
        fn default() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                on_transcode: Script::Ok,
                on_recognize: Script::Ok,
                on_translate: Script::Ok,
                on_synthesize: Script::Ok,
                recognized_text: "привет".into(),
            }
        }
    }

    impl FakeStages {
        pub fn calls(&self) -> Vec<Stage> {
            self.calls.lock().clone()
        }

        async fn step(&self, stage: Stage, script: Script) -> anyhow::Result<()> {
            self.calls.lock().push(stage);
            match script {
                Script::Ok | Script::Silent => Ok(()),
                Script::Fail => anyhow::bail!("{stage} backend error 503"),
                Script::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(())
                }
            }
        }
    }

    #[async_trait]
    impl AudioTranscoder for FakeStages {
        fn name(&self) -> &str {
            "fake"
        }

        async fn transcode(&self, audio: &AudioInput) -> anyhow::Result<PcmAudio> {
            self.step(Stage::Transcode, self.on_transcode).await?;
            Ok(PcmAudio {
                wav: audio.bytes.clone(),
                sample_rate: 16_000,
            })
        }
    }

    #[async_trait]
    impl SpeechRecognizer for FakeStages {
        fn name(&self) -> &str {
            "fake"
        }

        async fn recognize(&self, _audio: &PcmAudio, _locale: &str) -> anyhow::Result<Recognition> {
            self.step(Stage::Recognize, self.on_recognize).await?;
            if self.on_recognize == Script::Silent {
                return Ok(Recognition::NoSpeech);
            }
            Ok(Recognition::Text(self.recognized_text.clone()))
        }
    }

    #[async_trait]
    impl Translator for FakeStages {
        fn name(&self) -> &str {
            "fake"
        }

        async fn translate(&self, text: &str, source: &str, target: &str) -> anyhow::Result<String> {
            self.step(Stage::Translate, self.on_translate).await?;
            Ok(format!("[{source}->{target}] {text}"))
        }
    }

    #[async_trait]
    impl SpeechSynthesizer for FakeStages {
        fn name(&self) -> &str {
            "fake"
        }

        async fn synthesize(&self, text: &str, _language: &str) -> anyhow::Result<SynthesizedAudio> {
            self.step(Stage::Synthesize, self.on_synthesize).await?;
            Ok(SynthesizedAudio {
                bytes: text.as_bytes().to_vec(),
                encoding: SynthesisEncoding::Mp3,
            })
        }
    }

    pub(crate) fn pipeline_with(fake: Arc<FakeStages>, timeout: Duration) -> TranslationPipeline {
        TranslationPipeline::new(
            fake.clone(),
            fake.clone(),
            fake.clone(),
            Some(fake),
            timeout,
        )
    }

    fn ru_de() -> Direction {
        Direction::new("ru_de", "ru", "de", "ru-RU", "de", "RU → DE")
    }

    fn voice() -> PipelineInput {
        PipelineInput::Audio(AudioInput {
            bytes: vec![1, 2, 3],
            format: ContainerFormat::Ogg,
        })
    }

    async fn run(fake: FakeStages, input: PipelineInput) -> (PipelineOutcome, Vec<Stage>) {
        let fake = Arc::new(fake);
        let pipeline = pipeline_with(fake.clone(), Duration::from_secs(5));
        let outcome = pipeline.run(&ru_de(), input).await;
        (outcome, fake.calls())
    }

    #[tokio::test]
    async fn voice_runs_all_stages_in_order() {
        let (outcome, calls) = run(FakeStages::default(), voice()).await;
        assert_eq!(
            calls,
            vec![Stage::Transcode, Stage::Recognize, Stage::Translate, Stage::Synthesize]
        );
        let PipelineOutcome::Translated(t) = outcome else {
            panic!("expected translation, got {outcome:?}");
        };
        assert_eq!(t.recognized.as_deref(), Some("привет"));
        assert_eq!(t.text, "[ru->de] привет");
        assert_eq!(t.audio.unwrap().bytes, "[ru->de] привет".as_bytes());
        assert!(t.synthesis_error.is_none());
    }

    #[tokio::test]
    async fn text_skips_audio_stages() {
        let (outcome, calls) = run(FakeStages::default(), PipelineInput::Text("hallo".into())).await;
        assert_eq!(calls, vec![Stage::Translate, Stage::Synthesize]);
        assert!(matches!(outcome, PipelineOutcome::Translated(t) if t.recognized.is_none()));
    }

    #[tokio::test]
    async fn no_speech_stops_before_translation() {
        let fake = FakeStages {
            on_recognize: Script::Silent,
            ..Default::default()
        };
        let (outcome, calls) = run(fake, voice()).await;
        assert!(matches!(outcome, PipelineOutcome::NotRecognized));
        assert_eq!(calls, vec![Stage::Transcode, Stage::Recognize]);
    }

    #[tokio::test]
    async fn blank_transcript_counts_as_no_speech() {
        let fake = FakeStages {
            recognized_text: "   ".into(),
            ..Default::default()
        };
        let (outcome, calls) = run(fake, voice()).await;
        assert!(matches!(outcome, PipelineOutcome::NotRecognized));
        assert!(!calls.contains(&Stage::Translate));
    }

    #[tokio::test]
    async fn transcode_failure_aborts_everything() {
        let fake = FakeStages {
            on_transcode: Script::Fail,
            ..Default::default()
        };
        let (outcome, calls) = run(fake, voice()).await;
        assert_eq!(calls, vec![Stage::Transcode]);
        let PipelineOutcome::Failed { recognized, error } = outcome else {
            panic!("expected failure");
        };
        assert!(recognized.is_none());
        assert_eq!(error.stage(), Stage::Transcode);
    }

    #[tokio::test]
    async fn recognition_service_error_is_distinct_from_no_speech() {
        let fake = FakeStages {
            on_recognize: Script::Fail,
            ..Default::default()
        };
        let (outcome, _) = run(fake, voice()).await;
        assert!(matches!(
            outcome,
            PipelineOutcome::Failed { error: PipelineError::RecognitionService(_), .. }
        ));
    }

    #[tokio::test]
    async fn translation_failure_keeps_recognized_text() {
        let fake = FakeStages {
            on_translate: Script::Fail,
            ..Default::default()
        };
        let (outcome, calls) = run(fake, voice()).await;
        assert!(!calls.contains(&Stage::Synthesize));
        let PipelineOutcome::Failed { recognized, error } = outcome else {
            panic!("expected failure");
        };
        assert_eq!(recognized.as_deref(), Some("привет"));
        assert!(matches!(error, PipelineError::TranslationService(m) if m.contains("503")));
    }

    #[tokio::test]
    async fn synthesis_failure_is_soft() {
        let fake = FakeStages {
            on_synthesize: Script::Fail,
            ..Default::default()
        };
        let (outcome, _) = run(fake, PipelineInput::Text("hallo".into())).await;
        let PipelineOutcome::Translated(t) = outcome else {
            panic!("synthesis failure must not fail the run");
        };
        assert_eq!(t.text, "[ru->de] hallo");
        assert!(t.audio.is_none());
        assert_eq!(t.synthesis_error.unwrap().stage(), Stage::Synthesize);
    }

    #[tokio::test]
    async fn empty_text_skips_translation_service() {
        let (outcome, calls) = run(FakeStages::default(), PipelineInput::Text("  ".into())).await;
        assert!(calls.is_empty());
        let PipelineOutcome::Translated(t) = outcome else {
            panic!("expected translation");
        };
        assert_eq!(t.text, "");
        assert!(t.audio.is_none());
    }

    #[tokio::test]
    async fn hung_stage_times_out_as_its_own_error() {
        let fake = Arc::new(FakeStages {
            on_translate: Script::Hang,
            ..Default::default()
        });
        let pipeline = pipeline_with(fake.clone(), Duration::from_millis(50));
        let outcome = pipeline.run(&ru_de(), PipelineInput::Text("hallo".into())).await;
        let PipelineOutcome::Failed { error, .. } = outcome else {
            panic!("expected timeout failure");
        };
        assert!(matches!(error, PipelineError::TranslationService(m) if m.contains("timed out")));
    }

    #[tokio::test]
    async fn without_synthesizer_replies_are_text_only() {
        let fake = Arc::new(FakeStages::default());
        let pipeline = TranslationPipeline::new(
            fake.clone(),
            fake.clone(),
            fake.clone(),
            None,
            Duration::from_secs(5),
        );
        assert!(!pipeline.synthesis_enabled());
        let outcome = pipeline.run(&ru_de(), PipelineInput::Text("hallo".into())).await;
        assert!(matches!(outcome, PipelineOutcome::Translated(t) if t.audio.is_none() && t.synthesis_error.is_none()));
        assert_eq!(fake.calls(), vec![Stage::Translate]);
    }
}
