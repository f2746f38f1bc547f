//! Speech and translation pipeline.
//!
//! ## Design
//! - Four ordered stages: transcode → recognize → translate → synthesize
//! - Each stage is a trait (`AudioTranscoder`, `SpeechRecognizer`,
//!   `Translator`, `SpeechSynthesizer`) so backends can be swapped or faked
//! - Every external call runs under its own timeout; no session lock is
//!   held while a stage is awaited
//! - Stage failures become a typed `PipelineError`; synthesis failure is
//!   soft and never discards the translation
//! - Production backends: ffmpeg child process for transcoding, Google
//!   Cloud REST APIs for recognition, translation and synthesis

pub mod ffmpeg;
pub mod google;
pub mod pipeline;
pub mod traits;

pub use ffmpeg::FfmpegTranscoder;
pub use google::{GoogleRecognizer, GoogleSynthesizer, GoogleTranslator};
pub use pipeline::{PipelineError, PipelineInput, PipelineOutcome, Translation, TranslationPipeline};
pub use traits::{
    AudioInput, AudioTranscoder, ContainerFormat, PcmAudio, Recognition, SpeechRecognizer,
    SpeechSynthesizer, Stage, SynthesizedAudio, Translator,
};
