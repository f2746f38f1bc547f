//! Google Cloud REST backends: Speech-to-Text v1, Translation v2,
//! Text-to-Speech v1.
//!
//! All three authenticate with an API key passed as `?key=` and share one
//! `reqwest::Client`. Timeouts are applied by the pipeline per stage.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;

use super::traits::{PcmAudio, Recognition, SpeechRecognizer, SpeechSynthesizer, SynthesizedAudio, Translator};
use crate::config::{ServicesConfig, SynthesisEncoding};

/// POST `payload` to `endpoint` and return the JSON body, failing on any
/// non-2xx status.
async fn post_json(
    client: &reqwest::Client,
    service: &str,
    endpoint: &str,
    api_key: &str,
    payload: &serde_json::Value,
) -> Result<serde_json::Value> {
    let resp = client
        .post(endpoint)
        .query(&[("key", api_key)])
        .json(payload)
        .send()
        .await
        .with_context(|| format!("{service} request failed"))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        bail!("{service} API error {status}: {body}");
    }

    resp.json()
        .await
        .with_context(|| format!("{service} returned a malformed response"))
}

fn require_key(services: &ServicesConfig) -> Result<String> {
    services
        .google_api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .context("services.google_api_key is not set (or DOLMETSCHER_GOOGLE_API_KEY)")
}

// ── Speech-to-Text ───────────────────────────────────────────────

/// Google Speech-to-Text v1 (`speech:recognize`), LINEAR16 input.
pub struct GoogleRecognizer {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<RecognizeResult>,
}

#[derive(Debug, Deserialize)]
struct RecognizeResult {
    #[serde(default)]
    alternatives: Vec<RecognizeAlternative>,
}

#[derive(Debug, Deserialize)]
struct RecognizeAlternative {
    #[serde(default)]
    transcript: String,
}

impl GoogleRecognizer {
    pub fn new(client: reqwest::Client, api_key: String, endpoint: String) -> Self {
        Self {
            client,
            api_key,
            endpoint,
        }
    }

    pub fn from_config(client: reqwest::Client, services: &ServicesConfig) -> Result<Self> {
        Ok(Self::new(client, require_key(services)?, services.speech_url.clone()))
    }
}

#[async_trait]
impl SpeechRecognizer for GoogleRecognizer {
    fn name(&self) -> &str {
        "google-speech"
    }

    async fn recognize(&self, audio: &PcmAudio, locale: &str) -> Result<Recognition> {
        let payload = serde_json::json!({
            "config": {
                "encoding": "LINEAR16",
                "sampleRateHertz": audio.sample_rate,
                "languageCode": locale,
            },
            "audio": {
                "content": base64::engine::general_purpose::STANDARD.encode(&audio.wav),
            },
        });

        let body = post_json(&self.client, "Speech", &self.endpoint, &self.api_key, &payload).await?;
        let parsed: RecognizeResponse = serde_json::from_value(body)?;

        // Long utterances come back as several results; keep the best
        // alternative of each.
        let transcript = parsed
            .results
            .iter()
            .filter_map(|r| r.alternatives.first())
            .map(|a| a.transcript.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if transcript.is_empty() {
            Ok(Recognition::NoSpeech)
        } else {
            Ok(Recognition::Text(transcript))
        }
    }
}

// ── Translation ──────────────────────────────────────────────────

/// Google Cloud Translation v2 (basic).
pub struct GoogleTranslator {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl GoogleTranslator {
    pub fn new(client: reqwest::Client, api_key: String, endpoint: String) -> Self {
        Self {
            client,
            api_key,
            endpoint,
        }
    }

    pub fn from_config(client: reqwest::Client, services: &ServicesConfig) -> Result<Self> {
        Ok(Self::new(client, require_key(services)?, services.translate_url.clone()))
    }
}

#[async_trait]
impl Translator for GoogleTranslator {
    fn name(&self) -> &str {
        "google-translate"
    }

    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String> {
        let payload = serde_json::json!({
            "q": text,
            "source": source,
            "target": target,
            "format": "text",
        });

        let body = post_json(&self.client, "Translate", &self.endpoint, &self.api_key, &payload).await?;
        body["data"]["translations"][0]["translatedText"]
            .as_str()
            .map(str::to_string)
            .context("Translate response has no translatedText")
    }
}

// ── Text-to-Speech ───────────────────────────────────────────────

/// Google Text-to-Speech v1 (`text:synthesize`).
pub struct GoogleSynthesizer {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    encoding: SynthesisEncoding,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: String,
}

impl GoogleSynthesizer {
    pub fn new(
        client: reqwest::Client,
        api_key: String,
        endpoint: String,
        encoding: SynthesisEncoding,
    ) -> Self {
        Self {
            client,
            api_key,
            endpoint,
            encoding,
        }
    }

    pub fn from_config(client: reqwest::Client, services: &ServicesConfig) -> Result<Self> {
        Ok(Self::new(
            client,
            require_key(services)?,
            services.tts_url.clone(),
            services.synthesis_encoding,
        ))
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleSynthesizer {
    fn name(&self) -> &str {
        "google-tts"
    }

    async fn synthesize(&self, text: &str, language: &str) -> Result<SynthesizedAudio> {
        let payload = serde_json::json!({
            "input": { "text": text },
            "voice": { "languageCode": language },
            "audioConfig": { "audioEncoding": self.encoding.as_str() },
        });

        let body = post_json(&self.client, "TextToSpeech", &self.endpoint, &self.api_key, &payload)
            .await?;
        let parsed: SynthesizeResponse = serde_json::from_value(body)?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(parsed.audio_content)
            .context("TextToSpeech audioContent is not valid base64")?;

        if bytes.is_empty() {
            bail!("TextToSpeech returned empty audio");
        }

        Ok(SynthesizedAudio {
            bytes,
            encoding: self.encoding,
        })
    }
}
