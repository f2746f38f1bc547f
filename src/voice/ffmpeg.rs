//! ffmpeg-based transcoder: any supported voice container → 16-bit mono WAV.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::traits::{AudioInput, AudioTranscoder, PcmAudio};

/// Runs `ffmpeg` as a child process, streaming audio through stdin/stdout.
pub struct FfmpegTranscoder {
    program: String,
    sample_rate: u32,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<String>, sample_rate: u32) -> Self {
        Self {
            program: program.into(),
            sample_rate,
        }
    }

    fn args(&self, audio: &AudioInput) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-nostdin"]
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        let rate = self.sample_rate.to_string();
        if let Some(demuxer) = audio.format.ffmpeg_demuxer() {
            args.extend(["-f".into(), demuxer.into()]);
        }
        args.extend(
            [
                "-i",
                "pipe:0",
                "-vn",
                "-ac",
                "1",
                "-ar",
                rate.as_str(),
                "-acodec",
                "pcm_s16le",
                "-f",
                "wav",
                "pipe:1",
            ]
            .iter()
            .map(|s| (*s).to_string()),
        );
        args
    }
}

#[async_trait]
impl AudioTranscoder for FfmpegTranscoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn transcode(&self, audio: &AudioInput) -> Result<PcmAudio> {
        if audio.bytes.is_empty() {
            bail!("Empty {} input", audio.format.extension());
        }

        let mut child = Command::new(&self.program)
            .args(self.args(audio))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start '{}'", self.program))?;

        // Feed stdin from a separate task so a full stdout pipe cannot
        // deadlock the write.
        let mut stdin = child.stdin.take().context("ffmpeg stdin not captured")?;
        let input = audio.bytes.clone();
        let writer = tokio::spawn(async move {
            stdin.write_all(&input).await?;
            stdin.shutdown().await
        });

        let output = child
            .wait_with_output()
            .await
            .context("Failed to wait for ffmpeg")?;

        // A broken pipe here just means ffmpeg stopped reading early; the
        // exit status below is the real verdict.
        if let Ok(Err(e)) = writer.await {
            tracing::debug!("ffmpeg stdin closed early: {e}");
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("ffmpeg exited with {}: {}", output.status, stderr.trim());
        }
        if output.stdout.is_empty() {
            bail!("ffmpeg produced no audio");
        }

        Ok(PcmAudio {
            wav: output.stdout,
            sample_rate: self.sample_rate,
        })
    }
}
