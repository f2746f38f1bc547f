use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use dolmetscher::catalog::Catalogs;
use dolmetscher::config::LogLevel;
use dolmetscher::dispatch::{format_for_path, Envelope};
use dolmetscher::session::UserId;
use dolmetscher::voice::ContainerFormat;
use dolmetscher::{Assistant, Config, InboundEvent, Notice, OutboundEvent};

/// Voice and text translation assistant.
#[derive(Parser, Debug)]
#[command(name = "dolmetscher", version, about)]
struct Cli {
    /// Config file (default: <config dir>/dolmetscher/config.toml)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load and validate the configuration, then print the catalogs
    CheckConfig,

    /// Print the configuration JSON Schema
    Schema,

    /// Translate one text message
    Translate {
        /// User id to account the message to
        #[arg(long, default_value = "cli")]
        user: String,

        /// Direction code to select first (e.g. "en_de")
        #[arg(long)]
        direction: Option<String>,

        /// Message text
        #[arg(required = true)]
        text: Vec<String>,
    },

    /// Translate one voice file; the spoken reply is written next to it
    Voice {
        #[arg(long, default_value = "cli")]
        user: String,

        #[arg(long)]
        direction: Option<String>,

        /// Container format (default: from the file extension)
        #[arg(long)]
        format: Option<ContainerFormat>,

        file: PathBuf,
    },

    /// Line-delimited JSON gateway on stdin/stdout
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if matches!(cli.command, Commands::Schema) {
        let schema = schemars::schema_for!(Config);
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    // Messages from loading the config go through a default-level
    // subscriber until the configured one is installed.
    let config = {
        let _guard = subscriber(LogLevel::default()).set_default();
        Config::load(cli.config.as_deref())?
    };
    subscriber(config.logging.level).init();

    match cli.command {
        Commands::Schema => Ok(()),
        Commands::CheckConfig => check_config(&config),
        Commands::Translate {
            user,
            direction,
            text,
        } => {
            let assistant = Assistant::from_config(&config)?;
            let user = UserId::from(user);
            select_direction(&assistant, &user, direction).await?;
            let replies = assistant
                .handle(InboundEvent::TextMessage {
                    user_id: user,
                    text: text.join(" "),
                })
                .await?;
            print_replies(&replies, None).await
        }
        Commands::Voice {
            user,
            direction,
            format,
            file,
        } => {
            let format = match format.or_else(|| format_for_path(&file)) {
                Some(f) => f,
                None => bail!("Cannot tell the audio format of {}; pass --format", file.display()),
            };
            let audio = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;

            let assistant = Assistant::from_config(&config)?;
            let user = UserId::from(user);
            select_direction(&assistant, &user, direction).await?;
            let replies = assistant
                .handle(InboundEvent::VoiceMessage {
                    user_id: user,
                    audio,
                    format,
                })
                .await?;
            print_replies(&replies, Some(&file)).await
        }
        Commands::Serve => {
            let assistant = Arc::new(Assistant::from_config(&config)?);
            let stdin = BufReader::new(tokio::io::stdin());
            serve(assistant, stdin, tokio::io::stdout()).await
        }
    }
}

/// `RUST_LOG` wins; otherwise `level`. Logs go to stderr so stdout stays
/// clean for replies.
fn subscriber(level: LogLevel) -> impl tracing::Subscriber + Send + Sync {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish()
}

// ── check-config ─────────────────────────────────────────────────

fn check_config(config: &Config) -> Result<()> {
    let catalogs = Catalogs::from_config(config)?;

    println!("Configuration OK");
    println!();
    println!("Directions (default {}):", catalogs.default_direction().code);
    for row in catalogs.directions.menu_rows() {
        let cells: Vec<String> = row
            .iter()
            .map(|d| format!("{:<8} {}", d.code, d.label))
            .collect();
        println!("  {}", cells.join("   |   "));
    }

    println!();
    println!("Tiers (default {}):", catalogs.tiers.default_tier().name);
    for tier in catalogs.tiers.iter() {
        println!("  {:<8} {:<14} {}", tier.name, tier.label, tier.quota);
    }
    println!("  access codes: {}", catalogs.tiers.code_count());

    println!();
    println!(
        "UI languages: {} (default {})",
        catalogs.ui_languages().join(", "),
        catalogs.default_ui_language()
    );
    println!("Unlimited users: {}", config.access.unlimited_users.len());
    println!("Admins: {}", config.access.admins.len());
    println!("Quota day time zone: {}", config.timezone()?);
    println!(
        "Storage: {:?}{}",
        config.storage.backend,
        match config.storage.backend {
            dolmetscher::config::StorageBackend::Sqlite =>
                format!(" ({})", config.sqlite_path()?.display()),
            dolmetscher::config::StorageBackend::Memory => String::new(),
        }
    );
    println!(
        "Pipeline: stage timeout {}s, synthesis {}",
        config.pipeline.stage_timeout_secs,
        if config.pipeline.synthesis_enabled { "on" } else { "off" }
    );
    if config.services.google_api_key.is_none() {
        println!("Warning: no Google API key configured; translate/voice/serve will refuse to start");
    }
    Ok(())
}

// ── translate / voice ────────────────────────────────────────────

async fn select_direction(
    assistant: &Assistant,
    user: &UserId,
    direction: Option<String>,
) -> Result<()> {
    let Some(code) = direction else {
        return Ok(());
    };
    let replies = assistant
        .handle(InboundEvent::DirectionSelect {
            user_id: user.clone(),
            code: code.clone(),
        })
        .await?;
    if replies
        .iter()
        .any(|r| matches!(r, OutboundEvent::Notice(Notice::UnknownSelection { .. })))
    {
        bail!("Unknown direction '{code}'");
    }
    Ok(())
}

async fn print_replies(replies: &[OutboundEvent], source_file: Option<&Path>) -> Result<()> {
    for reply in replies {
        match reply {
            OutboundEvent::Transcript { text, language } => println!("[{language}] {text}"),
            OutboundEvent::TextReply { text, language } => println!("[{language}] → {text}"),
            OutboundEvent::VoiceReply { audio, format } => match source_file {
                Some(file) => {
                    let out = file.with_extension(format!("reply.{}", format.extension()));
                    tokio::fs::write(&out, audio)
                        .await
                        .with_context(|| format!("Failed to write {}", out.display()))?;
                    println!("voice reply: {}", out.display());
                }
                None => println!("voice reply: {} bytes ({})", audio.len(), format.as_str()),
            },
            OutboundEvent::Notice(notice) => {
                println!("notice: {}", serde_json::to_string(notice)?);
            }
            OutboundEvent::Status(report) => {
                println!("{}", serde_json::to_string_pretty(report)?);
            }
        }
    }
    Ok(())
}

// ── serve ────────────────────────────────────────────────────────

/// Read `InboundEvent` JSON lines from `input`, handle each on its own task,
/// write one `Envelope` line per event to `output`.
///
/// Stops reading as soon as `output` fails, so no further messages are
/// charged for replies that cannot be delivered.
async fn serve<R, W>(assistant: Arc<Assistant>, input: R, mut output: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    tracing::info!(
        directions = assistant.catalogs().directions.len(),
        backend = assistant.store().backend_name(),
        "Serving JSON lines on stdin/stdout"
    );

    let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
    let mut writer = tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            let mut line = serde_json::to_vec(&envelope)?;
            line.push(b'\n');
            output.write_all(&line).await?;
            output.flush().await?;
        }
        anyhow::Ok(())
    });

    let mut tasks = JoinSet::new();
    let mut lines = input.lines();

    loop {
        let next = tokio::select! {
            next = lines.next_line() => next?,
            // The writer holds the only receiver; while `tx` is alive it
            // can only finish by failing.
            finished = &mut writer => {
                finished.context("Reply writer panicked")??;
                bail!("Reply writer stopped");
            }
        };
        let Some(line) = next else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let event: InboundEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("Skipping malformed event: {e}");
                continue;
            }
        };

        let assistant = Arc::clone(&assistant);
        let tx = tx.clone();
        tasks.spawn(async move {
            let request_id = uuid::Uuid::new_v4();
            let user_id = event.user_id().clone();
            let kind = event.kind();
            let start = Instant::now();

            let envelope = match assistant.handle(event).await {
                Ok(events) => Envelope {
                    user_id,
                    events,
                    error: None,
                },
                Err(e) => {
                    tracing::error!(%request_id, user_id = %user_id, kind, "Event failed: {e:#}");
                    Envelope {
                        user_id,
                        events: Vec::new(),
                        error: Some("temporarily unavailable".into()),
                    }
                }
            };

            tracing::debug!(
                %request_id,
                kind,
                elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                "Event handled"
            );
            if let Err(mpsc::error::SendError(lost)) = tx.send(envelope) {
                tracing::warn!(%request_id, user_id = %lost.user_id, kind, "Output closed, reply dropped");
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::error!("Event task panicked: {e}");
        }
    }
    drop(tx);
    writer.await??;

    tracing::info!("Input closed, shutting down");
    Ok(())
}
