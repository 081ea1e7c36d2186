//! Status notifications: message rendering, the `Notifier` seam, the Telegram
//! Bot API client, and the photo-then-text dispatcher.
//!
//! Notification failures never propagate past [`NotificationDispatcher::dispatch`];
//! they come back as a [`DispatchOutcome`] for the loop to log.

#![allow(missing_docs)]

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::blocking::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

use crate::core::errors::DispatchError;
use crate::daemon::artifact::ImageArtifact;
use crate::device::sampler::{PrintStatus, TelemetrySnapshot};
use crate::logger::activity::ActivityLoggerHandle;

// ──────────────────── configuration ────────────────────

/// Notifier credentials and transport settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NotificationConfig {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub api_base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            api_base_url: "https://api.telegram.org".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl NotificationConfig {
    /// Both the bot token and the chat id are set.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        present(&self.bot_token) && present(&self.chat_id)
    }
}

// ──────────────────── message rendering ────────────────────

/// Icon shown in front of the status line.
#[must_use]
pub fn status_icon(status: &PrintStatus) -> &'static str {
    match status {
        PrintStatus::Paused => "⏸️",
        PrintStatus::Running => "🚀",
        PrintStatus::Finished => "✅",
        _ => "ℹ️",
    }
}

/// Escape text for Telegram MarkdownV2.
#[must_use]
pub fn escape_markdown_v2(text: &str) -> String {
    const SPECIAL: &[char] = &[
        '\\', '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.',
        '!',
    ];
    let mut out = String::with_capacity(text.len() + 8);
    for ch in text.chars() {
        if SPECIAL.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Notification text in MarkdownV2: a header line followed by a block quote.
#[must_use]
pub fn render_message(snapshot: &TelemetrySnapshot) -> String {
    let header = format!(
        "{} {} - {}",
        status_icon(&snapshot.status),
        snapshot.status,
        snapshot.sub_status
    );
    let quoted = [
        format!("Percentage: {}%", snapshot.percentage),
        format!("Bed temp: {}ºC", snapshot.bed_display()),
        format!("Nozzle temp: {}ºC", snapshot.nozzle_display()),
        format!("Remaining time: {}m", snapshot.remaining_display()),
        format!("Finish time: {}", snapshot.finish_time),
    ];

    let mut lines = Vec::with_capacity(quoted.len() + 1);
    lines.push(escape_markdown_v2(&header));
    lines.extend(quoted.iter().map(|line| format!(">{}", escape_markdown_v2(line))));
    lines.join("\n")
}

// ──────────────────── notifier seam ────────────────────

/// A chat backend able to post the rendered message.
pub trait Notifier: Send {
    fn name(&self) -> &'static str;
    fn send_message(&self, text: &str) -> Result<(), DispatchError>;
    fn send_photo(&self, photo: &ImageArtifact, caption: &str) -> Result<(), DispatchError>;
}

// ──── Telegram Bot API ────

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramNotifier {
    client: Client,
    endpoint: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn from_config(config: &NotificationConfig) -> Result<Self, DispatchError> {
        let (Some(token), Some(chat_id)) = (&config.bot_token, &config.chat_id) else {
            return Err(DispatchError::Disabled {
                details: "bot token and chat id are both required".to_string(),
            });
        };
        if !config.is_configured() {
            return Err(DispatchError::Disabled {
                details: "bot token or chat id is blank".to_string(),
            });
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| DispatchError::Transport {
                details: e.without_url().to_string(),
            })?;

        Ok(Self {
            client,
            endpoint: format!("{}/bot{token}", config.api_base_url.trim_end_matches('/')),
            chat_id: chat_id.clone(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{method}", self.endpoint)
    }

    fn check(response: reqwest::blocking::Response) -> Result<(), DispatchError> {
        let status = response.status();
        let parsed: Option<TelegramResponse> = response.json().ok();
        match parsed {
            Some(TelegramResponse { ok: true, .. }) if status.is_success() => Ok(()),
            Some(body) => Err(DispatchError::Rejected {
                status: status.as_u16(),
                description: body
                    .description
                    .unwrap_or_else(|| "no description".to_string()),
            }),
            None => Err(DispatchError::Rejected {
                status: status.as_u16(),
                description: "unparseable Bot API response".to_string(),
            }),
        }
    }
}

/// The request URL embeds the bot token, so it is stripped from error text.
fn transport(error: reqwest::Error) -> DispatchError {
    DispatchError::Transport {
        details: error.without_url().to_string(),
    }
}

impl Notifier for TelegramNotifier {
    fn name(&self) -> &'static str {
        "telegram"
    }

    fn send_message(&self, text: &str) -> Result<(), DispatchError> {
        let payload = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "MarkdownV2",
        });
        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&payload)
            .send()
            .map_err(transport)?;
        Self::check(response)
    }

    fn send_photo(&self, photo: &ImageArtifact, caption: &str) -> Result<(), DispatchError> {
        let file_name = photo
            .path()
            .file_name()
            .map_or_else(|| "status.png".to_string(), |n| n.to_string_lossy().into_owned());
        let part = Part::bytes(photo.bytes().to_vec())
            .file_name(file_name)
            .mime_str("image/png")
            .map_err(transport)?;
        let form = Form::new()
            .text("chat_id", self.chat_id.clone())
            .text("caption", caption.to_string())
            .text("parse_mode", "MarkdownV2")
            .part("photo", part);
        let response = self
            .client
            .post(self.method_url("sendPhoto"))
            .multipart(form)
            .send()
            .map_err(transport)?;
        Self::check(response)
    }
}

// ──────────────────── dispatcher ────────────────────

/// What happened to one notification.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// No notifier configured.
    Skipped,
    /// Photo with caption delivered.
    Delivered,
    /// Photo failed; the text-only message went through.
    DeliveredViaFallback,
    /// Both attempts failed; carries the text attempt's error.
    Failed(DispatchError),
}

impl DispatchOutcome {
    /// Short label for log lines.
    #[must_use]
    pub const fn via(&self) -> &'static str {
        match self {
            Self::Skipped => "none",
            Self::Delivered => "photo",
            Self::DeliveredViaFallback => "text",
            Self::Failed(_) => "failed",
        }
    }
}

/// Renders a snapshot and delivers it, photo first, text as fallback.
pub struct NotificationDispatcher {
    notifier: Option<Box<dyn Notifier>>,
    logger: ActivityLoggerHandle,
}

impl NotificationDispatcher {
    /// Telegram when configured, otherwise disabled with a warning.
    #[must_use]
    pub fn from_config(config: &NotificationConfig, logger: ActivityLoggerHandle) -> Self {
        if !config.is_configured() {
            logger.warning("Telegram bot not configured - notifications disabled");
            return Self::disabled(logger);
        }
        match TelegramNotifier::from_config(config) {
            Ok(notifier) => Self::with_notifier(Box::new(notifier), logger),
            Err(e) => {
                logger.error(format!("Telegram client setup failed, notifications disabled: {e}"));
                Self::disabled(logger)
            }
        }
    }

    #[must_use]
    pub fn with_notifier(notifier: Box<dyn Notifier>, logger: ActivityLoggerHandle) -> Self {
        Self {
            notifier: Some(notifier),
            logger,
        }
    }

    #[must_use]
    pub fn disabled(logger: ActivityLoggerHandle) -> Self {
        Self {
            notifier: None,
            logger,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.notifier.is_some()
    }

    pub fn dispatch(&self, snapshot: &TelemetrySnapshot, image: &ImageArtifact) -> DispatchOutcome {
        let Some(notifier) = &self.notifier else {
            self.logger
                .info("Telegram bot not configured, skipping notification.");
            return DispatchOutcome::Skipped;
        };

        let message = render_message(snapshot);
        self.logger.info(format!(
            "Sending notification - Status: '{}', Extended: '{}'",
            snapshot.status, snapshot.sub_status
        ));

        let photo_error = match notifier.send_photo(image, &message) {
            Ok(()) => return DispatchOutcome::Delivered,
            Err(e) => e,
        };
        self.logger.error(format!(
            "Failed to send {} photo message: {photo_error}",
            notifier.name()
        ));
        self.logger.info("Attempting fallback to text message");

        match notifier.send_message(&message) {
            Ok(()) => DispatchOutcome::DeliveredViaFallback,
            Err(e) => {
                self.logger
                    .error(format!("Fallback text message also failed: {e}"));
                DispatchOutcome::Failed(e)
            }
        }
    }
}

// ──────────────────── tests ────────────────────
