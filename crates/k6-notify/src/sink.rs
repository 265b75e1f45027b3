use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{error, info};

use crate::cli::RunContext;
use crate::config::SlackSettings;
use crate::payload::NotificationPayload;

/// Destination for a finished report.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn deliver(&self, payload: &NotificationPayload) -> Result<()>;
}

pub fn sink_for(dry_run: bool, ctx: &RunContext, slack: &SlackSettings) -> Result<Box<dyn Sink>> {
    if dry_run {
        return Ok(Box::new(StdoutSink));
    }
    Ok(Box::new(SlackSink::new(
        &slack.api_url,
        &ctx.slack_token,
        slack.timeout(),
    )?))
}

/// Deliver once and log the outcome. Failures are logged, never retried.
pub async fn notify(sink: &dyn Sink, payload: &NotificationPayload) {
    match sink.deliver(payload).await {
        Ok(()) => info!("notification delivered to {}", payload.channel),
        Err(e) => error!("failed to deliver notification: {e:#}"),
    }
}

/// Posts through Slack's `chat.postMessage` Web API.
pub struct SlackSink {
    client: reqwest::Client,
    api_url: String,
    token: String,
}

/// The part of a Web API response we look at. Slack reports most errors
/// with HTTP 200 and `ok: false`.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

impl SlackSink {
    pub fn new(api_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Building HTTP client")?;
        Ok(Self {
            client,
            api_url: api_url.to_string(),
            token: token.to_string(),
        })
    }
}

#[async_trait]
impl Sink for SlackSink {
    async fn deliver(&self, payload: &NotificationPayload) -> Result<()> {
        let resp = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.token)
            .json(payload)
            .send()
            .await
            .with_context(|| format!("Posting to {}", self.api_url))?
            .error_for_status()
            .with_context(|| "Slack API error")?;

        let body: ApiResponse = resp
            .json()
            .await
            .with_context(|| "Decoding Slack API response")?;
        if !body.ok {
            anyhow::bail!(
                "Slack rejected the message: {}",
                body.error.as_deref().unwrap_or("unknown error")
            );
        }
        Ok(())
    }
}

/// Prints the payload instead of sending it.
pub struct StdoutSink;

#[async_trait]
impl Sink for StdoutSink {
    async fn deliver(&self, payload: &NotificationPayload) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(payload)?);
        Ok(())
    }
}
