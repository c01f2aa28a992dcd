pub mod policy;

pub use policy::{BreakerState, DeliveryPolicy, DeliveryPolicyConfig, RateLimitDecision};

use reciprocity_core::{CoreError, ErrorExt, NotifierError, TelegramConfig};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub const EMERGENCY_ALERT: &str =
    "⚠️ <b>The notification channel keeps rate limiting the bot.</b> Please check on it.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// Gave up after the channel kept answering 429.
    RateLimited,
    /// Dropped without sending because the circuit is open.
    Suppressed,
    Failed,
    /// No channel configured.
    Disabled,
}

/// Best-effort delivery of HTML-formatted operational messages.
#[allow(async_fn_in_trait)]
pub trait Notifier {
    async fn send(&self, html: &str) -> DeliveryOutcome;
}

impl<N: Notifier + ?Sized> Notifier for &N {
    async fn send(&self, html: &str) -> DeliveryOutcome {
        (**self).send(html).await
    }
}

impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    async fn send(&self, html: &str) -> DeliveryOutcome {
        (**self).send(html).await
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawResponseParameters {
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawBotResponse {
    ok: bool,
    description: Option<String>,
    parameters: Option<RawResponseParameters>,
}

#[derive(Debug, Clone)]
struct Channel {
    send_url: String,
    chat_id: String,
}

/// Telegram Bot API `sendMessage` with `parse_mode=HTML`.
#[derive(Debug)]
pub struct TelegramNotifier {
    http_client: Client,
    channel: Option<Channel>,
    policy: Mutex<DeliveryPolicy>,
}

impl TelegramNotifier {
    pub fn from_config(config: &TelegramConfig) -> Result<Self, CoreError> {
        Self::with_policy(config, DeliveryPolicyConfig::default())
    }

    pub fn with_policy(
        config: &TelegramConfig,
        policy: DeliveryPolicyConfig,
    ) -> Result<Self, CoreError> {
        let http_client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        let channel = match (&config.bot_token, &config.channel_id) {
            (Some(token), Some(chat_id)) => Some(Channel {
                send_url: format!(
                    "{}/bot{}/sendMessage",
                    config.api_base.trim_end_matches('/'),
                    token
                ),
                chat_id: chat_id.clone(),
            }),
            _ => {
                warn!("Telegram bot token or channel id missing, notifications disabled");
                None
            }
        };

        Ok(Self {
            http_client,
            channel,
            policy: Mutex::new(DeliveryPolicy::new(policy)),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.channel.is_some()
    }

    pub async fn breaker_state(&self) -> BreakerState {
        self.policy.lock().await.state()
    }

    async fn post(&self, html: &str) -> Result<(), NotifierError> {
        let channel = self.channel.as_ref().ok_or(NotifierError::NotConfigured)?;

        let body = json!({
            "chat_id": channel.chat_id,
            "text": html,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        let response = self
            .http_client
            .post(&channel.send_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifierError::DeliveryFailed {
                reason: e.to_string(),
            })?;

        let status = response.status();
        let raw: RawBotResponse = response.json().await.unwrap_or_default();

        if status.is_success() && raw.ok {
            return Ok(());
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = raw.parameters.and_then(|p| p.retry_after);
            return Err(NotifierError::RateLimited {
                // zero means the channel did not say
                retry_after: retry_after.unwrap_or(0),
            });
        }
        Err(NotifierError::Rejected {
            status_code: status.as_u16(),
            description: raw.description.unwrap_or_default(),
        })
    }
}

impl Notifier for TelegramNotifier {
    async fn send(&self, html: &str) -> DeliveryOutcome {
        let mut attempt = 0;
        loop {
            let retry_after = match self.post(html).await {
                Ok(()) => {
                    self.policy.lock().await.on_success();
                    debug!("Notification delivered");
                    return DeliveryOutcome::Delivered;
                }
                Err(NotifierError::NotConfigured) => return DeliveryOutcome::Disabled,
                Err(e @ NotifierError::RateLimited { .. }) => e.retry_after().map(|d| d.as_secs()),
                Err(e) => {
                    e.log_warn();
                    return DeliveryOutcome::Failed;
                }
            };

            let decision = self.policy.lock().await.on_rate_limited(retry_after, attempt);
            match decision {
                RateLimitDecision::Retry(wait) => {
                    info!("Notification rate limited, retrying in {:?}", wait);
                    sleep(wait).await;
                    attempt += 1;
                }
                RateLimitDecision::GiveUp => {
                    warn!("Notification dropped after {} rate-limited attempts", attempt + 1);
                    return DeliveryOutcome::RateLimited;
                }
                RateLimitDecision::Escalate => {
                    if let Err(e) = self.post(EMERGENCY_ALERT).await {
                        error!("Emergency alert could not be delivered: {}", e);
                    }
                    return DeliveryOutcome::RateLimited;
                }
                RateLimitDecision::Drop => {
                    debug!("Circuit open, notification suppressed");
                    return DeliveryOutcome::Suppressed;
                }
            }
        }
    }
}
