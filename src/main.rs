use bluesky_client::{BlueskyClient, SocialClient};
use engagement_service::{
    EngagementService, FailureKind, Reporter, ServiceConfig, SharedClock, SystemClock,
};
use reciprocity_core::{AppConfig, CoreError, ErrorExt};
use std::sync::Arc;
use telegram_notifier::TelegramNotifier;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str =
    "reciprocity=info,engagement_service=info,bluesky_client=info,telegram_notifier=info";

#[tokio::main]
async fn main() -> Result<(), CoreError> {
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    match dotenv {
        Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => tracing::debug!("No .env file found"),
        Err(e) => tracing::warn!("Could not read .env file: {}", e),
    }

    tracing::info!("Starting reciprocity bot");

    let config = AppConfig::load().map_err(|e| {
        tracing::error!("{}", e.user_friendly_message());
        e
    })?;

    let clock: SharedClock = Arc::new(SystemClock::new(config.utc_offset_hours)?);
    let notifier = TelegramNotifier::from_config(&config.telegram)?;

    let client = match login(&config).await {
        Ok(client) => client,
        Err(e) => {
            Reporter::new(&notifier, clock.clone())
                .error(FailureKind::Setup, &e, Some("Bluesky login"))
                .await;
            tracing::error!("Bluesky login failed, the bot cannot run");
            return Err(e);
        }
    };

    let service = EngagementService::start(
        client,
        notifier,
        clock,
        ServiceConfig::from_app(&config),
    )
    .await?;

    service.run().await
}

async fn login(config: &AppConfig) -> Result<BlueskyClient, CoreError> {
    let client = BlueskyClient::login(&config.bluesky).await?;
    let profile = client
        .resolve_profile(&config.bluesky.identifier)
        .await
        .map_err(|e| {
            e.log_error();
            CoreError::Internal {
                message: format!("Own profile could not be verified: {}", e),
            }
        })?;
    tracing::info!("Bluesky profile verified: @{}", profile.handle);
    Ok(client)
}
