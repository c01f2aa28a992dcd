use crate::failure::FailureKind;
use crate::fetcher::EngagementFetcher;
use crate::reciprocator::Reciprocator;
use crate::reconciler::{CycleReport, Reconciler};
use crate::report::{Reporter, SharedClock};
use crate::schedule::{next_scheduled_time, LocalTime};
use crate::session::Session;
use bluesky_client::SocialClient;
use futures::FutureExt;
use reciprocity_core::{parse_post_url, AppConfig, AtUri, CoreError, Did, PacingConfig, TargetPost};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use telegram_notifier::Notifier;
use tokio::time::sleep;
use tracing::{info, warn};

const PREVIEW_CHARS: usize = 50;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub target_post_url: String,
    pub feed_limit: u32,
    pub pacing: PacingConfig,
}

impl ServiceConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            target_post_url: config.target_post_url.clone(),
            feed_limit: config.feed_limit,
            pacing: config.pacing,
        }
    }
}

async fn target_uri<C: SocialClient>(client: &C, url: &str) -> Result<AtUri, CoreError> {
    let (actor, rkey) = parse_post_url(url)?;
    let did = if actor.starts_with("did:") {
        Did::new(actor)
    } else {
        client.resolve_profile(&actor).await?.did
    };
    Ok(AtUri::post(&did, rkey))
}

/// Resolves the web link once. A failure is reported and yields the placeholder.
pub async fn resolve_target<C: SocialClient, N: Notifier>(
    client: &C,
    reporter: &Reporter<N>,
    url: &str,
) -> TargetPost {
    match target_uri(client, url).await {
        Ok(uri) => {
            info!("Target post URI: {}", uri);
            TargetPost::resolved(url, uri)
        }
        Err(e) => {
            reporter
                .error(FailureKind::Setup, &e, Some(format!("target post {}", url).as_str()))
                .await;
            warn!("Continuing with an unresolved target post");
            TargetPost::placeholder(url)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

/// The scheduled engagement loop and the state it carries.
pub struct EngagementService<C, N> {
    client: C,
    reporter: Reporter<N>,
    config: ServiceConfig,
    session: Session,
}

impl<C: SocialClient, N: Notifier> EngagementService<C, N> {
    /// Resolves the target post and checks that it can be fetched.
    pub async fn start(
        client: C,
        notifier: N,
        clock: SharedClock,
        config: ServiceConfig,
    ) -> Result<Self, CoreError> {
        let reporter = Reporter::new(notifier, clock);
        let target = resolve_target(&client, &reporter, &config.target_post_url).await;

        match client.get_post(&target.uri).await {
            Ok(post) => info!("Target post found: {}...", preview(&post.text)),
            Err(e) => {
                reporter
                    .error(
                        FailureKind::Setup,
                        &e,
                        Some(format!("target post {} could not be fetched", target.url).as_str()),
                    )
                    .await;
                return Err(e);
            }
        }

        Ok(Self {
            client,
            reporter,
            config,
            session: Session::new(target),
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Fetch, classify, reciprocate, report.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let target = self.session.target.uri.clone();
        info!("Checking engagement on {}", target);

        let engagement = EngagementFetcher::new(&self.client, &self.reporter)
            .fetch(&target)
            .await;

        let reciprocator = Reciprocator::new(
            &self.client,
            &self.reporter,
            self.config.feed_limit,
            self.config.pacing.after_reply,
        );
        let reconciler = Reconciler::new(&self.reporter, reciprocator, self.config.pacing.between_users);
        reconciler
            .reconcile(&engagement, &mut self.session.processed)
            .await
    }

    /// Runs a cycle if the schedule says so right now.
    pub async fn poll_schedule(&mut self) -> Option<CycleReport> {
        let now = self.reporter.now();
        if !self.session.gate.is_scheduled_check_time(&now) {
            return None;
        }
        self.session.gate.note_day(&now);
        info!("Scheduled check at {}", now.format("%H:%M"));
        Some(self.run_cycle().await)
    }

    pub fn until_next_check(&self) -> (LocalTime, Duration) {
        let now = self.reporter.now();
        let next = next_scheduled_time(&now);
        let wait = next.signed_duration_since(now).to_std().unwrap_or_default();
        (next, wait)
    }

    async fn step(&mut self) {
        if let Some(report) = self.poll_schedule().await {
            info!(
                "Cycle done: {} users, {} reciprocal actions, {} replied / {} liked so far",
                report.outcomes.len(),
                report.mutations(),
                self.session.processed.replied_count(),
                self.session.processed.liked_count()
            );
        }

        let (next, wait) = self.until_next_check();
        info!(
            "Next check at {} ({} minutes)",
            next.format("%H:%M"),
            wait.as_secs() / 60
        );
        sleep(wait).await;
    }

    /// Never returns. A panicking iteration is reported and the loop resumes after
    /// the error backoff.
    pub async fn run(mut self) -> Result<(), CoreError> {
        info!("Entering main loop");
        loop {
            if let Err(payload) = AssertUnwindSafe(self.step()).catch_unwind().await {
                let message = panic_message(payload.as_ref());
                self.reporter
                    .failure(FailureKind::Loop, &message, None)
                    .await;
                sleep(self.config.pacing.error_backoff).await;
            }
        }
    }
}
