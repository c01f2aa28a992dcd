//! Turns a snapshot of engagement into one reciprocal action per user.

use crate::fetcher::Engagement;
use crate::reciprocator::{ReciprocationOutcome, Reciprocator};
use crate::report::{detail_report, summary_report, Reporter};
use crate::session::ProcessedSet;
use bluesky_client::SocialClient;
use reciprocity_core::{Actor, Did};
use std::collections::HashSet;
use std::time::Duration;
use telegram_notifier::Notifier;
use tokio::time::sleep;
use tracing::{debug, info};

/// Users split by how they engaged. Each class keeps first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub both: Vec<Actor>,
    pub comment_only: Vec<Actor>,
    pub like_only: Vec<Actor>,
}

impl Classification {
    pub fn classify(engagement: &Engagement) -> Self {
        let likers: HashSet<&Did> = engagement.likes.iter().map(|l| &l.actor.did).collect();
        let commenters: HashSet<&Did> = engagement.comments.iter().map(|c| &c.author.did).collect();

        let mut seen = HashSet::new();
        let mut classes = Self::default();

        for comment in &engagement.comments {
            let author = &comment.author;
            if !seen.insert(&author.did) {
                continue;
            }
            if likers.contains(&author.did) {
                classes.both.push(author.clone());
            } else {
                classes.comment_only.push(author.clone());
            }
        }

        for like in &engagement.likes {
            let actor = &like.actor;
            if seen.insert(&actor.did) && !commenters.contains(&actor.did) {
                classes.like_only.push(actor.clone());
            }
        }

        classes
    }

    pub fn total_users(&self) -> usize {
        self.both.len() + self.comment_only.len() + self.like_only.len()
    }
}

/// One user to reciprocate, in processing order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAction {
    pub user: Actor,
    pub has_commented: bool,
    pub has_liked: bool,
}

/// Commenters first, in list order, then likers who did not comment.
pub fn plan_actions(engagement: &Engagement) -> Vec<PlannedAction> {
    let likers: HashSet<&Did> = engagement.likes.iter().map(|l| &l.actor.did).collect();

    let commenters = engagement.comments.iter().map(|comment| PlannedAction {
        user: comment.author.clone(),
        has_commented: true,
        has_liked: likers.contains(&comment.author.did),
    });
    let likes_only = engagement.likes.iter().map(|like| PlannedAction {
        user: like.actor.clone(),
        has_commented: false,
        has_liked: true,
    });

    commenters.chain(likes_only).collect()
}

#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub classification: Classification,
    pub outcomes: Vec<(Did, ReciprocationOutcome)>,
}

impl CycleReport {
    pub fn mutations(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.is_mutation())
            .count()
    }
}

pub struct Reconciler<'a, C, N> {
    reporter: &'a Reporter<N>,
    reciprocator: Reciprocator<'a, C, N>,
    between_users: Duration,
}

impl<'a, C: SocialClient, N: Notifier> Reconciler<'a, C, N> {
    pub fn new(
        reporter: &'a Reporter<N>,
        reciprocator: Reciprocator<'a, C, N>,
        between_users: Duration,
    ) -> Self {
        Self {
            reporter,
            reciprocator,
            between_users,
        }
    }

    pub async fn reconcile(
        &self,
        engagement: &Engagement,
        processed: &mut ProcessedSet,
    ) -> CycleReport {
        processed.begin_cycle();

        let classification = Classification::classify(engagement);
        info!(
            "Engagement: {} comments, {} likes, {} both, {} comment only, {} like only",
            engagement.comments.len(),
            engagement.likes.len(),
            classification.both.len(),
            classification.comment_only.len(),
            classification.like_only.len()
        );

        let now = self.reporter.now();
        self.reporter
            .send(&summary_report(
                &now,
                engagement.comments.len(),
                engagement.likes.len(),
                &classification,
            ))
            .await;
        for message in detail_report(&classification) {
            self.reporter.send(&message).await;
        }

        let mut outcomes = Vec::new();
        for action in plan_actions(engagement) {
            if !processed.claim_user(&action.user.did) {
                debug!("{} already handled this cycle", action.user.did);
                continue;
            }
            if !outcomes.is_empty() {
                sleep(self.between_users).await;
            }

            info!(
                "Processing @{} ({}), commented: {}, liked: {}",
                action.user.handle, action.user.did, action.has_commented, action.has_liked
            );
            let outcome = self
                .reciprocator
                .reciprocate(processed, &action.user, action.has_commented, action.has_liked)
                .await;
            outcomes.push((action.user.did, outcome));
        }

        info!("Cycle finished, {} users processed", processed.cycle_user_count());
        CycleReport {
            classification,
            outcomes,
        }
    }
}
