//! Likes or replies to a user's latest original post.

use crate::failure::FailureKind;
use crate::report::{like_notice, reply_notice, Reporter};
use crate::schedule::is_operating_window;
use crate::session::ProcessedSet;
use bluesky_client::SocialClient;
use reciprocity_core::{Actor, AtUri, CoreError, Did, Post, UNKNOWN_HANDLE};
use std::time::Duration;
use telegram_notifier::Notifier;
use tokio::time::sleep;
use tracing::{debug, info};

pub const REPLY_TEXT: &str = "Harika bir paylaşım! 👏";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReciprocationOutcome {
    Replied { post: AtUri },
    Liked { post: AtUri },
    /// The post was already replied to or liked by this process.
    AlreadyReciprocated { post: AtUri },
    NoOriginalPost,
    OutsideWindow,
    /// Neither commented nor liked.
    NothingToDo,
    Failed(FailureKind),
}

impl ReciprocationOutcome {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            ReciprocationOutcome::Replied { .. } | ReciprocationOutcome::Liked { .. }
        )
    }
}

pub struct Reciprocator<'a, C, N> {
    client: &'a C,
    reporter: &'a Reporter<N>,
    feed_limit: u32,
    after_reply: Duration,
}

impl<'a, C: SocialClient, N: Notifier> Reciprocator<'a, C, N> {
    pub fn new(
        client: &'a C,
        reporter: &'a Reporter<N>,
        feed_limit: u32,
        after_reply: Duration,
    ) -> Self {
        Self {
            client,
            reporter,
            feed_limit,
            after_reply,
        }
    }

    /// Newest post by `user` that is neither a reply nor a repost.
    pub async fn latest_original_post(&self, user: &Did) -> Result<Option<Post>, CoreError> {
        let feed = self.client.get_author_feed(user, self.feed_limit).await?;
        Ok(feed
            .into_iter()
            .find(|item| item.is_original_by(user))
            .map(|item| item.post))
    }

    /// At most one like or reply for `user`. Never fails; problems are reported and
    /// show up in the outcome.
    pub async fn reciprocate(
        &self,
        processed: &mut ProcessedSet,
        user: &Actor,
        has_commented: bool,
        has_liked: bool,
    ) -> ReciprocationOutcome {
        let now = self.reporter.now();
        if !is_operating_window(&now) {
            info!(
                "Outside operating hours ({}), not acting for @{}",
                now.format("%H:%M"),
                user.handle
            );
            return ReciprocationOutcome::OutsideWindow;
        }

        let latest = match self.latest_original_post(&user.did).await {
            Ok(Some(post)) => post,
            Ok(None) => {
                info!("@{} has no original post to reciprocate on", user.handle);
                return ReciprocationOutcome::NoOriginalPost;
            }
            Err(e) => {
                self.reporter
                    .error(FailureKind::Fetch, &e, Some(format!("feed of {}", user.did).as_str()))
                    .await;
                return ReciprocationOutcome::Failed(FailureKind::Fetch);
            }
        };
        debug!("Latest original post of @{}: {}", user.handle, latest.uri);

        if has_commented {
            if processed.is_replied(&latest.uri) {
                debug!("Already replied to {}", latest.uri);
                return ReciprocationOutcome::AlreadyReciprocated { post: latest.uri };
            }
            return self.reply(processed, user, &latest).await;
        }

        if has_liked {
            if processed.is_liked(&latest.uri) {
                debug!("Already liked {}", latest.uri);
                return ReciprocationOutcome::AlreadyReciprocated { post: latest.uri };
            }
            return self.like(processed, user, &latest.uri).await;
        }

        ReciprocationOutcome::NothingToDo
    }

    async fn reply(
        &self,
        processed: &mut ProcessedSet,
        user: &Actor,
        post: &Post,
    ) -> ReciprocationOutcome {
        let target = post.to_ref();
        let handle = self.display_handle(user).await;

        if let Err(e) = self.client.create_reply(REPLY_TEXT, &target, &target).await {
            let context = format!("user @{} ({}), post {}", handle, user.did, post.uri.to_web_url());
            self.reporter
                .error(FailureKind::Mutation, &e, Some(context.as_str()))
                .await;
            return ReciprocationOutcome::Failed(FailureKind::Mutation);
        }

        processed.record_reply(post.uri.clone());
        info!("Replied to {} by @{}", post.uri, handle);
        self.reporter
            .send(&reply_notice(&handle, &post.uri, REPLY_TEXT))
            .await;
        sleep(self.after_reply).await;

        ReciprocationOutcome::Replied {
            post: post.uri.clone(),
        }
    }

    async fn like(
        &self,
        processed: &mut ProcessedSet,
        user: &Actor,
        uri: &AtUri,
    ) -> ReciprocationOutcome {
        let handle = self.display_handle(user).await;
        let context = || format!("user @{} ({}), post {}", handle, user.did, uri.to_web_url());

        // The like needs the post's current CID.
        let post = match self.client.get_post(uri).await {
            Ok(post) => post,
            Err(e) => {
                self.reporter
                    .error(FailureKind::Fetch, &e, Some(context().as_str()))
                    .await;
                return ReciprocationOutcome::Failed(FailureKind::Fetch);
            }
        };

        if let Err(e) = self.client.create_like(&post.to_ref()).await {
            self.reporter
                .error(FailureKind::Mutation, &e, Some(context().as_str()))
                .await;
            return ReciprocationOutcome::Failed(FailureKind::Mutation);
        }

        processed.record_like(uri.clone());
        info!("Liked {} by @{}", uri, handle);
        self.reporter.send(&like_notice(&handle, uri)).await;

        ReciprocationOutcome::Liked { post: uri.clone() }
    }

    async fn display_handle(&self, user: &Actor) -> String {
        if user.has_known_handle() {
            return user.handle.clone();
        }
        match self.client.resolve_profile(user.did.as_str()).await {
            Ok(profile) if profile.has_known_handle() => profile.handle,
            Ok(_) => UNKNOWN_HANDLE.to_string(),
            Err(e) => {
                debug!("Profile lookup for {} failed: {}", user.did, e);
                UNKNOWN_HANDLE.to_string()
            }
        }
    }
}
