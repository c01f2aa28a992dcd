use crate::failure::FailureKind;
use crate::report::Reporter;
use bluesky_client::SocialClient;
use reciprocity_core::{AtUri, Comment, Like};
use telegram_notifier::Notifier;
use tracing::info;

/// Current engagement on the target post.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Engagement {
    pub comments: Vec<Comment>,
    pub likes: Vec<Like>,
}

/// Read-only view of who commented on and liked a post. Failures degrade to empty lists.
pub struct EngagementFetcher<'a, C, N> {
    client: &'a C,
    reporter: &'a Reporter<N>,
}

impl<'a, C: SocialClient, N: Notifier> EngagementFetcher<'a, C, N> {
    pub fn new(client: &'a C, reporter: &'a Reporter<N>) -> Self {
        Self { client, reporter }
    }

    pub async fn fetch_comments(&self, post: &AtUri) -> Vec<Comment> {
        match self.client.get_post_thread(post).await {
            Ok(thread) => {
                info!("Found {} comments on {}", thread.replies.len(), post);
                thread.replies
            }
            Err(e) => {
                self.reporter
                    .error(FailureKind::Fetch, &e, Some(format!("comments of {}", post).as_str()))
                    .await;
                Vec::new()
            }
        }
    }

    pub async fn fetch_likers(&self, post: &AtUri) -> Vec<Like> {
        match self.client.get_likes(post).await {
            Ok(likes) => {
                info!("Found {} likes on {}", likes.len(), post);
                likes
            }
            Err(e) => {
                self.reporter
                    .error(FailureKind::Fetch, &e, Some(format!("likes of {}", post).as_str()))
                    .await;
                Vec::new()
            }
        }
    }

    pub async fn fetch(&self, post: &AtUri) -> Engagement {
        Engagement {
            comments: self.fetch_comments(post).await,
            likes: self.fetch_likers(post).await,
        }
    }
}
