pub mod api;
pub mod models;
pub mod rate_limiter;
pub mod retry;


pub use api::{BlueskyClient, Session};

use reciprocity_core::{
    Actor, AtUri, BlueskyApiError, CoreError, Did, FeedItem, Like, Post, PostRef, PostThread,
};
use std::sync::Arc;

/// Operations the engagement loop needs from a social network.
///
/// Implementations are expected to be authenticated already.
#[allow(async_fn_in_trait)]
pub trait SocialClient {
    /// Looks up a profile by handle or DID.
    async fn resolve_profile(&self, actor: &str) -> Result<Actor, CoreError>;

    async fn get_posts(&self, uris: &[AtUri]) -> Result<Vec<Post>, CoreError>;

    async fn get_post(&self, uri: &AtUri) -> Result<Post, CoreError> {
        self.get_posts(std::slice::from_ref(uri))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                CoreError::Bluesky(BlueskyApiError::NotFound {
                    resource: uri.to_string(),
                })
            })
    }

    async fn get_post_thread(&self, uri: &AtUri) -> Result<PostThread, CoreError>;

    async fn get_likes(&self, uri: &AtUri) -> Result<Vec<Like>, CoreError>;

    /// Newest first.
    async fn get_author_feed(&self, actor: &Did, limit: u32) -> Result<Vec<FeedItem>, CoreError>;

    async fn create_like(&self, subject: &PostRef) -> Result<AtUri, CoreError>;

    async fn create_reply(
        &self,
        text: &str,
        root: &PostRef,
        parent: &PostRef,
    ) -> Result<AtUri, CoreError>;
}

macro_rules! forward_social_client {
    ($($wrapper:ty),*) => {$(
        impl<S: SocialClient + ?Sized> SocialClient for $wrapper {
            async fn resolve_profile(&self, actor: &str) -> Result<Actor, CoreError> {
                (**self).resolve_profile(actor).await
            }

            async fn get_posts(&self, uris: &[AtUri]) -> Result<Vec<Post>, CoreError> {
                (**self).get_posts(uris).await
            }

            async fn get_post_thread(&self, uri: &AtUri) -> Result<PostThread, CoreError> {
                (**self).get_post_thread(uri).await
            }

            async fn get_likes(&self, uri: &AtUri) -> Result<Vec<Like>, CoreError> {
                (**self).get_likes(uri).await
            }

            async fn get_author_feed(
                &self,
                actor: &Did,
                limit: u32,
            ) -> Result<Vec<FeedItem>, CoreError> {
                (**self).get_author_feed(actor, limit).await
            }

            async fn create_like(&self, subject: &PostRef) -> Result<AtUri, CoreError> {
                (**self).create_like(subject).await
            }

            async fn create_reply(
                &self,
                text: &str,
                root: &PostRef,
                parent: &PostRef,
            ) -> Result<AtUri, CoreError> {
                (**self).create_reply(text, root, parent).await
            }
        }
    )*};
}

forward_social_client!(&S, Arc<S>);
