//! Wire types for the XRPC endpoints we call.
//!
//! Every response is decoded into lenient `Raw*` structs first (all fields optional),
//! then converted into domain types here. Entries missing a field we cannot do
//! without are dropped; cosmetic fields fall back to defaults. A field of the wrong
//! type counts as missing, and a list entry that does not decode is skipped.

use reciprocity_core::{
    Actor, AtUri, Comment, FeedItem, Like, Post, PostThread, UNKNOWN_HANDLE,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Value::deserialize(deserializer)? {
        Value::Array(entries) => Ok(entries
            .into_iter()
            .filter_map(|entry| serde_json::from_value(entry).ok())
            .collect()),
        _ => Ok(Vec::new()),
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSession {
    pub did: String,
    pub handle: String,
    pub access_jwt: String,
    pub refresh_jwt: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawXrpcError {
    pub error: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawProfile {
    #[serde(deserialize_with = "lenient")]
    pub did: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub handle: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawReplyRef {
    pub parent: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawPostRecord {
    #[serde(deserialize_with = "lenient")]
    pub text: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub reply: Option<RawReplyRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawPostView {
    #[serde(deserialize_with = "lenient")]
    pub uri: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub cid: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub author: Option<RawProfile>,
    pub record: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawPostsResponse {
    #[serde(deserialize_with = "lenient_list")]
    pub posts: Vec<RawPostView>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawThreadNode {
    #[serde(deserialize_with = "lenient")]
    pub post: Option<RawPostView>,
    #[serde(deserialize_with = "lenient_list")]
    pub replies: Vec<RawThreadNode>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawThreadResponse {
    #[serde(deserialize_with = "lenient")]
    pub thread: Option<RawThreadNode>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawLike {
    #[serde(deserialize_with = "lenient")]
    pub actor: Option<RawProfile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawLikesResponse {
    #[serde(deserialize_with = "lenient_list")]
    pub likes: Vec<RawLike>,
    #[serde(deserialize_with = "lenient")]
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawFeedViewPost {
    #[serde(deserialize_with = "lenient")]
    pub post: Option<RawPostView>,
    #[serde(deserialize_with = "lenient")]
    pub reply: Option<RawReplyRef>,
    pub reason: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawFeedResponse {
    #[serde(deserialize_with = "lenient_list")]
    pub feed: Vec<RawFeedViewPost>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCreateRecordResponse {
    pub uri: String,
    pub cid: String,
}

impl RawProfile {
    /// A profile is usable as long as it names a DID.
    pub fn into_actor(self) -> Option<Actor> {
        let did = self.did.filter(|d| !d.is_empty())?;
        let handle = self
            .handle
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| UNKNOWN_HANDLE.to_string());
        Some(Actor::new(did, handle))
    }
}

impl RawReplyRef {
    fn has_parent(reply: &Option<RawReplyRef>) -> bool {
        reply.as_ref().is_some_and(|r| r.parent.is_some())
    }
}

impl RawPostView {
    fn decoded_record(&self) -> RawPostRecord {
        self.record
            .clone()
            .and_then(|record| serde_json::from_value(record).ok())
            .unwrap_or_default()
    }

    pub fn into_post(self) -> Option<Post> {
        let record = self.decoded_record();
        let uri: AtUri = self.uri?.parse().ok()?;
        let cid = self.cid.filter(|c| !c.is_empty())?;
        let author = self.author?.into_actor()?;
        Some(Post {
            uri,
            cid,
            author,
            text: record.text.unwrap_or_default(),
            is_reply: RawReplyRef::has_parent(&record.reply),
        })
    }

    pub fn into_comment(self) -> Option<Comment> {
        let text = self.decoded_record().text.unwrap_or_default();
        let author = self.author?.into_actor()?;
        Some(Comment { author, text })
    }
}

impl RawThreadResponse {
    /// Direct replies only. Blocked or deleted nodes carry no `post` and are skipped.
    pub fn into_thread(self) -> PostThread {
        let replies = self
            .thread
            .map(|root| root.replies)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|node| node.post?.into_comment())
            .collect();
        PostThread { replies }
    }
}

impl RawLike {
    pub fn into_like(self) -> Option<Like> {
        Some(Like {
            actor: self.actor?.into_actor()?,
        })
    }
}

impl RawFeedViewPost {
    pub fn into_feed_item(self) -> Option<FeedItem> {
        let feed_reply = RawReplyRef::has_parent(&self.reply);
        Some(FeedItem {
            post: self.post?.into_post()?,
            feed_reply,
            repost: self.reason.is_some(),
        })
    }
}
