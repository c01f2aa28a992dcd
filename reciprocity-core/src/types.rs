use crate::{BlueskyApiError, CoreError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const POST_COLLECTION: &str = "app.bsky.feed.post";
pub const LIKE_COLLECTION: &str = "app.bsky.feed.like";
pub const UNKNOWN_HANDLE: &str = "unknown";

const WEB_HOST: &str = "bsky.app";

/// Decentralized identifier of an account, e.g. `did:plc:abc123`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Did(String);

impl Did {
    pub fn new(did: impl Into<String>) -> Self {
        Self(did.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `at://<authority>/<collection>/<rkey>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtUri {
    authority: String,
    collection: String,
    rkey: String,
}

impl AtUri {
    pub fn new(
        authority: impl Into<String>,
        collection: impl Into<String>,
        rkey: impl Into<String>,
    ) -> Self {
        Self {
            authority: authority.into(),
            collection: collection.into(),
            rkey: rkey.into(),
        }
    }

    pub fn post(did: &Did, rkey: impl Into<String>) -> Self {
        Self::new(did.as_str(), POST_COLLECTION, rkey)
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn rkey(&self) -> &str {
        &self.rkey
    }

    /// Web link for a post record, or the raw URI for anything else.
    pub fn to_web_url(&self) -> String {
        if self.collection == POST_COLLECTION {
            format!(
                "https://{}/profile/{}/post/{}",
                WEB_HOST, self.authority, self.rkey
            )
        } else {
            self.to_string()
        }
    }
}

impl fmt::Display for AtUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at://{}/{}/{}", self.authority, self.collection, self.rkey)
    }
}

impl FromStr for AtUri {
    type Err = BlueskyApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BlueskyApiError::InvalidUri { uri: s.to_string() };
        let rest = s.strip_prefix("at://").ok_or_else(invalid)?;
        let mut parts = rest.split('/');
        let (Some(authority), Some(collection), Some(rkey), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        if authority.is_empty() || collection.is_empty() || rkey.is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(authority, collection, rkey))
    }
}

impl Serialize for AtUri {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AtUri {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Strong reference to a specific version of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRef {
    pub uri: AtUri,
    pub cid: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub did: Did,
    pub handle: String,
}

impl Actor {
    pub fn new(did: impl Into<String>, handle: impl Into<String>) -> Self {
        Self {
            did: Did::new(did),
            handle: handle.into(),
        }
    }

    pub fn has_known_handle(&self) -> bool {
        !self.handle.is_empty() && self.handle != UNKNOWN_HANDLE
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub uri: AtUri,
    pub cid: String,
    pub author: Actor,
    pub text: String,
    /// The record itself points at a reply parent.
    pub is_reply: bool,
}

impl Post {
    pub fn to_ref(&self) -> PostRef {
        PostRef {
            uri: self.uri.clone(),
            cid: self.cid.clone(),
        }
    }
}

/// One entry of an author feed page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub post: Post,
    /// The feed view carries reply context for this entry.
    pub feed_reply: bool,
    /// The entry is a repost of someone else's post.
    pub repost: bool,
}

impl FeedItem {
    /// A post written by `owner` that is neither a reply nor a repost.
    pub fn is_original_by(&self, owner: &Did) -> bool {
        !self.post.is_reply && !self.feed_reply && !self.repost && &self.post.author.did == owner
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub author: Actor,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Like {
    pub actor: Actor,
}

/// Thread view one level deep: the direct replies to a post.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostThread {
    pub replies: Vec<Comment>,
}

/// The single post whose engagement is monitored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPost {
    pub url: String,
    pub uri: AtUri,
    pub resolved: bool,
}

impl TargetPost {
    pub fn resolved(url: impl Into<String>, uri: AtUri) -> Self {
        Self {
            url: url.into(),
            uri,
            resolved: true,
        }
    }

    /// Stand-in used when the configured link cannot be resolved.
    pub fn placeholder(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            uri: AtUri::new("did:plc:unresolved", POST_COLLECTION, "unresolved"),
            resolved: false,
        }
    }
}

/// Splits `https://bsky.app/profile/<actor>/post/<rkey>` into `(actor, rkey)`.
pub fn parse_post_url(link: &str) -> Result<(String, String), CoreError> {
    let invalid = |reason: &str| CoreError::InvalidInput {
        message: format!("{}: {}", reason, link),
    };
    let parsed = url::Url::parse(link).map_err(|_| invalid("not a URL"))?;
    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();

    match segments.as_slice() {
        ["profile", actor, "post", rkey] => Ok((actor.to_string(), rkey.to_string())),
        _ => Err(invalid("expected /profile/<handle>/post/<id>")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_uri_parse_and_display() {
        let uri: AtUri = "at://did:plc:abc/app.bsky.feed.post/3lna2hon6ic2r"
            .parse()
            .unwrap();
        assert_eq!(uri.authority(), "did:plc:abc");
        assert_eq!(uri.collection(), POST_COLLECTION);
        assert_eq!(uri.rkey(), "3lna2hon6ic2r");
        assert_eq!(
            uri.to_string(),
            "at://did:plc:abc/app.bsky.feed.post/3lna2hon6ic2r"
        );
    }

    #[test]
    fn test_at_uri_rejects_malformed() {
        assert!("https://bsky.app/x".parse::<AtUri>().is_err());
        assert!("at://did:plc:abc/app.bsky.feed.post".parse::<AtUri>().is_err());
        assert!("at://did:plc:abc//rkey".parse::<AtUri>().is_err());
        assert!("at://did:plc:abc/a/b/c".parse::<AtUri>().is_err());
    }

    #[test]
    fn test_web_url() {
        let uri = AtUri::post(&Did::new("did:plc:abc"), "xyz");
        assert_eq!(uri.to_web_url(), "https://bsky.app/profile/did:plc:abc/post/xyz");

        let like = AtUri::new("did:plc:abc", LIKE_COLLECTION, "xyz");
        assert_eq!(like.to_web_url(), like.to_string());
    }

    #[test]
    fn test_parse_post_url() {
        let (actor, rkey) =
            parse_post_url("https://bsky.app/profile/mrmoonrose.bsky.social/post/3lna2hon6ic2r")
                .unwrap();
        assert_eq!(actor, "mrmoonrose.bsky.social");
        assert_eq!(rkey, "3lna2hon6ic2r");

        assert!(parse_post_url("https://bsky.app/profile/someone").is_err());
        assert!(parse_post_url("not a url").is_err());
    }

    #[test]
    fn test_feed_item_originality() {
        let owner = Did::new("did:plc:owner");
        let post = Post {
            uri: AtUri::post(&owner, "1"),
            cid: "cid1".to_string(),
            author: Actor::new("did:plc:owner", "owner.bsky.social"),
            text: "hello".to_string(),
            is_reply: false,
        };
        let original = FeedItem {
            post: post.clone(),
            feed_reply: false,
            repost: false,
        };
        assert!(original.is_original_by(&owner));

        let reply = FeedItem {
            feed_reply: true,
            ..original.clone()
        };
        assert!(!reply.is_original_by(&owner));

        let record_reply = FeedItem {
            post: Post {
                is_reply: true,
                ..post
            },
            ..original.clone()
        };
        assert!(!record_reply.is_original_by(&owner));

        assert!(!original.is_original_by(&Did::new("did:plc:other")));
    }

    #[test]
    fn test_placeholder_target() {
        let target = TargetPost::placeholder("https://bsky.app/profile/x/post/y");
        assert!(!target.resolved);
        assert_eq!(
            target.uri.to_string(),
            "at://did:plc:unresolved/app.bsky.feed.post/unresolved"
        );
    }
}
