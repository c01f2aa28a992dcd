use crate::models::{
    RawCreateRecordResponse, RawFeedResponse, RawFeedViewPost, RawLike, RawLikesResponse,
    RawPostView, RawPostsResponse, RawProfile, RawSession, RawThreadResponse, RawXrpcError,
};
use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use crate::retry::{RetryConfig, RetryExecutor};
use crate::SocialClient;
use chrono::{SecondsFormat, Utc};
use reciprocity_core::{
    Actor, AtUri, BlueskyApiError, BlueskyConfig, CoreError, Did, FeedItem, Like, Post,
    PostRef, PostThread, LIKE_COLLECTION, POST_COLLECTION,
};
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RATE_LIMIT_WAIT_S: u64 = 60;
const LIKES_PAGE_SIZE: u32 = 100;
const MAX_LIKE_PAGES: usize = 10;

const CREATE_SESSION: &str = "com.atproto.server.createSession";
const REFRESH_SESSION: &str = "com.atproto.server.refreshSession";
const CREATE_RECORD: &str = "com.atproto.repo.createRecord";

/// Logged-in account.
#[derive(Debug, Clone)]
pub struct Session {
    pub did: Did,
    pub handle: String,
    access_jwt: String,
    refresh_jwt: String,
}

impl From<RawSession> for Session {
    fn from(raw: RawSession) -> Self {
        Self {
            did: Did::new(raw.did),
            handle: raw.handle,
            access_jwt: raw.access_jwt,
            refresh_jwt: raw.refresh_jwt,
        }
    }
}

/// Plain XRPC over HTTP: rate limiting and status mapping, no session handling.
#[derive(Debug)]
struct XrpcTransport {
    http_client: Client,
    service_url: String,
    rate_limiter: RateLimiter,
}

impl XrpcTransport {
    async fn call(
        &self,
        method: Method,
        nsid: &str,
        token: Option<&str>,
        params: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Response, CoreError> {
        let url = format!("{}/xrpc/{}", self.service_url, nsid);

        let waited = self.rate_limiter.acquire_permit().await;
        if waited > Duration::from_millis(100) {
            debug!("Waited {:?} for a rate limit permit before {}", waited, nsid);
        }

        let mut request_builder = self.http_client.request(method.clone(), &url);
        if let Some(token) = token {
            request_builder = request_builder.bearer_auth(token);
        }
        if !params.is_empty() {
            request_builder = request_builder.query(params);
        }
        if let Some(body) = body {
            request_builder = request_builder.json(body);
        }

        debug!("XRPC {} {}", method, nsid);
        let response = request_builder.send().await.map_err(|e| {
            error!("Network error for {} {}: {}", method, nsid, e);
            if e.is_timeout() {
                CoreError::Bluesky(BlueskyApiError::RequestTimeout)
            } else {
                CoreError::Network(e)
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = rate_limit_wait(response.headers());
        let body_text = response.text().await.unwrap_or_default();
        let resource = params
            .iter()
            .find(|(key, _)| matches!(*key, "uri" | "uris" | "actor"))
            .map(|(_, value)| value.as_str())
            .unwrap_or(nsid);
        let api_error = error_for_status(status, retry_after, &body_text, resource);
        warn!("{} failed with status {}: {}", nsid, status, api_error);
        Err(api_error.into())
    }
}

/// Seconds until the server's rate limit window resets.
fn rate_limit_wait(headers: &HeaderMap) -> u64 {
    let header_u64 = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
    };

    if let Some(reset_at) = header_u64("ratelimit-reset") {
        let now = Utc::now().timestamp().max(0) as u64;
        return reset_at.saturating_sub(now).max(1);
    }
    header_u64("retry-after").unwrap_or(DEFAULT_RATE_LIMIT_WAIT_S)
}

fn error_for_status(
    status: StatusCode,
    retry_after: u64,
    body: &str,
    resource: &str,
) -> BlueskyApiError {
    let xrpc: RawXrpcError = serde_json::from_str(body).unwrap_or_default();
    let code = xrpc.error.unwrap_or_default();
    let message = xrpc.message.unwrap_or_else(|| body.to_string());

    match status.as_u16() {
        429 => BlueskyApiError::RateLimitExceeded { retry_after },
        _ if code == "ExpiredToken" => BlueskyApiError::ExpiredToken,
        401 => BlueskyApiError::AuthenticationFailed { reason: message },
        404 => BlueskyApiError::NotFound {
            resource: resource.to_string(),
        },
        400 if code == "NotFound" => BlueskyApiError::NotFound {
            resource: resource.to_string(),
        },
        code_num if code_num >= 500 => BlueskyApiError::ServerError {
            status_code: code_num,
        },
        _ => BlueskyApiError::InvalidRequest {
            error: if code.is_empty() {
                status.to_string()
            } else {
                code
            },
            message,
        },
    }
}

async fn decode_json<T: DeserializeOwned>(response: Response, nsid: &str) -> Result<T, CoreError> {
    response.json::<T>().await.map_err(|e| {
        error!("Failed to parse {} response: {}", nsid, e);
        CoreError::Bluesky(BlueskyApiError::InvalidResponse {
            details: format!("Failed to parse {} response", nsid),
        })
    })
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn strong_ref(post: &PostRef) -> Value {
    json!({ "uri": post.uri.to_string(), "cid": post.cid })
}

/// Authenticated Bluesky client speaking XRPC to a PDS.
#[derive(Debug)]
pub struct BlueskyClient {
    transport: XrpcTransport,
    session: RwLock<Session>,
    retry: RetryExecutor,
}

impl BlueskyClient {
    pub async fn login(config: &BlueskyConfig) -> Result<Self, CoreError> {
        Self::login_with(config, RetryConfig::bluesky()).await
    }

    pub async fn login_with(
        config: &BlueskyConfig,
        retry_config: RetryConfig,
    ) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .user_agent(concat!("reciprocity/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        let transport = XrpcTransport {
            http_client,
            service_url: config.service_url.trim_end_matches('/').to_string(),
            rate_limiter: RateLimiter::new(RateLimitConfig::bluesky()),
        };

        info!(
            "Logging in to {} as {}",
            transport.service_url, config.identifier
        );
        let body = json!({
            "identifier": config.identifier,
            "password": config.app_password,
        });
        let response = transport
            .call(Method::POST, CREATE_SESSION, None, &[], Some(&body))
            .await?;
        let session: Session = decode_json::<RawSession>(response, CREATE_SESSION)
            .await?
            .into();
        info!("Logged in as @{} ({})", session.handle, session.did);

        Ok(Self {
            transport,
            session: RwLock::new(session),
            retry: RetryExecutor::new(retry_config),
        })
    }

    pub async fn session(&self) -> Session {
        self.session.read().await.clone()
    }

    /// Swaps the access token using the refresh token.
    pub async fn refresh_session(&self) -> Result<(), CoreError> {
        let mut session = self.session.write().await;
        info!("Refreshing Bluesky session for @{}", session.handle);

        let response = self
            .transport
            .call(
                Method::POST,
                REFRESH_SESSION,
                Some(session.refresh_jwt.as_str()),
                &[],
                None,
            )
            .await
            .map_err(|e| match e {
                CoreError::Bluesky(BlueskyApiError::ExpiredToken) => {
                    CoreError::Bluesky(BlueskyApiError::AuthenticationFailed {
                        reason: "refresh token expired".to_string(),
                    })
                }
                other => other,
            })?;

        *session = decode_json::<RawSession>(response, REFRESH_SESSION)
            .await?
            .into();
        Ok(())
    }

    /// One authenticated call; an expired access token is refreshed and the call replayed once.
    async fn authed<T: DeserializeOwned>(
        &self,
        method: Method,
        nsid: &str,
        params: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<T, CoreError> {
        let token = self.session.read().await.access_jwt.clone();
        let response = match self
            .transport
            .call(method.clone(), nsid, Some(token.as_str()), params, body)
            .await
        {
            Err(CoreError::Bluesky(BlueskyApiError::ExpiredToken)) => {
                self.refresh_session().await?;
                let token = self.session.read().await.access_jwt.clone();
                self.transport
                    .call(method, nsid, Some(token.as_str()), params, body)
                    .await?
            }
            other => other?,
        };
        decode_json(response, nsid).await
    }

    /// Read-only query, retried on transient failures.
    async fn query<T: DeserializeOwned>(
        &self,
        nsid: &str,
        params: &[(&str, String)],
    ) -> Result<T, CoreError> {
        self.retry
            .execute(nsid, move || self.authed::<T>(Method::GET, nsid, params, None))
            .await
    }

    /// Writes a record into our own repo. Never retried.
    async fn create_record(&self, collection: &str, record: Value) -> Result<AtUri, CoreError> {
        let repo = self.session.read().await.did.clone();
        let body = json!({
            "repo": repo.as_str(),
            "collection": collection,
            "record": record,
        });
        let created: RawCreateRecordResponse = self
            .authed(Method::POST, CREATE_RECORD, &[], Some(&body))
            .await?;
        debug!("Created record {} ({})", created.uri, created.cid);
        Ok(created.uri.parse()?)
    }
}

impl SocialClient for BlueskyClient {
    async fn resolve_profile(&self, actor: &str) -> Result<Actor, CoreError> {
        let profile: RawProfile = self
            .query("app.bsky.actor.getProfile", &[("actor", actor.to_string())])
            .await?;
        profile.into_actor().ok_or_else(|| {
            CoreError::Bluesky(BlueskyApiError::InvalidResponse {
                details: format!("profile for {} has no DID", actor),
            })
        })
    }

    async fn get_posts(&self, uris: &[AtUri]) -> Result<Vec<Post>, CoreError> {
        if uris.is_empty() {
            return Ok(Vec::new());
        }
        let params: Vec<(&str, String)> = uris.iter().map(|uri| ("uris", uri.to_string())).collect();
        let response: RawPostsResponse = self.query("app.bsky.feed.getPosts", &params).await?;
        Ok(response
            .posts
            .into_iter()
            .filter_map(RawPostView::into_post)
            .collect())
    }

    async fn get_post_thread(&self, uri: &AtUri) -> Result<PostThread, CoreError> {
        let response: RawThreadResponse = self
            .query(
                "app.bsky.feed.getPostThread",
                &[
                    ("uri", uri.to_string()),
                    ("depth", "1".to_string()),
                    ("parentHeight", "0".to_string()),
                ],
            )
            .await?;
        let thread = response.into_thread();
        debug!("Thread {} has {} direct replies", uri, thread.replies.len());
        Ok(thread)
    }

    async fn get_likes(&self, uri: &AtUri) -> Result<Vec<Like>, CoreError> {
        let mut likes = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_LIKE_PAGES {
            let mut params = vec![
                ("uri", uri.to_string()),
                ("limit", LIKES_PAGE_SIZE.to_string()),
            ];
            if let Some(cursor) = cursor.take() {
                params.push(("cursor", cursor));
            }

            let page: RawLikesResponse = self.query("app.bsky.feed.getLikes", &params).await?;
            let page_len = page.likes.len();
            likes.extend(page.likes.into_iter().filter_map(RawLike::into_like));

            match page.cursor {
                Some(next) if page_len > 0 => cursor = Some(next),
                _ => break,
            }
        }

        debug!("Post {} has {} likes", uri, likes.len());
        Ok(likes)
    }

    async fn get_author_feed(&self, actor: &Did, limit: u32) -> Result<Vec<FeedItem>, CoreError> {
        let response: RawFeedResponse = self
            .query(
                "app.bsky.feed.getAuthorFeed",
                &[
                    ("actor", actor.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        Ok(response
            .feed
            .into_iter()
            .filter_map(RawFeedViewPost::into_feed_item)
            .collect())
    }

    async fn create_like(&self, subject: &PostRef) -> Result<AtUri, CoreError> {
        let record = json!({
            "$type": LIKE_COLLECTION,
            "subject": strong_ref(subject),
            "createdAt": now_rfc3339(),
        });
        self.create_record(LIKE_COLLECTION, record).await
    }

    async fn create_reply(
        &self,
        text: &str,
        root: &PostRef,
        parent: &PostRef,
    ) -> Result<AtUri, CoreError> {
        let record = json!({
            "$type": POST_COLLECTION,
            "text": text,
            "createdAt": now_rfc3339(),
            "reply": {
                "root": strong_ref(root),
                "parent": strong_ref(parent),
            },
        });
        self.create_record(POST_COLLECTION, record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err = error_for_status(StatusCode::TOO_MANY_REQUESTS, 12, "", "x");
        assert!(matches!(err, BlueskyApiError::RateLimitExceeded { retry_after: 12 }));

        let err = error_for_status(
            StatusCode::BAD_REQUEST,
            60,
            r#"{"error":"ExpiredToken","message":"Token has expired"}"#,
            "x",
        );
        assert!(matches!(err, BlueskyApiError::ExpiredToken));

        let err = error_for_status(
            StatusCode::BAD_REQUEST,
            60,
            r#"{"error":"NotFound","message":"Post not found"}"#,
            "at://did:plc:x/app.bsky.feed.post/1",
        );
        assert!(matches!(
            err,
            BlueskyApiError::NotFound { ref resource } if resource == "at://did:plc:x/app.bsky.feed.post/1"
        ));

        let err = error_for_status(
            StatusCode::UNAUTHORIZED,
            60,
            r#"{"error":"AuthenticationRequired","message":"Invalid identifier or password"}"#,
            "x",
        );
        assert!(matches!(
            err,
            BlueskyApiError::AuthenticationFailed { ref reason } if reason.contains("Invalid identifier")
        ));

        let err = error_for_status(StatusCode::BAD_GATEWAY, 60, "upstream", "x");
        assert!(matches!(err, BlueskyApiError::ServerError { status_code: 502 }));

        let err = error_for_status(StatusCode::BAD_REQUEST, 60, "not json", "x");
        assert!(matches!(err, BlueskyApiError::InvalidRequest { .. }));
    }

    #[test]
    fn test_rate_limit_wait_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(rate_limit_wait(&headers), DEFAULT_RATE_LIMIT_WAIT_S);

        headers.insert("retry-after", "7".parse().unwrap());
        assert_eq!(rate_limit_wait(&headers), 7);

        let reset = (Utc::now().timestamp() + 30).to_string();
        headers.insert("ratelimit-reset", reset.parse().unwrap());
        let wait = rate_limit_wait(&headers);
        assert!((29..=30).contains(&wait));
    }
}
