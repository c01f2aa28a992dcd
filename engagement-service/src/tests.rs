use crate::failure::FailureKind;
use crate::reciprocator::{ReciprocationOutcome, Reciprocator, REPLY_TEXT};
use crate::report::{Reporter, SharedClock};
use crate::schedule::{local_offset, Clock, LocalTime};
use crate::service::{EngagementService, ServiceConfig};
use crate::session::ProcessedSet;
use bluesky_client::SocialClient;
use chrono::TimeZone;
use reciprocity_core::{
    Actor, AtUri, BlueskyApiError, CoreError, Did, FeedItem, Like, PacingConfig, Post,
    PostRef, PostThread, Comment, UNKNOWN_HANDLE,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use telegram_notifier::{DeliveryOutcome, Notifier};
use tokio_test::{assert_err, assert_ok};

const OWNER: &str = "did:plc:owner";
const TARGET_URL: &str = "https://bsky.app/profile/owner.bsky.social/post/target";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Reply { parent: AtUri, root: AtUri, text: String },
    Like { subject: AtUri },
}

#[derive(Default)]
struct FakeClient {
    profiles: HashMap<String, Actor>,
    posts: HashMap<AtUri, Post>,
    /// `None` makes the thread fetch fail.
    thread: Option<PostThread>,
    panic_on_thread: bool,
    likes: Vec<Like>,
    feeds: HashMap<Did, Vec<FeedItem>>,
    failing_mutations: Mutex<HashSet<AtUri>>,
    calls: Mutex<Vec<Call>>,
}

fn not_found(resource: impl ToString) -> CoreError {
    CoreError::Bluesky(BlueskyApiError::NotFound {
        resource: resource.to_string(),
    })
}

impl FakeClient {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn fail_mutations_on(&self, post: &AtUri) {
        self.failing_mutations.lock().unwrap().insert(post.clone());
    }

    fn heal(&self) {
        self.failing_mutations.lock().unwrap().clear();
    }

    fn mutation(&self, subject: &AtUri, call: Call) -> Result<AtUri, CoreError> {
        if self.failing_mutations.lock().unwrap().contains(subject) {
            return Err(CoreError::Bluesky(BlueskyApiError::ServerError {
                status_code: 500,
            }));
        }
        self.calls.lock().unwrap().push(call);
        Ok(AtUri::new("did:plc:bot", "app.bsky.feed.like", "r"))
    }
}

impl SocialClient for FakeClient {
    async fn resolve_profile(&self, actor: &str) -> Result<Actor, CoreError> {
        self.profiles
            .get(actor)
            .cloned()
            .ok_or_else(|| not_found(actor))
    }

    async fn get_posts(&self, uris: &[AtUri]) -> Result<Vec<Post>, CoreError> {
        Ok(uris.iter().filter_map(|u| self.posts.get(u).cloned()).collect())
    }

    async fn get_post_thread(&self, uri: &AtUri) -> Result<PostThread, CoreError> {
        if self.panic_on_thread {
            panic!("thread view exploded");
        }
        self.thread.clone().ok_or_else(|| not_found(uri))
    }

    async fn get_likes(&self, _uri: &AtUri) -> Result<Vec<Like>, CoreError> {
        Ok(self.likes.clone())
    }

    async fn get_author_feed(&self, actor: &Did, _limit: u32) -> Result<Vec<FeedItem>, CoreError> {
        self.feeds.get(actor).cloned().ok_or_else(|| not_found(actor))
    }

    async fn create_like(&self, subject: &PostRef) -> Result<AtUri, CoreError> {
        self.mutation(
            &subject.uri,
            Call::Like {
                subject: subject.uri.clone(),
            },
        )
    }

    async fn create_reply(
        &self,
        text: &str,
        root: &PostRef,
        parent: &PostRef,
    ) -> Result<AtUri, CoreError> {
        self.mutation(
            &parent.uri,
            Call::Reply {
                parent: parent.uri.clone(),
                root: root.uri.clone(),
                text: text.to_string(),
            },
        )
    }
}

#[derive(Default)]
struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    async fn send(&self, html: &str) -> DeliveryOutcome {
        self.messages.lock().unwrap().push(html.to_string());
        DeliveryOutcome::Delivered
    }
}

struct FrozenClock(LocalTime);

impl FrozenClock {
    fn at(hour: u32, minute: u32) -> Arc<Self> {
        Arc::new(Self(time_at(hour, minute)))
    }
}

impl Clock for FrozenClock {
    fn now(&self) -> LocalTime {
        self.0
    }
}

fn time_at(hour: u32, minute: u32) -> LocalTime {
    local_offset(3)
        .unwrap()
        .with_ymd_and_hms(2025, 4, 1, hour, minute, 0)
        .unwrap()
}

fn no_pauses() -> PacingConfig {
    PacingConfig {
        between_users: Duration::ZERO,
        after_reply: Duration::ZERO,
        error_backoff: Duration::ZERO,
    }
}

fn actor(name: &str) -> Actor {
    Actor::new(format!("did:plc:{}", name), format!("{}.bsky.social", name))
}

fn post(author: &Actor, rkey: &str, is_reply: bool) -> Post {
    Post {
        uri: AtUri::post(&author.did, rkey),
        cid: format!("cid-{}", rkey),
        author: author.clone(),
        text: format!("post {}", rkey),
        is_reply,
    }
}

fn item(post: Post) -> FeedItem {
    FeedItem {
        post,
        feed_reply: false,
        repost: false,
    }
}

fn target_uri() -> AtUri {
    AtUri::post(&Did::new(OWNER), "target")
}

fn original_of(name: &str) -> AtUri {
    AtUri::post(&actor(name).did, format!("{}-original", name))
}

/// Users `a`, `b`, `c`: each feed starts with a reply, followed by an original post.
fn scenario_client(commenters: &[&str], likers: &[&str]) -> FakeClient {
    let mut client = FakeClient::default();
    let owner = Actor::new(OWNER, "owner.bsky.social");
    client.profiles.insert("owner.bsky.social".to_string(), owner.clone());
    client
        .posts
        .insert(target_uri(), post(&owner, "target", false));

    for name in ["a", "b", "c"] {
        let user = actor(name);
        let reply = post(&user, &format!("{}-reply", name), true);
        let original = post(&user, &format!("{}-original", name), false);
        client.posts.insert(original.uri.clone(), original.clone());
        client.profiles.insert(user.did.to_string(), user.clone());
        client
            .feeds
            .insert(user.did.clone(), vec![item(reply), item(original)]);
    }

    client.thread = Some(PostThread {
        replies: commenters
            .iter()
            .map(|name| Comment {
                author: actor(name),
                text: "nice".to_string(),
            })
            .collect(),
    });
    client.likes = likers.iter().map(|name| Like { actor: actor(name) }).collect();
    client
}

fn service_config() -> ServiceConfig {
    ServiceConfig {
        target_post_url: TARGET_URL.to_string(),
        feed_limit: 20,
        pacing: no_pauses(),
    }
}

async fn started(
    client: FakeClient,
    clock: Arc<FrozenClock>,
) -> (
    EngagementService<Arc<FakeClient>, Arc<RecordingNotifier>>,
    Arc<FakeClient>,
    Arc<RecordingNotifier>,
) {
    let client = Arc::new(client);
    let notifier = Arc::new(RecordingNotifier::default());
    let clock: SharedClock = clock;
    let service = EngagementService::start(client.clone(), notifier.clone(), clock, service_config())
        .await
        .unwrap();
    (service, client, notifier)
}

#[tokio::test]
async fn test_end_to_end_cycle() {
    let (mut service, client, notifier) =
        started(scenario_client(&["a", "b"], &["a", "c"]), FrozenClock::at(12, 0)).await;

    assert!(service.session().target.resolved);
    assert_eq!(service.session().target.uri, target_uri());

    let report = service.run_cycle().await;

    let dids = |actors: &[Actor]| actors.iter().map(|a| a.did.clone()).collect::<Vec<_>>();
    assert_eq!(dids(&report.classification.both), vec![actor("a").did]);
    assert_eq!(dids(&report.classification.comment_only), vec![actor("b").did]);
    assert_eq!(dids(&report.classification.like_only), vec![actor("c").did]);

    assert_eq!(
        report.outcomes,
        vec![
            (actor("a").did, ReciprocationOutcome::Replied { post: original_of("a") }),
            (actor("b").did, ReciprocationOutcome::Replied { post: original_of("b") }),
            (actor("c").did, ReciprocationOutcome::Liked { post: original_of("c") }),
        ]
    );

    assert_eq!(
        client.calls(),
        vec![
            Call::Reply {
                parent: original_of("a"),
                root: original_of("a"),
                text: REPLY_TEXT.to_string(),
            },
            Call::Reply {
                parent: original_of("b"),
                root: original_of("b"),
                text: REPLY_TEXT.to_string(),
            },
            Call::Like {
                subject: original_of("c"),
            },
        ]
    );

    let messages = notifier.messages();
    assert_eq!(messages.len(), 5);
    assert!(messages[0].contains("Engagement report"));
    assert!(messages[1].contains("Commented and liked (1)"));
    assert!(messages[2].contains("@a.bsky.social"));
    assert!(messages[2].contains("https://bsky.app/profile/did:plc:a/post/a-original"));
    assert!(messages[4].contains("Liked"));
}

#[tokio::test]
async fn test_second_cycle_does_not_mutate_again() {
    let (mut service, client, _notifier) =
        started(scenario_client(&["a", "b"], &["a", "c"]), FrozenClock::at(12, 0)).await;

    service.run_cycle().await;
    let report = service.run_cycle().await;

    assert_eq!(report.mutations(), 0);
    assert!(report
        .outcomes
        .iter()
        .all(|(_, outcome)| matches!(outcome, ReciprocationOutcome::AlreadyReciprocated { .. })));
    assert_eq!(client.calls().len(), 3);
    assert_eq!(service.session().processed.replied_count(), 2);
    assert_eq!(service.session().processed.liked_count(), 1);
}

#[tokio::test]
async fn test_comment_fetch_failure_still_processes_likes() {
    let mut client = scenario_client(&[], &["a", "c"]);
    client.thread = None;
    let (mut service, client, notifier) = started(client, FrozenClock::at(14, 0)).await;

    let report = service.run_cycle().await;

    assert_eq!(report.classification.like_only.len(), 2);
    assert_eq!(
        client.calls(),
        vec![
            Call::Like { subject: original_of("a") },
            Call::Like { subject: original_of("c") },
        ]
    );
    let messages = notifier.messages();
    assert!(messages[0].contains("Where: Fetch"));
    assert_eq!(messages.len(), 5);
}

#[tokio::test]
async fn test_mutation_failure_leaves_user_for_next_cycle() {
    let (mut service, client, notifier) =
        started(scenario_client(&["b"], &[]), FrozenClock::at(17, 0)).await;
    client.fail_mutations_on(&original_of("b"));

    let report = service.run_cycle().await;
    assert_eq!(
        report.outcomes,
        vec![(actor("b").did, ReciprocationOutcome::Failed(FailureKind::Mutation))]
    );
    assert!(!service.session().processed.is_replied(&original_of("b")));
    assert!(notifier
        .messages()
        .iter()
        .any(|m| m.contains("Where: Reciprocation") && m.contains("did:plc:b")));

    client.heal();
    let report = service.run_cycle().await;
    assert_eq!(report.mutations(), 1);
    assert!(service.session().processed.is_replied(&original_of("b")));
}

#[tokio::test]
async fn test_no_actions_outside_operating_window() {
    let (mut service, client, notifier) =
        started(scenario_client(&["a"], &["c"]), FrozenClock::at(20, 0)).await;

    let report = service.run_cycle().await;

    assert!(report
        .outcomes
        .iter()
        .all(|(_, outcome)| *outcome == ReciprocationOutcome::OutsideWindow));
    assert!(client.calls().is_empty());
    assert_eq!(notifier.messages().len(), 2);
}

#[tokio::test]
async fn test_scheduled_check_fires_once_with_frozen_clock() {
    let (mut service, client, _notifier) =
        started(scenario_client(&["a"], &[]), FrozenClock::at(12, 0)).await;

    assert!(service.poll_schedule().await.is_some());
    assert!(service.poll_schedule().await.is_none());
    assert_eq!(client.calls().len(), 1);

    let (next, wait) = service.until_next_check();
    assert_eq!(next, time_at(14, 0));
    assert_eq!(wait, Duration::from_secs(2 * 3600));
}

#[tokio::test]
async fn test_latest_original_post_skips_replies_and_reposts() {
    let mut client = FakeClient::default();
    let user = actor("a");
    let other = actor("z");
    client.feeds.insert(
        user.did.clone(),
        vec![
            item(post(&user, "reply", true)),
            FeedItem {
                feed_reply: true,
                ..item(post(&user, "thread-context", false))
            },
            FeedItem {
                repost: true,
                ..item(post(&other, "reposted", false))
            },
            item(post(&user, "original", false)),
            item(post(&user, "older", false)),
        ],
    );

    let notifier = RecordingNotifier::default();
    let reporter = Reporter::new(&notifier, FrozenClock::at(12, 0));
    let reciprocator = Reciprocator::new(&client, &reporter, 20, Duration::ZERO);

    let latest = assert_ok!(reciprocator.latest_original_post(&user.did).await);
    assert_eq!(latest.map(|p| p.uri), Some(AtUri::post(&user.did, "original")));

    assert_err!(reciprocator.latest_original_post(&other.did).await);
}

#[tokio::test]
async fn test_reciprocating_twice_mutates_once() {
    let client = scenario_client(&[], &[]);
    let notifier = RecordingNotifier::default();
    let reporter = Reporter::new(&notifier, FrozenClock::at(12, 0));
    let reciprocator = Reciprocator::new(&client, &reporter, 20, Duration::ZERO);
    let mut processed = ProcessedSet::new();

    let first = reciprocator
        .reciprocate(&mut processed, &actor("c"), false, true)
        .await;
    let second = reciprocator
        .reciprocate(&mut processed, &actor("c"), false, true)
        .await;

    assert_eq!(first, ReciprocationOutcome::Liked { post: original_of("c") });
    assert_eq!(
        second,
        ReciprocationOutcome::AlreadyReciprocated { post: original_of("c") }
    );
    assert_eq!(client.calls().len(), 1);
}

#[tokio::test]
async fn test_unknown_handle_is_looked_up_for_notice() {
    let client = scenario_client(&[], &[]);
    let notifier = RecordingNotifier::default();
    let reporter = Reporter::new(&notifier, FrozenClock::at(12, 0));
    let reciprocator = Reciprocator::new(&client, &reporter, 20, Duration::ZERO);
    let mut processed = ProcessedSet::new();

    let anonymous = Actor::new("did:plc:a", UNKNOWN_HANDLE);
    reciprocator
        .reciprocate(&mut processed, &anonymous, true, false)
        .await;

    let messages = notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("@a.bsky.social"));
}

#[tokio::test]
async fn test_startup_fails_when_target_is_unreachable() {
    let mut client = scenario_client(&[], &[]);
    client.profiles.clear();
    let notifier = Arc::new(RecordingNotifier::default());
    let clock: SharedClock = FrozenClock::at(12, 0);

    let result = EngagementService::start(
        Arc::new(client),
        notifier.clone(),
        clock,
        service_config(),
    )
    .await;

    assert!(result.is_err());
    let messages = notifier.messages();
    // One report for the failed lookup, one for the unfetchable placeholder.
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| m.contains("Where: Startup")));
    assert!(messages[1].contains(TARGET_URL));
}

#[tokio::test(start_paused = true)]
async fn test_main_loop_survives_a_panicking_cycle() {
    let mut client = scenario_client(&["a"], &[]);
    client.panic_on_thread = true;
    let client = Arc::new(client);
    let notifier = Arc::new(RecordingNotifier::default());
    let clock: SharedClock = FrozenClock::at(12, 0);
    let mut config = service_config();
    config.pacing.error_backoff = Duration::from_secs(60);

    let service = EngagementService::start(client.clone(), notifier.clone(), clock, config)
        .await
        .unwrap();

    // The loop never returns on its own; still running after three hours means it resumed.
    let outcome = tokio::time::timeout(Duration::from_secs(3 * 3600), service.run()).await;
    assert!(outcome.is_err());

    let failures: Vec<String> = notifier
        .messages()
        .into_iter()
        .filter(|m| m.contains("Where: Main loop"))
        .collect();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("thread view exploded"));
    assert!(client.calls().is_empty());
}
