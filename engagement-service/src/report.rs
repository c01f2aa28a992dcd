//! Messages for the operations channel.

use crate::failure::FailureKind;
use crate::reconciler::Classification;
use crate::schedule::{Clock, LocalTime};
use reciprocity_core::{Actor, AtUri, CoreError, ErrorExt};
use std::sync::Arc;
use telegram_notifier::{DeliveryOutcome, Notifier};
use tracing::{debug, error, warn};

pub type SharedClock = Arc<dyn Clock + Send + Sync>;

const NO_USERS: &str = "No users";

/// Telegram rejects messages over 4096 characters. Counted before entity parsing, so
/// escaped text stays under the limit too.
pub const MESSAGE_CHAR_LIMIT: usize = 4000;

/// Escapes text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub fn summary_report(
    now: &LocalTime,
    comment_count: usize,
    like_count: usize,
    classes: &Classification,
) -> String {
    format!(
        "📊 <b>Engagement report</b>\n\
         🕒 Time: {}\n\
         📝 Comments: {}\n\
         ❤️ Likes: {}\n\
         👥 Commented and liked: {}\n\
         💬 Commented only: {}\n\
         👍 Liked only: {}",
        now.format("%d/%m/%Y %H:%M"),
        comment_count,
        like_count,
        classes.both.len(),
        classes.comment_only.len(),
        classes.like_only.len(),
    )
}

fn section_lines(heading: &str, users: &[Actor], lines: &mut Vec<String>) {
    lines.push(format!("{} ({})</b>", heading, users.len()));
    if users.is_empty() {
        lines.push(NO_USERS.to_string());
    }
    lines.extend(users.iter().map(|user| {
        format!("- {} ({})", escape_html(&user.handle), escape_html(user.did.as_str()))
    }));
}

/// Joins lines into as few messages as fit under `limit` characters each. Lines are
/// never split, so markup opened on a line is closed in the same message.
fn pack_lines(lines: &[String], limit: usize) -> Vec<String> {
    let mut messages = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in lines {
        let len = line.chars().count();
        if current_len > 0 && current_len + 1 + len > limit {
            messages.push(current.trim_end().to_string());
            current.clear();
            current_len = 0;
        }
        if current_len > 0 {
            current.push('\n');
            current_len += 1;
        }
        current.push_str(line);
        current_len += len;
    }
    if !current.trim_end().is_empty() {
        messages.push(current.trim_end().to_string());
    }
    messages
}

/// Every user of every class, split into channel-sized messages.
pub fn detail_report(classes: &Classification) -> Vec<String> {
    let mut lines = Vec::new();
    section_lines("👥 <b>Commented and liked", &classes.both, &mut lines);
    lines.push(String::new());
    section_lines("💬 <b>Commented only", &classes.comment_only, &mut lines);
    lines.push(String::new());
    section_lines("👍 <b>Liked only", &classes.like_only, &mut lines);
    pack_lines(&lines, MESSAGE_CHAR_LIMIT)
}

pub fn reply_notice(handle: &str, post: &AtUri, text: &str) -> String {
    format!(
        "💬 <b>Replied</b>\n👤 User: @{}\n🔗 Post: {}\n💭 Reply: {}",
        escape_html(handle),
        escape_html(&post.to_web_url()),
        escape_html(text),
    )
}

pub fn like_notice(handle: &str, post: &AtUri) -> String {
    format!(
        "❤️ <b>Liked</b>\n👤 User: @{}\n🔗 Post: {}",
        escape_html(handle),
        escape_html(&post.to_web_url()),
    )
}

pub fn failure_report(
    kind: FailureKind,
    message: &str,
    context: Option<&str>,
    now: &LocalTime,
) -> String {
    let mut report = format!(
        "⚠️ <b>Error</b>\n🕒 Time: {}\n📍 Where: {}\n❌ Error: {}",
        now.format("%d/%m/%Y %H:%M:%S"),
        kind.label(),
        escape_html(message),
    );
    if let Some(context) = context {
        report.push_str("\nℹ️ Details: ");
        report.push_str(&escape_html(context));
    }
    report
}

/// Notifier plus the clock used to timestamp reports.
pub struct Reporter<N> {
    notifier: N,
    clock: SharedClock,
}

impl<N: Notifier> Reporter<N> {
    pub fn new(notifier: N, clock: SharedClock) -> Self {
        Self { notifier, clock }
    }

    pub fn now(&self) -> LocalTime {
        self.clock.now()
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Best effort. The outcome is logged and returned, never an error.
    pub async fn send(&self, html: &str) -> DeliveryOutcome {
        let outcome = self.notifier.send(html).await;
        match outcome {
            DeliveryOutcome::Delivered | DeliveryOutcome::Disabled => {
                debug!("Notification outcome: {:?}", outcome)
            }
            _ => warn!(
                "[{}] notification not delivered: {:?}",
                FailureKind::Notifier,
                outcome
            ),
        }
        outcome
    }

    pub async fn failure(&self, kind: FailureKind, message: &str, context: Option<&str>) {
        match context {
            Some(context) => error!("[{}] {} ({})", kind, message, context),
            None => error!("[{}] {}", kind, message),
        }
        let report = failure_report(kind, message, context, &self.now());
        self.send(&report).await;
    }

    pub async fn error(&self, kind: FailureKind, err: &CoreError, context: Option<&str>) {
        let message = format!("{} [{}]", err, err.error_code());
        self.failure(kind, &message, context).await;
    }
}
