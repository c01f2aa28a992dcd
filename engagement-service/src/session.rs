use crate::schedule::ScheduleGate;
use reciprocity_core::{AtUri, Did, TargetPost};
use std::collections::HashSet;

/// Posts already reciprocated by this process, plus the users handled in the
/// current cycle.
#[derive(Debug, Default, Clone)]
pub struct ProcessedSet {
    replied: HashSet<AtUri>,
    liked: HashSet<AtUri>,
    cycle_users: HashSet<Did>,
}

impl ProcessedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_replied(&self, post: &AtUri) -> bool {
        self.replied.contains(post)
    }

    pub fn is_liked(&self, post: &AtUri) -> bool {
        self.liked.contains(post)
    }

    pub fn record_reply(&mut self, post: AtUri) -> bool {
        self.replied.insert(post)
    }

    pub fn record_like(&mut self, post: AtUri) -> bool {
        self.liked.insert(post)
    }

    pub fn replied_count(&self) -> usize {
        self.replied.len()
    }

    pub fn liked_count(&self) -> usize {
        self.liked.len()
    }

    pub fn begin_cycle(&mut self) {
        self.cycle_users.clear();
    }

    /// Claims `user` for this cycle. False if already claimed.
    pub fn claim_user(&mut self, user: &Did) -> bool {
        self.cycle_users.insert(user.clone())
    }

    pub fn cycle_user_count(&self) -> usize {
        self.cycle_users.len()
    }
}

/// Everything the loop keeps between cycles. Lives from startup to process exit.
#[derive(Debug, Clone)]
pub struct Session {
    pub target: TargetPost,
    pub processed: ProcessedSet,
    pub gate: ScheduleGate,
}

impl Session {
    pub fn new(target: TargetPost) -> Self {
        Self {
            target,
            processed: ProcessedSet::new(),
            gate: ScheduleGate::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processed_posts_survive_cycles() {
        let mut processed = ProcessedSet::new();
        let post = AtUri::post(&Did::new("did:plc:a"), "1");

        assert!(processed.record_reply(post.clone()));
        assert!(!processed.record_reply(post.clone()));
        assert!(processed.is_replied(&post));
        assert!(!processed.is_liked(&post));

        processed.begin_cycle();
        assert!(processed.is_replied(&post));
        assert_eq!(processed.replied_count(), 1);
    }

    #[test]
    fn test_cycle_users_reset() {
        let mut processed = ProcessedSet::new();
        let user = Did::new("did:plc:a");

        assert!(processed.claim_user(&user));
        assert!(!processed.claim_user(&user));
        assert_eq!(processed.cycle_user_count(), 1);

        processed.begin_cycle();
        assert!(processed.claim_user(&user));
    }
}
