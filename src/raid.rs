//! Raid/spam heuristics.
//!
//! One [`RaidChecker`] per guild composes four rate buckets with join timing:
//! 1) fast joiners: 10 msgs / 12 s per channel (hit-and-run)
//! 2) new members: 30 msgs / 35 s per channel
//! 3) any author: 10 msgs / 12 s
//! 4) same text in the same channel: 15 msgs / 17 s
//!
//! [`SpamGuard`] owns the per-guild checkers, each behind its own mutex so a
//! window check-and-increment is atomic even with a multi-threaded runtime.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::GuardConfig;
use crate::event::{MemberInfo, MessageEvent};
use crate::expiring::ExpiringCache;
use crate::ratelimit::KeyedBucket;

/// Which bucket tripped first for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpamSignal {
    HitAndRun,
    NewUser,
    ByUser,
    ByContent,
}

impl SpamSignal {
    pub fn as_str(self) -> &'static str {
        match self {
            SpamSignal::HitAndRun => "hit_and_run",
            SpamSignal::NewUser => "new_user",
            SpamSignal::ByUser => "by_user",
            SpamSignal::ByContent => "by_content",
        }
    }
}

fn author_key(m: &MessageEvent) -> u64 {
    m.author.id
}

fn content_key(m: &MessageEvent) -> (u64, String) {
    (m.channel_id, m.content.clone())
}

fn channel_key(m: &MessageEvent) -> u64 {
    m.channel_id
}

#[derive(Debug)]
pub struct RaidChecker {
    cfg: GuardConfig,
    by_user: KeyedBucket<MessageEvent, u64>,
    by_content: KeyedBucket<MessageEvent, (u64, String)>,
    new_user: KeyedBucket<MessageEvent, u64>,
    hit_and_run: KeyedBucket<MessageEvent, u64>,
    last_join: Option<DateTime<Utc>>,
    fast_joiners: ExpiringCache<u64, ()>,
}

impl Default for RaidChecker {
    fn default() -> Self {
        Self::new(GuardConfig::default())
    }
}

impl RaidChecker {
    pub fn new(cfg: GuardConfig) -> Self {
        Self {
            by_user: KeyedBucket::new(cfg.by_user, author_key),
            by_content: KeyedBucket::new(cfg.by_content, content_key),
            new_user: KeyedBucket::new(cfg.new_user, channel_key),
            hit_and_run: KeyedBucket::new(cfg.hit_and_run, channel_key),
            last_join: None,
            fast_joiners: ExpiringCache::new(Duration::from_secs(cfg.fast_joiner_ttl_secs)),
            cfg,
        }
    }

    /// Account younger than `new_account_days` AND member for less than `new_member_days`.
    pub fn is_new(&self, member: &MemberInfo, now: DateTime<Utc>) -> bool {
        let account_cutoff = now - chrono::Duration::days(self.cfg.new_account_days);
        let member_cutoff = now - chrono::Duration::days(self.cfg.new_member_days);
        member.created_at > account_cutoff
            && member.joined_at.is_some_and(|j| j > member_cutoff)
    }

    /// Compares this join with the previous one only. The first join seeds the timestamp.
    pub fn is_fast_join(&mut self, member: &MemberInfo, seen: Instant) -> bool {
        let joined = member.joined_at.unwrap_or_else(Utc::now);
        let Some(last) = self.last_join.replace(joined) else {
            return false;
        };

        let gap_secs = (joined - last).num_milliseconds() as f64 / 1000.0;
        let is_fast = gap_secs <= self.cfg.fast_join_secs;
        if is_fast {
            self.fast_joiners.put_at(member.id, (), seen);
        }
        is_fast
    }

    pub fn is_fast_joiner(&mut self, user_id: u64, seen: Instant) -> bool {
        self.fast_joiners.contains_at(&user_id, seen)
    }

    pub fn last_join(&self) -> Option<DateTime<Utc>> {
        self.last_join
    }

    /// First tripped bucket for this message, if any. Later buckets are not touched once one trips.
    pub fn check_message(&mut self, msg: &MessageEvent, seen: Instant) -> Option<SpamSignal> {
        msg.guild_id?;

        let current = msg.timestamp_secs();

        if self.fast_joiners.contains_at(&msg.author.id, seen) && self.hit_and_run.check(msg, current) {
            return Some(SpamSignal::HitAndRun);
        }

        if self.is_new(&msg.author, msg.created_at) && self.new_user.check(msg, current) {
            return Some(SpamSignal::NewUser);
        }

        if self.by_user.check(msg, current) {
            return Some(SpamSignal::ByUser);
        }

        if self.by_content.check(msg, current) {
            return Some(SpamSignal::ByContent);
        }

        None
    }

    pub fn is_spamming(&mut self, msg: &MessageEvent, seen: Instant) -> bool {
        self.check_message(msg, seen).is_some()
    }

    /// Drops stale bucket windows and expired fast joiners.
    pub fn prune(&mut self, now_secs: f64, seen: Instant) {
        self.by_user.prune(now_secs);
        self.by_content.prune(now_secs);
        self.new_user.prune(now_secs);
        self.hit_and_run.prune(now_secs);
        self.fast_joiners.purge(seen);
    }
}

/* ==============================
   Rejestr per-gildia
   ============================== */

#[derive(Debug)]
pub struct SpamGuard {
    cfg: GuardConfig,
    checkers: DashMap<u64, Arc<Mutex<RaidChecker>>>,
}

impl SpamGuard {
    pub fn new(cfg: GuardConfig) -> Arc<Self> {
        Arc::new(Self {
            cfg,
            checkers: DashMap::new(),
        })
    }

    /// Lazily created checker for a guild.
    pub fn checker(&self, guild_id: u64) -> Arc<Mutex<RaidChecker>> {
        self.checkers
            .entry(guild_id)
            .or_insert_with(|| Arc::new(Mutex::new(RaidChecker::new(self.cfg.clone()))))
            .clone()
    }

    pub fn guild_count(&self) -> usize {
        self.checkers.len()
    }

    pub async fn check_message(&self, msg: &MessageEvent) -> Option<SpamSignal> {
        let gid = msg.guild_id?;
        let checker = self.checker(gid);
        let mut checker = checker.lock().await;
        let signal = checker.check_message(msg, Instant::now());
        if let Some(s) = signal {
            debug!(gid, uid = msg.author.id, channel = msg.channel_id, signal = s.as_str(), "spam bucket tripped");
        }
        signal
    }

    pub async fn is_spamming(&self, msg: &MessageEvent) -> bool {
        self.check_message(msg).await.is_some()
    }

    pub async fn is_fast_join(&self, guild_id: u64, member: &MemberInfo) -> bool {
        let checker = self.checker(guild_id);
        let mut checker = checker.lock().await;
        checker.is_fast_join(member, Instant::now())
    }

    pub async fn is_new(&self, guild_id: u64, member: &MemberInfo) -> bool {
        let checker = self.checker(guild_id);
        let checker = checker.lock().await;
        checker.is_new(member, Utc::now())
    }

    pub async fn prune_all(&self) {
        let now_secs = Utc::now().timestamp_millis() as f64 / 1000.0;
        let seen = Instant::now();
        let all: Vec<Arc<Mutex<RaidChecker>>> =
            self.checkers.iter().map(|e| e.value().clone()).collect();
        for checker in all {
            checker.lock().await.prune(now_secs, seen);
        }
    }

    /// Background sweep; stops once the guard is dropped.
    pub fn spawn_prune_task(this: &Arc<Self>) {
        let weak = Arc::downgrade(this);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                if let Some(strong) = weak.upgrade() {
                    strong.prune_all().await;
                } else {
                    break;
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn t_ms(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
    }

    fn old_member(id: u64) -> MemberInfo {
        MemberInfo::new(id, t(0) - chrono::Duration::days(200), Some(t(0) - chrono::Duration::days(100)))
    }

    fn new_member(id: u64) -> MemberInfo {
        MemberInfo::new(id, t(0) - chrono::Duration::days(3), Some(t(0) - chrono::Duration::days(1)))
    }

    fn msg(author: MemberInfo, channel: u64, text: &str, at: DateTime<Utc>) -> MessageEvent {
        MessageEvent {
            guild_id: Some(1),
            channel_id: channel,
            message_id: 0,
            author,
            content: text.to_string(),
            created_at: at,
        }
    }

    #[test]
    fn is_new_requires_both_bounds() {
        let c = RaidChecker::default();
        let now = t(0);
        let days = chrono::Duration::days;

        assert!(c.is_new(&MemberInfo::new(1, now - days(89), Some(now - days(6))), now));
        // stare konto, świeży join
        assert!(!c.is_new(&MemberInfo::new(1, now - days(91), Some(now - days(1))), now));
        // młode konto, stary join
        assert!(!c.is_new(&MemberInfo::new(1, now - days(30), Some(now - days(8))), now));
        assert!(!c.is_new(&MemberInfo::new(1, now - days(30), None), now));
    }

    #[test]
    fn first_join_seeds_and_returns_false() {
        let mut c = RaidChecker::default();
        let m = MemberInfo::new(5, t(-10), Some(t(0)));
        assert!(!c.is_fast_join(&m, Instant::now()));
        assert_eq!(c.last_join(), Some(t(0)));
    }

    #[test]
    fn fast_join_within_two_seconds() {
        let seen = Instant::now();
        let mut c = RaidChecker::default();
        assert!(!c.is_fast_join(&MemberInfo::new(1, t(-10), Some(t_ms(0))), seen));
        assert!(c.is_fast_join(&MemberInfo::new(2, t(-10), Some(t_ms(1_500))), seen));
        assert!(c.is_fast_joiner(2, seen));
        assert!(!c.is_fast_joiner(1, seen));

        // 3s after the previous join: not fast, timestamp still advances
        assert!(!c.is_fast_join(&MemberInfo::new(3, t(-10), Some(t_ms(4_500))), seen));
        assert_eq!(c.last_join(), Some(t_ms(4_500)));
        assert!(!c.is_fast_joiner(3, seen));
    }

    #[test]
    fn fast_joiner_flag_lasts_exactly_ttl() {
        let seen = Instant::now();
        let mut c = RaidChecker::default();
        c.is_fast_join(&MemberInfo::new(1, t(-10), Some(t(0))), seen);
        c.is_fast_join(&MemberInfo::new(2, t(-10), Some(t(1))), seen);

        assert!(c.is_fast_joiner(2, seen + Duration::from_secs(1800)));
        assert!(!c.is_fast_joiner(2, seen + Duration::from_secs(1801)));
    }

    #[test]
    fn burst_from_old_account_trips_by_user_on_eleventh() {
        let seen = Instant::now();
        let mut c = RaidChecker::default();
        let author = old_member(9);
        for i in 0..10 {
            let m = msg(author.clone(), 100, &format!("msg {i}"), t_ms(i * 900));
            assert!(!c.is_spamming(&m, seen), "tripped at {}", i + 1);
        }
        let m = msg(author, 100, "msg 10", t_ms(9_500));
        assert_eq!(c.check_message(&m, seen), Some(SpamSignal::ByUser));
    }

    #[test]
    fn many_new_accounts_trip_new_user_bucket() {
        let seen = Instant::now();
        let mut c = RaidChecker::default();
        for i in 0..30u64 {
            let m = msg(new_member(1000 + i), 7, &format!("hello {i}"), t_ms(i as i64 * 900));
            assert!(!c.is_spamming(&m, seen));
        }
        let m = msg(new_member(2000), 7, "hello again", t_ms(29_500));
        assert_eq!(c.check_message(&m, seen), Some(SpamSignal::NewUser));
    }

    #[test]
    fn old_accounts_do_not_feed_new_user_bucket() {
        let seen = Instant::now();
        let mut c = RaidChecker::default();
        for i in 0..40u64 {
            let m = msg(old_member(1000 + i), 7, &format!("hello {i}"), t_ms(i as i64 * 500));
            assert!(!c.is_spamming(&m, seen));
        }
    }

    #[test]
    fn same_text_trips_by_content() {
        let seen = Instant::now();
        let mut c = RaidChecker::default();
        for i in 0..15u64 {
            let m = msg(old_member(i), 3, "buy now", t_ms(i as i64 * 1000));
            assert!(!c.is_spamming(&m, seen));
        }
        let m = msg(old_member(99), 3, "buy now", t_ms(15_000));
        assert_eq!(c.check_message(&m, seen), Some(SpamSignal::ByContent));

        // inny kanał, ta sama treść
        let m = msg(old_member(98), 4, "buy now", t_ms(15_000));
        assert!(!c.is_spamming(&m, seen));
    }

    #[test]
    fn fast_joiners_hit_stricter_bucket_first() {
        let seen = Instant::now();
        let mut c = RaidChecker::default();
        c.is_fast_join(&old_member(1), seen);
        let mut joiner = old_member(2);
        joiner.joined_at = Some(t(0) - chrono::Duration::days(100) + chrono::Duration::seconds(1));
        assert!(c.is_fast_join(&joiner, seen));

        for i in 0..10 {
            let m = msg(joiner.clone(), 50, &format!("x{i}"), t_ms(i * 100));
            assert!(!c.is_spamming(&m, seen));
        }
        let m = msg(joiner, 50, "x10", t_ms(1_000));
        assert_eq!(c.check_message(&m, seen), Some(SpamSignal::HitAndRun));
    }

    #[test]
    fn message_without_guild_is_never_spam() {
        let seen = Instant::now();
        let mut c = RaidChecker::default();
        for i in 0..50 {
            let mut m = msg(old_member(1), 1, "dm", t_ms(i));
            m.guild_id = None;
            assert!(!c.is_spamming(&m, seen));
        }
    }

    #[tokio::test]
    async fn guard_keeps_guilds_apart() {
        let guard = SpamGuard::new(GuardConfig::default());
        let author = old_member(1);
        for i in 0..10 {
            let mut m = msg(author.clone(), 1, &format!("{i}"), t_ms(i * 10));
            m.guild_id = Some(10);
            assert!(!guard.is_spamming(&m).await);
        }
        let mut other = msg(author.clone(), 1, "x", t_ms(200));
        other.guild_id = Some(20);
        assert!(!guard.is_spamming(&other).await);

        let mut m = msg(author, 1, "y", t_ms(300));
        m.guild_id = Some(10);
        assert!(guard.is_spamming(&m).await);
        assert_eq!(guard.guild_count(), 2);
    }
}
