//! Transport-independent inbound events.
//!
//! The gateway layer converts serenity models into these so the checker,
//! the punishment executor and the security pipeline never touch serenity types.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct MemberInfo {
    pub id: u64,
    /// Account creation time (derived from the snowflake).
    pub created_at: DateTime<Utc>,
    /// Guild join time, if the platform reported one.
    pub joined_at: Option<DateTime<Utc>>,
    pub display_name: String,
    pub bot: bool,
    /// Members allowed to manage messages are never inspected by the spam pipeline.
    pub can_manage_messages: bool,
}

impl MemberInfo {
    pub fn new(id: u64, created_at: DateTime<Utc>, joined_at: Option<DateTime<Utc>>) -> Self {
        Self {
            id,
            created_at,
            joined_at,
            display_name: id.to_string(),
            bot: false,
            can_manage_messages: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    pub guild_id: Option<u64>,
    pub channel_id: u64,
    pub message_id: u64,
    pub author: MemberInfo,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl MessageEvent {
    /// Creation time as fractional unix seconds, the clock the rate buckets run on.
    pub fn timestamp_secs(&self) -> f64 {
        self.created_at.timestamp_millis() as f64 / 1000.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinEvent {
    pub guild_id: u64,
    pub member: MemberInfo,
    pub avatar_url: Option<String>,
}

/// Platform automod trigger kinds we react to (numeric values follow the platform).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutomodTrigger {
    Keyword,
    Spam,
    KeywordPreset,
    MentionSpam,
    Other(u8),
}

impl AutomodTrigger {
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => AutomodTrigger::Keyword,
            3 => AutomodTrigger::Spam,
            4 => AutomodTrigger::KeywordPreset,
            5 => AutomodTrigger::MentionSpam,
            other => AutomodTrigger::Other(other),
        }
    }

    /// Only spam-type triggers feed the antispam punishments.
    pub fn is_spam(self) -> bool {
        matches!(self, AutomodTrigger::Spam | AutomodTrigger::MentionSpam)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AutomodEvent {
    pub guild_id: u64,
    /// Member the platform flagged.
    pub member: MemberInfo,
    pub trigger: AutomodTrigger,
}
