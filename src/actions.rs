//! Outbound platform actions used by the moderation pipeline.
//!
//! The gateway layer implements [`ModerationActions`] on top of serenity;
//! [`RecordingActions`] records calls in memory so the pipeline can be driven in tests.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use serenity::async_trait;

use crate::error::ActionError;
use crate::joinwatch::JoinReport;

/// Audit log line posted to a guild's log channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub description: String,
    /// `None` for actions the bot took on its own.
    pub actor: Option<Actor>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: u64,
    pub name: String,
}

#[async_trait]
pub trait ModerationActions: Send + Sync {
    async fn timeout(&self, guild_id: u64, user_id: u64, duration: Duration, reason: &str) -> Result<(), ActionError>;

    async fn kick(&self, guild_id: u64, user_id: u64, reason: &str) -> Result<(), ActionError>;

    async fn ban(&self, guild_id: u64, user_id: u64, reason: &str) -> Result<(), ActionError>;

    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<(), ActionError>;

    async fn send_log(&self, channel_id: u64, entry: &LogEntry) -> Result<(), ActionError>;

    async fn send_join_report(&self, channel_id: u64, report: &JoinReport) -> Result<(), ActionError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedAction {
    Timeout { guild_id: u64, user_id: u64, duration: Duration, reason: String },
    Kick { guild_id: u64, user_id: u64, reason: String },
    Ban { guild_id: u64, user_id: u64, reason: String },
    DeleteMessage { channel_id: u64, message_id: u64 },
    Log { channel_id: u64, entry: LogEntry },
    JoinReport { channel_id: u64, report: JoinReport },
}

/// Which recorded call kinds should fail with `PermissionDenied`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Timeout,
    Kick,
    Ban,
    DeleteMessage,
    Log,
    JoinReport,
}

#[derive(Debug, Default)]
pub struct RecordingActions {
    calls: Mutex<Vec<RecordedAction>>,
    denied: Mutex<HashSet<ActionKind>>,
}

impl RecordingActions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny(&self, kind: ActionKind) {
        if let Ok(mut d) = self.denied.lock() {
            d.insert(kind);
        }
    }

    /// Successful calls, in order. Denied calls are not recorded.
    pub fn calls(&self) -> Vec<RecordedAction> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn timeouts(&self) -> Vec<Duration> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                RecordedAction::Timeout { duration, .. } => Some(duration),
                _ => None,
            })
            .collect()
    }

    pub fn logs(&self) -> Vec<LogEntry> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                RecordedAction::Log { entry, .. } => Some(entry),
                _ => None,
            })
            .collect()
    }

    fn record(&self, kind: ActionKind, call: RecordedAction) -> Result<(), ActionError> {
        let denied = self.denied.lock().map(|d| d.contains(&kind)).unwrap_or(false);
        if denied {
            return Err(ActionError::PermissionDenied);
        }
        if let Ok(mut c) = self.calls.lock() {
            c.push(call);
        }
        Ok(())
    }
}

#[async_trait]
impl ModerationActions for RecordingActions {
    async fn timeout(&self, guild_id: u64, user_id: u64, duration: Duration, reason: &str) -> Result<(), ActionError> {
        self.record(
            ActionKind::Timeout,
            RecordedAction::Timeout { guild_id, user_id, duration, reason: reason.to_string() },
        )
    }

    async fn kick(&self, guild_id: u64, user_id: u64, reason: &str) -> Result<(), ActionError> {
        self.record(
            ActionKind::Kick,
            RecordedAction::Kick { guild_id, user_id, reason: reason.to_string() },
        )
    }

    async fn ban(&self, guild_id: u64, user_id: u64, reason: &str) -> Result<(), ActionError> {
        self.record(
            ActionKind::Ban,
            RecordedAction::Ban { guild_id, user_id, reason: reason.to_string() },
        )
    }

    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<(), ActionError> {
        self.record(
            ActionKind::DeleteMessage,
            RecordedAction::DeleteMessage { channel_id, message_id },
        )
    }

    async fn send_log(&self, channel_id: u64, entry: &LogEntry) -> Result<(), ActionError> {
        self.record(
            ActionKind::Log,
            RecordedAction::Log { channel_id, entry: entry.clone() },
        )
    }

    async fn send_join_report(&self, channel_id: u64, report: &JoinReport) -> Result<(), ActionError> {
        self.record(
            ActionKind::JoinReport,
            RecordedAction::JoinReport { channel_id, report: report.clone() },
        )
    }
}
