//! Warning log: per (guild, user) entries numbered from 0.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::Storage;
use crate::error::CommandError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarnEntry {
    pub id: i64,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl WarnEntry {
    /// One-line rendering used in replies and the audit log.
    pub fn render(&self) -> String {
        format!(
            "ID: ``{}`` {}\n<t:{}:f>",
            self.id,
            self.reason,
            self.created_at.timestamp()
        )
    }
}

#[derive(Debug, Clone)]
pub struct WarningLog {
    storage: Arc<dyn Storage>,
}

impl WarningLog {
    pub fn new(storage: Arc<dyn Storage>) -> Arc<Self> {
        Arc::new(Self { storage })
    }

    pub async fn exec_warn(&self, guild_id: u64, user_id: u64, reason: &str) -> Result<i64> {
        let id = self
            .storage
            .append_warning(guild_id, user_id, reason, Utc::now())
            .await?;
        info!(gid = guild_id, uid = user_id, warn_id = id, reason, "warning recorded");
        Ok(id)
    }

    pub async fn list(&self, guild_id: u64, user_id: u64) -> Result<Vec<WarnEntry>> {
        self.storage.list_warnings(guild_id, user_id).await
    }

    /// Removes one warning. A missing id is a user-facing `NotFound`.
    pub async fn unwarn(&self, guild_id: u64, user_id: u64, warn_id: i64) -> Result<Result<WarnEntry, CommandError>> {
        let removed = self.storage.remove_warning(guild_id, user_id, warn_id).await?;
        Ok(removed.ok_or_else(|| CommandError::NotFound(format!("warning {warn_id}"))))
    }
}

/// Splits warnings into pages of `per_page` for paginated display.
pub fn paginate(entries: &[WarnEntry], per_page: usize) -> Vec<&[WarnEntry]> {
    if entries.is_empty() {
        return vec![];
    }
    entries.chunks(per_page.max(1)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStorage;

    #[tokio::test]
    async fn ids_increment_per_user() {
        let log = WarningLog::new(Arc::new(MemoryStorage::new()));
        assert_eq!(log.exec_warn(1, 10, "a").await.unwrap(), 0);
        assert_eq!(log.exec_warn(1, 10, "b").await.unwrap(), 1);
        assert_eq!(log.exec_warn(1, 11, "c").await.unwrap(), 0);
        assert_eq!(log.exec_warn(2, 10, "d").await.unwrap(), 0);

        let list = log.list(1, 10).await.unwrap();
        assert_eq!(list.iter().map(|w| w.reason.as_str()).collect::<Vec<_>>(), ["a", "b"]);
    }

    #[tokio::test]
    async fn unwarn_missing_is_not_found() {
        let log = WarningLog::new(Arc::new(MemoryStorage::new()));
        log.exec_warn(1, 10, "spam").await.unwrap();

        let removed = log.unwarn(1, 10, 0).await.unwrap().unwrap();
        assert_eq!(removed.reason, "spam");
        assert!(matches!(log.unwarn(1, 10, 0).await.unwrap(), Err(CommandError::NotFound(_))));
        assert!(log.list(1, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn numbering_continues_after_last_remaining() {
        let log = WarningLog::new(Arc::new(MemoryStorage::new()));
        for r in ["a", "b", "c"] {
            log.exec_warn(1, 1, r).await.unwrap();
        }
        log.unwarn(1, 1, 1).await.unwrap().unwrap();
        assert_eq!(log.exec_warn(1, 1, "d").await.unwrap(), 3);
    }

    #[test]
    fn paginate_chunks() {
        let e = |id| WarnEntry { id, reason: "r".into(), created_at: Utc::now() };
        let all: Vec<_> = (0..7).map(e).collect();
        let pages = paginate(&all, 3);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[2].len(), 1);
        assert!(paginate(&[], 3).is_empty());
    }
}
