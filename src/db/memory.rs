//! In-process storage. Used by tests and when `database.url` is `memory:` (nothing survives a restart).

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use serenity::async_trait;
use tokio::sync::Mutex;

use super::Storage;
use crate::prefs::{apply_field, GuildPrefs};
use crate::warnings::WarnEntry;

#[derive(Debug, Default)]
pub struct MemoryStorage {
    prefs: Mutex<HashMap<u64, GuildPrefs>>,
    warnings: Mutex<HashMap<(u64, u64), BTreeMap<i64, WarnEntry>>>,
    prefs_inserts: AtomicUsize,
    prefs_loads: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many preference documents were actually created.
    pub fn prefs_inserts(&self) -> usize {
        self.prefs_inserts.load(Ordering::SeqCst)
    }

    pub fn prefs_loads(&self) -> usize {
        self.prefs_loads.load(Ordering::SeqCst)
    }

    /// Makes every following write fail, to exercise error paths.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("storage unavailable");
        }
        Ok(())
    }

    /// Stored document, bypassing any cache.
    pub async fn stored_prefs(&self, guild_id: u64) -> Option<GuildPrefs> {
        self.prefs.lock().await.get(&guild_id).cloned()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn load_prefs(&self, guild_id: u64) -> Result<Option<GuildPrefs>> {
        self.prefs_loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.prefs.lock().await.get(&guild_id).cloned())
    }

    async fn insert_prefs_if_absent(&self, guild_id: u64, prefs: &GuildPrefs) -> Result<GuildPrefs> {
        self.check_writable()?;
        let mut map = self.prefs.lock().await;
        let stored = map.entry(guild_id).or_insert_with(|| {
            self.prefs_inserts.fetch_add(1, Ordering::SeqCst);
            prefs.clone()
        });
        Ok(stored.clone())
    }

    async fn update_prefs_field(&self, guild_id: u64, path: &[String], value: &Value) -> Result<()> {
        self.check_writable()?;
        let mut map = self.prefs.lock().await;
        let Some(current) = map.get(&guild_id) else {
            anyhow::bail!("no preference document for guild {guild_id}");
        };
        let updated = apply_field(current, path, value.clone())?;
        map.insert(guild_id, updated);
        Ok(())
    }

    async fn delete_prefs(&self, guild_id: u64) -> Result<()> {
        self.check_writable()?;
        self.prefs.lock().await.remove(&guild_id);
        Ok(())
    }

    async fn append_warning(
        &self,
        guild_id: u64,
        user_id: u64,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<i64> {
        self.check_writable()?;
        let mut map = self.warnings.lock().await;
        let entries = map.entry((guild_id, user_id)).or_default();
        let id = entries.keys().next_back().map(|last| last + 1).unwrap_or(0);
        entries.insert(
            id,
            WarnEntry {
                id,
                reason: reason.to_string(),
                created_at: at,
            },
        );
        Ok(id)
    }

    async fn list_warnings(&self, guild_id: u64, user_id: u64) -> Result<Vec<WarnEntry>> {
        let map = self.warnings.lock().await;
        Ok(map
            .get(&(guild_id, user_id))
            .map(|e| e.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn remove_warning(&self, guild_id: u64, user_id: u64, warn_id: i64) -> Result<Option<WarnEntry>> {
        self.check_writable()?;
        let mut map = self.warnings.lock().await;
        Ok(map
            .get_mut(&(guild_id, user_id))
            .and_then(|e| e.remove(&warn_id)))
    }
}
