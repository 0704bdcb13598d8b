//! Guild preference documents.
//!
//! [`PrefStore`] is a read-through cache over [`Storage`]: the first access for a
//! guild loads its document or persists defaults, later reads hit memory.
//! Writes go to storage first and only then replace the cached copy, so a failed
//! write never leaves a half-applied document in the cache. Writes of one guild
//! are serialized by a per-guild mutex.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use dashmap::DashMap;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::db::Storage;
use crate::error::PrefsError;
use crate::punish::PunishmentKind;

/// Abuse categories that each carry their own punishment list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Antispam,
    Linkfilter,
    Antiraid,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Antispam, Category::Linkfilter, Category::Antiraid];

    /// Field name inside the preference document.
    pub fn key(self) -> &'static str {
        match self {
            Category::Antispam => "antispam",
            Category::Linkfilter => "linkfilter",
            Category::Antiraid => "antiraid",
        }
    }

    /// Audit reason attached to punishments of this category.
    pub fn reason(self) -> &'static str {
        match self {
            Category::Antispam | Category::Antiraid => "Anti Spam",
            Category::Linkfilter => "Link Filter",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AntispamPrefs {
    pub enabled: bool,
    pub punishments: Vec<PunishmentKind>,
    /// Channel receiving platform automod alerts; 0 = none.
    pub notify: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CategoryPrefs {
    pub enabled: bool,
    pub punishments: Vec<PunishmentKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuildPrefs {
    pub lang: String,
    /// Audit log channel; 0 = logging disabled.
    pub logs: u64,
    pub antispam: AntispamPrefs,
    pub linkfilter: CategoryPrefs,
    pub antiraid: CategoryPrefs,
    /// Join report channel; 0 = join watch disabled.
    pub joinwatch: u64,
}

impl Default for GuildPrefs {
    fn default() -> Self {
        Self::with_lang("en")
    }
}

impl GuildPrefs {
    pub fn with_lang(lang: &str) -> Self {
        Self {
            lang: lang.to_string(),
            logs: 0,
            antispam: AntispamPrefs::default(),
            linkfilter: CategoryPrefs::default(),
            antiraid: CategoryPrefs::default(),
            joinwatch: 0,
        }
    }

    pub fn policy(&self, category: Category) -> CategoryPolicy {
        let (enabled, punishments) = match category {
            Category::Antispam => (self.antispam.enabled, &self.antispam.punishments),
            Category::Linkfilter => (self.linkfilter.enabled, &self.linkfilter.punishments),
            Category::Antiraid => (self.antiraid.enabled, &self.antiraid.punishments),
        };
        CategoryPolicy {
            category,
            enabled,
            punishments: punishments.clone(),
        }
    }

    pub fn log_channel(&self) -> Option<u64> {
        (self.logs != 0).then_some(self.logs)
    }

    pub fn joinwatch_channel(&self) -> Option<u64> {
        (self.joinwatch != 0).then_some(self.joinwatch)
    }
}

/// Punishment configuration of one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryPolicy {
    pub category: Category,
    pub enabled: bool,
    pub punishments: Vec<PunishmentKind>,
}

/// Single choice offered by `/antiraid` and `/linkfilter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PunishmentChoice {
    Disable,
    Punish(PunishmentKind),
}

impl PunishmentChoice {
    pub fn parse(raw: &str) -> Option<Self> {
        if raw == "disable" {
            return Some(PunishmentChoice::Disable);
        }
        raw.parse().ok().map(PunishmentChoice::Punish)
    }
}

/// Ordered set: keeps the first occurrence of each kind.
pub fn dedup_punishments(kinds: &[PunishmentKind]) -> Vec<PunishmentKind> {
    let mut out: Vec<PunishmentKind> = Vec::with_capacity(kinds.len());
    for k in kinds {
        if !out.contains(k) {
            out.push(*k);
        }
    }
    out
}

pub fn split_path(dotted: &str) -> Vec<String> {
    dotted.split('.').map(str::to_string).collect()
}

/// Returns a copy of `prefs` with the field at `path` replaced by `value`.
/// Unknown paths and values of the wrong shape are rejected.
pub fn apply_field(prefs: &GuildPrefs, path: &[String], value: Value) -> Result<GuildPrefs, PrefsError> {
    let dotted = path.join(".");
    let invalid = |reason: &str| PrefsError::InvalidField {
        path: dotted.clone(),
        reason: reason.to_string(),
    };

    if path.is_empty() || path.iter().any(|s| s.is_empty()) {
        return Err(invalid("empty path segment"));
    }

    let mut doc = serde_json::to_value(prefs).map_err(|e| PrefsError::Storage(e.into()))?;
    let mut node = &mut doc;
    for seg in path {
        node = node
            .as_object_mut()
            .and_then(|o| o.get_mut(seg))
            .ok_or_else(|| invalid("no such field"))?;
    }
    *node = value;

    serde_json::from_value(doc).map_err(|e| invalid(&e.to_string()))
}

#[derive(Debug)]
pub struct PrefStore {
    storage: Arc<dyn Storage>,
    cache: Cache<u64, GuildPrefs>,
    /// Serializes read-modify-write of one guild's document.
    write_locks: DashMap<u64, Arc<Mutex<()>>>,
    default_lang: String,
}

impl PrefStore {
    pub fn new(storage: Arc<dyn Storage>, default_lang: &str) -> Arc<Self> {
        Arc::new(Self {
            storage,
            cache: Cache::builder().max_capacity(100_000).build(),
            write_locks: DashMap::new(),
            default_lang: default_lang.to_string(),
        })
    }

    /// Preferences of a guild; persists defaults on first contact.
    /// Concurrent first calls for the same guild share a single load.
    pub async fn get_preferences(&self, guild_id: u64) -> Result<GuildPrefs> {
        let storage = self.storage.clone();
        let default_lang = self.default_lang.clone();
        self.cache
            .try_get_with(guild_id, async move {
                if let Some(found) = storage.load_prefs(guild_id).await? {
                    return Ok::<_, anyhow::Error>(found);
                }
                info!(gid = guild_id, "creating default guild preferences");
                storage
                    .insert_prefs_if_absent(guild_id, &GuildPrefs::with_lang(&default_lang))
                    .await
            })
            .await
            .map_err(|e| anyhow!("loading preferences for guild {guild_id}: {e:#}"))
    }

    /// Ensures the default document exists (guild join).
    pub async fn set_default_prefs(&self, guild_id: u64) -> Result<GuildPrefs> {
        self.get_preferences(guild_id).await
    }

    fn write_lock(&self, guild_id: u64) -> Arc<Mutex<()>> {
        self.write_locks
            .entry(guild_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Updates one field given as a dotted path, e.g. `antispam.notify`.
    /// Updates of the same guild run one at a time, so the cached copy never drops a concurrent write.
    pub async fn set_field(&self, guild_id: u64, dotted: &str, value: Value) -> Result<GuildPrefs, PrefsError> {
        let path = split_path(dotted);
        let lock = self.write_lock(guild_id);
        let _guard = lock.lock().await;

        let current = self.get_preferences(guild_id).await?;
        let updated = apply_field(&current, &path, value.clone())?;

        self.storage.update_prefs_field(guild_id, &path, &value).await?;
        self.cache.insert(guild_id, updated.clone()).await;
        debug!(gid = guild_id, field = dotted, "guild preference updated");
        Ok(updated)
    }

    pub async fn lang(&self, guild_id: u64) -> String {
        match self.get_preferences(guild_id).await {
            Ok(p) => p.lang,
            Err(e) => {
                tracing::warn!(error=?e, gid = guild_id, "prefs unavailable, using default language");
                self.default_lang.clone()
            }
        }
    }

    pub async fn policy(&self, guild_id: u64, category: Category) -> Result<CategoryPolicy> {
        Ok(self.get_preferences(guild_id).await?.policy(category))
    }

    pub async fn get_punishments(&self, guild_id: u64, category: Category) -> Result<Vec<PunishmentKind>> {
        Ok(self.policy(guild_id, category).await?.punishments)
    }

    pub async fn set_punishments(
        &self,
        guild_id: u64,
        category: Category,
        kinds: &[PunishmentKind],
    ) -> Result<GuildPrefs, PrefsError> {
        let kinds = dedup_punishments(kinds);
        let value = serde_json::to_value(&kinds).map_err(|e| PrefsError::Storage(e.into()))?;
        self.set_field(guild_id, &format!("{}.punishments", category.key()), value)
            .await
    }

    pub async fn set_enabled(&self, guild_id: u64, category: Category, enabled: bool) -> Result<GuildPrefs, PrefsError> {
        self.set_field(guild_id, &format!("{}.enabled", category.key()), Value::Bool(enabled))
            .await
    }

    /// `disable` switches the category off and clears its list; any kind enables it with that single kind.
    pub async fn configure_punishments(
        &self,
        guild_id: u64,
        category: Category,
        choice: PunishmentChoice,
    ) -> Result<GuildPrefs, PrefsError> {
        match choice {
            PunishmentChoice::Disable => {
                self.set_enabled(guild_id, category, false).await?;
                self.set_punishments(guild_id, category, &[]).await
            }
            PunishmentChoice::Punish(kind) => {
                self.set_punishments(guild_id, category, &[kind]).await?;
                self.set_enabled(guild_id, category, true).await
            }
        }
    }

    pub async fn set_channel(&self, guild_id: u64, dotted: &str, channel_id: Option<u64>) -> Result<GuildPrefs, PrefsError> {
        self.set_field(guild_id, dotted, Value::from(channel_id.unwrap_or(0)))
            .await
    }

    pub async fn set_lang(&self, guild_id: u64, lang: &str) -> Result<GuildPrefs, PrefsError> {
        self.set_field(guild_id, "lang", Value::String(lang.to_string()))
            .await
    }

    /// Drops the guild (bot removed from it).
    pub async fn forget(&self, guild_id: u64) -> Result<()> {
        let lock = self.write_lock(guild_id);
        let _guard = lock.lock().await;
        self.storage.delete_prefs(guild_id).await?;
        self.cache.invalidate(&guild_id).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStorage;
    use serde_json::json;

    fn store() -> (Arc<MemoryStorage>, Arc<PrefStore>) {
        let mem = Arc::new(MemoryStorage::new());
        let prefs = PrefStore::new(mem.clone(), "en");
        (mem, prefs)
    }

    #[tokio::test]
    async fn first_contact_creates_exactly_one_document() {
        let (mem, prefs) = store();
        let a = prefs.get_preferences(1).await.unwrap();
        let b = prefs.get_preferences(1).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(mem.prefs_inserts(), 1);
        assert_eq!(mem.prefs_loads(), 1);
    }

    #[tokio::test]
    async fn concurrent_first_contact_is_coalesced() {
        let (mem, prefs) = store();
        let (a, b, c) = tokio::join!(
            prefs.get_preferences(9),
            prefs.get_preferences(9),
            prefs.get_preferences(9)
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(mem.prefs_inserts(), 1);
    }

    #[tokio::test]
    async fn set_field_writes_through() {
        let (mem, prefs) = store();
        prefs.set_field(1, "antispam.notify", json!(555)).await.unwrap();

        assert_eq!(prefs.get_preferences(1).await.unwrap().antispam.notify, 555);
        assert_eq!(mem.stored_prefs(1).await.unwrap().antispam.notify, 555);
    }

    /// Storage whose field writes suspend before landing, like a network round trip.
    #[derive(Debug)]
    struct SlowWrites(MemoryStorage);

    #[serenity::async_trait]
    impl Storage for SlowWrites {
        async fn load_prefs(&self, guild_id: u64) -> Result<Option<GuildPrefs>> {
            self.0.load_prefs(guild_id).await
        }

        async fn insert_prefs_if_absent(&self, guild_id: u64, prefs: &GuildPrefs) -> Result<GuildPrefs> {
            self.0.insert_prefs_if_absent(guild_id, prefs).await
        }

        async fn update_prefs_field(&self, guild_id: u64, path: &[String], value: &Value) -> Result<()> {
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
            self.0.update_prefs_field(guild_id, path, value).await
        }

        async fn delete_prefs(&self, guild_id: u64) -> Result<()> {
            self.0.delete_prefs(guild_id).await
        }

        async fn append_warning(
            &self,
            guild_id: u64,
            user_id: u64,
            reason: &str,
            at: chrono::DateTime<chrono::Utc>,
        ) -> Result<i64> {
            self.0.append_warning(guild_id, user_id, reason, at).await
        }

        async fn list_warnings(&self, guild_id: u64, user_id: u64) -> Result<Vec<crate::warnings::WarnEntry>> {
            self.0.list_warnings(guild_id, user_id).await
        }

        async fn remove_warning(
            &self,
            guild_id: u64,
            user_id: u64,
            warn_id: i64,
        ) -> Result<Option<crate::warnings::WarnEntry>> {
            self.0.remove_warning(guild_id, user_id, warn_id).await
        }
    }

    #[tokio::test]
    async fn concurrent_updates_of_one_guild_keep_both_fields() {
        let slow = Arc::new(SlowWrites(MemoryStorage::new()));
        let prefs = PrefStore::new(slow.clone(), "en");
        prefs.get_preferences(1).await.unwrap();

        let (a, b) = tokio::join!(
            prefs.set_field(1, "antispam.notify", json!(555)),
            prefs.set_punishments(1, Category::Antispam, &[PunishmentKind::Warn])
        );
        a.unwrap();
        b.unwrap();

        let stored = slow.0.stored_prefs(1).await.unwrap();
        let cached = prefs.get_preferences(1).await.unwrap();
        assert_eq!(stored.antispam.notify, 555);
        assert_eq!(stored.antispam.punishments, vec![PunishmentKind::Warn]);
        assert_eq!(cached, stored);
    }

    #[tokio::test]
    async fn unknown_field_and_bad_value_are_rejected() {
        let (_mem, prefs) = store();
        let err = prefs.set_field(1, "antispam.nope", json!(1)).await.unwrap_err();
        assert!(matches!(err, PrefsError::InvalidField { .. }));

        let err = prefs
            .set_field(1, "antiraid.punishments", json!(["warn", "explode"]))
            .await
            .unwrap_err();
        assert!(matches!(err, PrefsError::InvalidField { .. }));
        assert!(prefs.get_preferences(1).await.unwrap().antiraid.punishments.is_empty());
    }

    #[tokio::test]
    async fn failed_write_leaves_cache_untouched() {
        let (mem, prefs) = store();
        prefs.get_preferences(1).await.unwrap();
        mem.set_fail_writes(true);

        let err = prefs.set_lang(1, "pl").await.unwrap_err();
        assert!(matches!(err, PrefsError::Storage(_)));
        assert_eq!(prefs.get_preferences(1).await.unwrap().lang, "en");
    }

    #[tokio::test]
    async fn configure_punishments_disable_and_enable() {
        let (_mem, prefs) = store();
        let p = prefs
            .configure_punishments(1, Category::Antiraid, PunishmentChoice::Punish(PunishmentKind::Kick))
            .await
            .unwrap();
        assert!(p.antiraid.enabled);
        assert_eq!(p.antiraid.punishments, vec![PunishmentKind::Kick]);

        let p = prefs
            .configure_punishments(1, Category::Antiraid, PunishmentChoice::Disable)
            .await
            .unwrap();
        assert!(!p.antiraid.enabled);
        assert!(p.antiraid.punishments.is_empty());
    }

    #[tokio::test]
    async fn punishments_are_an_ordered_set() {
        let (_mem, prefs) = store();
        use PunishmentKind::*;
        prefs
            .set_punishments(1, Category::Antispam, &[Warn, DayMute, Warn])
            .await
            .unwrap();
        assert_eq!(
            prefs.get_punishments(1, Category::Antispam).await.unwrap(),
            vec![Warn, DayMute]
        );
    }

    #[test]
    fn choice_parsing() {
        assert_eq!(PunishmentChoice::parse("disable"), Some(PunishmentChoice::Disable));
        assert_eq!(
            PunishmentChoice::parse("hour_mute"),
            Some(PunishmentChoice::Punish(PunishmentKind::HourMute))
        );
        assert_eq!(PunishmentChoice::parse("nuke"), None);
    }

    #[test]
    fn document_shape_is_stable() {
        let doc = serde_json::to_value(GuildPrefs::default()).unwrap();
        assert_eq!(
            doc,
            json!({
                "lang": "en",
                "logs": 0,
                "antispam": {"enabled": false, "punishments": [], "notify": 0},
                "linkfilter": {"enabled": false, "punishments": []},
                "antiraid": {"enabled": false, "punishments": []},
                "joinwatch": 0
            })
        );
    }
}
