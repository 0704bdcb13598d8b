use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use serenity::async_trait;

use crate::prefs::GuildPrefs;
use crate::warnings::WarnEntry;

mod memory;
mod postgres;

pub use memory::MemoryStorage;
pub use postgres::{connect, migrate, Db, PgStorage};

/// Persistence seen by the core: one preference document per guild plus the warning log.
///
/// Implementations must make `insert_prefs_if_absent` idempotent; it returns
/// whatever document is stored after the call.
#[async_trait]
pub trait Storage: Send + Sync + std::fmt::Debug {
    async fn load_prefs(&self, guild_id: u64) -> Result<Option<GuildPrefs>>;

    async fn insert_prefs_if_absent(&self, guild_id: u64, prefs: &GuildPrefs) -> Result<GuildPrefs>;

    /// Sets one (possibly nested) field of the stored document.
    async fn update_prefs_field(&self, guild_id: u64, path: &[String], value: &Value) -> Result<()>;

    async fn delete_prefs(&self, guild_id: u64) -> Result<()>;

    /// Appends a warning and returns its per-user number.
    async fn append_warning(
        &self,
        guild_id: u64,
        user_id: u64,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<i64>;

    async fn list_warnings(&self, guild_id: u64, user_id: u64) -> Result<Vec<WarnEntry>>;

    async fn remove_warning(&self, guild_id: u64, user_id: u64, warn_id: i64) -> Result<Option<WarnEntry>>;
}
