use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use serenity::async_trait;
use sqlx::{Pool, Postgres, postgres::PgPoolOptions};

use super::Storage;
use crate::prefs::GuildPrefs;
use crate::warnings::WarnEntry;

pub type Db = Pool<Postgres>;

pub async fn connect(url: &str, max: Option<u32>) -> Result<Db> {
    let pool = PgPoolOptions::new()
        .max_connections(max.unwrap_or(10))
        .connect(url)
        .await?;

    Ok(pool)
}

pub async fn migrate(pool: &Db) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PgStorage {
    db: Db,
}

impl PgStorage {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn load_prefs(&self, guild_id: u64) -> Result<Option<GuildPrefs>> {
        let row: Option<(Value,)> =
            sqlx::query_as("SELECT doc FROM warden.guild_prefs WHERE guild_id = $1")
                .bind(guild_id as i64)
                .fetch_optional(&self.db)
                .await?;
        match row {
            Some((doc,)) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    async fn insert_prefs_if_absent(&self, guild_id: u64, prefs: &GuildPrefs) -> Result<GuildPrefs> {
        let doc = serde_json::to_value(prefs)?;
        sqlx::query(
            "INSERT INTO warden.guild_prefs (guild_id, doc) VALUES ($1, $2) ON CONFLICT (guild_id) DO NOTHING",
        )
        .bind(guild_id as i64)
        .bind(&doc)
        .execute(&self.db)
        .await?;

        // ktoś mógł nas wyprzedzić – zwracamy to, co faktycznie leży w bazie
        match self.load_prefs(guild_id).await? {
            Some(stored) => Ok(stored),
            None => anyhow::bail!("guild_prefs row for {guild_id} vanished after insert"),
        }
    }

    async fn update_prefs_field(&self, guild_id: u64, path: &[String], value: &Value) -> Result<()> {
        let res = sqlx::query(
            r#"
            UPDATE warden.guild_prefs
               SET doc = jsonb_set(doc, $2::text[], $3::jsonb, true),
                   updated_at = now()
             WHERE guild_id = $1
            "#,
        )
        .bind(guild_id as i64)
        .bind(path.to_vec())
        .bind(value)
        .execute(&self.db)
        .await?;

        if res.rows_affected() == 0 {
            anyhow::bail!("no preference document for guild {guild_id}");
        }
        Ok(())
    }

    async fn delete_prefs(&self, guild_id: u64) -> Result<()> {
        sqlx::query("DELETE FROM warden.guild_prefs WHERE guild_id = $1")
            .bind(guild_id as i64)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn append_warning(
        &self,
        guild_id: u64,
        user_id: u64,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<i64> {
        let mut tx = self.db.begin().await?;
        // serializacja numeracji per (guild, user)
        sqlx::query("SELECT pg_advisory_xact_lock($1, $2)")
            .bind((guild_id % i32::MAX as u64) as i32)
            .bind((user_id % i32::MAX as u64) as i32)
            .execute(&mut *tx)
            .await?;
        let rec: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO warden.warnings (guild_id, user_id, warn_no, reason, created_at)
            SELECT $1, $2, COALESCE(MAX(warn_no) + 1, 0), $3, $4
              FROM warden.warnings
             WHERE guild_id = $1 AND user_id = $2
            RETURNING warn_no
            "#,
        )
        .bind(guild_id as i64)
        .bind(user_id as i64)
        .bind(reason)
        .bind(at)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(rec.0)
    }

    async fn list_warnings(&self, guild_id: u64, user_id: u64) -> Result<Vec<WarnEntry>> {
        let rows = sqlx::query_as::<_, (i64, String, DateTime<Utc>)>(
            r#"
            SELECT warn_no, reason, created_at
              FROM warden.warnings
             WHERE guild_id = $1 AND user_id = $2
             ORDER BY warn_no
            "#,
        )
        .bind(guild_id as i64)
        .bind(user_id as i64)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, reason, created_at)| WarnEntry { id, reason, created_at })
            .collect())
    }

    async fn remove_warning(&self, guild_id: u64, user_id: u64, warn_id: i64) -> Result<Option<WarnEntry>> {
        let row = sqlx::query_as::<_, (i64, String, DateTime<Utc>)>(
            r#"
            DELETE FROM warden.warnings
             WHERE guild_id = $1 AND user_id = $2 AND warn_no = $3
            RETURNING warn_no, reason, created_at
            "#,
        )
        .bind(guild_id as i64)
        .bind(user_id as i64)
        .bind(warn_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|(id, reason, created_at)| WarnEntry { id, reason, created_at }))
    }
}
