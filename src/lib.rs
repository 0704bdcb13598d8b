// src/lib.rs

pub mod actions;
pub mod config;
pub mod db;
pub mod discord;
pub mod error;
pub mod event;
pub mod expiring;
pub mod health;
pub mod i18n;
pub mod joinwatch;
pub mod linkfilter;
pub mod logging;
pub mod prefs;
pub mod punish;
pub mod raid;
pub mod ratelimit;
pub mod security;
pub mod warnings;

use anyhow::Result;
use std::sync::Arc;

use config::Settings;
use db::Storage;

/// Globalny kontekst aplikacji: konfiguracja, storage i gotowe serwisy.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub settings: Settings,
    pub storage: Arc<dyn Storage>,
    pub prefs: Arc<prefs::PrefStore>,
    pub warnings: Arc<warnings::WarningLog>,
    pub i18n: Arc<i18n::Translator>,
    pub guard: Arc<raid::SpamGuard>,
    pub punisher: Arc<punish::Punisher>,
    pub security: Arc<security::Security>,
}

impl AppContext {
    /// Bootstrap całej aplikacji:
    /// - logi
    /// - storage (`memory:` albo Postgres + migracje)
    /// - serwisy + task czyszczący liczniki spamu
    pub async fn bootstrap(settings: Settings) -> Result<Arc<Self>> {
        logging::init(&settings);

        let storage: Arc<dyn Storage> = if settings.database.url.starts_with("memory:") {
            tracing::warn!("database.url = memory: – nothing is persisted");
            Arc::new(db::MemoryStorage::new())
        } else {
            let pool = db::connect(&settings.database.url, settings.database.max_connections).await?;
            db::migrate(&pool).await?;
            Arc::new(db::PgStorage::new(pool))
        };

        let i18n = i18n::Translator::load(settings.i18n.dir.as_deref(), &settings.i18n.default_lang)?;
        let links = linkfilter::LinkFilter::load(settings.links.file.as_deref())?;

        let ctx = Self::assemble(settings, storage, i18n, links);
        raid::SpamGuard::spawn_prune_task(&ctx.guard);

        tracing::info!(
            env = %ctx.settings.env,
            langs = ?ctx.i18n.languages(),
            "application context ready"
        );
        Ok(ctx)
    }

    /// Context over in-memory storage and the built-in English table. No background tasks.
    pub fn new_testing(settings: Settings, links: linkfilter::LinkFilter) -> Arc<Self> {
        Self::assemble(
            settings,
            Arc::new(db::MemoryStorage::new()),
            Arc::new(i18n::Translator::builtin()),
            links,
        )
    }

    fn assemble(
        settings: Settings,
        storage: Arc<dyn Storage>,
        i18n: Arc<i18n::Translator>,
        links: linkfilter::LinkFilter,
    ) -> Arc<Self> {
        let prefs = prefs::PrefStore::new(storage.clone(), &settings.i18n.default_lang);
        let warnings = warnings::WarningLog::new(storage.clone());
        let guard = raid::SpamGuard::new(settings.guard.clone());
        let punisher = punish::Punisher::new(prefs.clone(), warnings.clone(), i18n.clone());
        let security = security::Security::new(
            prefs.clone(),
            guard.clone(),
            punisher.clone(),
            Arc::new(links),
            i18n.clone(),
        );

        Arc::new(Self {
            settings,
            storage,
            prefs,
            warnings,
            i18n,
            guard,
            punisher,
            security,
        })
    }

    /// Tłumaczenie w języku gildii (0 = poza gildią, język domyślny).
    pub async fn t(&self, guild_id: u64, key: &str, args: &[(&str, &str)]) -> String {
        let lang = if guild_id == 0 {
            self.settings.i18n.default_lang.clone()
        } else {
            self.prefs.lang(guild_id).await
        };
        self.i18n.t(&lang, key, args)
    }

    pub fn is_bot_admin(&self, user_id: u64) -> bool {
        self.settings.discord.admins.contains(&user_id)
    }
}

/// Start: opcjonalny `/health` + klient Discorda.
pub async fn run(ctx: Arc<AppContext>) -> Result<()> {
    if let Some(addr) = ctx.settings.app.health_addr.clone() {
        let app = ctx.clone();
        tokio::spawn(async move {
            if let Err(e) = health::serve(&addr, app).await {
                tracing::warn!(error=?e, addr, "health endpoint stopped");
            }
        });
    }
    discord::run_bot(ctx).await
}
