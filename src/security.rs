//! Security pipeline: messages, joins and platform automod hits.
//!
//! Everything here talks to the platform through [`ModerationActions`], so the
//! gateway layer only converts serenity models into [`crate::event`] types.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::actions::{Actor, ModerationActions};
use crate::error::ActionError;
use crate::event::{AutomodEvent, JoinEvent, MessageEvent};
use crate::i18n::Translator;
use crate::joinwatch::{self, JoinClass, JoinReport};
use crate::linkfilter::LinkFilter;
use crate::prefs::{Category, PrefStore};
use crate::punish::{PunishmentReport, Punisher};
use crate::raid::{SpamGuard, SpamSignal};

/// Accounts younger than this get the "very new" join report.
pub const JOINWATCH_NEW_ACCOUNT_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq)]
pub enum MessageOutcome {
    /// Not inspected (DM, bot, moderator).
    Skipped,
    Inspected {
        spam: Option<(SpamSignal, PunishmentReport)>,
        link: Option<LinkHit>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkHit {
    pub entry: String,
    pub deleted: bool,
    pub report: PunishmentReport,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinOutcome {
    pub fast: bool,
    pub class: JoinClass,
    /// Report that was posted, if join watch is on.
    pub report: Option<JoinReport>,
}

#[derive(Debug)]
pub struct Security {
    prefs: Arc<PrefStore>,
    guard: Arc<SpamGuard>,
    punisher: Arc<Punisher>,
    links: Arc<LinkFilter>,
    i18n: Arc<Translator>,
}

impl Security {
    pub fn new(
        prefs: Arc<PrefStore>,
        guard: Arc<SpamGuard>,
        punisher: Arc<Punisher>,
        links: Arc<LinkFilter>,
        i18n: Arc<Translator>,
    ) -> Arc<Self> {
        Arc::new(Self { prefs, guard, punisher, links, i18n })
    }

    pub async fn on_message(&self, actions: &dyn ModerationActions, msg: &MessageEvent) -> MessageOutcome {
        let Some(gid) = msg.guild_id else {
            return MessageOutcome::Skipped;
        };
        if msg.author.bot || msg.author.can_manage_messages {
            return MessageOutcome::Skipped;
        }

        let prefs = match self.prefs.get_preferences(gid).await {
            Ok(p) => p,
            Err(e) => {
                warn!(error=?e, gid, "prefs unavailable, message not inspected");
                return MessageOutcome::Skipped;
            }
        };

        let mut spam = None;
        let raid = prefs.policy(Category::Antiraid);
        if raid.enabled {
            if let Some(signal) = self.guard.check_message(msg).await {
                info!(gid, uid = msg.author.id, signal = signal.as_str(), "antiraid triggered");
                let report = self
                    .punisher
                    .apply(actions, &msg.author, gid, &raid.punishments, Category::Antiraid.reason())
                    .await;
                spam = Some((signal, report));
            }
        }

        let mut link = None;
        let filter = prefs.policy(Category::Linkfilter);
        if filter.enabled {
            if let Some(entry) = self.links.find(&msg.content) {
                info!(gid, uid = msg.author.id, entry, "blocked link");
                let deleted = match actions.delete_message(msg.channel_id, msg.message_id).await {
                    Ok(()) => true,
                    Err(ActionError::PermissionDenied) => {
                        debug!(gid, channel = msg.channel_id, "cannot delete message: missing permissions");
                        false
                    }
                    Err(e) => {
                        warn!(error=?e, gid, channel = msg.channel_id, "message delete failed");
                        false
                    }
                };
                let report = self
                    .punisher
                    .apply(actions, &msg.author, gid, &filter.punishments, Category::Linkfilter.reason())
                    .await;
                link = Some(LinkHit { entry: entry.to_string(), deleted, report });
            }
        }

        MessageOutcome::Inspected { spam, link }
    }

    /// Always records the join for fast-join detection; reports it when join watch is on.
    pub async fn on_member_join(&self, actions: &dyn ModerationActions, join: &JoinEvent) -> JoinOutcome {
        let gid = join.guild_id;
        let fast = self.guard.is_fast_join(gid, &join.member).await;
        let now = Utc::now();
        let class = joinwatch::classify(&join.member, fast, now, JOINWATCH_NEW_ACCOUNT_DAYS);
        if fast {
            debug!(gid, uid = join.member.id, "fast join");
        }

        let prefs = match self.prefs.get_preferences(gid).await {
            Ok(p) => p,
            Err(e) => {
                warn!(error=?e, gid, "prefs unavailable, join not reported");
                return JoinOutcome { fast, class, report: None };
            }
        };
        let Some(channel) = prefs.joinwatch_channel() else {
            return JoinOutcome { fast, class, report: None };
        };

        let report = JoinReport::build(&join.member, join.avatar_url.clone(), class, now, |k| {
            self.i18n.t(&prefs.lang, k, &[])
        });
        if let Err(e) = actions.send_join_report(channel, &report).await {
            warn!(error=?e, gid, channel, "join report send failed");
            return JoinOutcome { fast, class, report: None };
        }
        JoinOutcome { fast, class, report: Some(report) }
    }

    /// Platform automod hit. Only spam triggers are punished.
    pub async fn on_automod(&self, actions: &dyn ModerationActions, exec: &AutomodEvent) -> Option<PunishmentReport> {
        if !exec.trigger.is_spam() {
            return None;
        }
        let punishments = match self.prefs.get_punishments(exec.guild_id, Category::Antispam).await {
            Ok(p) => p,
            Err(e) => {
                warn!(error=?e, gid = exec.guild_id, "prefs unavailable, automod hit ignored");
                return None;
            }
        };
        if punishments.is_empty() {
            return None;
        }
        let report = self
            .punisher
            .apply(actions, &exec.member, exec.guild_id, &punishments, Category::Antispam.reason())
            .await;
        Some(report)
    }

    /// Posts a line to the guild's audit log.
    pub async fn log(&self, actions: &dyn ModerationActions, guild_id: u64, text: &str, actor: Option<Actor>) {
        self.punisher.audit(actions, guild_id, text, actor).await;
    }

    pub fn prefs(&self) -> &Arc<PrefStore> {
        &self.prefs
    }

    pub fn guard(&self) -> &Arc<SpamGuard> {
        &self.guard
    }
}
