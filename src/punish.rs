//! Punishment policy.
//!
//! Configured kinds are grouped into three independent categories:
//! - warn (whenever configured),
//! - at most one mute: day beats hour beats 5 minutes,
//! - at most one removal: ban beats kick.
//!
//! Steps run in that order. A step that fails (permission denied or otherwise)
//! is logged and skipped; the remaining steps still run. One audit message
//! listing every step that went through is posted afterwards.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::actions::{Actor, LogEntry, ModerationActions};
use crate::error::ActionError;
use crate::event::MemberInfo;
use crate::i18n::Translator;
use crate::prefs::PrefStore;
use crate::warnings::WarningLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PunishmentKind {
    Warn,
    MinMute,
    HourMute,
    DayMute,
    Kick,
    Ban,
}

impl PunishmentKind {
    pub const ALL: [PunishmentKind; 6] = [
        PunishmentKind::Warn,
        PunishmentKind::MinMute,
        PunishmentKind::HourMute,
        PunishmentKind::DayMute,
        PunishmentKind::Kick,
        PunishmentKind::Ban,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PunishmentKind::Warn => "warn",
            PunishmentKind::MinMute => "min_mute",
            PunishmentKind::HourMute => "hour_mute",
            PunishmentKind::DayMute => "day_mute",
            PunishmentKind::Kick => "kick",
            PunishmentKind::Ban => "ban",
        }
    }

    /// Timeout length for the mute tiers.
    pub fn mute_duration(self) -> Option<Duration> {
        match self {
            PunishmentKind::MinMute => Some(Duration::from_secs(5 * 60)),
            PunishmentKind::HourMute => Some(Duration::from_secs(3600)),
            PunishmentKind::DayMute => Some(Duration::from_secs(86_400)),
            _ => None,
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            PunishmentKind::Warn => "🪧",
            PunishmentKind::MinMute => "⌛",
            PunishmentKind::HourMute => "🕛",
            PunishmentKind::DayMute => "📆",
            PunishmentKind::Kick => "🦶",
            PunishmentKind::Ban => "🔨",
        }
    }

    /// Translation key of the audit line for this kind.
    pub fn log_key(self) -> &'static str {
        match self {
            PunishmentKind::Warn => "warnings.punished",
            PunishmentKind::MinMute => "punishments_log.min_mute",
            PunishmentKind::HourMute => "punishments_log.hour_mute",
            PunishmentKind::DayMute => "punishments_log.day_mute",
            PunishmentKind::Kick => "punishments_log.kick",
            PunishmentKind::Ban => "punishments_log.ban",
        }
    }
}

impl fmt::Display for PunishmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PunishmentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PunishmentKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown punishment `{s}`"))
    }
}

/// What actually runs for a configured set of kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PunishmentPlan {
    pub warn: bool,
    pub mute: Option<PunishmentKind>,
    pub removal: Option<PunishmentKind>,
}

impl PunishmentPlan {
    pub fn from_kinds(kinds: &[PunishmentKind]) -> Self {
        use PunishmentKind::*;
        let has = |k: PunishmentKind| kinds.contains(&k);

        let mute = [DayMute, HourMute, MinMute].into_iter().find(|k| has(*k));
        let removal = [Ban, Kick].into_iter().find(|k| has(*k));

        Self {
            warn: has(Warn),
            mute,
            removal,
        }
    }

    /// Execution order: warn, mute, removal.
    pub fn steps(&self) -> Vec<PunishmentKind> {
        let mut out = Vec::with_capacity(3);
        if self.warn {
            out.push(PunishmentKind::Warn);
        }
        out.extend(self.mute);
        out.extend(self.removal);
        out
    }

    pub fn is_empty(&self) -> bool {
        !self.warn && self.mute.is_none() && self.removal.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Applied,
    PermissionDenied,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PunishmentReport {
    pub steps: Vec<(PunishmentKind, StepOutcome)>,
    /// Composite audit text: one line per applied step. `None` if nothing was applied.
    pub audit_message: Option<String>,
}

impl PunishmentReport {
    pub fn applied(&self) -> Vec<PunishmentKind> {
        self.steps
            .iter()
            .filter(|(_, o)| *o == StepOutcome::Applied)
            .map(|(k, _)| *k)
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct Punisher {
    prefs: Arc<PrefStore>,
    warnings: Arc<WarningLog>,
    i18n: Arc<Translator>,
}

impl Punisher {
    pub fn new(prefs: Arc<PrefStore>, warnings: Arc<WarningLog>, i18n: Arc<Translator>) -> Arc<Self> {
        Arc::new(Self { prefs, warnings, i18n })
    }

    /// Applies the configured punishments to `target` and posts one audit message.
    pub async fn apply(
        &self,
        actions: &dyn ModerationActions,
        target: &MemberInfo,
        guild_id: u64,
        punishments: &[PunishmentKind],
        reason: &str,
    ) -> PunishmentReport {
        let plan = PunishmentPlan::from_kinds(punishments);
        let lang = self.prefs.lang(guild_id).await;

        let mut steps = Vec::new();
        let mut lines = Vec::new();

        for kind in plan.steps() {
            let outcome = match self.run_step(actions, target, guild_id, kind, reason).await {
                Ok(()) => {
                    lines.push(self.i18n.t(
                        &lang,
                        kind.log_key(),
                        &[("member", &target.display_name), ("reason", reason)],
                    ));
                    StepOutcome::Applied
                }
                Err(ActionError::PermissionDenied) => {
                    debug!(gid = guild_id, uid = target.id, punishment = %kind, "punishment skipped: missing permissions");
                    StepOutcome::PermissionDenied
                }
                Err(e) => {
                    warn!(error=?e, gid = guild_id, uid = target.id, punishment = %kind, "punishment failed");
                    StepOutcome::Failed(e.to_string())
                }
            };
            steps.push((kind, outcome));
        }

        let audit_message = (!lines.is_empty()).then(|| lines.join("\n"));
        if let Some(text) = &audit_message {
            info!(gid = guild_id, uid = target.id, reason, applied = lines.len(), "punishments applied");
            self.audit(actions, guild_id, text, None).await;
        }

        PunishmentReport { steps, audit_message }
    }

    async fn run_step(
        &self,
        actions: &dyn ModerationActions,
        target: &MemberInfo,
        guild_id: u64,
        kind: PunishmentKind,
        reason: &str,
    ) -> Result<(), ActionError> {
        match kind {
            PunishmentKind::Warn => {
                self.warnings.exec_warn(guild_id, target.id, reason).await?;
                Ok(())
            }
            PunishmentKind::MinMute | PunishmentKind::HourMute | PunishmentKind::DayMute => {
                let duration = kind.mute_duration().unwrap_or(Duration::from_secs(300));
                actions.timeout(guild_id, target.id, duration, reason).await
            }
            PunishmentKind::Kick => actions.kick(guild_id, target.id, reason).await,
            PunishmentKind::Ban => actions.ban(guild_id, target.id, reason).await,
        }
    }

    /// Posts `text` to the guild's log channel, if one is set. Failures are logged only.
    pub async fn audit(&self, actions: &dyn ModerationActions, guild_id: u64, text: &str, actor: Option<Actor>) {
        let channel = match self.prefs.get_preferences(guild_id).await {
            Ok(p) => p.log_channel(),
            Err(e) => {
                warn!(error=?e, gid = guild_id, "audit log skipped: prefs unavailable");
                None
            }
        };
        let Some(channel) = channel else {
            return;
        };
        let entry = LogEntry {
            description: text.to_string(),
            actor,
        };
        if let Err(e) = actions.send_log(channel, &entry).await {
            warn!(error=?e, gid = guild_id, channel, "audit log send failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ActionKind, RecordedAction, RecordingActions};
    use crate::db::MemoryStorage;
    use proptest::prelude::*;
    use PunishmentKind::*;

    fn punisher() -> (Arc<PrefStore>, Arc<WarningLog>, Arc<Punisher>) {
        let mem = Arc::new(MemoryStorage::new());
        let prefs = PrefStore::new(mem.clone(), "en");
        let warnings = WarningLog::new(mem);
        let p = Punisher::new(prefs.clone(), warnings.clone(), Arc::new(Translator::builtin()));
        (prefs, warnings, p)
    }

    fn target() -> MemberInfo {
        let mut m = MemberInfo::new(42, chrono::Utc::now(), None);
        m.display_name = "spammer".into();
        m
    }

    #[test]
    fn plan_precedence() {
        let plan = PunishmentPlan::from_kinds(&[MinMute, DayMute]);
        assert_eq!(plan.mute, Some(DayMute));
        assert_eq!(plan.steps(), vec![DayMute]);

        let plan = PunishmentPlan::from_kinds(&[Kick, Warn, Ban, HourMute]);
        assert_eq!(plan.steps(), vec![Warn, HourMute, Ban]);

        assert!(PunishmentPlan::from_kinds(&[]).is_empty());
    }

    #[test]
    fn kinds_roundtrip_through_strings() {
        for k in PunishmentKind::ALL {
            assert_eq!(k.as_str().parse::<PunishmentKind>(), Ok(k));
            assert_eq!(serde_json::to_value(k).unwrap(), serde_json::json!(k.as_str()));
        }
        assert!("mute".parse::<PunishmentKind>().is_err());
    }

    proptest! {
        #[test]
        fn plan_never_has_more_than_three_steps(mask in 0u8..64) {
            let kinds: Vec<_> = PunishmentKind::ALL
                .into_iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, k)| k)
                .collect();
            let steps = PunishmentPlan::from_kinds(&kinds).steps();
            prop_assert!(steps.len() <= 3);
            prop_assert!(steps.iter().filter(|k| k.mute_duration().is_some()).count() <= 1);
            prop_assert!(steps.iter().filter(|k| matches!(k, Kick | Ban)).count() <= 1);
            prop_assert_eq!(steps.contains(&Warn), kinds.contains(&Warn));
        }
    }

    #[tokio::test]
    async fn two_mutes_configured_single_day_timeout() {
        let (_prefs, _w, p) = punisher();
        let actions = RecordingActions::new();
        let report = p.apply(&actions, &target(), 1, &[MinMute, DayMute], "Anti Spam").await;

        assert_eq!(actions.timeouts(), vec![Duration::from_secs(86_400)]);
        assert_eq!(report.applied(), vec![DayMute]);
    }

    #[tokio::test]
    async fn warn_and_hour_mute() {
        let (prefs, warnings, p) = punisher();
        prefs.set_channel(1, "logs", Some(900)).await.unwrap();
        let actions = RecordingActions::new();

        let report = p.apply(&actions, &target(), 1, &[Warn, HourMute], "Anti Spam").await;

        assert_eq!(warnings.list(1, 42).await.unwrap().len(), 1);
        assert_eq!(actions.timeouts(), vec![Duration::from_secs(3600)]);
        let logs = actions.logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(
            logs[0].description,
            "**spammer** was warned. Reason: Anti Spam\n**spammer** was muted for 1 hour. Reason: Anti Spam"
        );
        assert_eq!(report.audit_message.as_deref(), Some(logs[0].description.as_str()));
    }

    #[tokio::test]
    async fn permission_denied_does_not_stop_later_steps() {
        let (prefs, _w, p) = punisher();
        prefs.set_channel(1, "logs", Some(900)).await.unwrap();
        let actions = RecordingActions::new();
        actions.deny(ActionKind::Timeout);

        let report = p.apply(&actions, &target(), 1, &[DayMute, Kick], "Anti Spam").await;

        assert_eq!(
            report.steps,
            vec![(DayMute, StepOutcome::PermissionDenied), (Kick, StepOutcome::Applied)]
        );
        let calls = actions.calls();
        assert!(matches!(calls[0], RecordedAction::Kick { user_id: 42, .. }));
        assert_eq!(actions.logs()[0].description, "**spammer** was kicked. Reason: Anti Spam");
    }

    #[tokio::test]
    async fn nothing_applied_nothing_logged() {
        let (prefs, _w, p) = punisher();
        prefs.set_channel(1, "logs", Some(900)).await.unwrap();
        let actions = RecordingActions::new();
        actions.deny(ActionKind::Ban);

        let report = p.apply(&actions, &target(), 1, &[Ban], "Anti Spam").await;
        assert!(report.audit_message.is_none());
        assert!(actions.calls().is_empty());
    }

    #[tokio::test]
    async fn no_log_channel_no_log() {
        let (_prefs, _w, p) = punisher();
        let actions = RecordingActions::new();
        let report = p.apply(&actions, &target(), 1, &[Kick], "Anti Spam").await;
        assert!(report.audit_message.is_some());
        assert!(actions.logs().is_empty());
    }
}
