use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use warden::actions::{ActionKind, RecordedAction, RecordingActions};
use warden::config::Settings;
use warden::event::{AutomodEvent, AutomodTrigger, JoinEvent, MemberInfo, MessageEvent};
use warden::joinwatch::JoinClass;
use warden::linkfilter::LinkFilter;
use warden::prefs::{Category, PunishmentChoice};
use warden::punish::PunishmentKind;
use warden::raid::SpamSignal;
use warden::security::MessageOutcome;
use warden::AppContext;

const GUILD: u64 = 1000;
const LOGS: u64 = 900;

fn app_with_links(entries: &[&str]) -> Arc<AppContext> {
    AppContext::new_testing(Settings::defaults("test"), LinkFilter::new(entries.iter().copied()))
}

fn veteran(id: u64) -> MemberInfo {
    let mut m = MemberInfo::new(id, Utc::now() - chrono::Duration::days(400), None);
    m.display_name = format!("user{id}");
    m
}

fn message(author: &MemberInfo, content: &str, n: u64, at: DateTime<Utc>) -> MessageEvent {
    MessageEvent {
        guild_id: Some(GUILD),
        channel_id: 10,
        message_id: 5000 + n,
        author: author.clone(),
        content: content.to_string(),
        created_at: at + chrono::Duration::milliseconds(n as i64 * 100),
    }
}

async fn punish_with(app: &AppContext, category: Category, kind: PunishmentKind) {
    app.prefs
        .configure_punishments(GUILD, category, PunishmentChoice::Punish(kind))
        .await
        .unwrap();
}

#[tokio::test]
async fn message_burst_trips_antiraid_and_kicks() {
    let app = app_with_links(&[]);
    punish_with(&app, Category::Antiraid, PunishmentKind::Kick).await;
    app.prefs.set_channel(GUILD, "logs", Some(LOGS)).await.unwrap();

    let actions = RecordingActions::new();
    let author = veteran(7);
    let base = Utc::now();

    for n in 0..10 {
        let out = app
            .security
            .on_message(&actions, &message(&author, &format!("hello {n}"), n, base))
            .await;
        assert_eq!(out, MessageOutcome::Inspected { spam: None, link: None });
    }

    let out = app
        .security
        .on_message(&actions, &message(&author, "hello 10", 10, base))
        .await;
    let MessageOutcome::Inspected { spam: Some((signal, report)), link: None } = out else {
        panic!("expected spam hit, got {out:?}");
    };
    assert_eq!(signal, SpamSignal::ByUser);
    assert_eq!(report.applied(), vec![PunishmentKind::Kick]);

    let calls = actions.calls();
    assert!(calls.contains(&RecordedAction::Kick { guild_id: GUILD, user_id: 7, reason: "Anti Spam".into() }));
    let logs = actions.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].description, "**user7** was kicked. Reason: Anti Spam");
    assert_eq!(logs[0].actor, None);
}

#[tokio::test]
async fn antiraid_disabled_never_punishes() {
    let app = app_with_links(&[]);
    let actions = RecordingActions::new();
    let author = veteran(7);
    let base = Utc::now();

    for n in 0..30 {
        app.security
            .on_message(&actions, &message(&author, "same text", n, base))
            .await;
    }
    assert!(actions.calls().is_empty());
}

#[tokio::test]
async fn blocked_link_is_deleted_and_warned() {
    let app = app_with_links(&["discord-gift.ru"]);
    punish_with(&app, Category::Linkfilter, PunishmentKind::Warn).await;

    let actions = RecordingActions::new();
    let author = veteran(8);
    let out = app
        .security
        .on_message(&actions, &message(&author, "free nitro https://discord-gift.ru/claim", 1, Utc::now()))
        .await;

    let MessageOutcome::Inspected { link: Some(hit), .. } = out else {
        panic!("expected link hit, got {out:?}");
    };
    assert_eq!(hit.entry, "discord-gift.ru");
    assert!(hit.deleted);
    assert_eq!(hit.report.applied(), vec![PunishmentKind::Warn]);

    assert!(actions
        .calls()
        .contains(&RecordedAction::DeleteMessage { channel_id: 10, message_id: 5001 }));
    let warns = app.warnings.list(GUILD, 8).await.unwrap();
    assert_eq!(warns.len(), 1);
    assert_eq!(warns[0].reason, "Link Filter");
}

#[tokio::test]
async fn undeletable_link_still_punished() {
    let app = app_with_links(&["grabify.link"]);
    punish_with(&app, Category::Linkfilter, PunishmentKind::HourMute).await;

    let actions = RecordingActions::new();
    actions.deny(ActionKind::DeleteMessage);
    let out = app
        .security
        .on_message(&actions, &message(&veteran(9), "look https://www.grabify.link/x", 1, Utc::now()))
        .await;

    let MessageOutcome::Inspected { link: Some(hit), .. } = out else {
        panic!("expected link hit, got {out:?}");
    };
    assert!(!hit.deleted);
    assert_eq!(actions.timeouts(), vec![Duration::from_secs(3600)]);
}

#[tokio::test]
async fn moderators_and_bots_are_not_inspected() {
    let app = app_with_links(&["grabify.link"]);
    punish_with(&app, Category::Linkfilter, PunishmentKind::Ban).await;
    let actions = RecordingActions::new();

    let mut moderator = veteran(11);
    moderator.can_manage_messages = true;
    let out = app
        .security
        .on_message(&actions, &message(&moderator, "grabify.link", 1, Utc::now()))
        .await;
    assert_eq!(out, MessageOutcome::Skipped);

    let mut bot = veteran(12);
    bot.bot = true;
    let out = app
        .security
        .on_message(&actions, &message(&bot, "grabify.link", 2, Utc::now()))
        .await;
    assert_eq!(out, MessageOutcome::Skipped);
    assert!(actions.calls().is_empty());
}

#[tokio::test]
async fn join_watch_reports_fast_joins() {
    let app = app_with_links(&[]);
    app.prefs.set_channel(GUILD, "joinwatch", Some(77)).await.unwrap();
    let actions = RecordingActions::new();

    let now = Utc::now();
    let first = JoinEvent {
        guild_id: GUILD,
        member: MemberInfo::new(21, now - chrono::Duration::days(400), Some(now)),
        avatar_url: None,
    };
    let second = JoinEvent {
        guild_id: GUILD,
        member: MemberInfo::new(22, now - chrono::Duration::hours(1), Some(now + chrono::Duration::seconds(1))),
        avatar_url: Some("https://cdn.example/avatar.png".into()),
    };

    let out = app.security.on_member_join(&actions, &first).await;
    assert!(!out.fast);
    assert_eq!(out.class, JoinClass::Regular);

    let out = app.security.on_member_join(&actions, &second).await;
    assert!(out.fast);
    assert_eq!(out.class, JoinClass::Fast { very_new: true });
    let report = out.report.expect("join watch is on");
    assert_eq!(report.member_id, 22);

    let reported: Vec<u64> = actions
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            RecordedAction::JoinReport { channel_id, report } => {
                assert_eq!(channel_id, 77);
                Some(report.member_id)
            }
            _ => None,
        })
        .collect();
    assert_eq!(reported, vec![21, 22]);
}

#[tokio::test]
async fn join_watch_off_still_tracks_fast_joins() {
    let app = app_with_links(&[]);
    let actions = RecordingActions::new();
    let now = Utc::now();
    let old = now - chrono::Duration::days(400);

    for (i, id) in [31u64, 32].into_iter().enumerate() {
        let join = JoinEvent {
            guild_id: GUILD,
            member: MemberInfo::new(id, old, Some(now + chrono::Duration::milliseconds(i as i64 * 500))),
            avatar_url: None,
        };
        let out = app.security.on_member_join(&actions, &join).await;
        assert_eq!(out.fast, i == 1);
        assert!(out.report.is_none());
    }
    assert!(actions.calls().is_empty());
}

#[tokio::test]
async fn automod_spam_hits_use_antispam_punishments() {
    let app = app_with_links(&[]);
    app.prefs
        .set_punishments(GUILD, Category::Antispam, &[PunishmentKind::Warn, PunishmentKind::MinMute])
        .await
        .unwrap();
    app.prefs.set_channel(GUILD, "logs", Some(LOGS)).await.unwrap();
    let actions = RecordingActions::new();

    let keyword = AutomodEvent { guild_id: GUILD, member: veteran(41), trigger: AutomodTrigger::Keyword };
    assert!(app.security.on_automod(&actions, &keyword).await.is_none());

    let spam = AutomodEvent { guild_id: GUILD, member: veteran(41), trigger: AutomodTrigger::MentionSpam };
    let report = app.security.on_automod(&actions, &spam).await.expect("spam trigger");
    assert_eq!(report.applied(), vec![PunishmentKind::Warn, PunishmentKind::MinMute]);
    assert_eq!(actions.timeouts(), vec![Duration::from_secs(300)]);

    let logs = actions.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(
        logs[0].description,
        "**user41** was warned. Reason: Anti Spam\n**user41** was muted for 5 minutes. Reason: Anti Spam"
    );
}

#[tokio::test]
async fn automod_without_punishments_is_ignored() {
    let app = app_with_links(&[]);
    let actions = RecordingActions::new();
    let spam = AutomodEvent { guild_id: GUILD, member: veteran(42), trigger: AutomodTrigger::Spam };
    assert!(app.security.on_automod(&actions, &spam).await.is_none());
    assert!(actions.calls().is_empty());
}

#[tokio::test]
async fn first_contact_persists_disabled_defaults() {
    let app = app_with_links(&[]);
    assert!(app.storage.load_prefs(GUILD).await.unwrap().is_none());

    let prefs = app.prefs.get_preferences(GUILD).await.unwrap();
    assert_eq!(prefs.lang, "en");
    for category in Category::ALL {
        let policy = prefs.policy(category);
        assert!(!policy.enabled);
        assert!(policy.punishments.is_empty());
    }
    assert_eq!(prefs.log_channel(), None);
    assert_eq!(app.storage.load_prefs(GUILD).await.unwrap(), Some(prefs));
}
