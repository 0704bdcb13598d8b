// src/discord/moderation.rs
//
// /kick, /ban, /mute – ręczna moderacja.

use std::time::Duration;

use anyhow::Result;
use serenity::all::{
    CommandInteraction, CommandOptionType, Context, CreateCommand, CreateCommandOption, GuildId,
    Interaction, Permissions,
};

use super::{
    COLOR_FAIL, COLOR_SUCCESS, actor, defer, display_name, edit_embed, guild_only, opt_int, opt_str,
    opt_user, platform_actions,
};
use crate::AppContext;
use crate::actions::ModerationActions;
use crate::error::{ActionError, CommandError};

/// (label, seconds) – wybory dla /mute.
pub const MUTE_CHOICES: [(&str, i64); 6] = [
    ("60 secs", 60),
    ("5 mins", 300),
    ("10 mins", 600),
    ("1 hour", 3600),
    ("1 day", 86_400),
    ("1 week", 604_800),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Kick,
    Ban,
    Mute,
}

impl Op {
    fn name(self) -> &'static str {
        match self {
            Op::Kick => "kick",
            Op::Ban => "ban",
            Op::Mute => "mute",
        }
    }
}

pub async fn register_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    let member = || CreateCommandOption::new(CommandOptionType::User, "member", "Target member").required(true);
    let reason = || CreateCommandOption::new(CommandOptionType::String, "reason", "Reason").required(false);

    guild_id
        .create_command(
            &ctx.http,
            CreateCommand::new("kick")
                .description("Kick a member.")
                .default_member_permissions(Permissions::KICK_MEMBERS)
                .add_option(member())
                .add_option(reason()),
        )
        .await?;

    guild_id
        .create_command(
            &ctx.http,
            CreateCommand::new("ban")
                .description("Ban a member.")
                .default_member_permissions(Permissions::BAN_MEMBERS)
                .add_option(member())
                .add_option(reason()),
        )
        .await?;

    let mut time = CreateCommandOption::new(CommandOptionType::Integer, "time", "Mute length").required(true);
    for (label, secs) in MUTE_CHOICES {
        time = time.add_int_choice(label, secs as i32);
    }
    guild_id
        .create_command(
            &ctx.http,
            CreateCommand::new("mute")
                .description("Time out a member.")
                .default_member_permissions(Permissions::MODERATE_MEMBERS)
                .add_option(member())
                .add_option(time)
                .add_option(reason()),
        )
        .await?;
    Ok(())
}

/// Router interakcji
pub async fn on_interaction(ctx: &Context, app: &AppContext, interaction: &Interaction) {
    let Interaction::Command(cmd) = interaction else {
        return;
    };
    let op = match cmd.data.name.as_str() {
        "kick" => Op::Kick,
        "ban" => Op::Ban,
        "mute" => Op::Mute,
        _ => return,
    };
    if let Err(e) = handle(ctx, app, cmd, op).await {
        tracing::warn!(error=?e, command = op.name(), "moderation command failed");
    }
}

/// "for <reason>" albo ✅ gdy brak powodu.
pub fn reason_suffix(reason: Option<&str>) -> String {
    match reason.map(str::trim).filter(|r| !r.is_empty()) {
        Some(r) => format!("for {r}"),
        None => "✅".to_string(),
    }
}

pub fn mute_label(secs: i64) -> Option<&'static str> {
    MUTE_CHOICES.iter().find(|(_, s)| *s == secs).map(|(l, _)| *l)
}

async fn handle(ctx: &Context, app: &AppContext, cmd: &CommandInteraction, op: Op) -> Result<()> {
    defer(ctx, cmd).await?;
    let Some(gid) = cmd.guild_id else {
        return guild_only(ctx, app, cmd).await;
    };
    let g = gid.get();
    let lang = app.prefs.lang(g).await;

    let Some(target) = opt_user(cmd, "member") else {
        let msg = app.i18n.t(&lang, CommandError::Malformed("member".into()).translation_key(), &[]);
        return edit_embed(ctx, cmd, &msg, COLOR_FAIL).await;
    };
    let reason = opt_str(cmd, "reason");
    let audit_reason = reason.clone().unwrap_or_default();
    let name = display_name(ctx, gid, target).await;
    let acts = platform_actions(ctx, app, &lang);

    let (res, msg) = match op {
        Op::Kick => (
            acts.kick(g, target.get(), &audit_reason).await,
            app.i18n.t(&lang, "moderation.kick", &[("member", &name), ("reason", &reason_suffix(reason.as_deref()))]),
        ),
        Op::Ban => (
            acts.ban(g, target.get(), &audit_reason).await,
            app.i18n.t(&lang, "moderation.ban", &[("member", &name), ("reason", &reason_suffix(reason.as_deref()))]),
        ),
        Op::Mute => {
            let secs = opt_int(cmd, "time").unwrap_or(60);
            let Some(label) = mute_label(secs) else {
                let msg = app.i18n.t(&lang, "command_fail.error", &[]);
                return edit_embed(ctx, cmd, &msg, COLOR_FAIL).await;
            };
            (
                acts.timeout(g, target.get(), Duration::from_secs(secs as u64), &audit_reason).await,
                app.i18n.t(
                    &lang,
                    "moderation.mute",
                    &[("member", &name), ("mutetime", label), ("reason", &reason_suffix(reason.as_deref()))],
                ),
            )
        }
    };

    match res {
        Ok(()) => {
            tracing::info!(gid = g, uid = target.get(), moderator = cmd.user.id.get(), op = op.name(), "moderation action");
            edit_embed(ctx, cmd, &msg, COLOR_SUCCESS).await?;
            app.security.log(&acts, g, &msg, Some(actor(&cmd.user))).await;
        }
        Err(e) => {
            if !matches!(e, ActionError::PermissionDenied) {
                tracing::warn!(error=?e, gid = g, uid = target.get(), op = op.name(), "moderation action failed");
            }
            let key = CommandError::from(e).translation_key();
            let msg = app.i18n.t(&lang, key, &[]);
            edit_embed(ctx, cmd, &msg, COLOR_FAIL).await?;
        }
    }
    Ok(())
}
