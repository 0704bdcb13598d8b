// src/discord/security.rs
//
// /antispam, /antiraid, /linkfilter, /joinwatch + panel konfiguracji antyspamu.

use anyhow::Result;
use serenity::all::{
    ChannelId, ChannelType, CommandInteraction, CommandOptionType, ComponentInteraction,
    ComponentInteractionDataKind, Context, CreateActionRow, CreateCommand, CreateCommandOption,
    CreateInteractionResponse, CreateInteractionResponseFollowup, CreateInteractionResponseMessage,
    CreateSelectMenu, CreateSelectMenuKind, CreateSelectMenuOption, EditAutoModRule,
    EditInteractionResponse, GuildId, Interaction, Permissions, ReactionType,
};
use serenity::model::guild::automod::{Action, EventType, Trigger};

use super::{
    COLOR_FAIL, COLOR_INFO, COLOR_SUCCESS, actor, defer, edit_embed, embed, guild_only, opt_bool,
    opt_channel, opt_str, platform_actions,
};
use crate::AppContext;
use crate::error::ActionError;
use crate::prefs::{Category, PunishmentChoice};
use crate::punish::PunishmentKind;

const PUNISH_SELECT: &str = "antispam:punish";
const NOTIFY_SELECT: &str = "antispam:notify";
const MAX_ANTISPAM_PUNISHMENTS: usize = 2;

pub async fn register_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id
        .create_command(
            &ctx.http,
            CreateCommand::new("antispam")
                .description("Manage the antispam filter.")
                .default_member_permissions(Permissions::MANAGE_GUILD)
                .add_option(
                    CreateCommandOption::new(CommandOptionType::Boolean, "enabled", "Turn the filter on or off")
                        .required(true),
                ),
        )
        .await?;

    for (name, desc) in [
        ("antiraid", "Choose a punishment for raid-like message floods."),
        ("linkfilter", "Choose a punishment for when a malicious link is detected."),
    ] {
        guild_id
            .create_command(
                &ctx.http,
                CreateCommand::new(name)
                    .description(desc)
                    .default_member_permissions(Permissions::MANAGE_GUILD)
                    .add_option(punishment_option()),
            )
            .await?;
    }

    guild_id
        .create_command(
            &ctx.http,
            CreateCommand::new("joinwatch")
                .description("Report member joins and their potential risk.")
                .default_member_permissions(Permissions::MANAGE_GUILD)
                .add_option(
                    CreateCommandOption::new(CommandOptionType::Boolean, "enabled", "Turn join reports on or off")
                        .required(true),
                )
                .add_option(
                    CreateCommandOption::new(CommandOptionType::Channel, "channel", "Channel receiving the reports")
                        .channel_types(vec![ChannelType::Text])
                        .required(false),
                ),
        )
        .await?;
    Ok(())
}

fn punishment_option() -> CreateCommandOption {
    let mut opt = CreateCommandOption::new(CommandOptionType::String, "punishment", "Punishment to apply")
        .required(true)
        .add_string_choice("Disable", "disable");
    for kind in PunishmentKind::ALL {
        opt = opt.add_string_choice(kind_label(kind), kind.as_str());
    }
    opt
}

fn kind_label(kind: PunishmentKind) -> &'static str {
    match kind {
        PunishmentKind::Warn => "Warn",
        PunishmentKind::MinMute => "5 minute mute",
        PunishmentKind::HourMute => "1 hour mute",
        PunishmentKind::DayMute => "1 day mute",
        PunishmentKind::Kick => "Kick",
        PunishmentKind::Ban => "Ban",
    }
}

/// Router interakcji
pub async fn on_interaction(ctx: &Context, app: &AppContext, interaction: &Interaction) {
    match interaction {
        Interaction::Command(cmd) => {
            let res = match cmd.data.name.as_str() {
                "antispam" => handle_antispam(ctx, app, cmd).await,
                "antiraid" => handle_category(ctx, app, cmd, Category::Antiraid).await,
                "linkfilter" => handle_category(ctx, app, cmd, Category::Linkfilter).await,
                "joinwatch" => handle_joinwatch(ctx, app, cmd).await,
                _ => return,
            };
            if let Err(e) = res {
                tracing::warn!(error=?e, command=%cmd.data.name, "security command failed");
                let text = app.t(cmd.guild_id.map(|g| g.get()).unwrap_or(0), "command_fail.error", &[]).await;
                let _ = edit_embed(ctx, cmd, &text, COLOR_FAIL).await;
            }
        }
        Interaction::Component(comp) => {
            let id = comp.data.custom_id.as_str();
            let res = if id.starts_with(PUNISH_SELECT) {
                handle_punish_select(ctx, app, comp).await
            } else if id.starts_with(NOTIFY_SELECT) {
                handle_notify_select(ctx, app, comp).await
            } else {
                return;
            };
            if let Err(e) = res {
                tracing::warn!(error=?e, custom_id=%id, "antispam panel failed");
            }
        }
        _ => {}
    }
}

/* ---------------- komendy ---------------- */

async fn handle_antispam(ctx: &Context, app: &AppContext, cmd: &CommandInteraction) -> Result<()> {
    defer(ctx, cmd).await?;
    let Some(gid) = cmd.guild_id else {
        return guild_only(ctx, app, cmd).await;
    };
    let g = gid.get();
    let enabled = opt_bool(cmd, "enabled").unwrap_or(false);

    if !enabled {
        app.prefs.set_enabled(g, Category::Antispam, false).await?;
        let msg = app.t(g, "antispam.off", &[]).await;
        edit_embed(ctx, cmd, &msg, COLOR_SUCCESS).await?;
        return log_change(ctx, app, g, cmd, &msg).await;
    }

    let lang = app.prefs.lang(g).await;
    let bot_name = ctx.cache.current_user().name.clone();
    let blocked = app.i18n.t(&lang, "antispam.blocked", &[("bot", &bot_name)]);

    match recreate_automod_rules(ctx, gid, &bot_name, &blocked).await {
        Ok(()) => {}
        Err(ActionError::PermissionDenied) => {
            let msg = app.i18n.t(&lang, "command_fail.forbidden", &[]);
            return edit_embed(ctx, cmd, &msg, COLOR_FAIL).await;
        }
        Err(e) => return Err(e.into()),
    }
    app.prefs.set_enabled(g, Category::Antispam, true).await?;

    let current = app.prefs.get_punishments(g, Category::Antispam).await?;
    let owner = cmd.user.id.get();
    let options: Vec<CreateSelectMenuOption> = PunishmentKind::ALL
        .into_iter()
        .map(|k| {
            CreateSelectMenuOption::new(app.i18n.t(&lang, &format!("punishments.{}", k.as_str()), &[]), k.as_str())
                .emoji(ReactionType::Unicode(k.emoji().to_string()))
                .default_selection(current.contains(&k))
        })
        .collect();

    let punish = CreateSelectMenu::new(format!("{PUNISH_SELECT}:{owner}"), CreateSelectMenuKind::String { options })
        .placeholder(app.i18n.t(&lang, "antispam.choose", &[]))
        .min_values(0)
        .max_values(MAX_ANTISPAM_PUNISHMENTS as u8);
    let notify = CreateSelectMenu::new(
        format!("{NOTIFY_SELECT}:{owner}"),
        CreateSelectMenuKind::Channel {
            channel_types: Some(vec![ChannelType::Text]),
            default_channels: None,
        },
    )
    .placeholder(app.i18n.t(&lang, "antispam.choose_channel", &[]))
    .min_values(0)
    .max_values(1);

    cmd.edit_response(
        &ctx.http,
        EditInteractionResponse::new()
            .embed(embed(&app.i18n.t(&lang, "antispam.on", &[]), COLOR_INFO))
            .components(vec![CreateActionRow::SelectMenu(punish), CreateActionRow::SelectMenu(notify)]),
    )
    .await?;
    Ok(())
}

async fn handle_category(ctx: &Context, app: &AppContext, cmd: &CommandInteraction, category: Category) -> Result<()> {
    defer(ctx, cmd).await?;
    let Some(gid) = cmd.guild_id else {
        return guild_only(ctx, app, cmd).await;
    };
    let g = gid.get();

    let raw = opt_str(cmd, "punishment").unwrap_or_default();
    let Some(choice) = PunishmentChoice::parse(&raw) else {
        let msg = app.t(g, "command_fail.error", &[]).await;
        return edit_embed(ctx, cmd, &msg, COLOR_FAIL).await;
    };

    app.prefs.configure_punishments(g, category, choice).await?;
    tracing::info!(gid = g, category = category.key(), choice = %raw, "punishment configured");

    let msg = app.t(g, category.key(), &[]).await;
    edit_embed(ctx, cmd, &msg, COLOR_SUCCESS).await?;
    log_change(ctx, app, g, cmd, &msg).await
}

async fn handle_joinwatch(ctx: &Context, app: &AppContext, cmd: &CommandInteraction) -> Result<()> {
    defer(ctx, cmd).await?;
    let Some(gid) = cmd.guild_id else {
        return guild_only(ctx, app, cmd).await;
    };
    let g = gid.get();

    let channel = match (opt_bool(cmd, "enabled").unwrap_or(false), opt_channel(cmd, "channel")) {
        (true, Some(ch)) => Some(ch),
        (true, None) => Some(cmd.channel_id),
        (false, _) => None,
    };
    app.prefs.set_channel(g, "joinwatch", channel.map(|c| c.get())).await?;

    let msg = match channel {
        Some(ch) => app.t(g, "joinwatch", &[("channel", &format!("<#{}>", ch.get()))]).await,
        None => app.t(g, "joinwatch_off", &[]).await,
    };
    edit_embed(ctx, cmd, &msg, COLOR_SUCCESS).await?;
    log_change(ctx, app, g, cmd, &msg).await
}

async fn log_change(ctx: &Context, app: &AppContext, gid: u64, cmd: &CommandInteraction, msg: &str) -> Result<()> {
    let lang = app.prefs.lang(gid).await;
    let acts = platform_actions(ctx, app, &lang);
    app.security.log(&acts, gid, msg, Some(actor(&cmd.user))).await;
    Ok(())
}

/* ---------------- panel (select menu) ---------------- */

/// custom_id = `<prefix>:<owner>`; tylko autor komendy może zmieniać panel.
async fn ensure_owner(ctx: &Context, app: &AppContext, comp: &ComponentInteraction) -> Result<bool> {
    let owner = comp
        .data
        .custom_id
        .rsplit(':')
        .next()
        .and_then(|s| s.parse::<u64>().ok());
    if owner == Some(comp.user.id.get()) {
        comp.create_response(&ctx.http, CreateInteractionResponse::Acknowledge).await?;
        return Ok(true);
    }
    let gid = comp.guild_id.map(|g| g.get()).unwrap_or(0);
    let text = app.t(gid, "command_fail.not_own_settings", &[]).await;
    comp.create_response(
        &ctx.http,
        CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().content(text).ephemeral(true)),
    )
    .await?;
    Ok(false)
}

async fn followup(ctx: &Context, comp: &ComponentInteraction, text: &str, colour: u32) -> Result<()> {
    comp.create_followup(
        &ctx.http,
        CreateInteractionResponseFollowup::new().embed(embed(text, colour)).ephemeral(true),
    )
    .await?;
    Ok(())
}

async fn handle_punish_select(ctx: &Context, app: &AppContext, comp: &ComponentInteraction) -> Result<()> {
    let Some(gid) = comp.guild_id else { return Ok(()) };
    if !ensure_owner(ctx, app, comp).await? {
        return Ok(());
    }
    let g = gid.get();

    let values: Vec<PunishmentKind> = match &comp.data.kind {
        ComponentInteractionDataKind::StringSelect { values } => values
            .iter()
            .filter_map(|v| v.parse().ok())
            .take(MAX_ANTISPAM_PUNISHMENTS)
            .collect(),
        _ => return Ok(()),
    };

    app.prefs.set_punishments(g, Category::Antispam, &values).await?;
    let msg = app.t(g, "antispam.config", &[]).await;
    followup(ctx, comp, &msg, COLOR_SUCCESS).await?;

    let lang = app.prefs.lang(g).await;
    app.security
        .log(&platform_actions(ctx, app, &lang), g, &msg, Some(actor(&comp.user)))
        .await;
    Ok(())
}

async fn handle_notify_select(ctx: &Context, app: &AppContext, comp: &ComponentInteraction) -> Result<()> {
    let Some(gid) = comp.guild_id else { return Ok(()) };
    if !ensure_owner(ctx, app, comp).await? {
        return Ok(());
    }
    let g = gid.get();

    let channel: Option<ChannelId> = match &comp.data.kind {
        ComponentInteractionDataKind::ChannelSelect { values } => values.first().copied(),
        _ => return Ok(()),
    };

    if let Some(ch) = channel {
        if let Err(e) = add_alert_action(ctx, gid, ch).await {
            tracing::warn!(error=?e, gid = g, "automod alert action not added");
        }
    }
    app.prefs.set_channel(g, "antispam.notify", channel.map(|c| c.get())).await?;

    let name = channel.map(|c| format!("<#{}>", c.get())).unwrap_or_else(|| "---".into());
    let msg = app.t(g, "antispam.notify", &[("channel", &name)]).await;
    followup(ctx, comp, &msg, COLOR_SUCCESS).await?;

    let lang = app.prefs.lang(g).await;
    app.security
        .log(&platform_actions(ctx, app, &lang), g, &msg, Some(actor(&comp.user)))
        .await;
    Ok(())
}

/* ---------------- automod ---------------- */

fn is_spam_rule(trigger: &Trigger) -> bool {
    matches!(trigger, Trigger::Spam | Trigger::MentionSpam { .. })
}

/// Usuwa istniejące reguły Spam / MentionSpam i zakłada je od nowa z blokadą wiadomości.
async fn recreate_automod_rules(ctx: &Context, gid: GuildId, bot_name: &str, blocked: &str) -> Result<(), ActionError> {
    let rules = gid.automod_rules(&ctx.http).await.map_err(super::actions::map_err)?;
    for rule in rules.iter().filter(|r| is_spam_rule(&r.trigger)) {
        gid.delete_automod_rule(&ctx.http, rule.id)
            .await
            .map_err(super::actions::map_err)?;
    }

    let block = vec![Action::BlockMessage {
        custom_message: Some(blocked.to_string()),
    }];
    for (suffix, trigger) in [
        ("Anti Mention Spam", Trigger::MentionSpam { mention_total_limit: 5 }),
        ("Anti Spam", Trigger::Spam),
    ] {
        gid.create_automod_rule(
            ctx,
            EditAutoModRule::new()
                .name(format!("{bot_name} - {suffix}"))
                .event_type(EventType::MessageSend)
                .trigger(trigger)
                .actions(block.clone())
                .enabled(true),
        )
        .await
        .map_err(super::actions::map_err)?;
    }
    tracing::info!(gid=%gid.get(), "automod spam rules recreated");
    Ok(())
}

async fn add_alert_action(ctx: &Context, gid: GuildId, channel: ChannelId) -> Result<(), ActionError> {
    let rules = gid.automod_rules(&ctx.http).await.map_err(super::actions::map_err)?;
    for rule in rules.into_iter().filter(|r| is_spam_rule(&r.trigger)) {
        let mut actions: Vec<Action> = rule
            .actions
            .into_iter()
            .filter(|a| !matches!(a, Action::Alert(_)))
            .collect();
        actions.push(Action::Alert(channel));
        gid.edit_automod_rule(ctx, rule.id, EditAutoModRule::new().actions(actions))
            .await
            .map_err(super::actions::map_err)?;
    }
    Ok(())
}
