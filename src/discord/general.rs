// src/discord/general.rs
//
// /logs, /language, /help, /report + tekstowe komendy adminów bota (!info, !leave).

use std::time::Instant;

use anyhow::Result;
use once_cell::sync::Lazy;
use serenity::all::{
    ActionRowComponent, ChannelId, ChannelType, CommandInteraction, CommandOptionType,
    ComponentInteraction, ComponentInteractionDataKind, Context, CreateActionRow, CreateButton,
    CreateCommand, CreateCommandOption, CreateEmbed, CreateEmbedAuthor, CreateInputText,
    CreateInteractionResponse, CreateInteractionResponseFollowup, CreateInteractionResponseMessage,
    CreateMessage, CreateModal, CreateSelectMenu, CreateSelectMenuKind, CreateSelectMenuOption,
    EditInteractionResponse, GuildId, InputTextStyle, Interaction, Message, ModalInteraction,
    Permissions, ReactionType,
};

use super::{
    COLOR_FAIL, COLOR_INFO, COLOR_SUCCESS, actor, defer, edit_embed, embed, guild_only, opt_channel,
    opt_str, platform_actions,
};
use crate::AppContext;
use crate::error::parse_snowflake;
use crate::prefs::{Category, GuildPrefs};

const HELP_SELECT: &str = "help:category";
const REPORT_MODAL: &str = "report:modal";
const REPORT_INPUT: &str = "report:info";
const ADMIN_PREFIX: &str = "!";

static STARTED: Lazy<Instant> = Lazy::new(Instant::now);

/// Start licznika uptime (wołane w `ready`).
pub fn mark_started() {
    Lazy::force(&STARTED);
}

pub async fn register_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id
        .create_command(
            &ctx.http,
            CreateCommand::new("logs")
                .description("Manage logs channel. If no channel is selected logs will be disabled.")
                .default_member_permissions(Permissions::MANAGE_GUILD)
                .add_option(
                    CreateCommandOption::new(
                        CommandOptionType::Channel,
                        "channel",
                        "Punishments and logs will be posted in this channel",
                    )
                    .channel_types(vec![ChannelType::Text])
                    .required(false),
                ),
        )
        .await?;

    guild_id
        .create_command(
            &ctx.http,
            CreateCommand::new("language")
                .description("Edit the bot language settings for this server")
                .default_member_permissions(Permissions::MANAGE_GUILD)
                .add_option(
                    CreateCommandOption::new(CommandOptionType::String, "language", "The general language for the bot")
                        .required(true),
                ),
        )
        .await?;

    guild_id
        .create_command(&ctx.http, CreateCommand::new("help").description("General bot info"))
        .await?;

    guild_id
        .create_command(
            &ctx.http,
            CreateCommand::new("report").description("Use this command to report bot bugs"),
        )
        .await?;
    Ok(())
}

/// Router interakcji
pub async fn on_interaction(ctx: &Context, app: &AppContext, interaction: &Interaction) {
    let res = match interaction {
        Interaction::Command(cmd) => match cmd.data.name.as_str() {
            "logs" => handle_logs(ctx, app, cmd).await,
            "language" => handle_language(ctx, app, cmd).await,
            "help" => handle_help(ctx, app, cmd).await,
            "report" => open_report_modal(ctx, cmd).await,
            _ => return,
        },
        Interaction::Component(comp) if comp.data.custom_id == HELP_SELECT => {
            handle_help_select(ctx, app, comp).await
        }
        Interaction::Modal(modal) if modal.data.custom_id == REPORT_MODAL => {
            handle_report(ctx, app, modal).await
        }
        _ => return,
    };
    if let Err(e) = res {
        tracing::warn!(error=?e, "general interaction failed");
    }
}

/* ---------------- /logs /language ---------------- */

async fn handle_logs(ctx: &Context, app: &AppContext, cmd: &CommandInteraction) -> Result<()> {
    defer(ctx, cmd).await?;
    let Some(gid) = cmd.guild_id else {
        return guild_only(ctx, app, cmd).await;
    };
    let g = gid.get();
    let channel = opt_channel(cmd, "channel");

    app.prefs.set_channel(g, "logs", channel.map(|c| c.get())).await?;

    let msg = match channel {
        Some(ch) => app.t(g, "logs.set", &[("channel", &format!("<#{}>", ch.get()))]).await,
        None => app.t(g, "logs.off", &[]).await,
    };
    edit_embed(ctx, cmd, &msg, COLOR_SUCCESS).await?;

    let lang = app.prefs.lang(g).await;
    app.security
        .log(&platform_actions(ctx, app, &lang), g, &msg, Some(actor(&cmd.user)))
        .await;
    Ok(())
}

async fn handle_language(ctx: &Context, app: &AppContext, cmd: &CommandInteraction) -> Result<()> {
    defer(ctx, cmd).await?;
    let Some(gid) = cmd.guild_id else {
        return guild_only(ctx, app, cmd).await;
    };
    let g = gid.get();
    let lang = opt_str(cmd, "language").unwrap_or_default().trim().to_lowercase();

    if !app.i18n.has_language(&lang) {
        let msg = app.t(g, "language.unknown", &[("lang", &lang)]).await;
        return edit_embed(ctx, cmd, &msg, COLOR_FAIL).await;
    }
    app.prefs.set_lang(g, &lang).await?;
    tracing::info!(gid = g, lang, "guild language changed");

    // już w nowym języku
    let msg = app.t(g, "language.set", &[("lang", &lang)]).await;
    edit_embed(ctx, cmd, &msg, COLOR_SUCCESS).await
}

/* ---------------- /help ---------------- */

fn help_main(app: &AppContext, lang: &str) -> CreateEmbed {
    let t = |k: &str| app.i18n.t(lang, k, &[]);
    let mut e = embed(&t("help.desc"), COLOR_INFO);
    for section in ["antispam", "linkfilter", "joinwatch", "punishments", "moderation", "warnings"] {
        e = e.field(t(&format!("help.{section}.1")), t(&format!("help.{section}.2")), false);
    }
    e
}

/// Pola kategorii "Security" z aktualnym stanem filtrów.
pub fn security_status(prefs: &GuildPrefs) -> Vec<(String, bool)> {
    vec![
        ("/antispam".to_string(), prefs.policy(Category::Antispam).enabled),
        ("/antiraid".to_string(), prefs.policy(Category::Antiraid).enabled),
        ("/linkfilter".to_string(), prefs.policy(Category::Linkfilter).enabled),
        ("/joinwatch".to_string(), prefs.joinwatch_channel().is_some()),
    ]
}

fn help_row(app: &AppContext) -> Vec<CreateActionRow> {
    let options = [
        ("Moderation commands", "moderation", "🔨"),
        ("Security commands", "security", "🛡️"),
        ("Warning commands", "warnings", "🪧"),
        ("Bot info", "main", "ℹ️"),
    ]
    .into_iter()
    .map(|(label, value, emoji)| {
        CreateSelectMenuOption::new(label, value).emoji(ReactionType::Unicode(emoji.to_string()))
    })
    .collect();
    let menu = CreateSelectMenu::new(HELP_SELECT, CreateSelectMenuKind::String { options })
        .placeholder("Help by category")
        .max_values(1);

    let mut rows = vec![CreateActionRow::SelectMenu(menu)];
    let mut links = Vec::new();
    if let Some(url) = &app.settings.support.support_server {
        links.push(CreateButton::new_link(url).label(app.i18n.t(&app.settings.i18n.default_lang, "help.support", &[])));
    }
    if let Some(url) = &app.settings.support.invite_link {
        links.push(CreateButton::new_link(url).label(app.i18n.t(&app.settings.i18n.default_lang, "help.invite", &[])));
    }
    if !links.is_empty() {
        rows.push(CreateActionRow::Buttons(links));
    }
    rows
}

async fn handle_help(ctx: &Context, app: &AppContext, cmd: &CommandInteraction) -> Result<()> {
    defer(ctx, cmd).await?;
    let lang = match cmd.guild_id {
        Some(g) => app.prefs.lang(g.get()).await,
        None => app.settings.i18n.default_lang.clone(),
    };
    cmd.edit_response(
        &ctx.http,
        EditInteractionResponse::new()
            .embed(help_main(app, &lang))
            .components(help_row(app)),
    )
    .await?;
    Ok(())
}

async fn handle_help_select(ctx: &Context, app: &AppContext, comp: &ComponentInteraction) -> Result<()> {
    let Some(gid) = comp.guild_id else { return Ok(()) };
    let g = gid.get();
    let lang = app.prefs.lang(g).await;

    let category = match &comp.data.kind {
        ComponentInteractionDataKind::StringSelect { values } => values.first().cloned().unwrap_or_default(),
        _ => return Ok(()),
    };

    let e = match category.as_str() {
        "security" => {
            let prefs = app.prefs.get_preferences(g).await?;
            security_status(&prefs)
                .into_iter()
                .fold(embed("Security commands", COLOR_INFO), |e, (name, on)| {
                    e.field(format!("{name} {}", if on { "✅" } else { "❌" }), "\u{200b}", true)
                })
        }
        "moderation" => embed("Moderation commands", COLOR_INFO)
            .field("/kick", "Kick a member.", true)
            .field("/ban", "Ban a member.", true)
            .field("/mute", "Time out a member.", true),
        "warnings" => embed("Warning commands", COLOR_INFO)
            .field("/warn", "Warn a user.", true)
            .field("/warnings", "Check your warnings.", true)
            .field("/userwarnings", "Check a user's warnings.", true)
            .field("/unwarn", "Remove a warning.", true),
        _ => help_main(app, &lang),
    };

    comp.create_response(
        &ctx.http,
        CreateInteractionResponse::UpdateMessage(CreateInteractionResponseMessage::new().embed(e)),
    )
    .await?;
    Ok(())
}

/* ---------------- /report ---------------- */

async fn open_report_modal(ctx: &Context, cmd: &CommandInteraction) -> Result<()> {
    let modal = CreateModal::new(REPORT_MODAL, "Bug report").components(vec![CreateActionRow::InputText(
        CreateInputText::new(InputTextStyle::Paragraph, "Explain the bug here", REPORT_INPUT)
            .placeholder("Please be detailed about the steps to reproduce this.")
            .min_length(20)
            .required(true),
    )]);
    cmd.create_response(&ctx.http, CreateInteractionResponse::Modal(modal))
        .await?;
    Ok(())
}

async fn handle_report(ctx: &Context, app: &AppContext, modal: &ModalInteraction) -> Result<()> {
    modal
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new().ephemeral(true)),
        )
        .await?;
    let g = modal.guild_id.map(|g| g.get()).unwrap_or(0);

    let mut info = String::new();
    for row in &modal.data.components {
        for comp in &row.components {
            if let ActionRowComponent::InputText(it) = comp {
                info = it.value.as_deref().unwrap_or("").trim().to_string();
            }
        }
    }

    let channel = app.settings.support.bug_report_channel;
    let reply = if channel == 0 {
        tracing::warn!("bug report received but support.bug_report_channel is not set");
        app.t(g, "report.unavailable", &[]).await
    } else {
        let mut author = CreateEmbedAuthor::new(&modal.user.name);
        if let Some(url) = modal.user.avatar_url() {
            author = author.icon_url(url);
        }
        let e = embed(&info, COLOR_INFO)
            .title(app.t(g, "report.title", &[]).await)
            .author(author)
            .field("Guild", g.to_string(), true)
            .field("User", modal.user.id.get().to_string(), true);
        if let Err(e) = ChannelId::new(channel)
            .send_message(&ctx.http, CreateMessage::new().embed(e))
            .await
        {
            tracing::warn!(error=?e, channel, "bug report not delivered");
        }
        app.t(g, "report.thanks", &[]).await
    };

    modal
        .create_followup(&ctx.http, CreateInteractionResponseFollowup::new().content(reply).ephemeral(true))
        .await?;
    Ok(())
}

/* ---------------- komendy adminów bota ---------------- */

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Help,
    Info,
    Leave(u64),
}

/// `!adminhelp`, `!info`, `!leave <server_id>`; `None` dla zwykłych wiadomości.
pub fn parse_admin_command(content: &str) -> Option<Result<AdminCommand, crate::error::CommandError>> {
    let rest = content.strip_prefix(ADMIN_PREFIX)?;
    let mut parts = rest.split_whitespace();
    match parts.next()? {
        "adminhelp" => Some(Ok(AdminCommand::Help)),
        "info" => Some(Ok(AdminCommand::Info)),
        "leave" => Some(parse_snowflake(parts.next().unwrap_or("")).map(AdminCommand::Leave)),
        _ => None,
    }
}

/// Zwraca `true`, jeśli wiadomość była komendą admina (i została obsłużona).
pub async fn on_admin_message(ctx: &Context, app: &AppContext, msg: &Message) -> bool {
    if !app.is_bot_admin(msg.author.id.get()) {
        return false;
    }
    let Some(parsed) = parse_admin_command(&msg.content) else {
        return false;
    };

    let reply = match parsed {
        Err(e) => embed(&app.i18n.t(&app.settings.i18n.default_lang, e.translation_key(), &[]), COLOR_FAIL),
        Ok(AdminCommand::Help) => embed("Admin commands", COLOR_INFO)
            .field("leave [server_id]", "The bot leaves the given server", false)
            .field("info", "Panel with bot info", false),
        Ok(AdminCommand::Info) => {
            let up = STARTED.elapsed().as_secs();
            embed("Bot information", COLOR_INFO)
                .field(
                    "Uptime",
                    format!("{} hours, {} minutes, and {} seconds", up / 3600, (up % 3600) / 60, up % 60),
                    false,
                )
                .field("Guild Count", ctx.cache.guild_count().to_string(), true)
                .field("Tracked guilds", app.guard.guild_count().to_string(), true)
        }
        Ok(AdminCommand::Leave(id)) => match GuildId::new(id).leave(&ctx.http).await {
            Ok(()) => {
                tracing::info!(gid = id, admin = msg.author.id.get(), "left guild on admin request");
                embed("Left server successfully", COLOR_SUCCESS)
            }
            Err(e) => {
                tracing::warn!(error=?e, gid = id, "leave failed");
                embed("Server not found for this ID", COLOR_FAIL)
            }
        },
    };

    if let Err(e) = msg.channel_id.send_message(&ctx.http, CreateMessage::new().embed(reply)).await {
        tracing::warn!(error=?e, "admin reply failed");
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CommandError;

    #[test]
    fn admin_commands_parse() {
        assert_eq!(parse_admin_command("!info"), Some(Ok(AdminCommand::Info)));
        assert_eq!(parse_admin_command("!leave 1234"), Some(Ok(AdminCommand::Leave(1234))));
        assert!(matches!(
            parse_admin_command("!leave abc"),
            Some(Err(CommandError::Malformed(_)))
        ));
        assert_eq!(parse_admin_command("hello"), None);
        assert_eq!(parse_admin_command("!unknown"), None);
    }

    #[test]
    fn security_status_reflects_prefs() {
        let mut prefs = GuildPrefs::default();
        prefs.antiraid.enabled = true;
        prefs.joinwatch = 5;
        let status = security_status(&prefs);
        assert_eq!(status[0], ("/antispam".to_string(), false));
        assert_eq!(status[1], ("/antiraid".to_string(), true));
        assert_eq!(status[3], ("/joinwatch".to_string(), true));
    }
}
