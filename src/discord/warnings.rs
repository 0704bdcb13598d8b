// src/discord/warnings.rs
//
// /warn, /warnings, /userwarnings, /unwarn + stronicowanie listy ostrzeżeń.

use anyhow::Result;
use serenity::all::{
    ButtonStyle, CommandInteraction, CommandOptionType, ComponentInteraction, Context, CreateActionRow,
    CreateButton, CreateCommand, CreateCommandOption, CreateEmbed, CreateEmbedFooter,
    CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse, GuildId,
    Interaction, Permissions, UserId,
};

use super::{
    COLOR_FAIL, COLOR_INFO, COLOR_SUCCESS, actor, defer, display_name, edit_embed, guild_only,
    opt_int, opt_str, opt_user, platform_actions,
};
use crate::AppContext;
use crate::error::{CommandError, parse_snowflake};
use crate::warnings::{WarnEntry, paginate};

const PAGE_SIZE: usize = 5;
const PAGE_BUTTON: &str = "warnpage";

pub async fn register_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id
        .create_command(
            &ctx.http,
            CreateCommand::new("warn")
                .description("Warn a user.")
                .default_member_permissions(Permissions::MODERATE_MEMBERS)
                .add_option(CreateCommandOption::new(CommandOptionType::User, "member", "Member to warn").required(true))
                .add_option(CreateCommandOption::new(CommandOptionType::String, "reason", "Reason").required(true)),
        )
        .await?;

    guild_id
        .create_command(
            &ctx.http,
            CreateCommand::new("warnings").description("Use this command to check your warnings."),
        )
        .await?;

    guild_id
        .create_command(
            &ctx.http,
            CreateCommand::new("userwarnings")
                .description("Use this command to check a user's warnings")
                .default_member_permissions(Permissions::MODERATE_MEMBERS)
                .add_option(CreateCommandOption::new(CommandOptionType::User, "member", "Member").required(false))
                .add_option(
                    CreateCommandOption::new(CommandOptionType::String, "user_id", "ID of a user who left the server")
                        .required(false),
                ),
        )
        .await?;

    guild_id
        .create_command(
            &ctx.http,
            CreateCommand::new("unwarn")
                .description("Remove a warning from a member.")
                .default_member_permissions(Permissions::MODERATE_MEMBERS)
                .add_option(CreateCommandOption::new(CommandOptionType::User, "member", "Member").required(true))
                .add_option(
                    CreateCommandOption::new(CommandOptionType::Integer, "warn_id", "Warning ID")
                        .min_int_value(0)
                        .required(true),
                ),
        )
        .await?;
    Ok(())
}

/// Router interakcji
pub async fn on_interaction(ctx: &Context, app: &AppContext, interaction: &Interaction) {
    match interaction {
        Interaction::Command(cmd) => {
            let res = match cmd.data.name.as_str() {
                "warn" => handle_warn(ctx, app, cmd).await,
                "warnings" => handle_list(ctx, app, cmd, Some(cmd.user.id)).await,
                "userwarnings" => handle_userwarnings(ctx, app, cmd).await,
                "unwarn" => handle_unwarn(ctx, app, cmd).await,
                _ => return,
            };
            if let Err(e) = res {
                tracing::warn!(error=?e, command=%cmd.data.name, "warnings command failed");
                let text = app.t(cmd.guild_id.map(|g| g.get()).unwrap_or(0), "command_fail.error", &[]).await;
                let _ = edit_embed(ctx, cmd, &text, COLOR_FAIL).await;
            }
        }
        Interaction::Component(comp) if comp.data.custom_id.starts_with(PAGE_BUTTON) => {
            if let Err(e) = handle_page(ctx, app, comp).await {
                tracing::warn!(error=?e, custom_id=%comp.data.custom_id, "warnings page failed");
            }
        }
        _ => {}
    }
}

async fn handle_warn(ctx: &Context, app: &AppContext, cmd: &CommandInteraction) -> Result<()> {
    defer(ctx, cmd).await?;
    let Some(gid) = cmd.guild_id else {
        return guild_only(ctx, app, cmd).await;
    };
    let g = gid.get();
    let (Some(target), Some(reason)) = (opt_user(cmd, "member"), opt_str(cmd, "reason")) else {
        let msg = app.t(g, "command_fail.malformed", &[]).await;
        return edit_embed(ctx, cmd, &msg, COLOR_FAIL).await;
    };

    app.warnings.exec_warn(g, target.get(), &reason).await?;

    let name = display_name(ctx, gid, target).await;
    let msg = app.t(g, "warnings.punish", &[("member", &name), ("reason", &reason)]).await;
    edit_embed(ctx, cmd, &msg, COLOR_SUCCESS).await?;

    let lang = app.prefs.lang(g).await;
    app.security
        .log(&platform_actions(ctx, app, &lang), g, &msg, Some(actor(&cmd.user)))
        .await;
    Ok(())
}

async fn handle_userwarnings(ctx: &Context, app: &AppContext, cmd: &CommandInteraction) -> Result<()> {
    if let Some(u) = opt_user(cmd, "member") {
        return handle_list(ctx, app, cmd, Some(u)).await;
    }
    let target = match opt_str(cmd, "user_id").map(|raw| parse_snowflake(&raw)) {
        Some(Ok(id)) => Some(UserId::new(id)),
        Some(Err(e)) => {
            defer(ctx, cmd).await?;
            let msg = app.t(cmd.guild_id.map(|g| g.get()).unwrap_or(0), e.translation_key(), &[]).await;
            return edit_embed(ctx, cmd, &msg, COLOR_FAIL).await;
        }
        None => None,
    };
    handle_list(ctx, app, cmd, target).await
}

async fn handle_list(ctx: &Context, app: &AppContext, cmd: &CommandInteraction, target: Option<UserId>) -> Result<()> {
    defer(ctx, cmd).await?;
    let Some(gid) = cmd.guild_id else {
        return guild_only(ctx, app, cmd).await;
    };
    let target = target.unwrap_or(cmd.user.id);

    let (embed, row) = warnings_page(ctx, app, gid, target, 0).await?;
    let mut edit = EditInteractionResponse::new().embed(embed);
    if let Some(row) = row {
        edit = edit.components(vec![row]);
    }
    cmd.edit_response(&ctx.http, edit).await?;
    Ok(())
}

async fn handle_unwarn(ctx: &Context, app: &AppContext, cmd: &CommandInteraction) -> Result<()> {
    defer(ctx, cmd).await?;
    let Some(gid) = cmd.guild_id else {
        return guild_only(ctx, app, cmd).await;
    };
    let g = gid.get();
    let (Some(target), Some(warn_id)) = (opt_user(cmd, "member"), opt_int(cmd, "warn_id")) else {
        let msg = app.t(g, "command_fail.malformed", &[]).await;
        return edit_embed(ctx, cmd, &msg, COLOR_FAIL).await;
    };

    let removed = match app.warnings.unwarn(g, target.get(), warn_id).await? {
        Ok(w) => w,
        Err(CommandError::NotFound(_)) => {
            let msg = app.t(g, "warnings.not_found", &[]).await;
            return edit_embed(ctx, cmd, &msg, COLOR_FAIL).await;
        }
        Err(e) => {
            let msg = app.t(g, e.translation_key(), &[]).await;
            return edit_embed(ctx, cmd, &msg, COLOR_FAIL).await;
        }
    };

    let name = display_name(ctx, gid, target).await;
    let msg = app
        .t(g, "warnings.unwarn", &[("member", &name), ("warning", &removed.render())])
        .await;
    edit_embed(ctx, cmd, &msg, COLOR_SUCCESS).await?;

    let lang = app.prefs.lang(g).await;
    app.security
        .log(&platform_actions(ctx, app, &lang), g, &msg, Some(actor(&cmd.user)))
        .await;
    Ok(())
}

/* ---------------- stronicowanie ---------------- */

/// custom_id = `warnpage:<user>:<page>`
async fn handle_page(ctx: &Context, app: &AppContext, comp: &ComponentInteraction) -> Result<()> {
    let Some(gid) = comp.guild_id else { return Ok(()) };
    let mut parts = comp.data.custom_id.split(':').skip(1);
    let (Some(Ok(user)), Some(Ok(page))) = (
        parts.next().map(str::parse::<u64>),
        parts.next().map(str::parse::<usize>),
    ) else {
        return Ok(());
    };
    if user == 0 {
        return Ok(());
    }

    let (embed, row) = warnings_page(ctx, app, gid, UserId::new(user), page).await?;
    let mut msg = CreateInteractionResponseMessage::new().embed(embed);
    if let Some(row) = row {
        msg = msg.components(vec![row]);
    }
    comp.create_response(&ctx.http, CreateInteractionResponse::UpdateMessage(msg))
        .await?;
    Ok(())
}

async fn warnings_page(
    ctx: &Context,
    app: &AppContext,
    gid: GuildId,
    target: UserId,
    page: usize,
) -> Result<(CreateEmbed, Option<CreateActionRow>)> {
    let g = gid.get();
    let name = display_name(ctx, gid, target).await;
    let entries: Vec<WarnEntry> = app.warnings.list(g, target.get()).await?;
    let pages = paginate(&entries, PAGE_SIZE);

    if pages.is_empty() {
        let text = app.t(g, "warnings.none", &[("member", &name)]).await;
        return Ok((CreateEmbed::new().description(text).colour(COLOR_INFO), None));
    }

    let page = page.min(pages.len() - 1);
    let body = pages[page].iter().map(WarnEntry::render).collect::<Vec<_>>().join("\n\n");
    let embed = CreateEmbed::new()
        .title(app.t(g, "warnings.title", &[("member", &name)]).await)
        .description(body)
        .colour(COLOR_INFO)
        .footer(CreateEmbedFooter::new(format!("{}/{}", page + 1, pages.len())));

    if pages.len() == 1 {
        return Ok((embed, None));
    }
    let uid = target.get();
    let row = CreateActionRow::Buttons(vec![
        CreateButton::new(format!("{PAGE_BUTTON}:{uid}:{}", page.saturating_sub(1)))
            .label("◀")
            .style(ButtonStyle::Secondary)
            .disabled(page == 0),
        CreateButton::new(format!("{PAGE_BUTTON}:{uid}:{}", page + 1))
            .label("▶")
            .style(ButtonStyle::Secondary)
            .disabled(page + 1 >= pages.len()),
    ]);
    Ok((embed, Some(row)))
}
