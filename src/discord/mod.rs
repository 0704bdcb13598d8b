// src/discord/mod.rs
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use futures_util::FutureExt;
use once_cell::sync::OnceCell;
use serenity::all::*;
use serenity::async_trait;
use serenity::model::guild::automod::{self, ActionExecution};

use crate::actions::Actor;
use crate::event::{AutomodEvent, JoinEvent};
use crate::AppContext;

pub mod actions;
pub mod general;
pub mod moderation;
pub mod security;
pub mod warnings;

use self::actions::SerenityActions;

pub const COLOR_SUCCESS: u32 = 0x57F287;
pub const COLOR_FAIL: u32 = 0xED4245;
pub const COLOR_INFO: u32 = 0x5865F2;

pub struct Handler {
    pub app: Arc<AppContext>,
    /// Właściciel aplikacji (ustawiany w `ready`).
    pub owner: OnceCell<u64>,
}

impl Handler {
    pub fn new(app: Arc<AppContext>) -> Self {
        Self { app, owner: OnceCell::new() }
    }
}

/// Wiadomości bota i właściciela aplikacji nie są sprawdzane.
pub fn is_exempt_author(author_id: u64, bot_id: u64, owner_id: Option<u64>) -> bool {
    author_id == bot_id || owner_id == Some(author_id)
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        tracing::info!(guilds = ready.guilds.len(), "Logged in as {}", ready.user.name);
        general::mark_started();

        match ctx.http.get_current_application_info().await {
            Ok(info) => {
                if let Some(owner) = info.owner {
                    let _ = self.owner.set(owner.id.get());
                }
            }
            Err(e) => tracing::warn!(error=?e, "application info unavailable, owner not exempted"),
        }

        for g in ready.guilds {
            if let Err(e) = register_commands_for_guild(&ctx, g.id).await {
                tracing::warn!(error=?e, gid=%g.id.get(), "register_commands_for_guild failed");
            }
        }
    }

    async fn guild_create(&self, ctx: Context, guild: Guild, is_new: Option<bool>) {
        let gid = guild.id.get();

        // dokument preferencji powstaje przy pierwszym kontakcie
        if let Err(e) = self.app.prefs.set_default_prefs(gid).await {
            tracing::warn!(error=?e, gid, "default prefs not created");
        }

        if is_new == Some(true) {
            if let Err(e) = register_commands_for_guild(&ctx, guild.id).await {
                tracing::warn!(error=?e, gid, "register_commands_for_guild failed (on guild_create)");
            }
            tracing::info!(guild=%guild.name, gid, "joined guild");
        }
    }

    async fn guild_delete(&self, _ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        // unavailable = outage, nie usunięcie bota
        if incomplete.unavailable {
            return;
        }
        let gid = incomplete.id.get();
        if let Err(e) = self.app.prefs.forget(gid).await {
            tracing::warn!(error=?e, gid, "guild prefs not removed");
        } else {
            tracing::info!(gid, "left guild, prefs removed");
        }
    }

    /// Brama interakcji: slash + komponenty
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let started = Instant::now();
        let name = match &interaction {
            Interaction::Command(cmd) => Some(cmd.data.name.clone()),
            Interaction::Component(comp) => Some(comp.data.custom_id.clone()),
            _ => None,
        };

        let fut = async {
            security::on_interaction(&ctx, &self.app, &interaction).await;
            moderation::on_interaction(&ctx, &self.app, &interaction).await;
            warnings::on_interaction(&ctx, &self.app, &interaction).await;
            general::on_interaction(&ctx, &self.app, &interaction).await;
        };

        let result = AssertUnwindSafe(fut).catch_unwind().await;

        if let Some(name) = name {
            if result.is_err() {
                tracing::error!(interaction = %name, "interaction handler panicked");
            } else {
                tracing::debug!(interaction = %name, elapsed_ms = started.elapsed().as_millis() as u64, "interaction handled");
            }
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        let bot_id = ctx.cache.current_user().id.get();
        if msg.author.bot || msg.author.id.get() == bot_id {
            return;
        }
        if general::on_admin_message(&ctx, &self.app, &msg).await || msg.guild_id.is_none() {
            return;
        }
        if is_exempt_author(msg.author.id.get(), bot_id, self.owner.get().copied()) {
            return;
        }

        let event = actions::message_event(&ctx, &msg).await;
        let lang = self.app.prefs.lang(msg.guild_id.map(|g| g.get()).unwrap_or(0)).await;
        let acts = platform_actions(&ctx, &self.app, &lang);
        self.app.security.on_message(&acts, &event).await;
    }

    async fn guild_member_addition(&self, ctx: Context, member: Member) {
        let gid = member.guild_id.get();
        let join = JoinEvent {
            guild_id: gid,
            member: actions::member_info(&ctx, &member),
            avatar_url: Some(member.face()),
        };
        let lang = self.app.prefs.lang(gid).await;
        let acts = platform_actions(&ctx, &self.app, &lang);
        let outcome = self.app.security.on_member_join(&acts, &join).await;
        tracing::debug!(gid, uid = join.member.id, fast = outcome.fast, class = ?outcome.class, "member joined");
    }

    async fn auto_moderation_action_execution(&self, ctx: Context, execution: ActionExecution) {
        // jedna reguła z alertem wywołuje event dwa razy – karzemy tylko za blokadę
        if !matches!(execution.action, automod::Action::BlockMessage { .. }) {
            return;
        }
        let gid = execution.guild_id;
        let member = match gid.member(&ctx, execution.user_id).await {
            Ok(m) => actions::member_info(&ctx, &m),
            Err(e) => {
                tracing::debug!(error=?e, gid=%gid.get(), "automod target not resolved");
                actions::user_info(execution.user_id)
            }
        };
        let event = AutomodEvent {
            guild_id: gid.get(),
            member,
            trigger: actions::automod_trigger(execution.trigger_type),
        };
        let lang = self.app.prefs.lang(gid.get()).await;
        let acts = platform_actions(&ctx, &self.app, &lang);
        if let Some(report) = self.app.security.on_automod(&acts, &event).await {
            tracing::info!(gid=%gid.get(), uid = event.member.id, applied = ?report.applied(), "automod punishments");
        }
    }
}

fn intents_from_settings(names: &[String]) -> GatewayIntents {
    let mut i = GatewayIntents::empty();
    for n in names {
        match n.as_str() {
            "GUILDS" => i |= GatewayIntents::GUILDS,
            "GUILD_MEMBERS" => i |= GatewayIntents::GUILD_MEMBERS,
            "GUILD_MESSAGES" => i |= GatewayIntents::GUILD_MESSAGES,
            "MESSAGE_CONTENT" => i |= GatewayIntents::MESSAGE_CONTENT,
            "DIRECT_MESSAGES" => i |= GatewayIntents::DIRECT_MESSAGES,
            "AUTO_MODERATION_EXECUTION" => i |= GatewayIntents::AUTO_MODERATION_EXECUTION,
            "AUTO_MODERATION_CONFIGURATION" => i |= GatewayIntents::AUTO_MODERATION_CONFIGURATION,
            other => tracing::warn!(intent = other, "unknown gateway intent ignored"),
        }
    }
    i
}

pub async fn run_bot(ctx: Arc<AppContext>) -> Result<()> {
    let token = &ctx.settings.discord.token;
    if token.is_empty() {
        anyhow::bail!("Brak tokenu Discord (WARDEN_DISCORD__TOKEN). Uzupełnij w .env.");
    }

    let intents = intents_from_settings(&ctx.settings.discord.intents);
    let handler = Handler::new(ctx.clone());

    let mut client = serenity::Client::builder(token, intents)
        .event_handler(handler)
        .await?;

    tracing::info!("Discord client starting…");
    client.start().await?;
    Ok(())
}

/* ============================================================
   REJESTR KOMEND
   ============================================================ */
async fn register_commands_for_guild(ctx: &Context, guild_id: GuildId) -> Result<()> {
    if let Err(e) = security::register_commands(ctx, guild_id).await {
        tracing::warn!(error=?e, gid=%guild_id.get(), "register security failed");
    }
    if let Err(e) = moderation::register_commands(ctx, guild_id).await {
        tracing::warn!(error=?e, gid=%guild_id.get(), "register moderation failed");
    }
    if let Err(e) = warnings::register_commands(ctx, guild_id).await {
        tracing::warn!(error=?e, gid=%guild_id.get(), "register warnings failed");
    }
    if let Err(e) = general::register_commands(ctx, guild_id).await {
        tracing::warn!(error=?e, gid=%guild_id.get(), "register general failed");
    }
    Ok(())
}

/* ============================================================
   Wspólne helpery komend
   ============================================================ */

pub(crate) fn platform_actions(ctx: &Context, app: &AppContext, lang: &str) -> SerenityActions {
    SerenityActions::new(
        ctx.http.clone(),
        app.i18n.t(lang, "log.actor", &[]),
        app.settings.app.name.clone(),
    )
}

pub(crate) fn actor(user: &User) -> Actor {
    Actor {
        id: user.id.get(),
        name: user.name.clone(),
    }
}

pub(crate) async fn display_name(ctx: &Context, gid: GuildId, uid: UserId) -> String {
    match gid.member(ctx, uid).await {
        Ok(m) => m.display_name().to_string(),
        Err(_) => format!("<@{}>", uid.get()),
    }
}

pub(crate) async fn defer(ctx: &Context, cmd: &CommandInteraction) -> Result<()> {
    cmd.create_response(
        &ctx.http,
        CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new().ephemeral(true)),
    )
    .await?;
    Ok(())
}

pub(crate) async fn guild_only(ctx: &Context, app: &AppContext, cmd: &CommandInteraction) -> Result<()> {
    let text = app
        .i18n
        .t(&app.settings.i18n.default_lang, "command_fail.guild_only", &[]);
    edit_embed(ctx, cmd, &text, COLOR_FAIL).await
}

pub(crate) fn embed(text: &str, colour: u32) -> CreateEmbed {
    CreateEmbed::new().description(text).colour(Colour::new(colour))
}

pub(crate) async fn edit_embed(ctx: &Context, cmd: &CommandInteraction, text: &str, colour: u32) -> Result<()> {
    cmd.edit_response(&ctx.http, EditInteractionResponse::new().embed(embed(text, colour)))
        .await?;
    Ok(())
}

pub(crate) fn opt<'a>(cmd: &'a CommandInteraction, name: &str) -> Option<&'a CommandDataOptionValue> {
    cmd.data.options.iter().find(|o| o.name == name).map(|o| &o.value)
}

pub(crate) fn opt_str(cmd: &CommandInteraction, name: &str) -> Option<String> {
    match opt(cmd, name)? {
        CommandDataOptionValue::String(s) => Some(s.clone()),
        _ => None,
    }
}

pub(crate) fn opt_user(cmd: &CommandInteraction, name: &str) -> Option<UserId> {
    match opt(cmd, name)? {
        CommandDataOptionValue::User(u) => Some(*u),
        _ => None,
    }
}

pub(crate) fn opt_channel(cmd: &CommandInteraction, name: &str) -> Option<ChannelId> {
    match opt(cmd, name)? {
        CommandDataOptionValue::Channel(c) => Some(*c),
        _ => None,
    }
}

pub(crate) fn opt_bool(cmd: &CommandInteraction, name: &str) -> Option<bool> {
    match opt(cmd, name)? {
        CommandDataOptionValue::Boolean(b) => Some(*b),
        _ => None,
    }
}

pub(crate) fn opt_int(cmd: &CommandInteraction, name: &str) -> Option<i64> {
    match opt(cmd, name)? {
        CommandDataOptionValue::Integer(i) => Some(*i),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bot_and_owner_messages_are_exempt() {
        assert!(is_exempt_author(1, 1, None));
        assert!(is_exempt_author(7, 1, Some(7)));
        assert!(!is_exempt_author(8, 1, Some(7)));
        assert!(!is_exempt_author(8, 1, None));
    }
}
