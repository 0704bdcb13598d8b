// src/discord/actions.rs

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serenity::all::{
    ChannelId, Colour, Context, CreateEmbed, CreateEmbedAuthor, CreateEmbedFooter, CreateMessage,
    EditMember, GuildId, Http, Member, Message, MessageId, ModelError, Timestamp, UserId,
};
use serenity::async_trait;
use serenity::http::HttpError;

use crate::actions::{LogEntry, ModerationActions};
use crate::error::ActionError;
use crate::event::{AutomodTrigger, MemberInfo, MessageEvent};
use serenity::model::guild::automod::TriggerType;
use crate::joinwatch::JoinReport;

/// Kolor embedów logów.
pub const EMBED_COLOR: u32 = 0x2B2D31;

const DISCORD_EPOCH_MS: i64 = 1_420_070_400_000;

/// Serenity-backed platform actions.
#[derive(Clone)]
pub struct SerenityActions {
    http: Arc<Http>,
    actor_label: String,
    footer: String,
}

impl std::fmt::Debug for SerenityActions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerenityActions").finish_non_exhaustive()
    }
}

impl SerenityActions {
    pub fn new(http: Arc<Http>, actor_label: impl Into<String>, footer: impl Into<String>) -> Self {
        Self {
            http,
            actor_label: actor_label.into(),
            footer: footer.into(),
        }
    }
}

/// 403 / brak uprawnień w cache → PermissionDenied, 404 → NotFound.
pub fn map_err(e: serenity::Error) -> ActionError {
    match &e {
        serenity::Error::Http(HttpError::UnsuccessfulRequest(resp)) => match resp.status_code.as_u16() {
            403 => ActionError::PermissionDenied,
            404 => ActionError::NotFound,
            _ => ActionError::Other(anyhow!(e)),
        },
        serenity::Error::Model(ModelError::InvalidPermissions { .. } | ModelError::Hierarchy) => {
            ActionError::PermissionDenied
        }
        _ => ActionError::Other(anyhow!(e)),
    }
}

#[async_trait]
impl ModerationActions for SerenityActions {
    async fn timeout(&self, guild_id: u64, user_id: u64, duration: Duration, reason: &str) -> Result<(), ActionError> {
        let until = Utc::now() + chrono::Duration::seconds(duration.as_secs() as i64);
        let until = Timestamp::from_unix_timestamp(until.timestamp()).map_err(|e| ActionError::Other(anyhow!("{e}")))?;
        GuildId::new(guild_id)
            .edit_member(
                &self.http,
                UserId::new(user_id),
                EditMember::new()
                    .disable_communication_until_datetime(until)
                    .audit_log_reason(reason),
            )
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn kick(&self, guild_id: u64, user_id: u64, reason: &str) -> Result<(), ActionError> {
        GuildId::new(guild_id)
            .kick_with_reason(&self.http, UserId::new(user_id), reason)
            .await
            .map_err(map_err)
    }

    async fn ban(&self, guild_id: u64, user_id: u64, reason: &str) -> Result<(), ActionError> {
        GuildId::new(guild_id)
            .ban_with_reason(&self.http, UserId::new(user_id), 0, reason)
            .await
            .map_err(map_err)
    }

    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<(), ActionError> {
        ChannelId::new(channel_id)
            .delete_message(&self.http, MessageId::new(message_id))
            .await
            .map_err(map_err)
    }

    async fn send_log(&self, channel_id: u64, entry: &LogEntry) -> Result<(), ActionError> {
        let mut e = CreateEmbed::new()
            .description(&entry.description)
            .colour(Colour::new(EMBED_COLOR))
            .footer(CreateEmbedFooter::new(&self.footer))
            .timestamp(Timestamp::now());
        if let Some(actor) = &entry.actor {
            e = e.field(&self.actor_label, format!("{}\nID: ``{}``", actor.name, actor.id), false);
        }
        ChannelId::new(channel_id)
            .send_message(&self.http, CreateMessage::new().embed(e))
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn send_join_report(&self, channel_id: u64, report: &JoinReport) -> Result<(), ActionError> {
        let mut author = CreateEmbedAuthor::new(&report.member_name);
        if let Some(url) = &report.avatar_url {
            author = author.icon_url(url);
        }
        let mut e = CreateEmbed::new()
            .title(&report.title)
            .colour(Colour::new(report.color))
            .author(author)
            .timestamp(Timestamp::now());
        for (i, (name, value)) in report.fields.iter().enumerate() {
            // ostatnie pole (Created) w osobnej linii
            let inline = i + 1 < report.fields.len();
            e = e.field(name, value, inline);
        }
        ChannelId::new(channel_id)
            .send_message(&self.http, CreateMessage::new().embed(e))
            .await
            .map_err(map_err)?;
        Ok(())
    }
}

/* ==============================
   Konwersje serenity -> event
   ============================== */

/// Creation time encoded in a snowflake.
pub fn snowflake_time(id: u64) -> DateTime<Utc> {
    let ms = (id >> 22) as i64 + DISCORD_EPOCH_MS;
    DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}

pub fn to_chrono(ts: Timestamp) -> DateTime<Utc> {
    DateTime::from_timestamp(ts.unix_timestamp(), 0).unwrap_or_else(Utc::now)
}

fn can_manage_messages(ctx: &Context, member: &Member) -> bool {
    ctx.cache
        .guild(member.guild_id)
        .map(|g| {
            #[allow(deprecated)]
            let perms = g.member_permissions(member);
            perms.manage_messages() || perms.administrator()
        })
        .unwrap_or(false)
}

pub fn member_info(ctx: &Context, member: &Member) -> MemberInfo {
    let mut info = MemberInfo::new(
        member.user.id.get(),
        snowflake_time(member.user.id.get()),
        member.joined_at.map(to_chrono),
    );
    info.display_name = member.display_name().to_string();
    info.bot = member.user.bot;
    info.can_manage_messages = can_manage_messages(ctx, member);
    info
}

/// Bare info when the member could not be resolved.
pub fn user_info(user_id: UserId) -> MemberInfo {
    MemberInfo::new(user_id.get(), snowflake_time(user_id.get()), None)
}

/// Resolves the author as a guild member (cache first, then HTTP).
/// Typ wyzwalacza automoda -> nasz enum.
pub fn automod_trigger(trigger: TriggerType) -> AutomodTrigger {
    AutomodTrigger::from_code(u8::from(trigger))
}

pub async fn message_event(ctx: &Context, msg: &Message) -> MessageEvent {
    let author = match msg.guild_id {
        Some(gid) => match gid.member(ctx, msg.author.id).await {
            Ok(m) => member_info(ctx, &m),
            Err(e) => {
                tracing::debug!(error=?e, gid=%gid.get(), uid=%msg.author.id.get(), "author not resolved as member");
                let mut info = user_info(msg.author.id);
                info.display_name = msg.author.name.clone();
                info.joined_at = msg
                    .member
                    .as_ref()
                    .and_then(|pm| pm.joined_at)
                    .map(to_chrono);
                info.bot = msg.author.bot;
                info
            }
        },
        None => {
            let mut info = user_info(msg.author.id);
            info.bot = msg.author.bot;
            info
        }
    };

    MessageEvent {
        guild_id: msg.guild_id.map(|g| g.get()),
        channel_id: msg.channel_id.get(),
        message_id: msg.id.get(),
        author,
        content: msg.content.clone(),
        created_at: snowflake_time(msg.id.get()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snowflake_decodes_creation_time() {
        // 175928847299117063 -> 2016-04-30 11:18:25.796 UTC
        let t = snowflake_time(175_928_847_299_117_063);
        assert_eq!(t.timestamp_millis(), 1_462_015_105_796);
    }

    #[test]
    fn automod_trigger_types_map_by_code() {
        assert_eq!(automod_trigger(TriggerType::Spam), AutomodTrigger::Spam);
        assert_eq!(automod_trigger(TriggerType::MentionSpam), AutomodTrigger::MentionSpam);
        assert_eq!(automod_trigger(TriggerType::Keyword), AutomodTrigger::Keyword);
        assert!(!automod_trigger(TriggerType::KeywordPreset).is_spam());
    }
}
