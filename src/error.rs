//! Error taxonomy shared by the moderation pipeline and the command surface.

use thiserror::Error;

/// Failure of a single outbound platform action (timeout, kick, ban, delete, send).
#[derive(Debug, Error)]
pub enum ActionError {
    /// The bot lacks the permission or role position for this action.
    #[error("missing permissions")]
    PermissionDenied,
    /// Target member/channel/message does not exist (anymore).
    #[error("target not found")]
    NotFound,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ActionError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, ActionError::PermissionDenied)
    }
}

/// Failure while mutating the guild preference document.
#[derive(Debug, Error)]
pub enum PrefsError {
    /// Path does not exist in the document or the value has the wrong shape.
    #[error("invalid preference field `{path}`: {reason}")]
    InvalidField { path: String, reason: String },
    #[error("preference storage failed: {0}")]
    Storage(#[from] anyhow::Error),
}

/// User-facing command failures. Each maps to a localized reply.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("malformed input: {0}")]
    Malformed(String),
    #[error("forbidden")]
    Forbidden,
}

impl CommandError {
    /// Translation key of the reply shown to the invoking user.
    pub fn translation_key(&self) -> &'static str {
        match self {
            CommandError::NotFound(_) => "command_fail.not_found",
            CommandError::Malformed(_) => "command_fail.malformed",
            CommandError::Forbidden => "command_fail.forbidden",
        }
    }
}

impl From<ActionError> for CommandError {
    fn from(e: ActionError) -> Self {
        match e {
            ActionError::PermissionDenied => CommandError::Forbidden,
            ActionError::NotFound => CommandError::NotFound("target".into()),
            ActionError::Other(e) => CommandError::Malformed(e.to_string()),
        }
    }
}

/// Parses a snowflake id typed by a user. Rejected before any side effect.
pub fn parse_snowflake(raw: &str) -> Result<u64, CommandError> {
    let trimmed = raw
        .trim()
        .trim_start_matches(|c| matches!(c, '<' | '@' | '!' | '#' | '&'))
        .trim_end_matches('>');
    match trimmed.parse::<u64>() {
        Ok(0) | Err(_) => Err(CommandError::Malformed(raw.to_string())),
        Ok(id) => Ok(id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_snowflake_accepts_plain_and_mentions() {
        assert_eq!(parse_snowflake("1234"), Ok(1234));
        assert_eq!(parse_snowflake(" <@!42> "), Ok(42));
        assert_eq!(parse_snowflake("<#77>"), Ok(77));
    }

    #[test]
    fn parse_snowflake_rejects_garbage() {
        assert!(matches!(parse_snowflake("abc"), Err(CommandError::Malformed(_))));
        assert!(matches!(parse_snowflake("0"), Err(CommandError::Malformed(_))));
        assert!(matches!(parse_snowflake("-5"), Err(CommandError::Malformed(_))));
    }

    #[test]
    fn action_errors_map_to_command_errors() {
        assert_eq!(CommandError::from(ActionError::PermissionDenied), CommandError::Forbidden);
        assert_eq!(
            CommandError::from(ActionError::NotFound).translation_key(),
            "command_fail.not_found"
        );
    }
}
