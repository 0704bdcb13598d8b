//! Join watch: classifies each member join for the report channel.

use chrono::{DateTime, Duration, Utc};

use crate::event::MemberInfo;

pub const COLOR_FAST_JOIN: u32 = 0xDD5F53;
pub const COLOR_NEW_ACCOUNT: u32 = 0xDDA453;
pub const COLOR_REGULAR: u32 = 0x53DDA4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinClass {
    /// Joined right after another member.
    Fast { very_new: bool },
    NewAccount,
    Regular,
}

impl JoinClass {
    pub fn color(self) -> u32 {
        match self {
            JoinClass::Fast { .. } => COLOR_FAST_JOIN,
            JoinClass::NewAccount => COLOR_NEW_ACCOUNT,
            JoinClass::Regular => COLOR_REGULAR,
        }
    }

    pub fn very_new(self) -> bool {
        matches!(self, JoinClass::Fast { very_new: true } | JoinClass::NewAccount)
    }

    /// Translation key of the report title.
    pub fn title_key(self) -> &'static str {
        if self.very_new() {
            "joinwatch_report.very_new"
        } else {
            "joinwatch_report.joined"
        }
    }
}

pub fn classify(member: &MemberInfo, fast: bool, now: DateTime<Utc>, new_account_days: i64) -> JoinClass {
    let very_new = now - member.created_at < Duration::days(new_account_days);
    match (fast, very_new) {
        (true, very_new) => JoinClass::Fast { very_new },
        (false, true) => JoinClass::NewAccount,
        (false, false) => JoinClass::Regular,
    }
}

/// Rendered join report, ready to be posted as an embed.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinReport {
    pub class: JoinClass,
    pub title: String,
    pub color: u32,
    pub member_id: u64,
    pub member_name: String,
    pub avatar_url: Option<String>,
    /// `(label, value)` embed fields in display order.
    pub fields: Vec<(String, String)>,
}

impl JoinReport {
    pub fn build(
        member: &MemberInfo,
        avatar_url: Option<String>,
        class: JoinClass,
        now: DateTime<Utc>,
        label: impl Fn(&str) -> String,
    ) -> Self {
        let joined = member.joined_at.unwrap_or(now);
        let fields = vec![
            (label("joinwatch_report.id"), member.id.to_string()),
            (label("joinwatch_report.joined_at"), format!("<t:{}:f>", joined.timestamp())),
            (label("joinwatch_report.created"), format!("<t:{}:R>", member.created_at.timestamp())),
        ];
        Self {
            class,
            title: label(class.title_key()),
            color: class.color(),
            member_id: member.id,
            member_name: member.display_name.clone(),
            avatar_url,
            fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i18n::Translator;

    fn member(age_days: i64, now: DateTime<Utc>) -> MemberInfo {
        MemberInfo::new(5, now - Duration::days(age_days), Some(now))
    }

    #[test]
    fn classification_matrix() {
        let now = Utc::now();
        assert_eq!(classify(&member(100, now), true, now, 7), JoinClass::Fast { very_new: false });
        assert_eq!(classify(&member(2, now), true, now, 7), JoinClass::Fast { very_new: true });
        assert_eq!(classify(&member(2, now), false, now, 7), JoinClass::NewAccount);
        assert_eq!(classify(&member(30, now), false, now, 7), JoinClass::Regular);
    }

    #[test]
    fn colors_and_titles() {
        assert_eq!(JoinClass::Fast { very_new: true }.color(), 0xDD5F53);
        assert_eq!(JoinClass::NewAccount.color(), 0xDDA453);
        assert_eq!(JoinClass::Regular.color(), 0x53DDA4);
        assert_eq!(JoinClass::Fast { very_new: false }.title_key(), "joinwatch_report.joined");
        assert_eq!(JoinClass::Fast { very_new: true }.title_key(), "joinwatch_report.very_new");
    }

    #[test]
    fn report_fields() {
        let now = Utc::now();
        let t = Translator::builtin();
        let m = member(1, now);
        let r = JoinReport::build(&m, None, classify(&m, false, now, 7), now, |k| t.t("en", k, &[]));
        assert_eq!(r.title, "Member Joined (Very New Member)");
        assert_eq!(r.fields[0], ("ID".to_string(), "5".to_string()));
        assert!(r.fields[2].1.ends_with(":R>"));
    }
}
