// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Comment-permission resolution.
//!
//! Whether a user may post on a pad's comment channel is decided by an
//! ordered rule chain; the first rule with an opinion wins:
//!
//! 1. no authorization for the pad (or `none`) denies
//! 2. write authorization (`modify`, `create`) allows
//! 3. the user's per-pad override
//! 4. the user's general `canComment` setting
//! 5. the global default
//! 6. otherwise allow
//!
//! Resolution is pure: it reads an already-loaded [`CommentPermissions`]
//! and performs no I/O.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Authorization a session holds on a pad body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PadAccess {
    /// Explicitly no access.
    None,
    /// May view the pad but not edit its body.
    ReadOnly,
    /// May edit an existing pad.
    Modify,
    /// May create and edit the pad.
    Create,
}

impl PadAccess {
    /// True for authorizations that may edit the pad body.
    pub fn can_write(self) -> bool {
        matches!(self, Self::Modify | Self::Create)
    }

    /// Cap this authorization at read-only (sessions joined through a read-only alias).
    pub fn capped_read_only(self) -> Self {
        match self {
            Self::None => Self::None,
            Self::ReadOnly | Self::Modify | Self::Create => Self::ReadOnly,
        }
    }
}

/// Comment settings for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserCommentSettings {
    /// General permission for this user.
    pub can_comment: Option<bool>,
    /// Per-pad overrides keyed by canonical pad id.
    pub pads: BTreeMap<String, bool>,
}

/// Layered comment permissions as loaded from configuration.
///
/// ```json
/// { "default": false,
///   "users": { "alice": { "canComment": true, "pads": { "doc1": false } } } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommentPermissions {
    /// Global default applied when no user layer decides.
    pub default: Option<bool>,
    /// Per-user settings keyed by user name.
    pub users: BTreeMap<String, UserCommentSettings>,
}

impl CommentPermissions {
    /// Set the global default.
    pub fn with_default(mut self, allowed: bool) -> Self {
        self.default = Some(allowed);
        self
    }

    /// Set a user's general permission.
    pub fn with_user(mut self, user: &str, allowed: bool) -> Self {
        self.users.entry(user.to_owned()).or_default().can_comment = Some(allowed);
        self
    }

    /// Set a user's override for one pad.
    pub fn with_pad_override(mut self, user: &str, pad: &str, allowed: bool) -> Self {
        self.users
            .entry(user.to_owned())
            .or_default()
            .pads
            .insert(pad.to_owned(), allowed);
        self
    }
}

/// Inputs of one resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessQuery<'a> {
    /// User name, `None` for anonymous sessions.
    pub user: Option<&'a str>,
    /// Canonical pad id.
    pub pad: &'a str,
    /// The session's authorization record for the pad.
    pub access: Option<PadAccess>,
}

/// Layer that produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionSource {
    /// No authorization (or `none`) on the pad.
    NoAccess,
    /// Write authorization implies comment access.
    WriteAccess,
    /// Per-user per-pad override.
    PadOverride,
    /// Per-user general setting.
    UserSetting,
    /// Global default.
    GlobalDefault,
    /// Nothing configured.
    BuiltIn,
}

/// Resolution outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the user may comment.
    pub allowed: bool,
    /// Layer that decided.
    pub source: DecisionSource,
}

impl Decision {
    const fn new(allowed: bool, source: DecisionSource) -> Self {
        Self { allowed, source }
    }
}

type Rule = fn(&AccessQuery<'_>, &CommentPermissions) -> Option<Decision>;

const RULES: [Rule; 5] = [
    no_access,
    write_access,
    pad_override,
    user_setting,
    global_default,
];

fn no_access(query: &AccessQuery<'_>, _: &CommentPermissions) -> Option<Decision> {
    matches!(query.access, None | Some(PadAccess::None))
        .then_some(Decision::new(false, DecisionSource::NoAccess))
}

fn write_access(query: &AccessQuery<'_>, _: &CommentPermissions) -> Option<Decision> {
    query
        .access
        .is_some_and(PadAccess::can_write)
        .then_some(Decision::new(true, DecisionSource::WriteAccess))
}

fn pad_override(query: &AccessQuery<'_>, perms: &CommentPermissions) -> Option<Decision> {
    let settings = perms.users.get(query.user?)?;
    let allowed = *settings.pads.get(query.pad)?;
    Some(Decision::new(allowed, DecisionSource::PadOverride))
}

fn user_setting(query: &AccessQuery<'_>, perms: &CommentPermissions) -> Option<Decision> {
    let allowed = perms.users.get(query.user?)?.can_comment?;
    Some(Decision::new(allowed, DecisionSource::UserSetting))
}

fn global_default(_: &AccessQuery<'_>, perms: &CommentPermissions) -> Option<Decision> {
    perms
        .default
        .map(|allowed| Decision::new(allowed, DecisionSource::GlobalDefault))
}

/// Run the rule chain.
pub fn resolve(query: &AccessQuery<'_>, perms: &CommentPermissions) -> Decision {
    RULES
        .iter()
        .find_map(|rule| rule(query, perms))
        .unwrap_or(Decision::new(true, DecisionSource::BuiltIn))
}

/// Whether `user` may post comment-channel events on `pad`.
pub fn can_comment(
    user: Option<&str>,
    pad: &str,
    access: Option<PadAccess>,
    perms: &CommentPermissions,
) -> bool {
    resolve(&AccessQuery { user, pad, access }, perms).allowed
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn decide(perms: &CommentPermissions, access: Option<PadAccess>) -> Decision {
        resolve(
            &AccessQuery {
                user: Some("alice"),
                pad: "doc1",
                access,
            },
            perms,
        )
    }

    #[test]
    fn missing_or_none_authorization_denies_over_everything() {
        let perms = CommentPermissions::default()
            .with_default(true)
            .with_user("alice", true)
            .with_pad_override("alice", "doc1", true);
        for access in [None, Some(PadAccess::None)] {
            assert_eq!(
                decide(&perms, access),
                Decision::new(false, DecisionSource::NoAccess)
            );
        }
    }

    #[test]
    fn write_access_shadows_every_setting() {
        let perms = CommentPermissions::default()
            .with_default(false)
            .with_user("alice", false)
            .with_pad_override("alice", "doc1", false);
        for access in [PadAccess::Modify, PadAccess::Create] {
            assert_eq!(
                decide(&perms, Some(access)),
                Decision::new(true, DecisionSource::WriteAccess)
            );
        }
    }

    #[test]
    fn modify_with_global_false_still_comments() {
        let perms = CommentPermissions::default().with_default(false);
        assert!(can_comment(Some("bob"), "doc1", Some(PadAccess::Modify), &perms));
    }

    #[test]
    fn pad_override_shadows_user_and_global() {
        let perms = CommentPermissions::default()
            .with_default(false)
            .with_user("alice", false)
            .with_pad_override("alice", "doc1", true);
        assert_eq!(
            decide(&perms, Some(PadAccess::ReadOnly)),
            Decision::new(true, DecisionSource::PadOverride)
        );

        let denied = CommentPermissions::default()
            .with_default(true)
            .with_user("alice", true)
            .with_pad_override("alice", "doc1", false);
        assert!(!decide(&denied, Some(PadAccess::ReadOnly)).allowed);
    }

    #[test]
    fn pad_override_for_other_pad_falls_through() {
        let perms = CommentPermissions::default()
            .with_user("alice", false)
            .with_pad_override("alice", "doc2", true);
        assert_eq!(
            decide(&perms, Some(PadAccess::ReadOnly)),
            Decision::new(false, DecisionSource::UserSetting)
        );
    }

    #[test]
    fn user_setting_shadows_global() {
        let perms = CommentPermissions::default()
            .with_default(false)
            .with_user("alice", true);
        assert_eq!(
            decide(&perms, Some(PadAccess::ReadOnly)),
            Decision::new(true, DecisionSource::UserSetting)
        );
    }

    #[test]
    fn global_false_denies_unconfigured_user() {
        let perms = CommentPermissions::default()
            .with_default(false)
            .with_user("carol", true);
        assert_eq!(
            decide(&perms, Some(PadAccess::ReadOnly)),
            Decision::new(false, DecisionSource::GlobalDefault)
        );
    }

    #[test]
    fn anonymous_sessions_skip_user_layers() {
        let perms = CommentPermissions::default()
            .with_default(false)
            .with_user("alice", true);
        assert!(!can_comment(None, "doc1", Some(PadAccess::ReadOnly), &perms));
    }

    #[test]
    fn nothing_configured_allows() {
        assert_eq!(
            decide(&CommentPermissions::default(), Some(PadAccess::ReadOnly)),
            Decision::new(true, DecisionSource::BuiltIn)
        );
    }

    #[test]
    fn permissions_load_from_json() {
        let json = r#"{"default":false,"users":{"alice":{"canComment":true,"pads":{"doc1":false}}}}"#;
        let perms: CommentPermissions = serde_json::from_str(json).unwrap();
        assert_eq!(
            perms,
            CommentPermissions::default()
                .with_default(false)
                .with_user("alice", true)
                .with_pad_override("alice", "doc1", false)
        );
        let empty: CommentPermissions = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, CommentPermissions::default());
    }

    #[test]
    fn read_only_cap_keeps_none() {
        assert_eq!(PadAccess::Create.capped_read_only(), PadAccess::ReadOnly);
        assert_eq!(PadAccess::None.capped_read_only(), PadAccess::None);
        let access: PadAccess = serde_json::from_str(r#""readOnly""#).unwrap();
        assert_eq!(access, PadAccess::ReadOnly);
    }
}
