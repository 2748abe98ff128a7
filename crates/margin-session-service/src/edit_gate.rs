// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Edit inspection hook for the host's mutation pipeline.
//!
//! Users without write access may still toggle comment markers on the pad
//! body. The gate answers [`EditVerdict::AllowOverride`] only for such users,
//! only when they may comment, and only for edits that touch nothing but the
//! reserved attribute. Every other case defers to the host.

use std::sync::Arc;

use margin_access::{resolve, AccessQuery, CommentPermissions, PadAccess};
use margin_app_core::PadResolver;
use margin_changeset::{AttributePool, CommentOnlyValidator, JsonablePool};
use margin_session_proto::EditVerdict;
use tracing::debug;

/// Who is editing.
#[derive(Debug, Clone, Copy)]
pub struct EditContext<'a> {
    /// Raw pad id the editor is attached to.
    pub pad_id: &'a str,
    /// Account name.
    pub user: Option<&'a str>,
    /// Authorization on the canonical pad.
    pub access: Option<PadAccess>,
}

/// Decides whether a read-only edit is a pure comment-marker edit.
#[derive(Clone)]
pub struct EditGate {
    pads: Arc<dyn PadResolver>,
    permissions: Arc<CommentPermissions>,
    validator: CommentOnlyValidator,
}

impl EditGate {
    /// Gate over the given collaborators.
    pub fn new(
        pads: Arc<dyn PadResolver>,
        permissions: Arc<CommentPermissions>,
        validator: CommentOnlyValidator,
    ) -> Self {
        Self {
            pads,
            permissions,
            validator,
        }
    }

    /// Inspect one edit.
    pub fn inspect(
        &self,
        ctx: EditContext<'_>,
        changeset: &str,
        apool: JsonablePool,
    ) -> EditVerdict {
        let Ok(pad) = self.pads.resolve(ctx.pad_id) else {
            debug!(pad = ctx.pad_id, "unresolvable pad id; deferring");
            return EditVerdict::Defer;
        };
        if !pad.read_only && ctx.access.is_some_and(PadAccess::can_write) {
            return EditVerdict::Defer;
        }
        let access = if pad.read_only {
            ctx.access.map(PadAccess::capped_read_only)
        } else {
            ctx.access
        };
        let decision = resolve(
            &AccessQuery {
                user: ctx.user,
                pad: &pad.canonical,
                access,
            },
            &self.permissions,
        );
        if !decision.allowed {
            debug!(
                pad = %pad.canonical,
                source = ?decision.source,
                "comment access denied; deferring"
            );
            return EditVerdict::Defer;
        }
        let pool = match AttributePool::from_jsonable(apool) {
            Ok(pool) => pool,
            Err(err) => {
                debug!(pad = %pad.canonical, %err, "bad attribute pool; deferring");
                return EditVerdict::Defer;
            }
        };
        match self.validator.check(changeset, &pool) {
            Ok(()) => EditVerdict::AllowOverride,
            Err(violation) => {
                debug!(pad = %pad.canonical, %violation, "edit is not comment-only; deferring");
                EditVerdict::Defer
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use margin_app_core::AliasTable;
    use margin_changeset::{Attribute, Builder};
    use margin_dry_tests::comment_pool;

    fn gate(perms: CommentPermissions) -> EditGate {
        EditGate::new(
            Arc::new(AliasTable::new().with_alias("r.abc", "doc1")),
            Arc::new(perms),
            CommentOnlyValidator::default(),
        )
    }

    fn reader(pad_id: &str) -> EditContext<'_> {
        EditContext {
            pad_id,
            user: Some("alice"),
            access: Some(PadAccess::ReadOnly),
        }
    }

    #[test]
    fn comment_marker_edit_by_reader_is_allowed() {
        let (pool, code) = comment_pool("c1");
        let cs = Builder::new().keep(5, 0, &[code]).build();
        let verdict = gate(CommentPermissions::default()).inspect(reader("doc1"), &cs, pool);
        assert_eq!(verdict, EditVerdict::AllowOverride);
    }

    #[test]
    fn content_insert_by_reader_defers() {
        let (pool, _) = comment_pool("c1");
        let cs = Builder::new().insert("abc", &[]).build();
        let verdict = gate(CommentPermissions::default()).inspect(reader("doc1"), &cs, pool);
        assert_eq!(verdict, EditVerdict::Defer);
    }

    #[test]
    fn writers_on_writable_pads_defer() {
        let (pool, code) = comment_pool("c1");
        let cs = Builder::new().keep(5, 0, &[code]).build();
        let ctx = EditContext {
            access: Some(PadAccess::Modify),
            ..reader("doc1")
        };
        assert_eq!(
            gate(CommentPermissions::default()).inspect(ctx, &cs, pool),
            EditVerdict::Defer
        );
    }

    #[test]
    fn writer_on_read_only_alias_is_inspected() {
        let (pool, code) = comment_pool("c1");
        let cs = Builder::new().keep(5, 0, &[code]).build();
        let ctx = EditContext {
            access: Some(PadAccess::Create),
            ..reader("r.abc")
        };
        assert_eq!(
            gate(CommentPermissions::default()).inspect(ctx, &cs, pool),
            EditVerdict::AllowOverride
        );
    }

    #[test]
    fn users_without_comment_access_defer() {
        let (pool, code) = comment_pool("c1");
        let cs = Builder::new().keep(5, 0, &[code]).build();
        let perms = CommentPermissions::default().with_user("alice", false);
        assert_eq!(gate(perms).inspect(reader("doc1"), &cs, pool), EditVerdict::Defer);
    }

    #[test]
    fn foreign_attributes_and_broken_pools_defer() {
        let mut pool = AttributePool::new();
        let bold = pool.put_attrib(Attribute::new("bold", "true")).unwrap();
        let cs = Builder::new().keep(5, 0, &[bold]).build();
        let g = gate(CommentPermissions::default());
        assert_eq!(g.inspect(reader("doc1"), &cs, pool.to_jsonable()), EditVerdict::Defer);

        let mut broken = JsonablePool::default();
        broken
            .num_to_attrib
            .insert("zero".into(), Attribute::new("comment", "c1"));
        let cs = Builder::new().keep(5, 0, &[]).build();
        assert_eq!(g.inspect(reader("doc1"), &cs, broken), EditVerdict::Defer);
    }

    #[test]
    fn unknown_alias_defers() {
        let (pool, code) = comment_pool("c1");
        let cs = Builder::new().keep(5, 0, &[code]).build();
        assert_eq!(
            gate(CommentPermissions::default()).inspect(reader("r.nope"), &cs, pool),
            EditVerdict::Defer
        );
    }
}
