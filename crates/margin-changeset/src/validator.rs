// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Comment-only edit validator.
//!
//! Users without write access to a pad body may still anchor comments, which
//! reaches the pad as an attribute change. An edit qualifies when every op is
//! a keep and every attribute code it applies resolves, through the pool sent
//! with that same edit, to the reserved attribute name.

use crate::changeset::{Changeset, ChangesetError, OpCode};
use crate::pool::AttributePool;
use thiserror::Error;

/// Default reserved attribute name.
pub const COMMENT_ATTRIBUTE: &str = "comment";

/// First rule an edit broke.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Violation {
    /// The changeset could not be unpacked.
    #[error("malformed changeset: {0}")]
    Malformed(#[from] ChangesetError),
    /// Op `index` inserts or deletes text.
    #[error("op {index} is {opcode:?}, only keep ops are allowed")]
    NotKeep {
        /// Position of the op in the changeset.
        index: usize,
        /// Offending op kind.
        opcode: OpCode,
    },
    /// Op `index` applies an attribute other than the reserved one.
    #[error("op {index} applies attribute code {code} ({name:?})")]
    ForeignAttribute {
        /// Position of the op in the changeset.
        index: usize,
        /// Attribute code as written in the op.
        code: u32,
        /// Resolved name, `None` when the pool has no such code.
        name: Option<String>,
    },
}

/// Validator bound to one reserved attribute name. Holds no pool: every call
/// resolves codes through the pool passed with the changeset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentOnlyValidator {
    reserved: String,
}

impl Default for CommentOnlyValidator {
    fn default() -> Self {
        Self::new(COMMENT_ATTRIBUTE)
    }
}

impl CommentOnlyValidator {
    /// Validator allowing only `reserved` attribute changes.
    pub fn new(reserved: impl Into<String>) -> Self {
        Self {
            reserved: reserved.into(),
        }
    }

    /// Reserved attribute name.
    pub fn reserved(&self) -> &str {
        &self.reserved
    }

    /// Check `changeset` against `pool`, stopping at the first violation.
    pub fn check(&self, changeset: &str, pool: &AttributePool) -> Result<(), Violation> {
        let unpacked = Changeset::unpack(changeset)?;
        for (index, op) in unpacked.ops().enumerate() {
            let op = op?;
            if op.opcode != OpCode::Keep {
                return Err(Violation::NotKeep {
                    index,
                    opcode: op.opcode,
                });
            }
            for &code in &op.attribs {
                match pool.get_attrib_key(code) {
                    Some(name) if name == self.reserved => {}
                    other => {
                        return Err(Violation::ForeignAttribute {
                            index,
                            code,
                            name: other.map(str::to_owned),
                        })
                    }
                }
            }
        }
        Ok(())
    }

    /// True when `changeset` only toggles the reserved attribute.
    pub fn allows(&self, changeset: &str, pool: &AttributePool) -> bool {
        self.check(changeset, pool).is_ok()
    }
}

/// [`CommentOnlyValidator::allows`] with the default `comment` attribute.
pub fn validate(changeset: &str, pool: &AttributePool) -> bool {
    CommentOnlyValidator::default().allows(changeset, pool)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::changeset::Builder;
    use crate::pool::Attribute;
    use proptest::prelude::*;

    // codes 0 and 1 are comment markers, 2 is bold, 3 is unassigned
    fn pool() -> AttributePool {
        let mut pool = AttributePool::new();
        pool.put_attrib(Attribute::new("comment", "c-1")).unwrap();
        pool.put_attrib(Attribute::new("comment", "")).unwrap();
        pool.put_attrib(Attribute::new("bold", "true")).unwrap();
        pool
    }

    #[test]
    fn keep_with_comment_attribute_is_allowed() {
        let cs = Builder::new().keep(5, 0, &[0]).build();
        assert_eq!(CommentOnlyValidator::default().check(&cs, &pool()), Ok(()));
    }

    #[test]
    fn clearing_a_comment_is_allowed() {
        let cs = Builder::new().keep(2, 0, &[]).keep(3, 0, &[1]).build();
        assert!(validate(&cs, &pool()));
    }

    #[test]
    fn empty_changeset_is_vacuously_allowed() {
        assert!(validate("Z:0>0$", &AttributePool::new()));
    }

    #[test]
    fn pure_retain_needs_no_pool() {
        let cs = Builder::new().keep(8, 1, &[]).build();
        assert!(validate(&cs, &AttributePool::new()));
    }

    #[test]
    fn insert_is_rejected() {
        let cs = Builder::new().insert("abc", &[]).build();
        assert_eq!(
            CommentOnlyValidator::default().check(&cs, &pool()),
            Err(Violation::NotKeep {
                index: 0,
                opcode: OpCode::Insert
            })
        );
    }

    #[test]
    fn delete_after_keep_is_rejected() {
        let cs = Builder::new().keep(4, 0, &[0]).remove(1, 0).build();
        assert_eq!(
            CommentOnlyValidator::default().check(&cs, &pool()),
            Err(Violation::NotKeep {
                index: 1,
                opcode: OpCode::Delete
            })
        );
    }

    #[test]
    fn foreign_attribute_is_rejected_with_its_name() {
        let cs = Builder::new().keep(4, 0, &[0, 2]).build();
        assert_eq!(
            CommentOnlyValidator::default().check(&cs, &pool()),
            Err(Violation::ForeignAttribute {
                index: 0,
                code: 2,
                name: Some("bold".into())
            })
        );
    }

    #[test]
    fn unknown_code_is_rejected() {
        let cs = Builder::new().keep(4, 0, &[3]).build();
        assert!(matches!(
            CommentOnlyValidator::default().check(&cs, &pool()),
            Err(Violation::ForeignAttribute { name: None, .. })
        ));
    }

    #[test]
    fn codes_resolve_through_the_supplied_pool_only() {
        // same packed text, different pools: code 0 means comment in one and bold in the other
        let cs = Builder::new().keep(3, 0, &[0]).build();
        let mut other = AttributePool::new();
        other.put_attrib(Attribute::new("bold", "true")).unwrap();
        assert!(validate(&cs, &pool()));
        assert!(!validate(&cs, &other));
    }

    #[test]
    fn custom_reserved_name_is_honoured() {
        let cs = Builder::new().keep(3, 0, &[2]).build();
        assert!(CommentOnlyValidator::new("bold").allows(&cs, &pool()));
        assert!(!CommentOnlyValidator::new("bold").allows(
            &Builder::new().keep(3, 0, &[0]).build(),
            &pool()
        ));
    }

    #[test]
    fn malformed_changeset_is_rejected() {
        assert!(matches!(
            CommentOnlyValidator::default().check("Z:3>0=3", &pool()),
            Err(Violation::Malformed(ChangesetError::MissingCharBank))
        ));
        assert!(!validate("", &pool()));
    }

    #[derive(Debug, Clone)]
    enum Step {
        Keep(usize, Vec<u32>),
        Insert(String),
        Delete(usize),
    }

    fn build(steps: &[Step]) -> String {
        steps
            .iter()
            .fold(Builder::new(), |b, step| match step {
                Step::Keep(n, attribs) => b.keep(*n, 0, attribs),
                Step::Insert(text) => b.insert(text, &[]),
                Step::Delete(n) => b.remove(*n, 0),
            })
            .build()
    }

    fn comment_keep() -> impl Strategy<Value = Step> {
        (1usize..40, prop::collection::vec(0u32..2, 0..3)).prop_map(|(n, a)| Step::Keep(n, a))
    }

    fn any_step() -> impl Strategy<Value = Step> {
        prop_oneof![
            comment_keep(),
            "[a-z]{1,5}".prop_map(Step::Insert),
            (1usize..10).prop_map(Step::Delete),
        ]
    }

    proptest! {
        #[test]
        fn keep_only_comment_scripts_are_allowed(steps in prop::collection::vec(comment_keep(), 0..12)) {
            prop_assert!(validate(&build(&steps), &pool()));
        }

        #[test]
        fn any_insert_or_delete_rejects(
            mut steps in prop::collection::vec(any_step(), 0..12),
            edit in prop_oneof![
                "[a-z]{1,5}".prop_map(Step::Insert),
                (1usize..10).prop_map(Step::Delete),
            ],
            at in any::<prop::sample::Index>(),
        ) {
            let pos = at.index(steps.len() + 1);
            steps.insert(pos, edit);
            prop_assert!(!validate(&build(&steps), &pool()));
        }

        #[test]
        fn foreign_attribute_rejects_at_any_position(
            mut steps in prop::collection::vec(comment_keep(), 0..12),
            foreign in 2u32..4,
            at in any::<prop::sample::Index>(),
        ) {
            let pos = at.index(steps.len() + 1);
            steps.insert(pos, Step::Keep(3, vec![0, foreign]));
            let result = CommentOnlyValidator::default().check(&build(&steps), &pool());
            let rejected = matches!(result, Err(Violation::ForeignAttribute { index, code, .. }) if index == pos && code == foreign);
            prop_assert!(rejected);
        }
    }
}
