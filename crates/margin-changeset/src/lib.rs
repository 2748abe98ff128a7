// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Changeset inspection for the comment channel.
//!
//! A pad edit travels as a packed changeset plus the attribute pool its
//! `*N` codes refer to. This crate unpacks that text form, iterates its
//! operations, and decides whether an edit only toggles the reserved
//! `comment` attribute on existing text.
//!
//! # Modules
//!
//! - [`changeset`] - packed changeset header, op iterator and builder
//! - [`pool`] - attribute pools (code ↔ name/value) and their jsonable form
//! - [`validator`] - the comment-only validator

pub mod changeset;
pub mod pool;
pub mod validator;

pub use changeset::{Builder, Changeset, ChangesetError, OpCode, Operation, Ops};
pub use pool::{Attribute, AttributePool, JsonablePool, PoolError};
pub use validator::{validate, CommentOnlyValidator, Violation, COMMENT_ATTRIBUTE};
