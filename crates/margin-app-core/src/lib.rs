// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Ports and core services shared by Margin binaries and adapters.
//! The hub depends on these traits only; storage and pad-id resolution are
//! supplied by collaborators.

pub mod config;
pub mod memory;
pub mod pads;
pub mod store;

pub use memory::MemoryCommentStore;
pub use pads::{AliasTable, PadError, PadResolver, ResolvedPad};
pub use store::{CommentStore, Record, RecordMap, StoreError};
