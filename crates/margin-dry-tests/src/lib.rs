// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared test doubles and fixtures for Margin crates.
#![forbid(unsafe_code)]
//!
//! # Modules
//!
//! - [`config`] - In-memory config store fake for testing without filesystem
//! - [`store`] - Comment store wrapper that counts calls and injects failures
//! - [`fixtures`] - Record, hello and attribute-pool builders

pub mod config;
pub mod fixtures;
pub mod store;

pub use config::InMemoryConfigStore;
pub use fixtures::{comment_pool, hello, record};
pub use store::RecordingCommentStore;
