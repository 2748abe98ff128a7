// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Margin comment hub.
//!
//! Sessions connect over a Unix socket, announce themselves with `hello`, and
//! join per-pad rooms by listing comments or replies. Comment events are
//! delivered to the other members of the pad's room; the edit gate lets read-only
//! users toggle comment markers on the pad body.

pub mod edit_gate;
pub mod error;
pub mod hub;
pub mod server;
pub mod settings;

pub use edit_gate::{EditContext, EditGate};
pub use error::{HubError, RequestError};
pub use hub::{Hub, SERVER_VERSION};
pub use server::{handle_client, serve};
pub use settings::{HostPrefs, Settings};
