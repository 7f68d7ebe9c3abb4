//! Remote call creation at the voice provider
//!
//! `ProviderClient` is the server-side half of call creation: it holds the
//! provider credential and forwards `CallConfig` bodies with it attached.

pub mod client;
pub mod messages;

pub use client::ProviderClient;
pub use messages::{ErrorBody, JoinResponse};
