//! Core of the `tg` CLI: entity resolution and the message query engine.
//!
//! Nothing here talks to Telegram directly. The MTProto client sits behind the
//! `Transport` / `Authenticator` ports, implemented in the binary crate.

pub mod auth;
pub mod chats;
pub mod config;
pub mod context;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod ports;
pub mod query;
pub mod resolver;
pub mod session;
pub mod update;

#[cfg(test)]
mod testing;

pub use errors::{Error, Result};
