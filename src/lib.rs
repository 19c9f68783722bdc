//! Paper-trading arcade engine.
//!
//! Exposes the matching engine, match lifecycle, bot ecosystem and account
//! store as a library so binaries and tests can drive them independently of
//! the HTTP/WebSocket transport in `main.rs`.

pub mod account;
pub mod book;
pub mod bots;
pub mod config;
pub mod error;
pub mod historical;
pub mod r#match;
pub mod model;
pub mod pricefeed;
pub mod redemption;
pub mod synthetic;
pub mod timescaler;
pub mod ws;

pub use error::{EngineError, EngineResult};
