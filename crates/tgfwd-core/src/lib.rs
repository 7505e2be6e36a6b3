//! Core domain + application logic for the Telegram history forwarder.
//!
//! This crate is framework-agnostic. The Telegram client lives behind the
//! `Forwarder` port (implemented in `tgfwd-telegram`), history comes in through
//! the `HistorySource` port, and checkpoint persistence through `CheckpointSink`.

pub mod batcher;
pub mod checkpoint;
pub mod config;
pub mod domain;
pub mod errors;
pub mod history;
pub mod logging;
pub mod ports;
pub mod rate_limit;
pub mod run;

pub use errors::{Error, Result};
