//! # A360 Common Library
//!
//! Shared code for the A360 aging-dataset tooling:
//! - Error type shared by all crates
//! - Bootstrap configuration loading
//! - Watcher event vocabulary (statuses, failure reasons, event payloads)
//! - Append-only JSONL sinks
//! - Timestamp helpers

pub mod config;
pub mod error;
pub mod events;
pub mod jsonl;
pub mod time;

pub use error::{Error, Result};
