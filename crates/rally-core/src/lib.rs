//! Rally scheduling/session engine - shared foundation.
//!
//! Configuration, error types, identifier newtypes, storage-key constants,
//! and session-day time utilities used by every other workspace crate.

pub mod config;
pub mod constants;
pub mod error;
pub mod time;
pub mod types;
