//! Rally scheduling/session engine - drivers.
//!
//! Periodic, cancellable tasks that feed the pure engine with "now" and
//! persist its decisions: the live-session controller, the join service
//! and its overflow reassignment job, the session budget clock, and the
//! event lifecycle service.

pub mod budget;
pub mod error;
pub mod event;
pub mod join;
pub mod live;
pub mod ticker;
