//! Rally scheduling/session engine - pure computation core.
//!
//! Four components over timestamps and small in-memory structures, none of
//! which perform I/O: recurrence evaluation, the event phase clock, the
//! batch assignment decision, and the session budget state machine. Their
//! outputs drive persistence and redirect decisions made by the service
//! layer.

// Lets the shared recurrence-cases data file name this crate the same way
// the integration tests do.
#[cfg(test)]
extern crate self as rally_engine;

pub mod batch;
pub mod budget;
pub mod error;
pub mod event;
pub mod phase;
pub mod recurrence;
