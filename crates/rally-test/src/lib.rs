//! Rally scheduling/session engine - integration test support.
//!
//! This crate re-exports the workspace crates to support integration tests
//! that use `rally_test::` paths.

pub mod core {
    pub use rally_core::*;
}

pub mod engine {
    pub use rally_engine::*;
}

pub mod store {
    pub use rally_store::*;
}

pub mod service {
    pub use rally_service::*;
}
