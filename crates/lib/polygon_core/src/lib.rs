//! # polygon_core
//!
//! Identity and session domain logic for Polygon: credential storage,
//! access-token issuance and validation, and the refresh-token ledger.

pub mod auth;
pub mod collaborators;
pub mod migrate;
pub mod models;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
