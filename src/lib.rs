//! vaultwatch: event indexer and telemetry daemon for a DFT/stable pool and
//! its liquidity vault.
//!
//! The binary wires these modules together; they are public so tests and
//! other front ends can drive the components directly.

pub mod chain;
pub mod config;
pub mod events;
pub mod indexer;
pub mod policy;
pub mod scheduler;
pub mod series;
pub mod snapshot;
pub mod store;
pub mod telemetry;
