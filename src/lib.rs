//! Zeus - submit SQL to Athena, track every run in a local ledger, page
//! through results and export them as CSV.
//!
//! The library exposes the core modules for the binary and integration tests.

pub mod api;
pub mod athena;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod objects;
pub mod output;
pub mod query;
