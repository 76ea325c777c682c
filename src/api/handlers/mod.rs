//! Route handlers.

pub mod athena;
pub mod health;
pub mod queries;
pub mod runs;

use uuid::Uuid;

use crate::error::ZeusError;

/// Parses a path identifier, rejecting malformed ones before any other work.
pub(crate) fn parse_id(raw: &str, what: &str) -> Result<Uuid, ZeusError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ZeusError::validation(format!("Invalid {what} ID: {raw}")))
}
