//! Prefixed ID generation for Resonate entities.
//!
//! All IDs use an `rz_` brand prefix so they can never be confused with
//! payment-provider identifiers (Stripe's `cs_`, `pi_`, etc.) or raw
//! storage object keys.
//!
//! Format: `rz_{entity}_{uuid_simple}` (32 hex chars, no hyphens)

use uuid::Uuid;

/// All known entity prefixes for validation.
const ALL_PREFIXES: &[&str] = &["rz_pur_", "rz_file_", "rz_att_"];

/// Validate that a string is a valid Resonate prefixed ID.
///
/// This is a cheap check to reject garbage before hitting the database.
/// Validates format: `rz_{entity}_{32_hex_chars}`
pub fn is_valid_prefixed_id(s: &str) -> bool {
    let Some(prefix) = ALL_PREFIXES.iter().find(|p| s.starts_with(*p)) else {
        return false;
    };

    let hex_part = &s[prefix.len()..];
    hex_part.len() == 32 && hex_part.chars().all(|c| c.is_ascii_hexdigit())
}

/// Entity types that have prefixed IDs in Resonate.
#[derive(Debug, Clone, Copy)]
pub enum EntityType {
    Purchase,
    RenderedFile,
    DownloadAttempt,
}

impl EntityType {
    /// Returns the prefix for this entity type.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Purchase => "rz_pur",
            Self::RenderedFile => "rz_file",
            Self::DownloadAttempt => "rz_att",
        }
    }

    /// Generates a new prefixed ID for this entity type.
    pub fn gen_id(&self) -> String {
        format!("{}_{}", self.prefix(), Uuid::new_v4().as_simple())
    }
}
