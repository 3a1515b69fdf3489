//! # Questline Common
//!
//! Shared types, errors, and the TOTP engine used across Questline components.
//!
//! ## Modules
//! - `totp` - Secret generation, Base32 decoding, code generation/validation
//! - `types` - Missions, mission codes, identities, ledger entries
//! - `error` - Common error types
//! - `constants` - Shared configuration constants

pub mod constants;
pub mod error;
pub mod totp;
pub mod types;

pub use error::QuestlineError;
pub use totp::{CurrentCode, OtpError, Secret, TotpParams};
pub use types::*;
