//! Core types for the dirauthz directory authorization engine.
//!
//! This crate carries everything the LDAP engine needs that is not
//! protocol-specific: the error taxonomy, the flat configuration surface,
//! distinguished-name parsing with structural comparison, wildcard
//! matching for skip lists, and the principal model.

pub mod config;
pub mod dn;
pub mod entry;
pub mod error;
pub mod principal;
pub mod wildcard;

pub use config::{AuthzConfig, BindCredential};
pub use dn::Dn;
pub use entry::DirectoryEntry;
pub use error::{Error, Result};
pub use principal::{Identity, Principal};

/// Dirauthz version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
