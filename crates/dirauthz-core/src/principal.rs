//! The authenticated principal the engine augments with roles.

use std::collections::BTreeSet;

use crate::entry::DirectoryEntry;

/// How the principal was identified by the authentication stage.
///
/// A directory-resolved principal already carries its entry and the
/// username it authenticated with; a bare-name principal carries only the
/// name and is resolved against the directory when roles are filled.
#[derive(Debug, Clone)]
pub enum Identity {
    /// Pre-resolved by a directory-backed authenticator.
    Resolved {
        entry: DirectoryEntry,
        original_username: String,
    },
    /// Only the authenticated name is known.
    Named(String),
}

/// An already-authenticated principal. The engine never verifies
/// credentials; it only appends role names.
#[derive(Debug, Clone)]
pub struct Principal {
    identity: Identity,
    roles: BTreeSet<String>,
}

impl Principal {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            identity: Identity::Named(name.into()),
            roles: BTreeSet::new(),
        }
    }

    pub fn resolved(entry: DirectoryEntry, original_username: impl Into<String>) -> Self {
        Self {
            identity: Identity::Resolved {
                entry,
                original_username: original_username.into(),
            },
            roles: BTreeSet::new(),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The name the principal authenticated as.
    pub fn name(&self) -> &str {
        match &self.identity {
            Identity::Resolved {
                original_username, ..
            } => original_username,
            Identity::Named(name) => name,
        }
    }

    /// Appends a role. Duplicates collapse.
    pub fn add_role(&mut self, role: impl Into<String>) {
        self.roles.insert(role.into());
    }

    /// Role names in sorted order.
    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }
}
