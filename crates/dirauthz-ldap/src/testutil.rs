//! In-memory directory double for exercising the role resolver without a
//! live LDAP server.

use async_trait::async_trait;
use dirauthz_core::{DirectoryEntry, Dn, Result};

use crate::search::DirectorySearch;

/// A flat list of entries with just enough filter support for the
/// engine's queries: a single `(attr=value)` equality term. Anything more
/// complex matches nothing, which conveniently mirrors how a directory
/// treats a filter with a leftover literal placeholder.
pub(crate) struct MemoryDirectory {
    entries: Vec<DirectoryEntry>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn add(&mut self, entry: DirectoryEntry) {
        self.entries.push(entry);
    }

    fn dn_matches(entry_dn: &str, wanted: &str) -> bool {
        match (Dn::parse(entry_dn), Dn::parse(wanted)) {
            (Ok(a), Ok(b)) => a == b,
            _ => entry_dn.eq_ignore_ascii_case(wanted),
        }
    }
}

#[async_trait]
impl DirectorySearch for MemoryDirectory {
    async fn lookup(&mut self, dn: &str) -> Result<Option<DirectoryEntry>> {
        Ok(self
            .entries
            .iter()
            .find(|e| Self::dn_matches(&e.dn, dn))
            .cloned())
    }

    async fn search(&mut self, base: &str, filter: &str) -> Result<Vec<DirectoryEntry>> {
        let Some((attr, value)) = filter
            .strip_prefix('(')
            .and_then(|f| f.strip_suffix(')'))
            .and_then(|f| f.split_once('='))
        else {
            return Ok(Vec::new());
        };

        Ok(self
            .entries
            .iter()
            .filter(|e| {
                base.is_empty() || e.dn.to_lowercase().ends_with(&base.to_lowercase())
            })
            .filter(|e| e.attr_values(attr).iter().any(|v| v == value))
            .cloned()
            .collect())
    }
}
