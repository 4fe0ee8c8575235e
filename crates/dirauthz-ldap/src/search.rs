//! Entry lookup and search against an open directory session.
//!
//! The engine's role collection and nested expansion run against the
//! [`DirectorySearch`] trait rather than the protocol client directly, so
//! the graph traversal can be exercised against an in-memory directory in
//! tests. Searches return an empty list for "no results", never an error.

use async_trait::async_trait;
use dirauthz_core::{DirectoryEntry, Error, Result};
use ldap3::{Ldap, Scope, SearchEntry, SearchResult};
use tracing::debug;

/// LDAP result code for noSuchObject.
const RC_NO_SUCH_OBJECT: u32 = 32;

/// Lookup/search operations the role resolver depends on.
#[async_trait]
pub trait DirectorySearch {
    /// Fetches the entry with exactly this DN, if it exists.
    async fn lookup(&mut self, dn: &str) -> Result<Option<DirectoryEntry>>;

    /// Subtree search under `base` for entries matching `filter`.
    async fn search(&mut self, base: &str, filter: &str) -> Result<Vec<DirectoryEntry>>;
}

/// An open, bound session to exactly one directory server. Owned by the
/// invocation that opened it, which must call [`LdapSession::close`] on
/// every exit path.
#[derive(Debug)]
pub struct LdapSession {
    ldap: Ldap,
}

impl LdapSession {
    pub(crate) fn new(ldap: Ldap) -> Self {
        Self { ldap }
    }

    /// Releases the connection. Close failures are ignored; there is
    /// nothing useful to do with them on a teardown path.
    pub async fn close(&mut self) {
        let _ = self.ldap.unbind().await;
    }
}

#[async_trait]
impl DirectorySearch for LdapSession {
    async fn lookup(&mut self, dn: &str) -> Result<Option<DirectoryEntry>> {
        let SearchResult(entries, res) = self
            .ldap
            .search(dn, Scope::Base, "(objectClass=*)", vec!["*"])
            .await
            .map_err(Error::resolution)?;
        match res.rc {
            0 => Ok(entries
                .into_iter()
                .next()
                .map(|e| to_entry(SearchEntry::construct(e)))),
            RC_NO_SUCH_OBJECT => Ok(None),
            _ => Err(Error::resolution(ldap3::LdapError::from(res))),
        }
    }

    async fn search(&mut self, base: &str, filter: &str) -> Result<Vec<DirectoryEntry>> {
        let SearchResult(entries, res) = self
            .ldap
            .search(base, Scope::Subtree, filter, vec!["*"])
            .await
            .map_err(Error::resolution)?;
        match res.rc {
            0 => Ok(entries
                .into_iter()
                .map(|e| to_entry(SearchEntry::construct(e)))
                .collect()),
            RC_NO_SUCH_OBJECT => {
                debug!("Search base '{base}' does not exist; treating as no results");
                Ok(Vec::new())
            }
            _ => Err(Error::resolution(ldap3::LdapError::from(res))),
        }
    }
}

fn to_entry(entry: SearchEntry) -> DirectoryEntry {
    DirectoryEntry {
        dn: entry.dn,
        attributes: entry.attrs,
    }
}
