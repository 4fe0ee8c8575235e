//! Transitive expansion of nested role memberships.
//!
//! The membership graph lives in the directory and can contain cycles, so
//! the traversal is an iterative worklist over a visited set: a role DN is
//! expanded at most once per top-level resolution, which guarantees
//! termination and bounds the work by the number of distinct roles. Depth
//! is otherwise unbounded.

use std::collections::HashSet;

use dirauthz_core::{AuthzConfig, Dn, Result};
use tracing::{debug, trace};

use crate::search::DirectorySearch;

/// Expands `seeds` through nested memberships and returns the union of
/// the seeds and everything reachable from them.
pub(crate) async fn resolve_nested<D>(
    dir: &mut D,
    config: &AuthzConfig,
    seeds: &HashSet<Dn>,
) -> Result<HashSet<Dn>>
where
    D: DirectorySearch + Send,
{
    let mut resolved = seeds.clone();
    let mut worklist: Vec<Dn> = seeds.iter().cloned().collect();

    while let Some(role) = worklist.pop() {
        let members = direct_memberships(dir, config, &role).await?;
        trace!("{} direct memberships for {role}", members.len());
        for candidate in members {
            if resolved.insert(candidate.clone()) {
                worklist.push(candidate);
            }
        }
    }

    Ok(resolved)
}

/// Roles that `role` is itself directly a member of: its membership
/// attribute plus, when role search is enabled, role entries referencing
/// it (placeholders {0} and {1} both bound to the role DN).
async fn direct_memberships<D>(dir: &mut D, config: &AuthzConfig, role: &Dn) -> Result<Vec<Dn>>
where
    D: DirectorySearch + Send,
{
    let role_dn = role.to_string();
    let mut found = Vec::new();

    match dir.lookup(&role_dn).await? {
        Some(entry) => {
            for value in entry.attr_values(&config.user_role_name) {
                match Dn::parse(value) {
                    Ok(dn) => found.push(dn),
                    Err(_) => {
                        debug!("Cannot add {value} as a nested role because it is not a valid DN")
                    }
                }
            }
        }
        None => debug!("Role entry {role_dn} not found during nested expansion"),
    }

    if config.role_search_enabled {
        let filter = config.nested_role_search_filter(&role_dn);
        for entry in dir.search(&config.role_base, &filter).await? {
            match Dn::parse(&entry.dn) {
                Ok(dn) => found.push(dn),
                Err(_) => debug!(
                    "Dropping nested role search result with invalid DN {}",
                    entry.dn
                ),
            }
        }
    }

    Ok(found)
}
