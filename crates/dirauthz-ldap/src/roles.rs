//! Role collection for authenticated principals.
//!
//! The sole inbound operation is [`LdapAuthorizationBackend::fill_roles`]:
//! it resolves the principal to a directory entry, gathers candidate role
//! DNs from the membership attribute and the role search, optionally
//! expands nested roles, maps every DN to a role name and appends the
//! names to the principal. The connection it opens is released on every
//! exit path.

use std::collections::HashSet;
use std::path::PathBuf;

use dirauthz_core::{
    wildcard, AuthzConfig, DirectoryEntry, Dn, Error, Identity, Principal, Result,
};
use ldap3::ldap_escape;
use tracing::{debug, trace, warn};

use crate::connect::{self, DirectoryEndpoint};
use crate::nested;
use crate::search::DirectorySearch;
use crate::tls;

/// Directory-backed authorization backend. Holds only read-only
/// configuration, so one instance safely serves concurrent invocations.
pub struct LdapAuthorizationBackend {
    config: AuthzConfig,
    config_root: PathBuf,
}

/// Principal identity reduced to what the resolver needs, computed once
/// at the boundary.
struct ResolvedIdentity {
    /// The DN for directory-resolved principals; the filter-escaped name
    /// otherwise. Skip patterns match against this string.
    authenticated_user: String,
    /// Name used for `{1}` substitution and diagnostics.
    original_username: String,
    entry: Option<DirectoryEntry>,
}

impl LdapAuthorizationBackend {
    /// `config_root` anchors relative trust/key material paths.
    pub fn new(config: AuthzConfig, config_root: impl Into<PathBuf>) -> Self {
        Self {
            config,
            config_root: config_root.into(),
        }
    }

    pub fn config(&self) -> &AuthzConfig {
        &self.config
    }

    /// Resolves and appends the principal's roles.
    ///
    /// All-or-nothing: on error no roles have been appended, and the
    /// connection opened for the invocation has been released.
    pub async fn fill_roles(&self, principal: &mut Principal) -> Result<()> {
        let identity = resolve_identity(principal);
        trace!("authenticatedUser: {}", identity.authenticated_user);
        trace!("originalUserName: {}", identity.original_username);

        if wildcard::match_any(&self.config.skip_users, &identity.authenticated_user) {
            debug!(
                "Skipped role resolution for user {}",
                identity.authenticated_user
            );
            return Ok(());
        }

        let security = tls::build_security_config(&self.config, &self.config_root)?;
        let endpoints = DirectoryEndpoint::parse_all(&self.config.hosts, self.config.use_tls)?;
        let mut session =
            connect::connect(&endpoints, &security, self.config.bind_credential().as_ref())
                .await?;

        let result = self.collect_role_names(&mut session, &identity).await;
        session.close().await;

        for role in result? {
            principal.add_role(role);
        }
        Ok(())
    }

    /// Role collection proper, against any lookup/search implementation.
    async fn collect_role_names<D>(
        &self,
        dir: &mut D,
        identity: &ResolvedIdentity,
    ) -> Result<Vec<String>>
    where
        D: DirectorySearch + Send,
    {
        let entry = match &identity.entry {
            Some(entry) => entry.clone(),
            None => self.resolve_user_entry(dir, identity).await?,
        };
        let user_dn = entry.dn.clone();
        trace!("User found with DN {user_dn}");

        let mut roles: HashSet<Dn> = HashSet::new();

        // roles recorded on the user entry itself
        for value in entry.attr_values(&self.config.user_role_name) {
            match Dn::parse(value) {
                Ok(dn) => {
                    roles.insert(dn);
                }
                Err(_) => debug!("Cannot add {value} as a role because it is not a valid DN"),
            }
        }
        trace!("User attribute roles: {}", roles.len());

        // role entries referencing the user
        if self.config.role_search_enabled {
            let user_role_attribute_value = self
                .config
                .user_role_attribute
                .as_deref()
                .and_then(|attr| entry.attr_first(attr));
            let filter = self.config.role_search_filter(
                &user_dn,
                &identity.original_username,
                user_role_attribute_value,
            );
            trace!("Role search filter: {filter}");
            for found in dir.search(&self.config.role_base, &filter).await? {
                match Dn::parse(&found.dn) {
                    Ok(dn) => {
                        roles.insert(dn);
                    }
                    Err(_) => {
                        debug!("Dropping role search result with invalid DN {}", found.dn)
                    }
                }
            }
        }
        trace!("Total roles before nested expansion: {}", roles.len());

        if self.config.resolve_nested_roles {
            roles = nested::resolve_nested(dir, &self.config, &roles).await?;
        }

        let mut names = Vec::with_capacity(roles.len());
        for role in &roles {
            match role.role_name(&self.config.role_name) {
                Some(name) => names.push(name),
                None => warn!(
                    "No or empty attribute '{}' for entry {role}",
                    self.config.role_name
                ),
            }
        }
        Ok(names)
    }

    /// Resolves a principal without a known entry: a valid DN is looked up
    /// directly, a bare username goes through the user search.
    async fn resolve_user_entry<D>(
        &self,
        dir: &mut D,
        identity: &ResolvedIdentity,
    ) -> Result<DirectoryEntry>
    where
        D: DirectorySearch + Send,
    {
        if Dn::is_valid(&identity.authenticated_user) {
            trace!("{} is a valid DN", identity.authenticated_user);
            dir.lookup(&identity.authenticated_user)
                .await?
                .ok_or_else(|| Error::PrincipalNotFound(identity.authenticated_user.clone()))
        } else {
            let filter = self.config.user_search_filter(&identity.authenticated_user);
            trace!(
                "{} is not a DN; resolving via user search {filter}",
                identity.authenticated_user
            );
            let mut found = dir.search(&self.config.user_base, &filter).await?;
            if found.is_empty() {
                return Err(Error::PrincipalNotFound(identity.original_username.clone()));
            }
            if found.len() > 1 {
                debug!(
                    "Multiple entries match user {}; using the first",
                    identity.original_username
                );
            }
            Ok(found.remove(0))
        }
    }
}

fn resolve_identity(principal: &Principal) -> ResolvedIdentity {
    match principal.identity() {
        Identity::Resolved {
            entry,
            original_username,
        } => ResolvedIdentity {
            authenticated_user: entry.dn.clone(),
            original_username: original_username.clone(),
            entry: Some(entry.clone()),
        },
        Identity::Named(name) => ResolvedIdentity {
            authenticated_user: ldap_escape(name.as_str()).into_owned(),
            original_username: name.clone(),
            entry: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MemoryDirectory;
    use std::collections::BTreeSet;

    const USER_DN: &str = "uid=jdoe,ou=people,dc=example";

    fn backend(config: AuthzConfig) -> LdapAuthorizationBackend {
        LdapAuthorizationBackend::new(config, "/etc/dirauthz")
    }

    fn cn_config() -> AuthzConfig {
        AuthzConfig {
            role_name: "cn".to_string(),
            ..Default::default()
        }
    }

    fn user_entry() -> DirectoryEntry {
        DirectoryEntry::new(USER_DN).with_attr("uid", vec!["jdoe".into()])
    }

    async fn roles_for(
        backend: &LdapAuthorizationBackend,
        dir: &mut MemoryDirectory,
        principal: &Principal,
    ) -> Result<BTreeSet<String>> {
        let identity = resolve_identity(principal);
        let names = backend.collect_role_names(dir, &identity).await?;
        Ok(names.into_iter().collect())
    }

    #[tokio::test]
    async fn merges_attribute_and_search_sources_without_duplicates() {
        let mut dir = MemoryDirectory::new();
        dir.add(user_entry().with_attr(
            "memberOf",
            vec![
                "cn=admins,ou=roles,dc=example".into(),
                // same role, different spelling; must collapse
                "CN=Admins, OU=Roles, DC=Example".into(),
            ],
        ));
        dir.add(
            DirectoryEntry::new("cn=admins,ou=roles,dc=example")
                .with_attr("member", vec![USER_DN.into()]),
        );
        dir.add(
            DirectoryEntry::new("cn=ops,ou=roles,dc=example")
                .with_attr("member", vec![USER_DN.into()]),
        );

        let backend = backend(cn_config());
        let principal = Principal::resolved(user_entry(), "jdoe");
        let roles = roles_for(&backend, &mut dir, &principal).await.unwrap();

        assert_eq!(
            roles,
            ["admins", "ops"].iter().map(|s| s.to_string()).collect()
        );
    }

    #[tokio::test]
    async fn no_membership_attribute_and_search_disabled_yields_no_roles() {
        let mut dir = MemoryDirectory::new();
        dir.add(user_entry());

        let backend = backend(AuthzConfig {
            role_search_enabled: false,
            ..cn_config()
        });
        let principal = Principal::resolved(user_entry(), "jdoe");
        let roles = roles_for(&backend, &mut dir, &principal).await.unwrap();
        assert!(roles.is_empty());
    }

    #[tokio::test]
    async fn malformed_dn_values_are_dropped_not_fatal() {
        let mut dir = MemoryDirectory::new();
        dir.add(user_entry().with_attr(
            "memberOf",
            vec![
                "not a dn".into(),
                "cn=admins,ou=roles,dc=example".into(),
                "also=bad,".into(),
            ],
        ));

        let backend = backend(AuthzConfig {
            role_search_enabled: false,
            ..cn_config()
        });
        let principal = Principal::resolved(user_entry(), "jdoe");
        let roles = roles_for(&backend, &mut dir, &principal).await.unwrap();
        assert_eq!(roles, ["admins".to_string()].into_iter().collect());
    }

    #[tokio::test]
    async fn role_name_dn_uses_literal_dns() {
        let mut dir = MemoryDirectory::new();
        dir.add(
            user_entry().with_attr("memberOf", vec!["cn=admins,ou=roles,dc=example".into()]),
        );

        let backend = backend(AuthzConfig {
            role_name: "dn".to_string(),
            role_search_enabled: false,
            ..Default::default()
        });
        let principal = Principal::resolved(user_entry(), "jdoe");
        let roles = roles_for(&backend, &mut dir, &principal).await.unwrap();
        assert_eq!(
            roles,
            ["cn=admins,ou=roles,dc=example".to_string()]
                .into_iter()
                .collect()
        );
    }

    #[tokio::test]
    async fn entries_without_role_name_attribute_contribute_nothing() {
        let mut dir = MemoryDirectory::new();
        dir.add(
            user_entry().with_attr("memberOf", vec!["ou=not-a-cn,dc=example".into()]),
        );

        let backend = backend(AuthzConfig {
            role_search_enabled: false,
            ..cn_config()
        });
        let principal = Principal::resolved(user_entry(), "jdoe");
        let roles = roles_for(&backend, &mut dir, &principal).await.unwrap();
        assert!(roles.is_empty());
    }

    #[tokio::test]
    async fn bare_username_is_resolved_through_user_search() {
        let mut dir = MemoryDirectory::new();
        dir.add(
            user_entry()
                .with_attr("sAMAccountName", vec!["jdoe".into()])
                .with_attr("memberOf", vec!["cn=admins,ou=roles,dc=example".into()]),
        );

        let backend = backend(AuthzConfig {
            role_search_enabled: false,
            ..cn_config()
        });
        let principal = Principal::named("jdoe");
        let roles = roles_for(&backend, &mut dir, &principal).await.unwrap();
        assert_eq!(roles, ["admins".to_string()].into_iter().collect());
    }

    #[tokio::test]
    async fn unknown_user_fails_with_principal_not_found() {
        let mut dir = MemoryDirectory::new();

        let backend = backend(cn_config());
        let principal = Principal::named("ghost");
        let err = roles_for(&backend, &mut dir, &principal).await.unwrap_err();
        assert!(matches!(err, Error::PrincipalNotFound(_)));

        let principal = Principal::named("cn=ghost,dc=example");
        let err = roles_for(&backend, &mut dir, &principal).await.unwrap_err();
        assert!(matches!(err, Error::PrincipalNotFound(_)));
    }

    #[tokio::test]
    async fn user_role_attribute_substitutes_into_the_filter() {
        let mut dir = MemoryDirectory::new();
        dir.add(
            user_entry().with_attr("departmentNumber", vec!["eng".into()]),
        );
        dir.add(
            DirectoryEntry::new("cn=engineers,ou=roles,dc=example")
                .with_attr("ou", vec!["eng".into()]),
        );

        let backend = backend(AuthzConfig {
            role_search: "(ou={2})".to_string(),
            user_role_attribute: Some("departmentNumber".to_string()),
            ..cn_config()
        });
        let principal = Principal::resolved(
            user_entry().with_attr("departmentNumber", vec!["eng".into()]),
            "jdoe",
        );
        let roles = roles_for(&backend, &mut dir, &principal).await.unwrap();
        assert_eq!(roles, ["engineers".to_string()].into_iter().collect());
    }

    #[tokio::test]
    async fn missing_user_role_attribute_leaves_placeholder_matching_nothing() {
        let mut dir = MemoryDirectory::new();
        dir.add(user_entry());
        dir.add(
            DirectoryEntry::new("cn=engineers,ou=roles,dc=example")
                .with_attr("ou", vec!["eng".into()]),
        );

        let backend = backend(AuthzConfig {
            role_search: "(ou={2})".to_string(),
            user_role_attribute: Some("departmentNumber".to_string()),
            ..cn_config()
        });
        let principal = Principal::resolved(user_entry(), "jdoe");
        let roles = roles_for(&backend, &mut dir, &principal).await.unwrap();
        assert!(roles.is_empty());
    }

    #[tokio::test]
    async fn nested_resolution_adds_transitive_roles() {
        let mut dir = MemoryDirectory::new();
        dir.add(
            user_entry().with_attr("memberOf", vec!["cn=a,ou=roles,dc=example".into()]),
        );
        dir.add(
            DirectoryEntry::new("cn=a,ou=roles,dc=example")
                .with_attr("memberOf", vec!["cn=b,ou=roles,dc=example".into()]),
        );
        dir.add(DirectoryEntry::new("cn=b,ou=roles,dc=example"));

        let backend = backend(AuthzConfig {
            resolve_nested_roles: true,
            role_search_enabled: false,
            ..cn_config()
        });
        let principal = Principal::resolved(user_entry(), "jdoe");
        let roles = roles_for(&backend, &mut dir, &principal).await.unwrap();
        assert_eq!(roles, ["a", "b"].iter().map(|s| s.to_string()).collect());
    }

    #[tokio::test]
    async fn nested_cycles_resolve_to_each_role_once() {
        let mut dir = MemoryDirectory::new();
        dir.add(
            user_entry().with_attr("memberOf", vec!["cn=a,ou=roles,dc=example".into()]),
        );
        dir.add(
            DirectoryEntry::new("cn=a,ou=roles,dc=example")
                .with_attr("memberOf", vec!["cn=b,ou=roles,dc=example".into()]),
        );
        dir.add(
            DirectoryEntry::new("cn=b,ou=roles,dc=example")
                .with_attr("memberOf", vec!["cn=a,ou=roles,dc=example".into()]),
        );

        let backend = backend(AuthzConfig {
            resolve_nested_roles: true,
            role_search_enabled: false,
            ..cn_config()
        });
        let principal = Principal::resolved(user_entry(), "jdoe");
        let roles = roles_for(&backend, &mut dir, &principal).await.unwrap();
        assert_eq!(roles, ["a", "b"].iter().map(|s| s.to_string()).collect());
    }

    #[tokio::test]
    async fn resolution_is_idempotent() {
        let mut dir = MemoryDirectory::new();
        dir.add(
            user_entry().with_attr("memberOf", vec!["cn=admins,ou=roles,dc=example".into()]),
        );
        dir.add(
            DirectoryEntry::new("cn=ops,ou=roles,dc=example")
                .with_attr("member", vec![USER_DN.into()]),
        );

        let backend = backend(cn_config());
        let first = roles_for(&backend, &mut dir, &Principal::resolved(user_entry(), "jdoe"))
            .await
            .unwrap();
        let second = roles_for(&backend, &mut dir, &Principal::resolved(user_entry(), "jdoe"))
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[tokio::test]
    async fn skip_patterns_bypass_the_directory_entirely() {
        // unreachable host: if fill_roles attempted a connection this
        // would fail, so an Ok result proves the skip short-circuits
        let backend = backend(AuthzConfig {
            hosts: vec!["127.0.0.1:1".to_string()],
            skip_users: vec!["svc_*".to_string()],
            ..Default::default()
        });
        let mut principal = Principal::named("svc_backup");
        backend.fill_roles(&mut principal).await.unwrap();
        assert!(principal.roles().is_empty());
    }

    #[tokio::test]
    async fn non_skipped_users_do_reach_the_connector() {
        let backend = backend(AuthzConfig {
            hosts: vec!["127.0.0.1:1".to_string()],
            skip_users: vec!["svc_*".to_string()],
            ..Default::default()
        });
        let mut principal = Principal::named("jdoe");
        let err = backend.fill_roles(&mut principal).await.unwrap_err();
        assert!(matches!(err, Error::NoReachableServer { .. }));
        assert!(principal.roles().is_empty());
    }
}
