//! Configuration surface for the directory authorization backend.
//!
//! Flat key/value settings with defaults, deserialized from TOML. Filter
//! templates use positional placeholders: `{0}` is the user (or role) DN,
//! `{1}` the display name, `{2}` the value of the configured user role
//! attribute.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Backend configuration. Treated as read-only for the lifetime of an
/// invocation; nothing here is mutated by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AuthzConfig {
    /// Directory servers as "host" or "host:port", tried in order.
    #[serde(default = "default_hosts")]
    pub hosts: Vec<String>,

    /// Connect over TLS from the start (ldaps).
    #[serde(default)]
    pub use_tls: bool,

    /// Upgrade a plaintext connection in-place via StartTLS.
    #[serde(default)]
    pub use_start_tls: bool,

    /// Present a client certificate (mutual TLS).
    #[serde(default)]
    pub enable_client_auth: bool,

    /// Verify server certificates and hostnames. Disabling this accepts
    /// any certificate; it exists for self-signed/internal deployments
    /// and must never be the default.
    #[serde(default = "default_true")]
    pub verify_hostnames: bool,

    /// Trust anchor file (PEM or DER), relative to the configuration root.
    /// Required when TLS or StartTLS is enabled.
    #[serde(default)]
    pub trust_store: Option<PathBuf>,

    /// Client certificate chain file (PEM or DER), relative to the
    /// configuration root. Only used with `enable_client_auth`.
    #[serde(default)]
    pub client_cert: Option<PathBuf>,

    /// Client private key file (PEM or DER), relative to the
    /// configuration root. Only used with `enable_client_auth`.
    #[serde(default)]
    pub client_key: Option<PathBuf>,

    /// Cipher suite allow-list; empty means provider defaults.
    #[serde(default)]
    pub enabled_cipher_suites: Vec<String>,

    /// TLS protocol allow-list, in preference order.
    #[serde(default = "default_protocols")]
    pub enabled_protocols: Vec<String>,

    /// DN to bind as; absent means anonymous bind.
    #[serde(default)]
    pub bind_dn: Option<String>,

    /// Password for `bind_dn`. A bind DN without a password falls back to
    /// an anonymous bind with a diagnostic.
    #[serde(default)]
    pub bind_password: Option<String>,

    /// Wildcard patterns for identities to skip entirely (service and
    /// system accounts).
    #[serde(default)]
    pub skip_users: Vec<String>,

    /// Whether to search for role entries referencing the user, in
    /// addition to reading the membership attribute.
    #[serde(default = "default_true")]
    pub role_search_enabled: bool,

    /// Multi-valued membership attribute on user (and role) entries.
    #[serde(default = "default_user_role_name")]
    pub user_role_name: String,

    /// Base DN for role searches; empty searches from the root.
    #[serde(default)]
    pub role_base: String,

    /// Role search filter template ({0} user DN, {1} display name,
    /// {2} user role attribute value).
    #[serde(default = "default_role_search")]
    pub role_search: String,

    /// Attribute of a role's RDN that names the role; the literal "dn"
    /// uses the full DN as the role name.
    #[serde(default = "default_role_name")]
    pub role_name: String,

    /// User entry attribute whose value substitutes {2} in the role
    /// search filter.
    #[serde(default)]
    pub user_role_attribute: Option<String>,

    /// Expand roles transitively through nested memberships.
    #[serde(default)]
    pub resolve_nested_roles: bool,

    /// Base DN for resolving bare usernames to entries.
    #[serde(default)]
    pub user_base: String,

    /// Filter template for resolving bare usernames ({0} = escaped name).
    #[serde(default = "default_user_filter")]
    pub user_filter: String,
}

fn default_hosts() -> Vec<String> {
    vec!["localhost".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_protocols() -> Vec<String> {
    vec!["TLSv1.2".to_string(), "TLSv1.3".to_string()]
}

fn default_user_role_name() -> String {
    "memberOf".to_string()
}

fn default_role_search() -> String {
    "(member={0})".to_string()
}

fn default_role_name() -> String {
    "name".to_string()
}

fn default_user_filter() -> String {
    "(sAMAccountName={0})".to_string()
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            hosts: default_hosts(),
            use_tls: false,
            use_start_tls: false,
            enable_client_auth: false,
            verify_hostnames: true,
            trust_store: None,
            client_cert: None,
            client_key: None,
            enabled_cipher_suites: Vec::new(),
            enabled_protocols: default_protocols(),
            bind_dn: None,
            bind_password: None,
            skip_users: Vec::new(),
            role_search_enabled: true,
            user_role_name: default_user_role_name(),
            role_base: String::new(),
            role_search: default_role_search(),
            role_name: default_role_name(),
            user_role_attribute: None,
            resolve_nested_roles: false,
            user_base: String::new(),
            user_filter: default_user_filter(),
        }
    }
}

/// Credential for the service bind. A DN with an empty secret is still
/// attempted anonymously (with a diagnostic), not rejected.
#[derive(Debug, Clone)]
pub struct BindCredential {
    pub dn: String,
    pub secret: String,
}

impl AuthzConfig {
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Configuration(format!("Failed to read config: {e}")))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::Configuration(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.hosts.is_empty() {
            return Err(Error::configuration("at least one host is required"));
        }
        if (self.use_tls || self.use_start_tls) && self.trust_store.is_none() {
            return Err(Error::configuration(
                "trust_store is required when TLS or StartTLS is enabled",
            ));
        }
        if self.enable_client_auth && (self.client_cert.is_none() != self.client_key.is_none()) {
            return Err(Error::configuration(
                "client_cert and client_key must both be set for client auth",
            ));
        }
        if !self.user_filter.contains("{0}") {
            return Err(Error::configuration(
                "user_filter must contain the {0} placeholder",
            ));
        }
        Ok(())
    }

    pub fn bind_credential(&self) -> Option<BindCredential> {
        self.bind_dn.as_ref().map(|dn| BindCredential {
            dn: dn.clone(),
            secret: self.bind_password.clone().unwrap_or_default(),
        })
    }

    /// Role search filter for a user. A missing user role attribute leaves
    /// the `{2}` token in place rather than failing; a literal `{2}` in a
    /// filter matches nothing downstream.
    pub fn role_search_filter(
        &self,
        user_dn: &str,
        display_name: &str,
        user_role_attribute_value: Option<&str>,
    ) -> String {
        let filter = self
            .role_search
            .replace("{0}", user_dn)
            .replace("{1}", display_name);
        match user_role_attribute_value {
            Some(value) => filter.replace("{2}", value),
            None => filter,
        }
    }

    /// Role search filter used during nested expansion: {0} and {1} are
    /// both the current role DN.
    pub fn nested_role_search_filter(&self, role_dn: &str) -> String {
        self.role_search.replace("{0}", role_dn).replace("{1}", role_dn)
    }

    /// Filter for resolving a bare username to its entry. The name must
    /// already be filter-escaped.
    pub fn user_search_filter(&self, escaped_name: &str) -> String {
        self.user_filter.replace("{0}", escaped_name)
    }
}
