//! LDAP directory authorization engine.
//!
//! Resolves the set of authorization roles for an already-authenticated
//! principal by querying an LDAP directory:
//! - ordered failover across the configured directory servers, with
//!   TLS/StartTLS and optional mutual auth
//! - role collection from a membership attribute on the user entry and
//!   from a role search, merged by structural DN equality
//! - optional transitive expansion of nested roles
//!
//! Authentication itself happens elsewhere; this engine only augments a
//! principal with role names.

pub mod connect;
pub mod roles;
pub mod search;
pub mod tls;

mod nested;
#[cfg(test)]
pub(crate) mod testutil;

pub use connect::{connect, DirectoryEndpoint};
pub use roles::LdapAuthorizationBackend;
pub use search::{DirectorySearch, LdapSession};
pub use tls::{build_security_config, SecurityConfig, CONNECT_TIMEOUT};
