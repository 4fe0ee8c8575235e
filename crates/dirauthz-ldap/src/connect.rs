//! Directory server connection with ordered failover.
//!
//! Endpoints are tried left-to-right; a failure to connect, negotiate TLS,
//! or bind on one endpoint is logged and the next is tried. Only when
//! every endpoint has failed does the whole operation fail, with an error
//! naming all attempted endpoints.

use std::fmt;

use dirauthz_core::{config::BindCredential, Error, Result};
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings};
use tracing::{debug, error, trace, warn};

use crate::search::LdapSession;
use crate::tls::{SecurityConfig, CONNECT_TIMEOUT};

pub const DEFAULT_PORT: u16 = 389;
pub const DEFAULT_TLS_PORT: u16 = 636;

/// One host:port candidate, parsed from a "host[:port]" setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEndpoint {
    pub host: String,
    pub port: u16,
}

impl DirectoryEndpoint {
    /// Parses "host" or "host:port". Without an explicit port, the
    /// protocol's well-known port is used: 636 over TLS, 389 otherwise.
    pub fn parse(input: &str, use_tls: bool) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::configuration("empty directory host"));
        }
        match input.split_once(':') {
            Some((host, port)) => {
                let port = port.parse().map_err(|_| {
                    Error::Configuration(format!("invalid port in directory host '{input}'"))
                })?;
                Ok(Self {
                    host: host.to_string(),
                    port,
                })
            }
            None => Ok(Self {
                host: input.to_string(),
                port: if use_tls { DEFAULT_TLS_PORT } else { DEFAULT_PORT },
            }),
        }
    }

    pub fn parse_all(hosts: &[String], use_tls: bool) -> Result<Vec<Self>> {
        hosts.iter().map(|h| Self::parse(h, use_tls)).collect()
    }

    pub fn url(&self, use_tls: bool) -> String {
        format!(
            "ldap{}://{}:{}",
            if use_tls { "s" } else { "" },
            self.host,
            self.port
        )
    }
}

impl fmt::Display for DirectoryEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Opens one authenticated session against the first reachable endpoint.
///
/// On success exactly one open connection is returned; on failure no
/// connection resources remain open.
pub async fn connect(
    endpoints: &[DirectoryEndpoint],
    security: &SecurityConfig,
    bind: Option<&BindCredential>,
) -> Result<LdapSession> {
    let mut attempted = Vec::with_capacity(endpoints.len());
    for endpoint in endpoints {
        trace!("Connecting to {endpoint}");
        attempted.push(endpoint.to_string());
        match connect_endpoint(endpoint, security, bind).await {
            Ok(session) => return Ok(session),
            Err(e) => {
                warn!("Unable to connect to directory server {endpoint}: {e}. Trying next.");
            }
        }
    }
    Err(Error::NoReachableServer { attempted })
}

async fn connect_endpoint(
    endpoint: &DirectoryEndpoint,
    security: &SecurityConfig,
    bind: Option<&BindCredential>,
) -> std::result::Result<LdapSession, ldap3::LdapError> {
    let url = endpoint.url(security.use_tls);
    trace!("Directory URL {url}");

    let mut settings = LdapConnSettings::new()
        .set_conn_timeout(CONNECT_TIMEOUT)
        .set_starttls(security.use_start_tls);
    if !security.verify_hostnames {
        settings = settings.set_no_tls_verify(true);
    }
    if let Some(tls) = &security.client_config {
        settings = settings.set_config(tls.clone());
    }

    let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &url).await?;
    ldap3::drive!(conn);

    if let Err(e) = bind_session(&mut ldap, bind).await {
        // a partially-opened session must not outlive the attempt
        let _ = ldap.unbind().await;
        return Err(e);
    }
    Ok(LdapSession::new(ldap))
}

async fn bind_session(
    ldap: &mut Ldap,
    bind: Option<&BindCredential>,
) -> std::result::Result<(), ldap3::LdapError> {
    match bind {
        Some(cred) if !cred.secret.is_empty() => {
            debug!("Binding as {}", cred.dn);
            ldap.simple_bind(&cred.dn, &cred.secret).await?.success()?;
        }
        Some(cred) => {
            error!(
                "No password given for bind_dn {}. Will try to authenticate anonymously",
                cred.dn
            );
            ldap.simple_bind("", "").await?.success()?;
        }
        None => {
            debug!("Binding anonymously");
            ldap.simple_bind("", "").await?.success()?;
        }
    }
    Ok(())
}
