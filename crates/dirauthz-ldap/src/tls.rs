//! TLS and credential configuration for directory connections.
//!
//! Builds the transport security configuration from the flat settings:
//! trust anchors, an optional client identity for mutual TLS, cipher and
//! protocol allow-lists, and the hostname verification policy. Pure given
//! its inputs; the only failure paths are unreadable or malformed key
//! material, surfaced as [`Error::Configuration`].

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use dirauthz_core::{AuthzConfig, Error, Result};
use rustls::{Certificate, ClientConfig, PrivateKey, RootCertStore, SupportedCipherSuite};
use tracing::{debug, warn};

/// Per-endpoint connect timeout. Fixed in the reference behavior, so not
/// a configuration option.
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Transport security settings for one invocation's connection attempts.
#[derive(Clone)]
pub struct SecurityConfig {
    pub use_tls: bool,
    pub use_start_tls: bool,
    pub verify_hostnames: bool,
    /// Present only when TLS or StartTLS is enabled.
    pub client_config: Option<Arc<ClientConfig>>,
}

impl SecurityConfig {
    /// Plaintext configuration: no trust material, no TLS.
    pub fn plaintext() -> Self {
        Self {
            use_tls: false,
            use_start_tls: false,
            verify_hostnames: true,
            client_config: None,
        }
    }
}

impl fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("use_tls", &self.use_tls)
            .field("use_start_tls", &self.use_start_tls)
            .field("verify_hostnames", &self.verify_hostnames)
            .field("client_config", &self.client_config.is_some())
            .finish()
    }
}

/// Builds the security configuration. Trust material is only loaded when
/// TLS or StartTLS is enabled; file paths resolve against `config_root`.
pub fn build_security_config(config: &AuthzConfig, config_root: &Path) -> Result<SecurityConfig> {
    if !config.use_tls && !config.use_start_tls {
        return Ok(SecurityConfig {
            verify_hostnames: config.verify_hostnames,
            ..SecurityConfig::plaintext()
        });
    }

    let trust_store = config
        .trust_store
        .as_ref()
        .ok_or_else(|| Error::configuration("trust_store is required when TLS is enabled"))?;

    let mut roots = RootCertStore::empty();
    for cert in load_certs(&config_root.join(trust_store))? {
        roots.add(&cert).map_err(|e| {
            Error::Configuration(format!(
                "invalid certificate in {}: {e}",
                trust_store.display()
            ))
        })?;
    }

    let suites = selected_cipher_suites(&config.enabled_cipher_suites)?;
    let protocols = selected_protocols(&config.enabled_protocols)?;
    debug!(
        "enabled tls protocols for directory connections: {:?}",
        config.enabled_protocols
    );

    let builder = ClientConfig::builder()
        .with_cipher_suites(&suites)
        .with_safe_default_kx_groups()
        .with_protocol_versions(&protocols)
        .map_err(|e| Error::Configuration(format!("unsupported TLS configuration: {e}")))?
        .with_root_certificates(roots);

    let mut client_config = match (&config.client_cert, &config.client_key) {
        (Some(cert), Some(key)) if config.enable_client_auth => {
            let chain = load_certs(&config_root.join(cert))?;
            let key = load_private_key(&config_root.join(key))?;
            builder.with_client_auth_cert(chain, key).map_err(|e| {
                Error::Configuration(format!("invalid client certificate or key: {e}"))
            })?
        }
        _ => builder.with_no_client_auth(),
    };

    if !config.verify_hostnames {
        // Deliberate insecurity escape hatch for self-signed/internal
        // deployments: every server certificate and hostname is accepted.
        warn!("directory TLS certificate and hostname verification is DISABLED");
        client_config
            .dangerous()
            .set_certificate_verifier(Arc::new(AcceptAnyServerCert));
    }

    Ok(SecurityConfig {
        use_tls: config.use_tls,
        use_start_tls: config.use_start_tls,
        verify_hostnames: config.verify_hostnames,
        client_config: Some(Arc::new(client_config)),
    })
}

/// PEM is selected by the `.pem` extension; anything else is read as DER.
fn is_pem(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pem"))
}

fn load_certs(path: &Path) -> Result<Vec<Certificate>> {
    let data = fs::read(path)
        .map_err(|e| Error::Configuration(format!("cannot read {}: {e}", path.display())))?;
    if is_pem(path) {
        let certs = rustls_pemfile::certs(&mut data.as_slice())
            .map_err(|e| Error::Configuration(format!("cannot parse {}: {e}", path.display())))?;
        if certs.is_empty() {
            return Err(Error::Configuration(format!(
                "no certificates found in {}",
                path.display()
            )));
        }
        Ok(certs.into_iter().map(Certificate).collect())
    } else {
        Ok(vec![Certificate(data)])
    }
}

fn load_private_key(path: &Path) -> Result<PrivateKey> {
    let data = fs::read(path)
        .map_err(|e| Error::Configuration(format!("cannot read {}: {e}", path.display())))?;
    if !is_pem(path) {
        return Ok(PrivateKey(data));
    }
    let mut reader = data.as_slice();
    while let Some(item) = rustls_pemfile::read_one(&mut reader)
        .map_err(|e| Error::Configuration(format!("cannot parse {}: {e}", path.display())))?
    {
        match item {
            rustls_pemfile::Item::PKCS8Key(key)
            | rustls_pemfile::Item::RSAKey(key)
            | rustls_pemfile::Item::ECKey(key) => return Ok(PrivateKey(key)),
            _ => continue,
        }
    }
    Err(Error::Configuration(format!(
        "no private key found in {}",
        path.display()
    )))
}

/// Cipher suite names follow the rustls spellings, e.g.
/// `TLS13_AES_256_GCM_SHA384`. An empty allow-list keeps the provider
/// defaults; a non-empty list that matches nothing is a configuration
/// error.
fn selected_cipher_suites(names: &[String]) -> Result<Vec<SupportedCipherSuite>> {
    if names.is_empty() {
        return Ok(rustls::DEFAULT_CIPHER_SUITES.to_vec());
    }
    let mut suites = Vec::new();
    for name in names {
        match rustls::ALL_CIPHER_SUITES
            .iter()
            .find(|s| format!("{:?}", s.suite()) == *name)
        {
            Some(suite) => suites.push(*suite),
            None => warn!("ignoring unknown cipher suite {name}"),
        }
    }
    if suites.is_empty() {
        return Err(Error::configuration(
            "enabled_cipher_suites matched no known cipher suites",
        ));
    }
    debug!("enabled cipher suites for directory connections: {names:?}");
    Ok(suites)
}

fn selected_protocols(names: &[String]) -> Result<Vec<&'static rustls::SupportedProtocolVersion>> {
    let mut protocols = Vec::new();
    for name in names {
        match name.as_str() {
            "TLSv1.2" => protocols.push(&rustls::version::TLS12),
            "TLSv1.3" => protocols.push(&rustls::version::TLS13),
            other => warn!("ignoring unsupported TLS protocol {other}"),
        }
    }
    if protocols.is_empty() {
        return Err(Error::configuration(
            "enabled_protocols matched no supported TLS protocols",
        ));
    }
    Ok(protocols)
}

/// Server certificate verifier that accepts anything. Installed only when
/// `verify_hostnames` is explicitly disabled.
struct AcceptAnyServerCert;

impl rustls::client::ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &rustls::ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> std::result::Result<rustls::client::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::ServerCertVerified::assertion())
    }
}
