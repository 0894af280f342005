//! Virtual-host TLS configuration
//!
//! This module provides the per-virtual-host configuration consumed by the
//! context manager, along with the error type shared by the whole TLS layer.

use std::fs;
use std::path::{Path, PathBuf};

use super::cache::SessionCacheConfig;

/// TLS version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    /// TLS 1.0
    Tls10,
    /// TLS 1.1
    Tls11,
    /// TLS 1.2
    Tls12,
    /// TLS 1.3
    Tls13,
}

impl TlsVersion {
    /// Get OpenSSL protocol version constant
    pub fn to_openssl_version(&self) -> openssl::ssl::SslVersion {
        use openssl::ssl::SslVersion;
        match self {
            TlsVersion::Tls10 => SslVersion::TLS1,
            TlsVersion::Tls11 => SslVersion::TLS1_1,
            TlsVersion::Tls12 => SslVersion::TLS1_2,
            TlsVersion::Tls13 => SslVersion::TLS1_3,
        }
    }

    /// Protocol name as OpenSSL spells it
    pub fn as_str(&self) -> &'static str {
        match self {
            TlsVersion::Tls10 => "TLSv1.0",
            TlsVersion::Tls11 => "TLSv1.1",
            TlsVersion::Tls12 => "TLSv1.2",
            TlsVersion::Tls13 => "TLSv1.3",
        }
    }
}

/// Client certificate verification mode, applied when a client CA file is set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientVerify {
    /// Don't request client certificates
    None,
    /// Request client certificate but don't require it
    Optional,
    /// Require client certificate
    Required,
}

impl ClientVerify {
    pub(crate) fn to_openssl_mode(self) -> openssl::ssl::SslVerifyMode {
        use openssl::ssl::SslVerifyMode;
        match self {
            ClientVerify::None => SslVerifyMode::NONE,
            ClientVerify::Optional => SslVerifyMode::PEER,
            ClientVerify::Required => SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT,
        }
    }
}

/// TLS errors
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Certificate error: {0}")]
    Certificate(String),

    #[error("Invalid domain name \"{name}\": {reason}")]
    InvalidDomainName { name: String, reason: &'static str },

    #[error("More than one certificate is set as default")]
    MultipleDefaults,

    #[error("Certificate {cert} does not have the same {field} as {baseline}")]
    CertNameMismatch {
        cert: String,
        baseline: String,
        field: &'static str,
    },

    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),
}

/// Where the password protecting a private key comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPassword {
    /// First line of a file
    File(PathBuf),
    /// Inline value
    Literal(String),
}

impl KeyPassword {
    /// Resolve the password bytes
    pub fn resolve(&self) -> Result<Vec<u8>, TlsError> {
        match self {
            KeyPassword::Literal(password) => Ok(password.as_bytes().to_vec()),
            KeyPassword::File(path) => {
                let contents = fs::read_to_string(path)?;
                let password = contents.lines().next().unwrap_or("").trim_end();
                Ok(password.as_bytes().to_vec())
            }
        }
    }
}

/// One certificate/key pair for a context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateSource {
    /// PEM files on disk. The certificate file may carry the chain after the
    /// leaf; `key_path` may point at the same file.
    Files {
        cert_path: PathBuf,
        key_path: PathBuf,
        password: Option<KeyPassword>,
    },
    /// PEM data held in memory
    Buffer { cert_pem: Vec<u8>, key_pem: Vec<u8> },
}

impl CertificateSource {
    /// Human-readable name used in errors and logs
    pub fn description(&self) -> String {
        match self {
            CertificateSource::Files { cert_path, .. } => cert_path.display().to_string(),
            CertificateSource::Buffer { .. } => "<buffer>".to_string(),
        }
    }
}

/// Configuration for one certificate context (one virtual host, or a group of
/// hosts sharing a certificate)
///
/// Built with chained setters, similar to the other configuration builders in
/// this crate:
///
/// ```no_run
/// use vhost_tls::tls::{SslContextConfig, TlsVersion};
///
/// let config = SslContextConfig::new()
///     .cert_key_files("/etc/certs/example.pem", "/etc/certs/example.key")
///     .version_range(TlsVersion::Tls12, TlsVersion::Tls13)
///     .alpn(&["h2", "http/1.1"])
///     .default_context(true);
/// ```
#[derive(Debug, Clone)]
pub struct SslContextConfig {
    pub certificates: Vec<CertificateSource>,
    /// Cipher list for TLS <= 1.2
    pub ciphers: Option<String>,
    /// Cipher suites for TLS 1.3
    pub ciphersuites: Option<String>,
    pub min_version: Option<TlsVersion>,
    pub max_version: Option<TlsVersion>,
    /// Named group used for ECDHE, e.g. `P-256`
    pub ecc_curve_name: Option<String>,
    /// Enables mutual TLS
    pub client_ca_file: Option<PathBuf>,
    pub client_verify: ClientVerify,
    /// ALPN protocols in order of preference
    pub next_protocols: Vec<String>,
    pub is_default: bool,
    /// Session id context; the certificate CN is used when unset
    pub session_context: Option<String>,
    pub session_cache: SessionCacheConfig,
}

impl Default for SslContextConfig {
    fn default() -> Self {
        SslContextConfig {
            certificates: Vec::new(),
            ciphers: None,
            ciphersuites: None,
            min_version: None,
            max_version: None,
            ecc_curve_name: None,
            client_ca_file: None,
            client_verify: ClientVerify::Required,
            next_protocols: Vec::new(),
            is_default: false,
            session_context: None,
            session_cache: SessionCacheConfig::default(),
        }
    }
}

impl SslContextConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a PEM file holding both the certificate (and chain) and its key
    pub fn cert_file<P: AsRef<Path>>(self, path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        self.certificate(CertificateSource::Files {
            cert_path: path.clone(),
            key_path: path,
            password: None,
        })
    }

    /// Add a certificate file and a separate key file
    pub fn cert_key_files<P: AsRef<Path>, K: AsRef<Path>>(self, cert: P, key: K) -> Self {
        self.certificate(CertificateSource::Files {
            cert_path: cert.as_ref().to_path_buf(),
            key_path: key.as_ref().to_path_buf(),
            password: None,
        })
    }

    /// Add a certificate file and an encrypted key file
    pub fn cert_key_files_with_password<P: AsRef<Path>, K: AsRef<Path>>(
        self,
        cert: P,
        key: K,
        password: KeyPassword,
    ) -> Self {
        self.certificate(CertificateSource::Files {
            cert_path: cert.as_ref().to_path_buf(),
            key_path: key.as_ref().to_path_buf(),
            password: Some(password),
        })
    }

    /// Add an in-memory certificate and key
    pub fn cert_pem(self, cert_pem: impl Into<Vec<u8>>, key_pem: impl Into<Vec<u8>>) -> Self {
        self.certificate(CertificateSource::Buffer {
            cert_pem: cert_pem.into(),
            key_pem: key_pem.into(),
        })
    }

    pub fn certificate(mut self, source: CertificateSource) -> Self {
        self.certificates.push(source);
        self
    }

    /// Set TLS version (both min and max)
    pub fn version(self, version: TlsVersion) -> Self {
        self.version_range(version, version)
    }

    /// Configured protocol range, e.g. `TLSv1.2..TLSv1.3`
    pub(crate) fn version_range_label(&self) -> String {
        let label = |version: Option<TlsVersion>| version.map_or("any", |v| v.as_str());
        format!("{}..{}", label(self.min_version), label(self.max_version))
    }

    /// Set TLS version range
    pub fn version_range(mut self, min: TlsVersion, max: TlsVersion) -> Self {
        self.min_version = Some(min);
        self.max_version = Some(max);
        self
    }

    /// Set cipher list (for TLS <= 1.2)
    pub fn cipher_list(mut self, ciphers: impl Into<String>) -> Self {
        self.ciphers = Some(ciphers.into());
        self
    }

    /// Set cipher suites (for TLS 1.3)
    pub fn ciphersuites(mut self, ciphers: impl Into<String>) -> Self {
        self.ciphersuites = Some(ciphers.into());
        self
    }

    pub fn ecc_curve(mut self, name: impl Into<String>) -> Self {
        self.ecc_curve_name = Some(name.into());
        self
    }

    /// Set CA file for client certificate verification
    pub fn client_ca_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.client_ca_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn client_verify(mut self, mode: ClientVerify) -> Self {
        self.client_verify = mode;
        self
    }

    /// Set ALPN protocols
    pub fn alpn(mut self, protocols: &[&str]) -> Self {
        self.next_protocols = protocols.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Mark this context as the one used when SNI is absent or unmatched
    pub fn default_context(mut self, is_default: bool) -> Self {
        self.is_default = is_default;
        self
    }

    pub fn session_context(mut self, context: impl Into<String>) -> Self {
        self.session_context = Some(context.into());
        self
    }

    pub fn session_cache(mut self, cache: SessionCacheConfig) -> Self {
        self.session_cache = cache;
        self
    }
}
