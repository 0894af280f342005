//! SNI certificate selection for TLS servers
//!
//! One listening endpoint can serve many virtual hosts, each with its own
//! certificate. This module picks, per handshake, the certificate context
//! matching the server name the client asked for, at the strongest
//! signature the client can verify.
//!
//! # Architecture
//!
//! 1. `SslContextConfig` describes one virtual host (certificates, ciphers,
//!    versions, ALPN, client verification, session resumption)
//! 2. `ServerContext` is the OpenSSL context built from it, plus the identity
//!    (CN, SANs, signature strength) of its certificates
//! 3. `DomainIndex` maps `(name, strength)` keys to contexts, with one level
//!    of wildcard matching
//! 4. `SslContextManager` publishes the index as an immutable snapshot and
//!    swaps it atomically on reload; the default context's servername
//!    callback runs `dispatch` against the live snapshot
//!
//! # Features
//!
//! - Exact and `*.` wildcard names from CN and subject alternative names
//! - SHA-1 signed certificates kept apart for legacy clients
//! - Multi-certificate bundles (e.g. RSA + ECDSA) with identity checks
//! - Whole-set reload without blocking handshakes
//! - Session cache with pluggable external storage, ticket key rotation
//! - SNI statistics
//!
//! # Example
//!
//! ```no_run
//! use vhost_tls::tls::{DomainKey, LoadOptions, SslContextConfig, SslContextManager};
//!
//! let mut manager = SslContextManager::new("www", true);
//! manager
//!     .add_ssl_context_config(
//!         &SslContextConfig::new().cert_key_files("site.pem", "site.key"),
//!         &LoadOptions::default(),
//!     )
//!     .unwrap();
//!
//! let ctx = manager.get_ssl_ctx(&DomainKey::best("www.example.com"));
//! ```

pub mod cache;
pub mod cert;
pub mod config;
pub mod context;
pub mod handshake;
pub mod index;
pub mod key;
pub mod manager;
pub mod stats;
pub mod ticket;

#[cfg(test)]
mod builtin_cert;
#[cfg(test)]
mod testing;

pub use cache::{CacheOptions, SessionCacheConfig, SessionCacheProvider};
pub use cert::CertInfo;
pub use config::{
    CertificateSource, ClientVerify, KeyPassword, SslContextConfig, TlsError, TlsVersion,
};
pub use context::{ClientCertVerifier, ServerContext};
pub use handshake::{dispatch, Dispatch, HandshakeInfo, SignatureHash};
pub use index::{DomainIndex, Lookup};
pub use key::{CertCrypto, DomainKey};
pub use manager::{ContextSnapshot, LoadOptions, SniResolver, SslContextManager};
pub use stats::{SniCounters, SniStats};
pub use ticket::{TicketKey, TicketKeyManager, TicketKeySeeds};

/// Result type for TLS operations
pub type Result<T> = std::result::Result<T, TlsError>;
