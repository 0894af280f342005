//! SNI dispatch
//!
//! One decision per handshake: pick the context serving the client's server
//! name at the strongest crypto the client can verify. The decision is a
//! pure function of a [`DomainIndex`] snapshot and the handshake details the
//! client sent; the OpenSSL callback only gathers a [`HandshakeInfo`] and
//! applies the outcome.

use std::sync::Arc;

use openssl::ssl::{NameType, SslRef};
use tracing::trace;

use super::context::ServerContext;
use super::index::{DomainIndex, Lookup};
use super::key::{CertCrypto, DomainKey};
use super::stats::SniStats;

/// Hash half of a TLS 1.2 signature algorithm pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureHash {
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    Other(u8),
}

impl SignatureHash {
    /// Whether a client offering this hash can verify a SHA-2 signed chain
    pub fn is_sha2(self) -> bool {
        matches!(
            self,
            SignatureHash::Sha256 | SignatureHash::Sha384 | SignatureHash::Sha512
        )
    }
}

impl From<u8> for SignatureHash {
    fn from(code: u8) -> Self {
        match code {
            1 => SignatureHash::Md5,
            2 => SignatureHash::Sha1,
            3 => SignatureHash::Sha224,
            4 => SignatureHash::Sha256,
            5 => SignatureHash::Sha384,
            6 => SignatureHash::Sha512,
            other => SignatureHash::Other(other),
        }
    }
}

/// What the client hello told us
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeInfo {
    pub server_name: Option<String>,
    pub signature_algorithms: Vec<SignatureHash>,
    pub sni_extension: bool,
}

impl HandshakeInfo {
    pub fn new(server_name: Option<&str>) -> Self {
        HandshakeInfo {
            server_name: server_name.map(str::to_owned),
            signature_algorithms: Vec::new(),
            sni_extension: server_name.is_some(),
        }
    }

    pub fn with_signature_algorithms(mut self, algorithms: Vec<SignatureHash>) -> Self {
        self.signature_algorithms = algorithms;
        self
    }

    /// Gather what OpenSSL exposes while the servername callback runs.
    /// The client's signature algorithm list is not available there.
    pub fn from_ssl(ssl: &SslRef) -> Self {
        Self::new(ssl.servername(NameType::HOST_NAME))
    }

    /// Crypto strength the client can handle
    pub fn requested_crypto(&self) -> CertCrypto {
        if self.sni_extension || self.signature_algorithms.iter().any(|hash| hash.is_sha2()) {
            CertCrypto::BestAvailable
        } else {
            CertCrypto::Sha1Signature
        }
    }
}

/// Dispatch outcome
#[derive(Debug, Clone)]
pub enum Dispatch {
    /// A context serves the request. `context` is `None` when the name
    /// belongs to the default context, which is already in place.
    Found {
        context: Option<Arc<ServerContext>>,
        requested: CertCrypto,
        served: CertCrypto,
    },
    /// Nothing matched; the connection stays on the default context
    NotFound,
}

impl Dispatch {
    pub fn is_found(&self) -> bool {
        matches!(self, Dispatch::Found { .. })
    }

    pub fn context(&self) -> Option<&Arc<ServerContext>> {
        match self {
            Dispatch::Found { context, .. } => context.as_ref(),
            Dispatch::NotFound => None,
        }
    }
}

/// Select the context for one handshake
pub fn dispatch(index: &DomainIndex, hello: &HandshakeInfo, stats: Option<&dyn SniStats>) -> Dispatch {
    let (server_name, has_sni) = match hello.server_name.as_deref() {
        Some(name) => (name, true),
        None => (index.default_domain_name(), false),
    };

    if let Some(stats) = stats {
        if has_sni {
            stats.record_present_hostname();
        } else {
            stats.record_absent_hostname();
        }
    }

    let requested = hello.requested_crypto();
    let key = DomainKey::new(server_name, requested);
    if let Some(hit) = index.lookup(&key) {
        trace!("Found context for \"{}\" at {}", key.name(), requested.as_str());
        return found(hit, requested, requested, has_sni, stats);
    }

    // Upgrade only: a client able to verify SHA-2 never gets a SHA-1 cert
    // it did not ask for
    if requested == CertCrypto::Sha1Signature {
        let key = key.with_crypto(CertCrypto::BestAvailable);
        if let Some(hit) = index.lookup(&key) {
            trace!("Found context for \"{}\" after upgrading to best", key.name());
            return found(hit, requested, CertCrypto::BestAvailable, has_sni, stats);
        }
    }

    trace!("Cannot find a context for \"{}\"", key.name());
    if has_sni {
        if let Some(stats) = stats {
            stats.record_not_match();
        }
    }
    Dispatch::NotFound
}

fn found(
    hit: Lookup,
    requested: CertCrypto,
    served: CertCrypto,
    has_sni: bool,
    stats: Option<&dyn SniStats>,
) -> Dispatch {
    if let Some(stats) = stats {
        if has_sni {
            stats.record_match();
        }
        stats.record_cert_crypto(requested, served);
    }

    let context = match hit {
        Lookup::Context(ctx) => Some(ctx),
        Lookup::Default => None,
    };
    Dispatch::Found {
        context,
        requested,
        served,
    }
}
