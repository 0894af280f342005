//! Domain keys used to index certificate contexts

use std::fmt;

use super::config::TlsError;

/// Crypto strength of a certificate signature, or the strength a client is
/// able to verify
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CertCrypto {
    /// SHA-1 signed certificate, kept for legacy clients (weak)
    Sha1Signature,
    /// Anything stronger (best)
    BestAvailable,
}

impl CertCrypto {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertCrypto::Sha1Signature => "sha1",
            CertCrypto::BestAvailable => "best",
        }
    }
}

/// A normalized domain name paired with a crypto strength
///
/// Wildcard names are stored without the leading `*`, so `*.example.com` is
/// keyed as `.example.com`. Names are lowercased, making comparisons
/// case-insensitive as DNS requires.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DomainKey {
    name: String,
    crypto: CertCrypto,
}

impl DomainKey {
    pub fn new(name: impl AsRef<str>, crypto: CertCrypto) -> Self {
        DomainKey {
            name: name.as_ref().to_ascii_lowercase(),
            crypto,
        }
    }

    /// Key at [`CertCrypto::BestAvailable`]
    pub fn best(name: impl AsRef<str>) -> Self {
        Self::new(name, CertCrypto::BestAvailable)
    }

    /// Key for a configured domain name, dropping the `*` of a `*.` prefix
    pub fn from_domain_name(name: &str, crypto: CertCrypto) -> Self {
        let name = if name.starts_with("*.") { &name[1..] } else { name };
        Self::new(name, crypto)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn crypto(&self) -> CertCrypto {
        self.crypto
    }

    /// Same name at a different strength
    pub fn with_crypto(&self, crypto: CertCrypto) -> Self {
        DomainKey {
            name: self.name.clone(),
            crypto,
        }
    }

    /// Wildcard key one level up: `foo.example.com` becomes `.example.com`
    pub fn suffix(&self) -> Option<DomainKey> {
        let dot = self.name.find('.')?;
        Some(DomainKey {
            name: self.name[dot..].to_string(),
            crypto: self.crypto,
        })
    }
}

impl fmt::Display for DomainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.crypto.as_str())
    }
}

/// Validate a CN or subject alternative name and return its lookup form
///
/// `*` is accepted only as the leading `*.` of a name longer than two
/// characters; it is stripped, keeping the dot.
pub(crate) fn normalize_cert_name(name: &str) -> Result<&str, TlsError> {
    let invalid = |reason: &'static str| TlsError::InvalidDomainName {
        name: name.to_string(),
        reason,
    };

    let mut dn = name;
    if dn.len() > 2 && dn.starts_with('*') {
        if dn.as_bytes()[1] == b'.' {
            dn = &dn[1..];
        } else {
            return Err(invalid("only '.' is allowed after a leading '*'"));
        }
    }

    if dn == "." {
        return Err(invalid("name is only '.' after removing the wildcard"));
    }

    if dn.contains('*') {
        return Err(invalid("'*' is only allowed as a leading \"*.\""));
    }

    Ok(dn)
}
