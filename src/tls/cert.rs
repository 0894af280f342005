//! Certificate identity extraction
//!
//! This module extracts the names a certificate can serve (Common Name and
//! DNS Subject Alternative Names) and classifies its signature strength. It
//! also checks that every certificate loaded into one context describes the
//! same identity.

use openssl::nid::Nid;
use openssl::x509::{X509NameRef, X509Ref};
use tracing::trace;

use super::config::TlsError;
use super::key::CertCrypto;

/// Identity of a leaf certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertInfo {
    /// Certificate subject (Common Name)
    pub common_name: String,
    /// DNS Subject Alternative Names, sorted; `None` when the extension is absent
    pub subject_alt_names: Option<Vec<String>>,
    /// Signature strength
    pub crypto: CertCrypto,
}

impl CertInfo {
    /// Extract certificate information from an X.509 certificate
    pub fn from_x509(cert: &X509Ref) -> Result<Self, TlsError> {
        let common_name = Self::get_cn(cert.subject_name())
            .ok_or_else(|| TlsError::Certificate("Cannot get CN".to_string()))?;

        Ok(CertInfo {
            common_name,
            subject_alt_names: Self::get_subject_alt_names(cert),
            crypto: Self::signature_crypto(cert),
        })
    }

    /// Every name the certificate serves, CN first
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.common_name.as_str()).chain(
            self.subject_alt_names
                .iter()
                .flat_map(|names| names.iter().map(String::as_str)),
        )
    }

    /// Get Common Name from X509_NAME
    fn get_cn(name: &X509NameRef) -> Option<String> {
        name.entries_by_nid(Nid::COMMONNAME)
            .next()
            .and_then(|entry| entry.data().as_utf8().ok())
            .map(|s| s.to_string())
    }

    /// Get DNS Subject Alternative Names
    fn get_subject_alt_names(cert: &X509Ref) -> Option<Vec<String>> {
        let san_ext = cert.subject_alt_names()?;
        let mut names: Vec<String> = san_ext
            .iter()
            .filter_map(|name| name.dnsname().map(str::to_string))
            .collect();
        names.sort();
        Some(names)
    }

    /// SHA-1 signatures are weak, everything else is best available
    fn signature_crypto(cert: &X509Ref) -> CertCrypto {
        match cert.signature_algorithm().object().nid() {
            Nid::SHA1WITHRSAENCRYPTION | Nid::ECDSA_WITH_SHA1 => CertCrypto::Sha1Signature,
            _ => CertCrypto::BestAvailable,
        }
    }
}

/// Checks that the certificates of one bundle share CN and SAN list
#[derive(Debug, Default)]
pub(crate) struct BundleIdentity {
    baseline: Option<CertInfo>,
    last_description: String,
}

impl BundleIdentity {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record the next certificate, failing if its names differ from the first
    pub(crate) fn verify(&mut self, info: &CertInfo, description: &str) -> Result<(), TlsError> {
        trace!("cert {} CN: {}", description, info.common_name);
        match &info.subject_alt_names {
            Some(names) => trace!("cert {} SAN: {}", description, names.join(", ")),
            None => trace!("cert {} SAN: {{none}}", description),
        }

        match &self.baseline {
            None => {
                self.baseline = Some(info.clone());
            }
            Some(baseline) => {
                let mismatch = |field: &'static str| TlsError::CertNameMismatch {
                    cert: description.to_string(),
                    baseline: self.last_description.clone(),
                    field,
                };
                if baseline.common_name != info.common_name {
                    return Err(mismatch("CN"));
                }
                if baseline.subject_alt_names != info.subject_alt_names {
                    return Err(mismatch("SAN"));
                }
            }
        }
        self.last_description = description.to_string();
        Ok(())
    }

    /// Common name established by the first certificate
    pub(crate) fn common_name(&self) -> Option<&str> {
        self.baseline
            .as_ref()
            .map(|info| info.common_name.as_str())
    }
}
