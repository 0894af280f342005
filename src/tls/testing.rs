//! Self-signed certificates for unit tests

use std::sync::Arc;

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::extension::SubjectAlternativeName;
use openssl::x509::{X509Builder, X509NameBuilder, X509};

use super::config::SslContextConfig;
use super::context::{ContextOptions, ServerContext};

#[derive(Debug, Clone, Copy)]
pub(crate) enum Digest {
    Sha1,
    Sha256,
}

pub(crate) struct TestCert {
    pub(crate) cert: X509,
    pub(crate) key: PKey<Private>,
}

impl TestCert {
    pub(crate) fn cert_pem(&self) -> Vec<u8> {
        self.cert.to_pem().unwrap()
    }

    pub(crate) fn key_pem(&self) -> Vec<u8> {
        self.key.private_key_to_pem_pkcs8().unwrap()
    }

    pub(crate) fn config(&self) -> SslContextConfig {
        SslContextConfig::new().cert_pem(self.cert_pem(), self.key_pem())
    }
}

pub(crate) fn self_signed(cn: &str, sans: &[&str], digest: Digest) -> TestCert {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    let key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, cn).unwrap();
    let name = name.build();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(365).unwrap())
        .unwrap();

    if !sans.is_empty() {
        let mut san = SubjectAlternativeName::new();
        for name in sans {
            san.dns(name);
        }
        let ext = san.build(&builder.x509v3_context(None, None)).unwrap();
        builder.append_extension(ext).unwrap();
    }

    let digest = match digest {
        Digest::Sha1 => MessageDigest::sha1(),
        Digest::Sha256 => MessageDigest::sha256(),
    };
    builder.sign(&key, digest).unwrap();

    TestCert {
        cert: builder.build(),
        key,
    }
}

/// Build a non-default context through the regular loading pipeline
pub(crate) fn context(cn: &str, sans: &[&str], digest: Digest) -> Arc<ServerContext> {
    let config = self_signed(cn, sans, digest).config();
    Arc::new(ServerContext::from_config(&config, &ContextOptions::default()).unwrap())
}

/// Same, marked as the default context
pub(crate) fn default_context(cn: &str, sans: &[&str], digest: Digest) -> Arc<ServerContext> {
    let config = self_signed(cn, sans, digest).config().default_context(true);
    Arc::new(ServerContext::from_config(&config, &ContextOptions::default()).unwrap())
}
