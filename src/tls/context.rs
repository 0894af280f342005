//! Certificate contexts
//!
//! A [`ServerContext`] is one OpenSSL server context bound to a certificate
//! bundle and its TLS options. Contexts are built once, off the handshake
//! path, and shared as `Arc<ServerContext>` between the published index and
//! any handshake that selected them.

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use openssl::dh::Dh;
use openssl::pkey::{PKey, Private};
use openssl::ssl::{
    AlpnError, SniError, SslAlert, SslContext, SslContextBuilder, SslMethod,
    SslMode, SslOptions, SslRef, SslVerifyMode,
};
use openssl::x509::{X509Name, X509StoreContextRef, X509};
use tracing::{debug, error, trace};

use super::cache::{setup_session_cache, CacheOptions, ExternalCache, SessionCacheProvider};
use super::cert::{BundleIdentity, CertInfo};
use super::config::{CertificateSource, ClientVerify, SslContextConfig, TlsError};
use super::ticket::{TicketKeyManager, TicketKeySeeds};
use super::Result;

/// Longest session id context OpenSSL accepts
const MAX_SID_CTX_LENGTH: usize = 32;

/// Handler invoked by OpenSSL once the client hello's server name is known
pub(crate) type ServernameCallback =
    Arc<dyn Fn(&mut SslRef, &mut SslAlert) -> std::result::Result<(), SniError> + Send + Sync>;

/// Externally supplied client certificate verification
pub type ClientCertVerifier = Arc<dyn Fn(bool, &mut X509StoreContextRef) -> bool + Send + Sync>;

/// Manager-wide inputs for building contexts
#[derive(Clone, Default)]
pub(crate) struct ContextOptions<'a> {
    pub(crate) cache_options: CacheOptions,
    pub(crate) ticket_seeds: Option<&'a TicketKeySeeds>,
    pub(crate) external_cache: Option<&'a Arc<dyn SessionCacheProvider>>,
    pub(crate) client_cert_verifier: Option<&'a ClientCertVerifier>,
    /// Installed on the default context only
    pub(crate) servername: Option<&'a ServernameCallback>,
}

/// A server TLS context and the identity of its certificate
pub struct ServerContext {
    ssl: SslContext,
    info: CertInfo,
    session_id_context: String,
    is_default: bool,
    ticket_manager: Option<TicketKeyManager>,
    external_cache: Option<ExternalCache>,
}

impl fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerContext")
            .field("common_name", &self.info.common_name)
            .field("subject_alt_names", &self.info.subject_alt_names)
            .field("crypto", &self.info.crypto)
            .field("is_default", &self.is_default)
            .field("ticket_manager", &self.ticket_manager.is_some())
            .field("external_cache", &self.external_cache)
            .finish()
    }
}

impl ServerContext {
    /// Load certificates and build a context from its configuration
    pub(crate) fn from_config(config: &SslContextConfig, options: &ContextOptions<'_>) -> Result<Self> {
        if config.certificates.is_empty() {
            return Err(TlsError::InvalidConfig(
                "No certificate configured for context".to_string(),
            ));
        }

        let mut builder = SslContextBuilder::new(SslMethod::tls_server())?;

        trace!("Protocol versions {}", config.version_range_label());
        if let Some(min) = config.min_version {
            builder.set_min_proto_version(Some(min.to_openssl_version()))?;
        }
        if let Some(max) = config.max_version {
            builder.set_max_proto_version(Some(max.to_openssl_version()))?;
        }

        let (common_name, info) = load_cert_key_pairs(&mut builder, &config.certificates)?;

        builder.set_options(
            SslOptions::CIPHER_SERVER_PREFERENCE
                | SslOptions::SINGLE_DH_USE
                | SslOptions::SINGLE_ECDH_USE
                | SslOptions::DONT_INSERT_EMPTY_FRAGMENTS,
        );

        if let Some(ciphers) = &config.ciphers {
            builder.set_cipher_list(ciphers)?;
        }
        if let Some(ciphersuites) = &config.ciphersuites {
            builder.set_ciphersuites(ciphersuites)?;
        }

        let dh = Dh::get_2048_256()?;
        builder.set_tmp_dh(&dh)?;

        if let Some(curve) = &config.ecc_curve_name {
            builder.set_groups_list(curve).map_err(|err| {
                TlsError::InvalidConfig(format!("Unknown curve name {}: {}", curve, err))
            })?;
        }

        if let Some(ca_file) = &config.client_ca_file {
            setup_client_verification(
                &mut builder,
                ca_file,
                config.client_verify,
                options.client_cert_verifier,
            )
            .map_err(|err| {
                let msg = format!("error loading client CA {}: {}", ca_file.display(), err);
                error!("{}", msg);
                TlsError::Certificate(msg)
            })?;
        }

        // Session resumption (cache or tickets) needs a session id context
        let session_id_context = match &config.session_context {
            Some(context) if !context.is_empty() => context.clone(),
            _ => common_name,
        };
        debug!("Setting sid_ctx {}", session_id_context);
        let sid = session_id_context.as_bytes();
        builder.set_session_id_context(&sid[..sid.len().min(MAX_SID_CTX_LENGTH)])?;

        let external_cache = setup_session_cache(
            &mut builder,
            &config.session_cache,
            &options.cache_options,
            options.external_cache,
        )?;

        let ticket_manager = match options.ticket_seeds {
            Some(seeds) if !seeds.is_empty() => Some(TicketKeyManager::new(seeds)),
            _ => {
                builder.set_options(SslOptions::NO_TICKET);
                None
            }
        };

        setup_by_feature(&mut builder, config, options.servername)?;

        let context = ServerContext {
            ssl: builder.build(),
            info,
            session_id_context,
            is_default: config.is_default,
            ticket_manager,
            external_cache,
        };
        debug!("Created context {:?}", context);
        Ok(context)
    }

    /// The underlying OpenSSL context
    pub fn ssl_context(&self) -> &SslContext {
        &self.ssl
    }

    pub fn cert_info(&self) -> &CertInfo {
        &self.info
    }

    pub fn common_name(&self) -> &str {
        &self.info.common_name
    }

    pub fn session_id_context(&self) -> &str {
        &self.session_id_context
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    pub fn ticket_manager(&self) -> Option<&TicketKeyManager> {
        self.ticket_manager.as_ref()
    }
}

/// Install every certificate of the bundle, returning the first CN and the
/// identity of the last certificate loaded
fn load_cert_key_pairs(
    builder: &mut SslContextBuilder,
    sources: &[CertificateSource],
) -> Result<(String, CertInfo)> {
    let mut bundle = BundleIdentity::new();
    let mut current = None;

    for source in sources {
        let description = source.description();
        let leaf = install_cert_key_pair(builder, source).map_err(|err| {
            let msg = format!("error loading SSL certificate {}: {}", description, err);
            error!("{}", msg);
            TlsError::Certificate(msg)
        })?;

        let info = CertInfo::from_x509(&leaf).map_err(|_| {
            TlsError::Certificate(format!("Cannot get CN for X509 {}", description))
        })?;
        bundle.verify(&info, &description)?;
        current = Some(info);
    }

    match (bundle.common_name(), current) {
        (Some(common_name), Some(info)) => Ok((common_name.to_string(), info)),
        _ => Err(TlsError::InvalidConfig(
            "No certificate configured for context".to_string(),
        )),
    }
}

fn install_cert_key_pair(builder: &mut SslContextBuilder, source: &CertificateSource) -> Result<X509> {
    let (cert_pem, key_pem, password) = match source {
        CertificateSource::Files {
            cert_path,
            key_path,
            password,
        } => {
            let password = match password {
                Some(password) => Some(password.resolve()?),
                None => None,
            };
            (fs::read(cert_path)?, fs::read(key_path)?, password)
        }
        CertificateSource::Buffer { cert_pem, key_pem } => (cert_pem.clone(), key_pem.clone(), None),
    };

    let mut certs = X509::stack_from_pem(&cert_pem)?.into_iter();
    let leaf = certs
        .next()
        .ok_or_else(|| TlsError::Certificate("no certificate found".to_string()))?;

    let key: PKey<Private> = match password {
        Some(password) => PKey::private_key_from_pem_passphrase(&key_pem, &password)?,
        None => PKey::private_key_from_pem(&key_pem)?,
    };

    builder.set_certificate(&leaf)?;
    builder.set_private_key(&key)?;
    builder.check_private_key()?;
    for chain_cert in certs {
        builder.add_extra_chain_cert(chain_cert)?;
    }

    Ok(leaf)
}

fn setup_client_verification(
    builder: &mut SslContextBuilder,
    ca_file: &Path,
    mode: ClientVerify,
    verifier: Option<&ClientCertVerifier>,
) -> Result<()> {
    builder.set_ca_file(ca_file)?;
    builder.set_client_ca_list(X509Name::load_client_ca_file(ca_file)?);

    match verifier {
        Some(verifier) => {
            let verifier = Arc::clone(verifier);
            builder.set_verify_callback(SslVerifyMode::PEER, move |ok, store| verifier(ok, store));
        }
        None => builder.set_verify(mode.to_openssl_mode()),
    }
    Ok(())
}

/// Encode ALPN protocols in wire format (length-prefixed)
fn encode_alpn(protocols: &[String]) -> Result<Vec<u8>> {
    let mut wire = Vec::new();
    for proto in protocols {
        if proto.is_empty() || proto.len() > u8::MAX as usize {
            return Err(TlsError::InvalidConfig(format!(
                "Invalid ALPN protocol \"{}\"",
                proto
            )));
        }
        wire.push(proto.len() as u8);
        wire.extend_from_slice(proto.as_bytes());
    }
    Ok(wire)
}

/// Entries of a length-prefixed protocol list, stopping at a truncated entry
fn alpn_entries<'a>(wire: &'a [u8]) -> impl Iterator<Item = &'a [u8]> {
    let mut pos = 0;
    std::iter::from_fn(move || {
        let len = *wire.get(pos)? as usize;
        let entry = wire.get(pos + 1..pos + 1 + len)?;
        pos += 1 + len;
        Some(entry)
    })
}

/// First server protocol, in server preference order, that the client also
/// offered. The match is borrowed from the client's list.
fn select_alpn<'a>(server_protos: &[u8], client_protos: &'a [u8]) -> Option<&'a [u8]> {
    alpn_entries(server_protos).find_map(|server_proto| {
        alpn_entries(client_protos).find(|client_proto| *client_proto == server_proto)
    })
}

fn setup_by_feature(
    builder: &mut SslContextBuilder,
    config: &SslContextConfig,
    servername: Option<&ServernameCallback>,
) -> Result<()> {
    // Compression is expensive in CPU and memory
    builder.set_options(SslOptions::NO_COMPRESSION | SslOptions::NO_RENEGOTIATION);
    builder.set_mode(SslMode::RELEASE_BUFFERS);

    if !config.next_protocols.is_empty() {
        let server_protos = encode_alpn(&config.next_protocols)?;
        builder.set_alpn_select_callback(move |_ssl, client_protos| {
            select_alpn(&server_protos, client_protos).ok_or(AlpnError::NOACK)
        });
    }

    if config.is_default {
        if let Some(callback) = servername {
            trace!("Installing servername callback on default context");
            let callback = Arc::clone(callback);
            builder.set_servername_callback(move |ssl, alert| callback(ssl, alert));
        }
    }

    Ok(())
}
