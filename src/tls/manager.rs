//! SSL context manager
//!
//! The manager owns the published [`ContextSnapshot`] of one listening
//! endpoint. Handshakes read the snapshot through [`ArcSwap::load`] and never
//! block; every change builds a new snapshot off the handshake path and
//! publishes it with a single store, so a handshake sees either the whole old
//! set of contexts or the whole new one.
//!
//! Writers (`add_*`, `remove_*`, `reset_*`, `clear`) take `&mut self` and are
//! expected to run on one control thread.
//!
//! # Example
//!
//! ```no_run
//! use vhost_tls::tls::{LoadOptions, SslContextConfig, SslContextManager};
//! use std::net::TcpListener;
//!
//! let mut manager = SslContextManager::new("vip:443", true);
//! manager
//!     .reset_ssl_context_configs(
//!         &[
//!             SslContextConfig::new()
//!                 .cert_key_files("default.pem", "default.key")
//!                 .default_context(true),
//!             SslContextConfig::new()
//!                 .cert_key_files("www.pem", "www.key")
//!                 .alpn(&["h2", "http/1.1"]),
//!         ],
//!         &LoadOptions::default(),
//!     )
//!     .unwrap();
//!
//! let listener = TcpListener::bind("0.0.0.0:443").unwrap();
//! let (tcp_stream, _) = listener.accept().unwrap();
//! let tls_stream = manager.accept(tcp_stream).unwrap();
//! ```

use std::fmt;
use std::io::{Read, Write};
use std::sync::{Arc, Weak};

use arc_swap::{ArcSwap, ArcSwapOption};
use openssl::ssl::{HandshakeError, SniError, Ssl, SslAlert, SslRef, SslStream};
use tracing::{debug, error, info};

use super::cache::{CacheOptions, SessionCacheProvider};
use super::config::{SslContextConfig, TlsError};
use super::context::{ClientCertVerifier, ContextOptions, ServerContext, ServernameCallback};
use super::handshake::{dispatch, Dispatch, HandshakeInfo};
use super::index::{DomainIndex, Lookup};
use super::key::{CertCrypto, DomainKey};
use super::stats::SniStats;
use super::ticket::TicketKeySeeds;
use super::Result;

/// `ArcSwapOption` needs a sized payload
type StatsSink = Arc<dyn SniStats>;

/// Manager-wide inputs applied to every context a load builds
#[derive(Clone, Default)]
pub struct LoadOptions {
    pub cache_options: CacheOptions,
    /// When `None`, a reset keeps the seeds of the snapshot it replaces
    pub ticket_seeds: Option<TicketKeySeeds>,
    pub external_cache: Option<Arc<dyn SessionCacheProvider>>,
}

impl fmt::Debug for LoadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadOptions")
            .field("cache_options", &self.cache_options)
            .field("ticket_seeds", &self.ticket_seeds)
            .field("external_cache", &self.external_cache.is_some())
            .finish()
    }
}

/// Everything a handshake needs, published as one unit
#[derive(Debug, Clone)]
pub struct ContextSnapshot {
    index: DomainIndex,
    default_ctx: Option<Arc<ServerContext>>,
}

impl ContextSnapshot {
    fn empty(strict: bool) -> Self {
        ContextSnapshot {
            index: DomainIndex::new(strict),
            default_ctx: None,
        }
    }

    pub fn index(&self) -> &DomainIndex {
        &self.index
    }

    pub fn default_ctx(&self) -> Option<&Arc<ServerContext>> {
        self.default_ctx.as_ref()
    }

    /// Best match for `key`, with default matches mapped to the default
    /// context
    pub fn resolve(&self, key: &DomainKey) -> Option<Arc<ServerContext>> {
        match self.index.lookup(key)? {
            Lookup::Context(ctx) => Some(ctx),
            Lookup::Default => self.default_ctx.clone(),
        }
    }

    fn ticket_seeds(&self) -> Option<TicketKeySeeds> {
        self.index.ticket_seeds().or_else(|| {
            self.default_ctx
                .as_ref()
                .and_then(|ctx| ctx.ticket_manager())
                .map(|manager| manager.seeds())
        })
    }
}

struct Shared {
    snapshot: ArcSwap<ContextSnapshot>,
    stats: ArcSwapOption<StatsSink>,
}

impl Shared {
    fn dispatch(&self, hello: &HandshakeInfo) -> Dispatch {
        let snapshot = self.snapshot.load();
        let stats = self.stats.load();
        let stats = stats.as_deref().map(|sink| &**sink);
        dispatch(&snapshot.index, hello, stats)
    }
}

/// Selects and serves certificate contexts for one endpoint
pub struct SslContextManager {
    vip_name: String,
    strict: bool,
    shared: Arc<Shared>,
    client_cert_verifier: Option<ClientCertVerifier>,
    servername: ServernameCallback,
}

impl fmt::Debug for SslContextManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SslContextManager")
            .field("vip_name", &self.vip_name)
            .field("strict", &self.strict)
            .field("snapshot", &self.shared.snapshot.load_full())
            .finish()
    }
}

impl SslContextManager {
    /// Create a manager with no contexts. `strict` selects whether an invalid
    /// certificate name aborts a load or is logged and skipped.
    pub fn new(vip_name: impl Into<String>, strict: bool) -> Self {
        let shared = Arc::new(Shared {
            snapshot: ArcSwap::from_pointee(ContextSnapshot::empty(strict)),
            stats: ArcSwapOption::empty(),
        });

        // The callback lives inside the default context, which the shared
        // state owns, so it must not keep that state alive
        let weak = Arc::downgrade(&shared);
        let servername: ServernameCallback = Arc::new(move |ssl: &mut SslRef, _alert: &mut SslAlert| {
            let shared = match Weak::upgrade(&weak) {
                Some(shared) => shared,
                None => return Err(SniError::NOACK),
            };

            match shared.dispatch(&HandshakeInfo::from_ssl(ssl)) {
                Dispatch::Found {
                    context: Some(ctx), ..
                } => ssl.set_ssl_context(ctx.ssl_context()).map_err(|err| {
                    error!("Error switching to context {}: {}", ctx.common_name(), err);
                    SniError::ALERT_FATAL
                }),
                Dispatch::Found { context: None, .. } => Ok(()),
                Dispatch::NotFound => Err(SniError::NOACK),
            }
        });

        SslContextManager {
            vip_name: vip_name.into(),
            strict,
            shared,
            client_cert_verifier: None,
            servername,
        }
    }

    pub fn vip_name(&self) -> &str {
        &self.vip_name
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// The snapshot handshakes currently see
    pub fn snapshot(&self) -> Arc<ContextSnapshot> {
        self.shared.snapshot.load_full()
    }

    /// A cloneable handle for connection threads
    pub fn resolver(&self) -> SniResolver {
        SniResolver {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Attach or detach the statistics sink. Takes effect on the next
    /// handshake.
    pub fn set_client_hello_stats(&self, stats: Option<Arc<dyn SniStats>>) {
        self.shared.stats.store(stats.map(Arc::new));
    }

    /// Verify client certificates with `verifier` instead of the configured
    /// mode. Applies to contexts built afterwards.
    pub fn set_client_cert_verify_callback(&mut self, verifier: Option<ClientCertVerifier>) {
        self.client_cert_verifier = verifier;
    }

    fn context_options<'a>(
        &'a self,
        options: &'a LoadOptions,
        ticket_seeds: Option<&'a TicketKeySeeds>,
    ) -> ContextOptions<'a> {
        ContextOptions {
            cache_options: options.cache_options,
            ticket_seeds,
            external_cache: options.external_cache.as_ref(),
            client_cert_verifier: self.client_cert_verifier.as_ref(),
            servername: Some(&self.servername),
        }
    }

    /// Add one context to the live set
    pub fn add_ssl_context_config(
        &mut self,
        config: &SslContextConfig,
        options: &LoadOptions,
    ) -> Result<()> {
        let current = self.shared.snapshot.load_full();
        let mut index = current.index.clone();
        let mut default_ctx = current.default_ctx.clone();

        let context_options = self.context_options(options, options.ticket_seeds.as_ref());
        index.add_config(config, &context_options, &mut default_ctx)?;

        self.shared
            .snapshot
            .store(Arc::new(ContextSnapshot { index, default_ctx }));
        debug!("Added context to {}", self.vip_name);
        Ok(())
    }

    /// Replace every context. On error the previous set stays in force.
    pub fn reset_ssl_context_configs(
        &mut self,
        configs: &[SslContextConfig],
        options: &LoadOptions,
    ) -> Result<()> {
        let current = self.shared.snapshot.load_full();
        let carried = match &options.ticket_seeds {
            Some(_) => None,
            None => current.ticket_seeds(),
        };
        let ticket_seeds = options.ticket_seeds.as_ref().or(carried.as_ref());

        let mut index = DomainIndex::new(self.strict);
        let mut default_ctx = None;
        let context_options = self.context_options(options, ticket_seeds);
        for config in configs {
            index
                .add_config(config, &context_options, &mut default_ctx)
                .map_err(|err| {
                    error!("Failed to reload contexts for {}: {}", self.vip_name, err);
                    err
                })?;
        }

        let loaded = index.contexts().len() + usize::from(default_ctx.is_some());
        self.shared
            .snapshot
            .store(Arc::new(ContextSnapshot { index, default_ctx }));
        info!("Reloaded {} contexts for {}", loaded, self.vip_name);
        Ok(())
    }

    /// Remove the context serving `domain_name` (`*.` wildcards accepted)
    pub fn remove_ssl_context_config_by_domain_name(&mut self, domain_name: &str) -> Result<()> {
        let key = DomainKey::from_domain_name(domain_name, CertCrypto::BestAvailable);
        self.remove_ssl_context_config(&key)
    }

    pub fn remove_ssl_context_config(&mut self, key: &DomainKey) -> Result<()> {
        let current = self.shared.snapshot.load_full();
        let mut index = current.index.clone();
        index.remove(key)?;

        self.shared.snapshot.store(Arc::new(ContextSnapshot {
            index,
            default_ctx: current.default_ctx.clone(),
        }));
        debug!("Removed {} from {}", key, self.vip_name);
        Ok(())
    }

    /// Push new ticket seeds into every live context
    pub fn reload_tls_ticket_keys(&self, seeds: &TicketKeySeeds) {
        let snapshot = self.shared.snapshot.load();
        let contexts = snapshot.index.contexts().iter().chain(snapshot.default_ctx.iter());
        for ctx in contexts {
            if let Some(manager) = ctx.ticket_manager() {
                manager.set_seeds(seeds);
            }
        }
        info!("Reloaded ticket keys for {}", self.vip_name);
    }

    /// Drop every context except the default one
    pub fn clear(&mut self) {
        let current = self.shared.snapshot.load_full();
        let mut index = current.index.clone();
        index.clear();
        self.shared.snapshot.store(Arc::new(ContextSnapshot {
            index,
            default_ctx: current.default_ctx.clone(),
        }));
    }

    pub fn default_ssl_ctx(&self) -> Option<Arc<ServerContext>> {
        self.shared.snapshot.load().default_ctx.clone()
    }

    /// Best match for `key`: exact, then one level of wildcard
    pub fn get_ssl_ctx(&self, key: &DomainKey) -> Option<Arc<ServerContext>> {
        self.shared.snapshot.load().resolve(key)
    }

    pub fn get_ssl_ctx_by_suffix(&self, key: &DomainKey) -> Option<Arc<ServerContext>> {
        let snapshot = self.shared.snapshot.load();
        snapshot.index.get_by_suffix(key).or_else(|| {
            if snapshot.index.is_default_suffix(key) {
                snapshot.default_ctx.clone()
            } else {
                None
            }
        })
    }

    pub fn get_ssl_ctx_by_exact_domain(&self, key: &DomainKey) -> Option<Arc<ServerContext>> {
        let snapshot = self.shared.snapshot.load();
        snapshot.index.get_by_exact_domain(key).or_else(|| {
            if snapshot.index.is_default_exact(key) {
                snapshot.default_ctx.clone()
            } else {
                None
            }
        })
    }

    /// Run a server handshake on `stream`, starting from the default context
    pub fn accept<S: Read + Write>(&self, stream: S) -> Result<SslStream<S>> {
        self.resolver().accept(stream)
    }
}

/// Read side of a manager, shared with connection threads
#[derive(Clone)]
pub struct SniResolver {
    shared: Arc<Shared>,
}

impl fmt::Debug for SniResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SniResolver").finish_non_exhaustive()
    }
}

impl SniResolver {
    pub fn snapshot(&self) -> Arc<ContextSnapshot> {
        self.shared.snapshot.load_full()
    }

    /// Dispatch a client hello against the live snapshot
    pub fn resolve(&self, hello: &HandshakeInfo) -> Dispatch {
        self.shared.dispatch(hello)
    }

    pub fn get_ssl_ctx(&self, key: &DomainKey) -> Option<Arc<ServerContext>> {
        self.shared.snapshot.load().resolve(key)
    }

    pub fn accept<S: Read + Write>(&self, stream: S) -> Result<SslStream<S>> {
        let default_ctx = self
            .shared
            .snapshot
            .load()
            .default_ctx
            .clone()
            .ok_or_else(|| TlsError::InvalidConfig("No default context configured".to_string()))?;

        let ssl = Ssl::new(default_ctx.ssl_context())?;
        ssl.accept(stream).map_err(|err| {
            let reason = match err {
                HandshakeError::SetupFailure(err) => err.to_string(),
                HandshakeError::Failure(mid) | HandshakeError::WouldBlock(mid) => {
                    mid.error().to_string()
                }
            };
            TlsError::HandshakeFailed(format!("Accept failed: {}", reason))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::stats::SniCounters;
    use super::super::config::ClientVerify;
    use super::super::testing::{self_signed, Digest};
    use openssl::ssl::SslVerifyMode;
    use openssl::x509::X509StoreContextRef;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    fn config(cn: &str, sans: &[&str]) -> SslContextConfig {
        self_signed(cn, sans, Digest::Sha256).config()
    }

    fn default_config(cn: &str) -> SslContextConfig {
        config(cn, &[]).default_context(true)
    }

    fn seeds(current: &str) -> TicketKeySeeds {
        TicketKeySeeds::new(vec![], vec![current.to_string()], vec![])
    }

    #[test]
    fn test_reset_publishes_new_set() {
        let mut manager = SslContextManager::new("vip", true);
        manager
            .reset_ssl_context_configs(
                &[default_config("default.test"), config("a.test", &["*.a.test"])],
                &LoadOptions::default(),
            )
            .unwrap();

        let ctx = manager.get_ssl_ctx(&DomainKey::best("www.a.test")).unwrap();
        assert_eq!(ctx.common_name(), "a.test");
        let default = manager.get_ssl_ctx(&DomainKey::best("default.test")).unwrap();
        assert!(Arc::ptr_eq(&default, &manager.default_ssl_ctx().unwrap()));

        manager
            .reset_ssl_context_configs(&[config("b.test", &[])], &LoadOptions::default())
            .unwrap();
        assert!(manager.get_ssl_ctx(&DomainKey::best("www.a.test")).is_none());
        assert!(manager.get_ssl_ctx(&DomainKey::best("b.test")).is_some());
        assert!(manager.default_ssl_ctx().is_none());
    }

    #[test]
    fn test_failed_reset_keeps_previous_snapshot() {
        let mut manager = SslContextManager::new("vip", true);
        manager
            .reset_ssl_context_configs(&[config("keep.test", &[])], &LoadOptions::default())
            .unwrap();
        let before = manager.snapshot();

        let err = manager
            .reset_ssl_context_configs(
                &[default_config("one.test"), default_config("two.test")],
                &LoadOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, TlsError::MultipleDefaults));
        assert!(Arc::ptr_eq(&before, &manager.snapshot()));

        let err = manager
            .reset_ssl_context_configs(
                &[config("new.test", &[]), config("bad.test", &["x.*.test"])],
                &LoadOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, TlsError::InvalidDomainName { .. }));
        assert!(manager.get_ssl_ctx(&DomainKey::best("keep.test")).is_some());
        assert!(manager.get_ssl_ctx(&DomainKey::best("new.test")).is_none());
    }

    #[test]
    fn test_lenient_reset_skips_invalid_names() {
        let mut manager = SslContextManager::new("vip", false);
        manager
            .reset_ssl_context_configs(
                &[config("new.test", &[]), config("bad.test", &["x.*.test"])],
                &LoadOptions::default(),
            )
            .unwrap();
        assert!(manager.get_ssl_ctx(&DomainKey::best("new.test")).is_some());
        assert!(manager.get_ssl_ctx(&DomainKey::best("bad.test")).is_some());
        assert_eq!(manager.snapshot().index().len(), 2);
    }

    #[test]
    fn test_incremental_add_and_remove() {
        let mut manager = SslContextManager::new("vip", true);
        manager
            .add_ssl_context_config(&default_config("default.test"), &LoadOptions::default())
            .unwrap();
        manager
            .add_ssl_context_config(&config("a.test", &["*.a.test"]), &LoadOptions::default())
            .unwrap();

        let err = manager
            .add_ssl_context_config(&default_config("other.test"), &LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, TlsError::MultipleDefaults));

        let before = manager.snapshot();
        manager.remove_ssl_context_config_by_domain_name("*.a.test").unwrap();
        assert!(manager.get_ssl_ctx(&DomainKey::best("www.a.test")).is_none());
        assert!(manager.get_ssl_ctx(&DomainKey::best("a.test")).is_some());
        // Published snapshots are never mutated
        assert!(before.resolve(&DomainKey::best("www.a.test")).is_some());

        let err = manager
            .remove_ssl_context_config_by_domain_name("default.test")
            .unwrap_err();
        assert!(matches!(err, TlsError::PolicyViolation(_)));
        assert!(manager.default_ssl_ctx().is_some());

        manager
            .remove_ssl_context_config(&DomainKey::best("a.test"))
            .unwrap();
        assert!(manager.snapshot().index().contexts().is_empty());
    }

    #[test]
    fn test_exact_and_suffix_getters() {
        let mut manager = SslContextManager::new("vip", true);
        let default = self_signed("default.test", &["*.default.test"], Digest::Sha256)
            .config()
            .default_context(true);
        manager
            .reset_ssl_context_configs(
                &[default, config("site.test", &["*.site.test"])],
                &LoadOptions::default(),
            )
            .unwrap();

        let www = DomainKey::best("www.site.test");
        assert!(manager.get_ssl_ctx_by_exact_domain(&www).is_none());
        assert_eq!(manager.get_ssl_ctx_by_suffix(&www).unwrap().common_name(), "site.test");

        let www_default = DomainKey::best("www.default.test");
        let ctx = manager.get_ssl_ctx_by_suffix(&www_default).unwrap();
        assert!(ctx.is_default());
        let ctx = manager
            .get_ssl_ctx_by_exact_domain(&DomainKey::best("default.test"))
            .unwrap();
        assert!(ctx.is_default());
    }

    #[test]
    fn test_clear_keeps_default() {
        let mut manager = SslContextManager::new("vip", true);
        manager
            .reset_ssl_context_configs(
                &[default_config("default.test"), config("a.test", &[])],
                &LoadOptions::default(),
            )
            .unwrap();

        manager.clear();
        assert!(manager.get_ssl_ctx(&DomainKey::best("a.test")).is_none());
        assert!(manager.default_ssl_ctx().is_some());
        assert_eq!(manager.snapshot().index().default_domain_name(), "default.test");
    }

    #[test]
    fn test_ticket_seeds_carry_forward_and_rotate() {
        let mut manager = SslContextManager::new("vip", true);
        let options = LoadOptions {
            ticket_seeds: Some(seeds("first")),
            ..Default::default()
        };
        manager
            .reset_ssl_context_configs(&[config("a.test", &[])], &options)
            .unwrap();

        manager
            .reset_ssl_context_configs(&[config("b.test", &[])], &LoadOptions::default())
            .unwrap();
        let ctx = manager.get_ssl_ctx(&DomainKey::best("b.test")).unwrap();
        assert_eq!(ctx.ticket_manager().unwrap().seeds(), seeds("first"));

        manager.reload_tls_ticket_keys(&seeds("second"));
        assert_eq!(ctx.ticket_manager().unwrap().seeds(), seeds("second"));
    }

    #[test]
    fn test_ticket_rotation_reaches_default() {
        let mut manager = SslContextManager::new("vip", true);
        let options = LoadOptions {
            ticket_seeds: Some(seeds("first")),
            ..Default::default()
        };
        manager
            .reset_ssl_context_configs(&[default_config("default.test")], &options)
            .unwrap();
        let default = manager.default_ssl_ctx().unwrap();
        assert_eq!(default.ticket_manager().unwrap().seeds(), seeds("first"));

        manager.reload_tls_ticket_keys(&seeds("second"));
        assert_eq!(default.ticket_manager().unwrap().seeds(), seeds("second"));
        assert_eq!(
            manager.default_ssl_ctx().unwrap().ticket_manager().unwrap().seeds(),
            seeds("second")
        );
    }

    #[test]
    fn test_client_cert_verifier_applies_to_new_contexts() {
        let dir = tempfile::tempdir().unwrap();
        let ca_file = dir.path().join("client-ca.pem");
        std::fs::write(
            &ca_file,
            self_signed("Test Client CA", &[], Digest::Sha256).cert_pem(),
        )
        .unwrap();
        let mtls_config = |cn: &str| {
            default_config(cn)
                .client_ca_file(&ca_file)
                .client_verify(ClientVerify::Required)
        };

        let mut manager = SslContextManager::new("vip", true);
        manager
            .reset_ssl_context_configs(&[mtls_config("before.test")], &LoadOptions::default())
            .unwrap();
        let before = manager.default_ssl_ctx().unwrap();
        assert_eq!(
            before.ssl_context().verify_mode(),
            SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT
        );

        let verifier: ClientCertVerifier =
            Arc::new(|ok: bool, _store: &mut X509StoreContextRef| ok);
        manager.set_client_cert_verify_callback(Some(verifier));
        manager
            .reset_ssl_context_configs(&[mtls_config("after.test")], &LoadOptions::default())
            .unwrap();
        let after = manager.default_ssl_ctx().unwrap();
        assert_eq!(after.ssl_context().verify_mode(), SslVerifyMode::PEER);
        // Contexts built earlier keep their mode
        assert_eq!(
            before.ssl_context().verify_mode(),
            SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT
        );
    }

    #[test]
    fn test_resolver_dispatch_and_stats() {
        let mut manager = SslContextManager::new("vip", true);
        manager
            .reset_ssl_context_configs(
                &[default_config("default.test"), config("a.test", &[])],
                &LoadOptions::default(),
            )
            .unwrap();
        let resolver = manager.resolver();

        let counters = Arc::new(SniCounters::new());
        manager.set_client_hello_stats(Some(counters.clone()));

        let outcome = resolver.resolve(&HandshakeInfo::new(Some("a.test")));
        assert_eq!(outcome.context().unwrap().common_name(), "a.test");
        assert!(resolver.resolve(&HandshakeInfo::default()).is_found());
        assert!(!resolver.resolve(&HandshakeInfo::new(Some("z.test"))).is_found());

        assert_eq!(counters.present_hostname(), 2);
        assert_eq!(counters.absent_hostname(), 1);
        assert_eq!(counters.matched(), 1);
        assert_eq!(counters.not_matched(), 1);

        manager.set_client_hello_stats(None);
        resolver.resolve(&HandshakeInfo::new(Some("a.test")));
        assert_eq!(counters.matched(), 1);
    }

    #[test]
    fn test_accept_without_default() {
        let manager = SslContextManager::new("vip", true);
        let err = manager.accept(std::io::Cursor::new(Vec::new())).unwrap_err();
        assert!(matches!(err, TlsError::InvalidConfig(_)));
    }

    #[test]
    fn test_concurrent_lookups_during_reset() {
        let mut manager = SslContextManager::new("vip", true);
        manager
            .reset_ssl_context_configs(&[config("a.com", &[])], &LoadOptions::default())
            .unwrap();
        let resolver = manager.resolver();
        let done = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let resolver = resolver.clone();
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    let a = DomainKey::new("a.com", CertCrypto::BestAvailable);
                    let b = DomainKey::new("b.com", CertCrypto::BestAvailable);
                    while !done.load(Ordering::Relaxed) {
                        let snapshot = resolver.snapshot();
                        let has_a = snapshot.resolve(&a).is_some();
                        let has_b = snapshot.resolve(&b).is_some();
                        assert!(has_a ^ has_b, "inconsistent snapshot");
                    }
                })
            })
            .collect();

        let a_config = config("a.com", &[]);
        let b_config = config("b.com", &[]);
        for round in 0..50 {
            let next = if round % 2 == 0 { &b_config } else { &a_config };
            manager
                .reset_ssl_context_configs(std::slice::from_ref(next), &LoadOptions::default())
                .unwrap();
        }
        done.store(true, Ordering::Relaxed);

        for reader in readers {
            reader.join().unwrap();
        }
    }
}
