//! Domain index
//!
//! The index maps [`DomainKey`]s to certificate contexts. It is a best match:
//!
//! 1. Wildcard names must be prefixed exactly by `*.`; a `*` anywhere else is
//!    rejected. `*.example.com` is stored under `.example.com`.
//! 2. A lookup tries the full name first, then one level up
//!    (`www.example.com` -> `.example.com`), the same depth browsers use
//!    when matching wildcard certificates. It never goes further.
//! 3. Keys owned by the default context are kept in a separate set and never
//!    map to a context here; the manager holds the default context itself.
//!    A key lives in the mapping or in the default set, never both.
//! 4. A SHA-1 signed certificate is also registered at best-available
//!    strength, unless a context already holds that key.
//!
//! A `DomainIndex` is built off the handshake path and published as an
//! immutable snapshot.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{error, trace};

use super::config::{SslContextConfig, TlsError};
use super::context::{ContextOptions, ServerContext};
use super::key::{normalize_cert_name, CertCrypto, DomainKey};
use super::ticket::TicketKeySeeds;
use super::Result;

/// Outcome of a successful lookup
#[derive(Debug, Clone)]
pub enum Lookup {
    /// A specific context serves the name
    Context(Arc<ServerContext>),
    /// The name belongs to the default context
    Default,
}

impl Lookup {
    pub fn context(&self) -> Option<&Arc<ServerContext>> {
        match self {
            Lookup::Context(ctx) => Some(ctx),
            Lookup::Default => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DomainIndex {
    contexts: Vec<Arc<ServerContext>>,
    by_domain: HashMap<DomainKey, Arc<ServerContext>>,
    default_keys: HashSet<DomainKey>,
    default_domain_name: String,
    strict: bool,
}

impl Default for DomainIndex {
    fn default() -> Self {
        DomainIndex::new(true)
    }
}

impl DomainIndex {
    /// Create an empty index. With `strict` unset, an invalid certificate
    /// name is logged and skipped instead of failing the whole load.
    pub fn new(strict: bool) -> Self {
        DomainIndex {
            contexts: Vec::new(),
            by_domain: HashMap::new(),
            default_keys: HashSet::new(),
            default_domain_name: String::new(),
            strict,
        }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Non-default contexts, in insertion order
    pub fn contexts(&self) -> &[Arc<ServerContext>] {
        &self.contexts
    }

    /// Number of keys mapped to a specific context
    pub fn len(&self) -> usize {
        self.by_domain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_domain.is_empty() && self.default_keys.is_empty()
    }

    /// CN of the default context, used when the client sends no SNI
    pub fn default_domain_name(&self) -> &str {
        &self.default_domain_name
    }

    /// Drop every entry, keeping the policy
    pub fn clear(&mut self) {
        self.contexts.clear();
        self.by_domain.clear();
        self.default_keys.clear();
    }

    /// Seeds of the first context with a ticket manager. Contexts of one
    /// endpoint are assumed to share seeds.
    pub fn ticket_seeds(&self) -> Option<TicketKeySeeds> {
        self.contexts
            .iter()
            .find_map(|ctx| ctx.ticket_manager())
            .map(|manager| manager.seeds())
    }

    /// Build a context from `config` and index it. A default context is
    /// stored into `new_default`, which must still be empty.
    pub(crate) fn add_config(
        &mut self,
        config: &SslContextConfig,
        options: &ContextOptions<'_>,
        new_default: &mut Option<Arc<ServerContext>>,
    ) -> Result<()> {
        if config.is_default && new_default.is_some() {
            return Err(TlsError::MultipleDefaults);
        }

        let ctx = Arc::new(ServerContext::from_config(config, options)?);

        self.insert(Arc::clone(&ctx), config.is_default)
            .map_err(|err| {
                error!("Error adding certificate: {}", err);
                err
            })?;

        if config.is_default {
            *new_default = Some(ctx);
        }
        Ok(())
    }

    /// Register a context under its CN and every subject alternative name
    pub fn insert(&mut self, ctx: Arc<ServerContext>, is_default: bool) -> Result<()> {
        let info = ctx.cert_info().clone();

        // A bare "*" CN can only serve as the catch-all default
        if info.common_name == "*" {
            if !is_default {
                return Err(TlsError::InvalidDomainName {
                    name: info.common_name,
                    reason: "a \"*\" certificate must be the default",
                });
            }
            return Ok(());
        }

        match info.crypto {
            CertCrypto::Sha1Signature => trace!("Adding context with SHA1 signature"),
            CertCrypto::BestAvailable => trace!("Adding context with best available crypto"),
        }

        for name in info.names() {
            self.register_name(name, &ctx, info.crypto, is_default)?;
        }

        if is_default {
            self.default_domain_name = info.common_name.to_ascii_lowercase();
        } else {
            self.contexts.push(ctx);
        }
        Ok(())
    }

    /// Register one name, applying the strict/lenient policy to invalid names
    pub fn register_name(
        &mut self,
        name: &str,
        ctx: &Arc<ServerContext>,
        crypto: CertCrypto,
        is_default: bool,
    ) -> Result<()> {
        match self.register_name_impl(name, ctx, crypto, is_default) {
            Err(err @ TlsError::InvalidDomainName { .. }) if !self.strict => {
                error!("{} DN={}", err, name);
                Ok(())
            }
            result => result,
        }
    }

    fn register_name_impl(
        &mut self,
        name: &str,
        ctx: &Arc<ServerContext>,
        crypto: CertCrypto,
        is_default: bool,
    ) -> Result<()> {
        trace!("Adding CN/Subject-alternative-name \"{}\" for SNI search", name);
        let dn = normalize_cert_name(name)?;

        let key = DomainKey::new(dn, crypto);
        if is_default {
            self.insert_into_default_keys(key, true);
        } else {
            self.insert_into_map(key, ctx, true);
        }

        if crypto != CertCrypto::BestAvailable {
            // Either the requested strength matches, or best available does
            trace!("Attempting insert of weak crypto context as best available");
            let key = DomainKey::new(dn, CertCrypto::BestAvailable);
            if is_default {
                self.insert_into_default_keys(key, false);
            } else {
                self.insert_into_map(key, ctx, false);
            }
        }
        Ok(())
    }

    /// Map `key` to `ctx`. `overwrite` decides whether an existing entry,
    /// in the mapping or in the default set, gives way.
    pub(crate) fn insert_into_map(&mut self, key: DomainKey, ctx: &Arc<ServerContext>, overwrite: bool) {
        if let Some(existing) = self.by_domain.get_mut(&key) {
            debug_assert!(!self.default_keys.contains(&key));
            if Arc::ptr_eq(existing, ctx) {
                trace!("Duplicate CN or subject alternative name found in the same X509, ignoring");
            } else if overwrite {
                trace!("Overwriting context for {}", key);
                *existing = Arc::clone(ctx);
            } else {
                trace!("Leaving existing context for {}", key);
            }
        } else if self.default_keys.contains(&key) {
            if overwrite {
                trace!("Overwriting context for {}, removing from defaults", key);
                self.default_keys.remove(&key);
                self.by_domain.insert(key, Arc::clone(ctx));
            } else {
                trace!("Leaving {} with the default context", key);
            }
        } else {
            trace!("Inserting context for {}", key);
            self.by_domain.insert(key, Arc::clone(ctx));
        }
    }

    /// Hand `key` to the default context
    pub(crate) fn insert_into_default_keys(&mut self, key: DomainKey, overwrite: bool) {
        if self.by_domain.contains_key(&key) {
            debug_assert!(!self.default_keys.contains(&key));
            if overwrite {
                trace!("{} reassigned to default", key);
                self.by_domain.remove(&key);
                self.default_keys.insert(key);
            } else {
                trace!("Leaving existing context for {}", key);
            }
        } else if !self.default_keys.insert(key) {
            trace!("Duplicate CN or subject alternative name found in the same X509, ignoring");
        }
    }

    /// Remove the context registered under `domain_name` (which may be a
    /// `*.` wildcard), at best-available strength
    pub fn remove_by_domain_name(&mut self, domain_name: &str) -> Result<()> {
        let key = DomainKey::from_domain_name(domain_name, CertCrypto::BestAvailable);
        self.remove(&key)
    }

    /// Remove the entry for `key` and its context. Keys of the default
    /// context can't be removed.
    pub fn remove(&mut self, key: &DomainKey) -> Result<()> {
        if self.default_keys.contains(key) {
            let msg = format!("Cert for the default domain {} can not be removed", key.name());
            error!("{}", msg);
            return Err(TlsError::PolicyViolation(msg));
        }

        if let Some(ctx) = self.by_domain.remove(key) {
            self.contexts.retain(|owned| !Arc::ptr_eq(owned, &ctx));
        }
        Ok(())
    }

    /// Best match for `key`: exact name first, then one level up
    pub fn lookup(&self, key: &DomainKey) -> Option<Lookup> {
        self.lookup_exact(key)
            .or_else(|| key.suffix().and_then(|suffix| self.lookup_exact(&suffix)))
    }

    fn lookup_exact(&self, key: &DomainKey) -> Option<Lookup> {
        if let Some(ctx) = self.by_domain.get(key) {
            return Some(Lookup::Context(Arc::clone(ctx)));
        }
        if self.default_keys.contains(key) {
            return Some(Lookup::Default);
        }
        None
    }

    pub fn get_by_exact_domain(&self, key: &DomainKey) -> Option<Arc<ServerContext>> {
        match self.by_domain.get(key) {
            Some(ctx) => {
                trace!("\"{}\" is an exact match", key.name());
                Some(Arc::clone(ctx))
            }
            None => {
                trace!("\"{}\" is not an exact match", key.name());
                None
            }
        }
    }

    pub fn get_by_suffix(&self, key: &DomainKey) -> Option<Arc<ServerContext>> {
        let ctx = key
            .suffix()
            .and_then(|suffix| self.by_domain.get(&suffix).cloned());
        if ctx.is_some() {
            trace!("\"{}\" is a wildcard match", key.name());
        } else {
            trace!("\"{}\" is not a wildcard match", key.name());
        }
        ctx
    }

    pub fn is_default(&self, key: &DomainKey) -> bool {
        self.is_default_exact(key) || self.is_default_suffix(key)
    }

    pub fn is_default_exact(&self, key: &DomainKey) -> bool {
        self.default_keys.contains(key)
    }

    pub fn is_default_suffix(&self, key: &DomainKey) -> bool {
        key.suffix()
            .map(|suffix| self.default_keys.contains(&suffix))
            .unwrap_or(false)
    }
}
