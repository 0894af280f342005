//! Session cache configuration
//!
//! OpenSSL keeps an internal server-side session cache per context. An
//! external backend (for example a cache shared between processes) can be
//! plugged in through [`SessionCacheProvider`]; it is attached when the
//! context is built and receives every new and evicted session.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use openssl::ssl::{SslContextBuilder, SslSession, SslSessionCacheMode};
use tracing::trace;

use super::Result;

/// External session storage
pub trait SessionCacheProvider: Send + Sync {
    /// Store a DER-encoded session under its id
    fn set_session(&self, id: &[u8], session: Vec<u8>, timeout: Duration);

    /// Fetch a DER-encoded session
    fn get_session(&self, id: &[u8]) -> Option<Vec<u8>>;

    fn remove_session(&self, id: &[u8]);
}

/// Per-context session cache switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionCacheConfig {
    /// Enable the OpenSSL server-side cache
    pub enabled: bool,
    /// Forward sessions to the external provider, if one is supplied
    pub use_external: bool,
}

impl Default for SessionCacheConfig {
    fn default() -> Self {
        SessionCacheConfig {
            enabled: true,
            use_external: true,
        }
    }
}

/// Cache tuning shared by all contexts of a manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    /// Lifetime handed to the external provider
    pub timeout: Duration,
    /// Maximum number of sessions kept by OpenSSL per context
    pub max_cache_size: u32,
}

impl Default for CacheOptions {
    fn default() -> Self {
        CacheOptions {
            timeout: Duration::from_secs(3600),
            max_cache_size: 20480,
        }
    }
}

/// Wrapper so the provider can be logged alongside the rest of the context
#[derive(Clone)]
pub(crate) struct ExternalCache(pub(crate) Arc<dyn SessionCacheProvider>);

impl fmt::Debug for ExternalCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ExternalCache")
    }
}

/// Configure the session cache of a context under construction
pub(crate) fn setup_session_cache(
    builder: &mut SslContextBuilder,
    config: &SessionCacheConfig,
    options: &CacheOptions,
    external: Option<&Arc<dyn SessionCacheProvider>>,
) -> Result<Option<ExternalCache>> {
    if !config.enabled {
        builder.set_session_cache_mode(SslSessionCacheMode::OFF);
        return Ok(None);
    }

    builder.set_session_cache_mode(SslSessionCacheMode::SERVER);
    builder.set_session_cache_size(options.max_cache_size.min(i32::MAX as u32) as i32);

    let provider = match external {
        Some(provider) if config.use_external => Arc::clone(provider),
        _ => return Ok(None),
    };

    let timeout = options.timeout;
    let store = Arc::clone(&provider);
    builder.set_new_session_callback(move |_ssl, session| {
        match session.to_der() {
            Ok(der) => {
                trace!("Storing session in external cache");
                store.set_session(session.id(), der, timeout);
            }
            Err(err) => trace!("Unable to serialize session: {}", err),
        }
    });

    let evict = Arc::clone(&provider);
    builder.set_remove_session_callback(move |_ctx, session| {
        evict.remove_session(session.id());
    });

    let fetch = Arc::clone(&provider);
    // SAFETY: sessions handed out here were serialized by the new-session
    // callback above, from a context sharing this session id context.
    unsafe {
        builder.set_get_session_callback(move |_ssl, id| {
            let der = fetch.get_session(id)?;
            SslSession::from_der(&der).ok()
        });
    }

    Ok(Some(ExternalCache(provider)))
}
