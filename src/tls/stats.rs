//! SNI statistics
//!
//! A [`SniStats`] sink can be attached to the manager at any time; the
//! dispatcher reads it on every handshake.

use std::sync::atomic::{AtomicU64, Ordering};

use super::key::CertCrypto;

/// Receives one event per dispatch decision
///
/// All methods default to no-ops so sinks only implement what they track.
pub trait SniStats: Send + Sync {
    /// Client hello carried a server name
    fn record_present_hostname(&self) {}

    /// Client hello had no server name; the default name was used
    fn record_absent_hostname(&self) {}

    /// A server name was matched to a context
    fn record_match(&self) {}

    /// A server name matched nothing
    fn record_not_match(&self) {}

    /// Strength the client asked for versus the strength it was given
    fn record_cert_crypto(&self, _requested: CertCrypto, _served: CertCrypto) {}
}

fn slot(crypto: CertCrypto) -> usize {
    match crypto {
        CertCrypto::Sha1Signature => 0,
        CertCrypto::BestAvailable => 1,
    }
}

/// Lock-free counters
#[derive(Debug, Default)]
pub struct SniCounters {
    present: AtomicU64,
    absent: AtomicU64,
    matched: AtomicU64,
    not_matched: AtomicU64,
    crypto: [[AtomicU64; 2]; 2],
}

impl SniCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn present_hostname(&self) -> u64 {
        self.present.load(Ordering::Relaxed)
    }

    pub fn absent_hostname(&self) -> u64 {
        self.absent.load(Ordering::Relaxed)
    }

    pub fn matched(&self) -> u64 {
        self.matched.load(Ordering::Relaxed)
    }

    pub fn not_matched(&self) -> u64 {
        self.not_matched.load(Ordering::Relaxed)
    }

    /// Dispatches that requested `requested` and were served `served`
    pub fn cert_crypto(&self, requested: CertCrypto, served: CertCrypto) -> u64 {
        self.crypto[slot(requested)][slot(served)].load(Ordering::Relaxed)
    }
}

impl SniStats for SniCounters {
    fn record_present_hostname(&self) {
        self.present.fetch_add(1, Ordering::Relaxed);
    }

    fn record_absent_hostname(&self) {
        self.absent.fetch_add(1, Ordering::Relaxed);
    }

    fn record_match(&self) {
        self.matched.fetch_add(1, Ordering::Relaxed);
    }

    fn record_not_match(&self) {
        self.not_matched.fetch_add(1, Ordering::Relaxed);
    }

    fn record_cert_crypto(&self, requested: CertCrypto, served: CertCrypto) {
        self.crypto[slot(requested)][slot(served)].fetch_add(1, Ordering::Relaxed);
    }
}
