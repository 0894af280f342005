//! TLS session ticket keys
//!
//! Ticket keys are derived from operator-supplied seeds arranged in three
//! generations: `old` seeds are still accepted for decryption, `current`
//! seeds encrypt new tickets, and `new` seeds are pre-announced so that a
//! fleet rotating at slightly different times still decrypts each other's
//! tickets.
//!
//! Unlike the rest of a published context, the seeds are mutated in place by
//! rotation, so every [`TicketKeyManager`] guards its state with a lock.

use openssl::sha::Sha256;
use parking_lot::RwLock;
use tracing::debug;

/// Seed triple used to derive ticket keys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketKeySeeds {
    pub old_seeds: Vec<String>,
    pub current_seeds: Vec<String>,
    pub new_seeds: Vec<String>,
}

impl TicketKeySeeds {
    pub fn new(old_seeds: Vec<String>, current_seeds: Vec<String>, new_seeds: Vec<String>) -> Self {
        TicketKeySeeds {
            old_seeds,
            current_seeds,
            new_seeds,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.old_seeds.is_empty() && self.current_seeds.is_empty() && self.new_seeds.is_empty()
    }
}

/// Key material derived from one seed
#[derive(Clone, PartialEq, Eq)]
pub struct TicketKey {
    /// Identifies the key inside an issued ticket
    pub name: [u8; 16],
    pub hmac_key: [u8; 16],
    pub aes_key: [u8; 16],
}

impl std::fmt::Debug for TicketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketKey")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl TicketKey {
    fn derive(seed: &str) -> Self {
        let material = label_hash(b"ticket-seed", seed.as_bytes());
        let name = label_hash(b"name", &material);
        let secret = label_hash(b"secret", &material);

        let mut key = TicketKey {
            name: [0; 16],
            hmac_key: [0; 16],
            aes_key: [0; 16],
        };
        key.name.copy_from_slice(&name[..16]);
        key.hmac_key.copy_from_slice(&secret[..16]);
        key.aes_key.copy_from_slice(&secret[16..]);
        key
    }
}

fn label_hash(label: &[u8], data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(label);
    hasher.update(&[0]);
    hasher.update(data);
    hasher.finish()
}

#[derive(Debug, Default)]
struct TicketKeyState {
    seeds: TicketKeySeeds,
    keys: Vec<TicketKey>,
    encryption: Option<usize>,
}

impl TicketKeyState {
    fn from_seeds(seeds: &TicketKeySeeds) -> Self {
        let mut keys = Vec::new();
        let mut encryption = None;
        for seed in &seeds.old_seeds {
            keys.push(TicketKey::derive(seed));
        }
        for seed in &seeds.current_seeds {
            if encryption.is_none() {
                encryption = Some(keys.len());
            }
            keys.push(TicketKey::derive(seed));
        }
        for seed in &seeds.new_seeds {
            keys.push(TicketKey::derive(seed));
        }
        TicketKeyState {
            seeds: seeds.clone(),
            keys,
            encryption,
        }
    }
}

/// Ticket keys of one certificate context
///
/// The keys are not installed into OpenSSL. Contexts with seeds issue tickets
/// under OpenSSL's own keys, so rotating seeds here does not change which
/// tickets a handshake accepts.
#[derive(Debug, Default)]
pub struct TicketKeyManager {
    state: RwLock<TicketKeyState>,
}

impl TicketKeyManager {
    pub fn new(seeds: &TicketKeySeeds) -> Self {
        TicketKeyManager {
            state: RwLock::new(TicketKeyState::from_seeds(seeds)),
        }
    }

    /// Replace all seeds; keys are re-derived before the lock is taken
    pub fn set_seeds(&self, seeds: &TicketKeySeeds) {
        let next = TicketKeyState::from_seeds(seeds);
        debug!(
            "Rotating ticket keys: {} old, {} current, {} new",
            seeds.old_seeds.len(),
            seeds.current_seeds.len(),
            seeds.new_seeds.len()
        );
        *self.state.write() = next;
    }

    pub fn seeds(&self) -> TicketKeySeeds {
        self.state.read().seeds.clone()
    }

    /// Key for encrypting new tickets (derived from the first current seed)
    pub fn encryption_key(&self) -> Option<TicketKey> {
        let state = self.state.read();
        state.encryption.map(|idx| state.keys[idx].clone())
    }

    /// Key for decrypting a ticket issued under `name`
    pub fn decryption_key(&self, name: &[u8]) -> Option<TicketKey> {
        self.state
            .read()
            .keys
            .iter()
            .find(|key| key.name[..] == *name)
            .cloned()
    }
}
