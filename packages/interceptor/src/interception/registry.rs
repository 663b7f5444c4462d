// packages/interceptor/src/interception/registry.rs
//! Handler registry with copy-on-iterate snapshots
//!
//! Each chain (preprocessors, interceptors) lives in its own registry.
//! Dispatch never iterates the live chain: it takes an immutable snapshot in
//! registration order, so a registration or removal racing with an in-flight
//! dispatch only affects later dispatches.
//!
//! # Layout
//!
//! ```text
//! RwLock<Chain>
//! ├─ entries:   seq → (key, handler)   (BTreeMap, registration order)
//! ├─ positions: key → seq              (O(1) removal lookup)
//! └─ snapshot:  Arc<[entry]>           (rebuilt lazily after a mutation)
//! ```

use crate::interception::handle::{HandlerKey, HandlerKind};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// A handler together with the key it was registered under
pub struct Registered<T: ?Sized> {
    pub key: HandlerKey,
    pub handler: Arc<T>,
}

impl<T: ?Sized> Clone for Registered<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            handler: Arc::clone(&self.handler),
        }
    }
}

/// Immutable view of a chain, in registration order
pub type Snapshot<T> = Arc<[Registered<T>]>;

struct Chain<T: ?Sized> {
    next_seq: u64,
    entries: BTreeMap<u64, Registered<T>>,
    positions: HashMap<HandlerKey, u64>,
    snapshot: Option<Snapshot<T>>,
}

/// Thread-safe ordered registry of handlers keyed by opaque handles
pub struct HandlerRegistry<T: ?Sized> {
    kind: HandlerKind,
    chain: RwLock<Chain<T>>,
}

impl<T: ?Sized> HandlerRegistry<T> {
    /// Create an empty registry issuing keys of `kind`
    pub fn new(kind: HandlerKind) -> Self {
        Self {
            kind,
            chain: RwLock::new(Chain {
                next_seq: 0,
                entries: BTreeMap::new(),
                positions: HashMap::new(),
                snapshot: None,
            }),
        }
    }

    pub fn kind(&self) -> HandlerKind {
        self.kind
    }

    /// Append a handler to the end of the chain
    pub fn register(&self, handler: Arc<T>) -> HandlerKey {
        let key = HandlerKey::generate(self.kind);

        let mut chain = self.chain.write();
        let seq = chain.next_seq;
        chain.next_seq += 1;
        chain.entries.insert(seq, Registered { key, handler });
        chain.positions.insert(key, seq);
        chain.snapshot = None;

        debug!("Registered {:?} {}", self.kind, key);
        key
    }

    /// Remove a handler. Unknown keys, keys of another kind and repeated
    /// removals are no-ops; returns whether anything was removed.
    pub fn unregister(&self, key: &HandlerKey) -> bool {
        if key.kind() != self.kind {
            return false;
        }

        let mut chain = self.chain.write();
        match chain.positions.remove(key) {
            Some(seq) => {
                chain.entries.remove(&seq);
                chain.snapshot = None;
                debug!("Unregistered {:?} {}", self.kind, key);
                true
            }
            None => false,
        }
    }

    /// Current chain in registration order
    pub fn snapshot(&self) -> Snapshot<T> {
        if let Some(snapshot) = &self.chain.read().snapshot {
            return Arc::clone(snapshot);
        }

        let mut chain = self.chain.write();
        if let Some(snapshot) = &chain.snapshot {
            return Arc::clone(snapshot);
        }

        let snapshot: Snapshot<T> = chain.entries.values().cloned().collect();
        chain.snapshot = Some(Arc::clone(&snapshot));
        snapshot
    }

    pub fn contains(&self, key: &HandlerKey) -> bool {
        self.chain.read().positions.contains_key(key)
    }

    /// Keys in registration order
    pub fn keys(&self) -> Vec<HandlerKey> {
        self.chain.read().entries.values().map(|e| e.key).collect()
    }

    pub fn len(&self) -> usize {
        self.chain.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every handler
    pub fn clear(&self) {
        let mut chain = self.chain.write();
        chain.entries.clear();
        chain.positions.clear();
        chain.snapshot = None;
    }
}
