//! Process-local cache of `(principal, permission)` decisions.
//!
//! Entries expire after a fixed TTL and the cache holds at most
//! `max_entries` keys. When full, the key inserted earliest is evicted,
//! regardless of how recently it was read: eviction is first-in-first-out,
//! not least-recently-used. Re-setting a live key keeps its original slot in
//! that order.
//!
//! Every invalidation bumps a generation counter. A caller that computes a
//! decision across an await reads [`PermissionCache::generation`] first and
//! stores through [`PermissionCache::set_if_generation`], so a result computed
//! before an invalidation is never written back after it.
//!
//! The cache is not shared across processes; each instance of the service
//! keeps its own copy.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use schoolgate_core_types::{Decision, Permission, PrincipalId, Role};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_MAX_ENTRIES: usize = 1_000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct CacheKey {
    pub principal: PrincipalId,
    pub permission: Permission,
}

impl CacheKey {
    pub fn new(principal: PrincipalId, permission: impl Into<Permission>) -> Self {
        Self {
            principal,
            permission: permission.into(),
        }
    }
}

/// Cached decision plus the wall-clock time it was computed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub allowed: bool,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    /// Role the decision was computed for. Ids are only unique per role, so
    /// readers compare this before trusting a hit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl CacheEntry {
    pub fn from_decision(decision: &Decision) -> Self {
        Self {
            allowed: decision.allowed,
            reason: decision.reason.clone(),
            timestamp: Utc::now(),
            role: None,
        }
    }

    pub fn for_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    /// True when the entry was computed for `role`, or for no role at all.
    pub fn applies_to(&self, role: Role) -> bool {
        self.role.map_or(true, |cached| cached == role)
    }

    pub fn decision(&self) -> Decision {
        Decision {
            allowed: self.allowed,
            reason: self.reason.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub ttl_ms: u64,
}

struct Slot {
    entry: CacheEntry,
    inserted_at: Instant,
    seq: u64,
}

#[derive(Default)]
struct CacheState {
    slots: HashMap<CacheKey, Slot>,
    // Insertion order; may hold stale pairs for keys removed out of order.
    order: VecDeque<(u64, CacheKey)>,
    next_seq: u64,
    generation: u64,
}

impl CacheState {
    fn is_live(&self, seq: u64, key: &CacheKey) -> bool {
        self.slots.get(key).map(|slot| slot.seq == seq).unwrap_or(false)
    }

    fn evict_oldest(&mut self) -> Option<CacheKey> {
        while let Some((seq, key)) = self.order.pop_front() {
            if self.is_live(seq, &key) {
                self.slots.remove(&key);
                return Some(key);
            }
        }
        None
    }

    fn insert(&mut self, key: CacheKey, entry: CacheEntry, max_entries: usize) {
        let now = Instant::now();
        if let Some(slot) = self.slots.get_mut(&key) {
            slot.entry = entry;
            slot.inserted_at = now;
            return;
        }

        while self.slots.len() >= max_entries {
            match self.evict_oldest() {
                Some(evicted) => debug!(
                    principal_id = %evicted.principal,
                    permission = %evicted.permission,
                    "permission cache full; evicted earliest entry"
                ),
                None => break,
            }
        }

        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.order.push_back((seq, key.clone()));
        self.slots.insert(
            key,
            Slot {
                entry,
                inserted_at: now,
                seq,
            },
        );
        self.compact_order(max_entries);
    }

    fn compact_order(&mut self, max_entries: usize) {
        if self.order.len() <= max_entries.saturating_mul(2) {
            return;
        }
        let order = std::mem::take(&mut self.order);
        self.order = order
            .into_iter()
            .filter(|(seq, key)| self.is_live(*seq, key))
            .collect();
    }
}

pub struct PermissionCache {
    config: CacheConfig,
    state: Mutex<CacheState>,
}

impl PermissionCache {
    pub fn new(config: CacheConfig) -> Self {
        let config = CacheConfig {
            ttl: config.ttl,
            max_entries: config.max_entries.max(1),
        };
        Self {
            config,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn with_limits(ttl: Duration, max_entries: usize) -> Self {
        Self::new(CacheConfig { ttl, max_entries })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the live entry for the key; expired entries are dropped and miss.
    pub fn get(&self, principal: PrincipalId, permission: &Permission) -> Option<CacheEntry> {
        let key = CacheKey::new(principal, permission.clone());
        let mut state = self.state.lock();
        let expired = match state.slots.get(&key) {
            None => return None,
            Some(slot) => slot.inserted_at.elapsed() >= self.config.ttl,
        };
        if expired {
            state.slots.remove(&key);
            debug!(principal_id = %principal, %permission, "permission cache entry expired");
            return None;
        }
        state.slots.get(&key).map(|slot| slot.entry.clone())
    }

    pub fn set(&self, principal: PrincipalId, permission: &Permission, entry: CacheEntry) {
        let key = CacheKey::new(principal, permission.clone());
        self.state.lock().insert(key, entry, self.config.max_entries);
    }

    /// Current invalidation generation.
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Stores the entry only if no invalidation happened since `generation`
    /// was read. Returns whether the entry was stored.
    pub fn set_if_generation(
        &self,
        generation: u64,
        principal: PrincipalId,
        permission: &Permission,
        entry: CacheEntry,
    ) -> bool {
        let key = CacheKey::new(principal, permission.clone());
        let mut state = self.state.lock();
        if state.generation != generation {
            debug!(
                principal_id = %principal,
                %permission,
                "dropping decision computed before an invalidation"
            );
            return false;
        }
        state.insert(key, entry, self.config.max_entries);
        true
    }

    /// Drops every entry held for the principal. Returns how many were removed.
    pub fn invalidate_user(&self, principal: PrincipalId) -> usize {
        let mut state = self.state.lock();
        state.generation = state.generation.wrapping_add(1);
        let before = state.slots.len();
        state.slots.retain(|key, _| key.principal != principal);
        let removed = before - state.slots.len();
        state.compact_order(self.config.max_entries);
        debug!(principal_id = %principal, removed, "invalidated cached permissions");
        removed
    }

    pub fn invalidate_all(&self) {
        let mut state = self.state.lock();
        state.generation = state.generation.wrapping_add(1);
        state.slots.clear();
        state.order.clear();
        debug!("invalidated all cached permissions");
    }

    /// Removes expired entries eagerly. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let ttl = self.config.ttl;
        let mut state = self.state.lock();
        let before = state.slots.len();
        state.slots.retain(|_, slot| slot.inserted_at.elapsed() < ttl);
        let removed = before - state.slots.len();
        state.compact_order(self.config.max_entries);
        removed
    }

    pub fn len(&self) -> usize {
        self.state.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.len(),
            max_size: self.config.max_entries,
            ttl_ms: u64::try_from(self.config.ttl.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl Default for PermissionCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
