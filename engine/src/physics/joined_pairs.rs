//! Registry of part pairs that are currently rigidly joined
//!
//! Read by the contact callbacks for every candidate pair, written only when
//! joins are created or broken. Also tracks a short per-part cooldown after
//! joints are broken so freshly separated parts do not dock again at once.

use crate::scene::PartId;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use tracing::trace;

/// Unordered pair of parts, stored with the smaller id first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartPair(PartId, PartId);

impl PartPair {
    pub fn new(a: PartId, b: PartId) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    pub fn first(&self) -> PartId {
        self.0
    }

    pub fn second(&self) -> PartId {
        self.1
    }

    pub fn contains(&self, part: PartId) -> bool {
        self.0 == part || self.1 == part
    }
}

#[derive(Debug, Default)]
pub struct JoinedPairRegistry {
    pairs: RwLock<HashSet<PartPair>>,
    /// Part -> tick until which it may not auto-join
    cooldowns: RwLock<HashMap<PartId, u64>>,
    tick: AtomicU64,
}

impl JoinedPairRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, a: PartId, b: PartId) -> bool {
        self.pairs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&PartPair::new(a, b))
    }

    /// Insert the pair and report whether it was absent. The check and the
    /// insert happen under one write lock, so of two racing callers exactly
    /// one wins.
    pub fn try_claim(&self, a: PartId, b: PartId) -> bool {
        let claimed = self
            .pairs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(PartPair::new(a, b));
        if claimed {
            trace!(%a, %b, "Claimed joined pair");
        }
        claimed
    }

    pub fn insert(&self, a: PartId, b: PartId) {
        self.try_claim(a, b);
    }

    pub fn remove(&self, a: PartId, b: PartId) -> bool {
        self.pairs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&PartPair::new(a, b))
    }

    /// Drop every pair involving `part`, returning what was removed
    pub fn remove_part(&self, part: PartId) -> Vec<PartPair> {
        let mut pairs = self.pairs.write().unwrap_or_else(PoisonError::into_inner);
        let removed: Vec<PartPair> = pairs.iter().filter(|p| p.contains(part)).copied().collect();
        for pair in &removed {
            pairs.remove(pair);
        }
        removed
    }

    pub fn pairs_involving(&self, part: PartId) -> Vec<PartPair> {
        self.pairs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|p| p.contains(part))
            .copied()
            .collect()
    }

    pub fn snapshot(&self) -> Vec<PartPair> {
        let mut pairs: Vec<PartPair> = self
            .pairs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect();
        pairs.sort();
        pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current simulation tick, used to expire cooldowns
    pub fn tick(&self) -> u64 {
        self.tick.load(Ordering::Acquire)
    }

    pub fn set_tick(&self, tick: u64) {
        self.tick.store(tick, Ordering::Release);
        let mut cooldowns = self.cooldowns.write().unwrap_or_else(PoisonError::into_inner);
        cooldowns.retain(|_, until| *until > tick);
    }

    pub fn start_cooldown(&self, part: PartId, ticks: u64) {
        if ticks == 0 {
            return;
        }
        let until = self.tick().saturating_add(ticks);
        let mut cooldowns = self.cooldowns.write().unwrap_or_else(PoisonError::into_inner);
        let entry = cooldowns.entry(part).or_insert(until);
        *entry = (*entry).max(until);
    }

    pub fn in_cooldown(&self, part: PartId) -> bool {
        let tick = self.tick();
        self.cooldowns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&part)
            .is_some_and(|until| *until > tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (PartId, PartId, PartId) {
        (PartId::from_bits(1), PartId::from_bits(2), PartId::from_bits(3))
    }

    #[test]
    fn test_pair_is_unordered() {
        let (a, b, _) = ids();
        assert_eq!(PartPair::new(a, b), PartPair::new(b, a));
        assert_eq!(PartPair::new(b, a).first(), a);
    }

    #[test]
    fn test_claim_only_once() {
        let (a, b, _) = ids();
        let registry = JoinedPairRegistry::new();
        assert!(registry.try_claim(a, b));
        assert!(!registry.try_claim(b, a));
        assert!(registry.contains(b, a));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_part() {
        let (a, b, c) = ids();
        let registry = JoinedPairRegistry::new();
        registry.insert(a, b);
        registry.insert(b, c);
        registry.insert(a, c);

        let removed = registry.remove_part(b);
        assert_eq!(removed.len(), 2);
        assert!(registry.pairs_involving(b).is_empty());
        assert!(registry.contains(a, c));
    }

    #[test]
    fn test_cooldown_expires() {
        let (a, b, _) = ids();
        let registry = JoinedPairRegistry::new();
        registry.set_tick(10);
        registry.start_cooldown(a, 5);

        assert!(registry.in_cooldown(a));
        assert!(!registry.in_cooldown(b));

        registry.set_tick(14);
        assert!(registry.in_cooldown(a));
        registry.set_tick(15);
        assert!(!registry.in_cooldown(a));
    }

    #[test]
    fn test_concurrent_claims_have_one_winner() {
        let (a, b, _) = ids();
        let registry = std::sync::Arc::new(JoinedPairRegistry::new());
        let winners: usize = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.try_claim(a, b))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| usize::from(handle.join().unwrap()))
            .sum();
        assert_eq!(winners, 1);
    }
}
