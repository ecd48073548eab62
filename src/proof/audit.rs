//! Audit Ticks
//!
//! Server-nominated ticks at which a checkpoint is mandatory, regardless of
//! the periodic interval. Drawn from the session, not by the client, so a
//! client cannot choose where its state gets fingerprinted.

use std::collections::BTreeSet;

use serde::{Serialize, Deserialize};

use crate::core::rng::{derive_seed, DeterministicRng, Seed};

/// Sorted, de-duplicated set of audit ticks. Read-only once issued.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditTicks(BTreeSet<u32>);

impl AuditTicks {
    /// No audit ticks.
    pub fn none() -> Self {
        Self::default()
    }

    /// Build from explicit ticks. Tick 0 is dropped (nothing happens there).
    pub fn new<I: IntoIterator<Item = u32>>(ticks: I) -> Self {
        Self(ticks.into_iter().filter(|t| *t > 0).collect())
    }

    /// Draw `count` ticks in `1..=horizon` from an RNG keyed on the session
    /// id and seed. Duplicates collapse, so the set may hold fewer.
    pub fn derive(session_id: &[u8], seed: Seed, horizon: u32, count: u32) -> Self {
        if horizon == 0 {
            return Self::none();
        }
        let key = derive_seed(b"FORTRESS_AUDIT_TICKS_V1", &[session_id, &seed.to_le_bytes()]);
        let mut rng = DeterministicRng::from_u64(key);
        Self::new((0..count).map(|_| 1 + rng.next_int(horizon)))
    }

    /// Is `tick` an audit tick?
    #[inline]
    pub fn contains(&self, tick: u32) -> bool {
        self.0.contains(&tick)
    }

    /// Ticks in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }

    /// First audit tick strictly after `tick`.
    pub fn next_after(&self, tick: u32) -> Option<u32> {
        self.0.range(tick.saturating_add(1)..).next().copied()
    }

    /// Number of ticks.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Is the set empty?
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sorts_and_dedups() {
        let audit = AuditTicks::new([90, 0, 45, 90, 7]);
        assert_eq!(audit.iter().collect::<Vec<_>>(), vec![7, 45, 90]);
        assert!(audit.contains(45));
        assert!(!audit.contains(0));
        assert_eq!(audit.next_after(7), Some(45));
        assert_eq!(audit.next_after(90), None);
    }

    #[test]
    fn test_derive_is_deterministic_and_bounded() {
        let a = AuditTicks::derive(b"session-a", 12345, 1000, 16);
        let b = AuditTicks::derive(b"session-a", 12345, 1000, 16);
        assert_eq!(a, b);
        assert!(!a.is_empty() && a.len() <= 16);
        assert!(a.iter().all(|t| (1..=1000).contains(&t)));

        assert_ne!(a, AuditTicks::derive(b"session-b", 12345, 1000, 16));
        assert_ne!(a, AuditTicks::derive(b"session-a", 12346, 1000, 16));
        assert!(AuditTicks::derive(b"x", 1, 0, 16).is_empty());
    }

    #[test]
    fn test_serializes_as_sorted_list() {
        let audit = AuditTicks::new([30, 10]);
        assert_eq!(serde_json::to_string(&audit).unwrap(), "[10,30]");
    }
}
