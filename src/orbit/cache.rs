use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use log::debug;

use crate::orbit::{SatelliteId, StateVector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    satellite: SatelliteId,
    at_ms: i64,
    epoch_ms: i64,
}

impl CacheKey {
    fn new(satellite: SatelliteId, at: DateTime<Utc>, epoch: DateTime<Utc>) -> Self {
        Self {
            satellite,
            at_ms: at.timestamp_millis(),
            epoch_ms: epoch.timestamp_millis(),
        }
    }
}

/// Memoised state vectors keyed by `(satellite, timestamp, element epoch)`.
///
/// Readers share the lock; inserts and invalidation take it exclusively.
/// Entries older than the TTL (relative to the newest insert) are evicted
/// whenever the capacity is reached.
pub struct PropagationCache {
    entries: RwLock<HashMap<CacheKey, StateVector>>,
    ttl: Duration,
    capacity: usize,
}

impl std::fmt::Debug for PropagationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropagationCache")
            .field("len", &self.len())
            .field("ttl", &self.ttl)
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl PropagationCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub fn get(
        &self,
        satellite: SatelliteId,
        at: DateTime<Utc>,
        epoch: DateTime<Utc>,
    ) -> Option<StateVector> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(&CacheKey::new(satellite, at, epoch)).copied()
    }

    pub fn insert(&self, state: StateVector) {
        let key = CacheKey::new(state.satellite_id, state.timestamp, state.element_epoch);
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.len() >= self.capacity {
            let cutoff = (state.timestamp - self.ttl).timestamp_millis();
            entries.retain(|k, _| k.at_ms >= cutoff);
            if entries.len() >= self.capacity {
                debug!("propagation cache full after ttl eviction, clearing");
                entries.clear();
            }
        }
        entries.insert(key, state);
    }

    /// Drop every entry of a satellite whose element set was superseded.
    pub fn invalidate(&self, satellite: SatelliteId) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.retain(|k, _| k.satellite != satellite);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orbit::PropagationModel;
    use chrono::TimeZone;

    fn state(id: u32, at: DateTime<Utc>) -> StateVector {
        StateVector {
            satellite_id: SatelliteId(id),
            timestamp: at,
            element_epoch: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            position_km: [7000.0, 0.0, 0.0],
            velocity_km_s: [0.0, 7.5, 0.0],
            model: PropagationModel::Sgp4,
            degraded: false,
        }
    }

    #[test]
    fn invalidation_only_touches_one_satellite() {
        let cache = PropagationCache::new(Duration::minutes(5), 100);
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 1, 0, 0).unwrap();
        cache.insert(state(1, at));
        cache.insert(state(2, at));
        cache.invalidate(SatelliteId(1));
        assert!(cache.get(SatelliteId(1), at, state(1, at).element_epoch).is_none());
        assert!(cache.get(SatelliteId(2), at, state(2, at).element_epoch).is_some());
    }

    #[test]
    fn different_epoch_misses() {
        let cache = PropagationCache::new(Duration::minutes(5), 100);
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 1, 0, 0).unwrap();
        cache.insert(state(1, at));
        let newer_epoch = Utc.with_ymd_and_hms(2025, 1, 1, 0, 30, 0).unwrap();
        assert!(cache.get(SatelliteId(1), at, newer_epoch).is_none());
    }

    #[test]
    fn capacity_evicts_expired_entries() {
        let cache = PropagationCache::new(Duration::minutes(1), 3);
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 1, 0, 0).unwrap();
        cache.insert(state(1, base));
        cache.insert(state(2, base));
        cache.insert(state(3, base + Duration::minutes(5)));
        cache.insert(state(4, base + Duration::minutes(5)));
        assert_eq!(cache.len(), 2);
    }
}
