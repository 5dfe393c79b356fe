use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use log::{info, warn};

use crate::orbit::cache::PropagationCache;
use crate::orbit::error::ElementError;
use crate::orbit::{OrbitalElement, PreparedElement, SatelliteId};

/// Outcome of one ingestion batch.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub added: usize,
    pub superseded: usize,
    pub ignored_older: usize,
    pub rejected: Vec<(SatelliteId, ElementError)>,
}

impl IngestReport {
    pub fn changed(&self) -> bool {
        self.added + self.superseded > 0
    }
}

/// Newest element set per satellite, shared by every observer.
///
/// Each accepted change bumps the generation counter; a cycle that started
/// under an older generation must not publish its result.
pub struct ElementCatalog {
    elements: RwLock<HashMap<SatelliteId, Arc<PreparedElement>>>,
    generation: AtomicU64,
    cache: Arc<PropagationCache>,
}

impl ElementCatalog {
    pub fn new(cache: Arc<PropagationCache>) -> Self {
        Self {
            elements: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<PropagationCache> {
        &self.cache
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn ingest<I>(&self, records: I) -> IngestReport
    where
        I: IntoIterator<Item = OrbitalElement>,
    {
        let mut report = IngestReport::default();

        // prepare outside the write lock; sgp4 initialisation is the costly part
        let mut prepared = Vec::new();
        for record in records {
            let id = record.satellite_id;
            match PreparedElement::new(record) {
                Ok(p) => prepared.push(p),
                Err(e) => {
                    warn!("Rejected element set for satellite {}: {}", id, e);
                    report.rejected.push((id, e));
                }
            }
        }

        let mut superseded = Vec::new();
        {
            let mut elements = self.elements.write().unwrap_or_else(|e| e.into_inner());
            for p in prepared {
                let id = p.satellite_id();
                match elements.get(&id) {
                    Some(current) if current.epoch() >= p.epoch() => {
                        report.ignored_older += 1;
                    }
                    Some(_) => {
                        elements.insert(id, Arc::new(p));
                        superseded.push(id);
                        report.superseded += 1;
                    }
                    None => {
                        elements.insert(id, Arc::new(p));
                        report.added += 1;
                    }
                }
            }
            if report.changed() {
                self.generation.fetch_add(1, Ordering::AcqRel);
            }
        }

        for id in superseded {
            self.cache.invalidate(id);
        }

        if report.changed() || !report.rejected.is_empty() {
            info!(
                "Ingested element sets: {} added, {} superseded, {} older ignored, {} rejected",
                report.added,
                report.superseded,
                report.ignored_older,
                report.rejected.len()
            );
        }
        report
    }

    pub fn get(&self, id: SatelliteId) -> Option<Arc<PreparedElement>> {
        self.elements
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
    }

    /// All current elements ordered by satellite id.
    pub fn snapshot(&self) -> Vec<Arc<PreparedElement>> {
        let elements = self.elements.read().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<_> = elements.values().cloned().collect();
        all.sort_by_key(|p| p.satellite_id());
        all
    }

    pub fn len(&self) -> usize {
        self.elements.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orbit::element::tests::leo_element;
    use crate::orbit::{PropagationConfig, Propagator};
    use chrono::Duration;

    fn catalog() -> ElementCatalog {
        ElementCatalog::new(Arc::new(PropagationCache::new(Duration::minutes(5), 1000)))
    }

    #[test]
    fn newer_epoch_replaces_and_bumps_generation() {
        let catalog = catalog();
        let report = catalog.ingest(vec![leo_element(1)]);
        assert_eq!(report.added, 1);
        assert_eq!(catalog.generation(), 1);

        let mut newer = leo_element(1);
        newer.epoch += Duration::hours(6);
        newer.mean_anomaly_rad = 1.0;
        let report = catalog.ingest(vec![newer.clone()]);
        assert_eq!(report.superseded, 1);
        assert_eq!(catalog.generation(), 2);
        assert_eq!(catalog.get(SatelliteId(1)).unwrap().element(), &newer);
    }

    #[test]
    fn older_or_equal_epoch_is_ignored() {
        let catalog = catalog();
        catalog.ingest(vec![leo_element(1)]);
        let mut older = leo_element(1);
        older.epoch -= Duration::hours(1);
        let report = catalog.ingest(vec![older, leo_element(1)]);
        assert_eq!(report.ignored_older, 2);
        assert_eq!(catalog.generation(), 1);
    }

    #[test]
    fn implausible_records_are_rejected_individually() {
        let catalog = catalog();
        let mut bad = leo_element(2);
        bad.eccentricity = 1.2;
        let report = catalog.ingest(vec![leo_element(1), bad]);
        assert_eq!(report.added, 1);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].0, SatelliteId(2));
        assert!(catalog.get(SatelliteId(2)).is_none());
    }

    #[test]
    fn supersession_invalidates_cached_states() {
        let catalog = catalog();
        catalog.ingest(vec![leo_element(1)]);
        let propagator =
            Propagator::with_cache(PropagationConfig::default(), catalog.cache().clone());
        let prepared = catalog.get(SatelliteId(1)).unwrap();
        propagator
            .propagate(&prepared, prepared.epoch() + Duration::minutes(1))
            .unwrap();
        assert_eq!(catalog.cache().len(), 1);

        let mut newer = leo_element(1);
        newer.epoch += Duration::hours(1);
        catalog.ingest(vec![newer]);
        assert!(catalog.cache().is_empty());
    }
}
