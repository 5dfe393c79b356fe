use crate::decision::engine::{best_by, confidence, DecisionEngine};
use crate::decision::types::{HandoverDecision, ReasonCode};
use crate::orbit::SatelliteId;
use crate::visibility::CandidatePool;

impl DecisionEngine {
    /// Attachment target for an observer without a serving satellite.
    ///
    /// Scores elevation, remaining visibility and load; `None` only when
    /// the pool is empty.
    pub fn select_initial_access(&self, pool: &CandidatePool) -> Option<SatelliteId> {
        best_by(pool.iter(), |c| self.config.access_score(c)).map(|(c, _)| c.satellite_id)
    }

    pub fn initial_access(&self, pool: &CandidatePool) -> HandoverDecision {
        let Some((best, score)) = best_by(pool.iter(), |c| self.config.access_score(c)) else {
            return HandoverDecision::no_candidate(pool.observer_id.clone(), None, pool.timestamp);
        };
        HandoverDecision {
            observer_id: pool.observer_id.clone(),
            serving: None,
            target: Some(best.satellite_id),
            timestamp: pool.timestamp,
            reason: ReasonCode::InitialAccess,
            events: Vec::new(),
            confidence: confidence(score, best.degraded),
            degraded: best.degraded,
            suppressed: None,
        }
    }
}
