use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};

use crate::decision::engine::{best_by, confidence, DecisionEngine};
use crate::decision::types::{HandoverDecision, ReasonCode, Suppression};
use crate::events::{EventKind, TriggeredEvent};
use crate::orbit::SatelliteId;
use crate::visibility::CandidatePool;

/// Satellites an observer recently handed over away from.
#[derive(Debug, Clone, Default)]
pub struct Cooldown {
    departures: BTreeMap<SatelliteId, DateTime<Utc>>,
}

impl Cooldown {
    pub fn record_departure(&mut self, satellite: SatelliteId, at: DateTime<Utc>) {
        self.departures.insert(satellite, at);
    }

    pub fn is_cooling(&self, satellite: SatelliteId, at: DateTime<Utc>, window: Duration) -> bool {
        self.departures
            .get(&satellite)
            .is_some_and(|left| at - *left < window)
    }

    pub fn prune(&mut self, at: DateTime<Utc>, window: Duration) {
        self.departures.retain(|_, left| at - *left < window);
    }

    pub fn len(&self) -> usize {
        self.departures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.departures.is_empty()
    }
}

impl DecisionEngine {
    /// Decide whether `serving` should be left this cycle.
    ///
    /// `triggered` is the evaluator's ranked set of events currently in the
    /// triggered state. A triggered candidate is taken only if its score
    /// beats the serving score by the ping-pong margin and it is not cooling
    /// down. Failing that, a serving window about to close (or already lost)
    /// forces a handover to the best remaining candidate.
    pub fn select_handover(
        &self,
        serving: SatelliteId,
        pool: &CandidatePool,
        triggered: &[TriggeredEvent],
        cooldown: &Cooldown,
    ) -> HandoverDecision {
        let at = pool.timestamp;
        let serving_candidate = pool.get(serving);
        let serving_score = serving_candidate.map_or(0.0, |c| self.handover_score(c));
        let serving_degraded = serving_candidate.is_some_and(|c| c.degraded);
        let mut suppressed = None;

        let decision = |target: Option<SatelliteId>, reason, events, score: f64, degraded: bool| {
            HandoverDecision {
                observer_id: pool.observer_id.clone(),
                serving: Some(serving),
                target,
                timestamp: at,
                reason,
                events,
                confidence: confidence(score, degraded),
                degraded,
                suppressed: None,
            }
        };

        let mut considered = BTreeSet::new();
        for event in triggered {
            if event.candidate == serving || !considered.insert(event.candidate) {
                continue;
            }
            let Some(candidate) = pool.get(event.candidate) else {
                continue;
            };
            if cooldown.is_cooling(candidate.satellite_id, at, self.config.cooldown) {
                suppressed.get_or_insert(Suppression::Cooldown);
                continue;
            }
            let score = self.handover_score(candidate);
            if score <= serving_score + self.config.ping_pong_margin {
                suppressed.get_or_insert(Suppression::PingPongMargin);
                continue;
            }

            let mut kinds: Vec<EventKind> = triggered
                .iter()
                .filter(|e| e.candidate == candidate.satellite_id)
                .map(|e| e.kind)
                .collect();
            kinds.sort();
            kinds.dedup();
            let reason = ReasonCode::for_events(&kinds);
            log::info!(
                "Observer {}: {} from {} to {} (score {:.3} vs {:.3})",
                pool.observer_id,
                reason,
                serving,
                candidate.satellite_id,
                score,
                serving_score
            );
            return decision(
                Some(candidate.satellite_id),
                reason,
                kinds,
                score,
                candidate.degraded || serving_degraded,
            );
        }

        let losing_serving = serving_candidate
            .map_or(true, |c| c.closes_within(at, self.config.forced_lookahead));
        if losing_serving {
            return match best_by(pool.others(serving), |c| self.handover_score(c)) {
                Some((best, score)) => {
                    log::info!(
                        "Observer {}: forced handover from {} to {} before visibility loss",
                        pool.observer_id,
                        serving,
                        best.satellite_id
                    );
                    decision(
                        Some(best.satellite_id),
                        ReasonCode::ForcedVisibilityLoss,
                        Vec::new(),
                        score,
                        best.degraded || serving_degraded,
                    )
                }
                None => {
                    log::warn!(
                        "Observer {}: serving satellite {} is being lost and no candidate is visible",
                        pool.observer_id,
                        serving
                    );
                    let mut d = HandoverDecision::no_candidate(
                        pool.observer_id.clone(),
                        Some(serving),
                        at,
                    );
                    d.degraded = serving_degraded;
                    d
                }
            };
        }

        if let Some(reason) = suppressed {
            log::debug!(
                "Observer {}: triggered handover suppressed ({})",
                pool.observer_id,
                reason
            );
        }
        let mut d = decision(
            None,
            ReasonCode::NoChange,
            Vec::new(),
            serving_score,
            serving_degraded,
        );
        d.suppressed = suppressed;
        d
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::scoring::tests::candidate;
    use crate::decision::DecisionConfig;
    use crate::events::LinkBudget;
    use crate::visibility::Candidate;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn engine() -> DecisionEngine {
        DecisionEngine::new(DecisionConfig::default(), LinkBudget::default())
    }

    fn pool(candidates: Vec<Candidate>) -> CandidatePool {
        CandidatePool::new("ntpu".into(), at(), candidates)
    }

    fn event(kind: EventKind, candidate: u32) -> TriggeredEvent {
        TriggeredEvent {
            kind,
            candidate: SatelliteId(candidate),
            since: at(),
            metric: -95.0,
            load: 0.5,
        }
    }

    #[test]
    fn no_event_and_healthy_serving_is_no_change() {
        let pool = pool(vec![candidate(1, 40.0, 300, 0.5), candidate(2, 60.0, 500, 0.1)]);
        let decision = engine().select_handover(SatelliteId(1), &pool, &[], &Cooldown::default());
        assert_eq!(decision.reason, ReasonCode::NoChange);
        assert_eq!(decision.target, None);
        assert!(!decision.is_degraded());
    }

    #[test]
    fn triggered_better_candidate_is_taken() {
        let pool = pool(vec![candidate(1, 20.0, 200, 0.7), candidate(2, 70.0, 500, 0.2)]);
        let decision = engine().select_handover(
            SatelliteId(1),
            &pool,
            &[event(EventKind::A4, 2)],
            &Cooldown::default(),
        );
        assert_eq!(decision.reason, ReasonCode::EventTriggeredA4);
        assert_eq!(decision.target, Some(SatelliteId(2)));
        assert_eq!(decision.events, vec![EventKind::A4]);
        assert!(decision.confidence > 0.0 && decision.confidence <= 1.0);
    }

    #[test]
    fn margin_blocks_marginal_candidate() {
        let pool = pool(vec![candidate(1, 45.0, 300, 0.5), candidate(2, 46.0, 300, 0.5)]);
        let decision = engine().select_handover(
            SatelliteId(1),
            &pool,
            &[event(EventKind::A4, 2)],
            &Cooldown::default(),
        );
        assert_eq!(decision.reason, ReasonCode::NoChange);
        assert_eq!(decision.suppressed, Some(Suppression::PingPongMargin));
    }

    #[test]
    fn a5_is_reported_over_a4() {
        let pool = pool(vec![candidate(1, 15.0, 200, 0.7), candidate(2, 70.0, 500, 0.2)]);
        let decision = engine().select_handover(
            SatelliteId(1),
            &pool,
            &[event(EventKind::A4, 2), event(EventKind::A5, 2), event(EventKind::D2, 2)],
            &Cooldown::default(),
        );
        assert_eq!(decision.reason, ReasonCode::EventTriggeredA5);
        assert_eq!(
            decision.events,
            vec![EventKind::A4, EventKind::A5, EventKind::D2]
        );
    }

    #[test]
    fn cooling_candidate_is_skipped_on_event_path() {
        let pool = pool(vec![candidate(1, 20.0, 200, 0.7), candidate(2, 70.0, 500, 0.2)]);
        let mut cooldown = Cooldown::default();
        cooldown.record_departure(SatelliteId(2), at() - Duration::seconds(10));
        let decision =
            engine().select_handover(SatelliteId(1), &pool, &[event(EventKind::A4, 2)], &cooldown);
        assert_eq!(decision.reason, ReasonCode::NoChange);
        assert_eq!(decision.suppressed, Some(Suppression::Cooldown));
    }

    #[test]
    fn closing_window_forces_handover_without_event() {
        let pool = pool(vec![candidate(1, 12.0, 20, 0.5), candidate(2, 30.0, 400, 0.9)]);
        let decision = engine().select_handover(SatelliteId(1), &pool, &[], &Cooldown::default());
        assert_eq!(decision.reason, ReasonCode::ForcedVisibilityLoss);
        assert_eq!(decision.target, Some(SatelliteId(2)));
    }

    #[test]
    fn forced_path_ignores_margin_and_cooldown() {
        let pool = pool(vec![candidate(1, 40.0, 10, 0.1), candidate(2, 11.0, 60, 0.9)]);
        let mut cooldown = Cooldown::default();
        cooldown.record_departure(SatelliteId(2), at() - Duration::seconds(5));
        let decision = engine().select_handover(SatelliteId(1), &pool, &[], &cooldown);
        assert_eq!(decision.target, Some(SatelliteId(2)));
    }

    #[test]
    fn lost_serving_with_empty_pool_is_no_candidate() {
        let decision = engine().select_handover(
            SatelliteId(1),
            &pool(vec![]),
            &[event(EventKind::A4, 2)],
            &Cooldown::default(),
        );
        assert_eq!(decision.reason, ReasonCode::NoCandidate);
        assert_eq!(decision.target, None);
        assert!(decision.is_degraded());
    }

    #[test]
    fn stale_target_halves_confidence() {
        let mut stale = candidate(2, 70.0, 500, 0.2);
        stale.degraded = true;
        let fresh = candidate(2, 70.0, 500, 0.2);
        let serving = candidate(1, 20.0, 200, 0.7);
        let events = [event(EventKind::A4, 2)];

        let engine = engine();
        let a = engine.select_handover(
            SatelliteId(1),
            &pool(vec![serving.clone(), fresh]),
            &events,
            &Cooldown::default(),
        );
        let b = engine.select_handover(
            SatelliteId(1),
            &pool(vec![serving, stale]),
            &events,
            &Cooldown::default(),
        );
        assert!(b.is_degraded());
        approx::assert_relative_eq!(b.confidence, a.confidence * 0.5, epsilon = 1e-12);
    }

    #[test]
    fn cooldown_expires() {
        let mut cooldown = Cooldown::default();
        cooldown.record_departure(SatelliteId(3), at());
        let window = Duration::seconds(30);
        assert!(cooldown.is_cooling(SatelliteId(3), at() + Duration::seconds(29), window));
        assert!(!cooldown.is_cooling(SatelliteId(3), at() + Duration::seconds(30), window));
        cooldown.prune(at() + Duration::seconds(31), window);
        assert!(cooldown.is_empty());
    }
}
