use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::decision::{Cooldown, DecisionEngine, HandoverDecision, HandoverStats, ReasonCode};
use crate::events::{
    EventEvaluator, EventTransition, LinkBudget, MeasurementSample, TransitionCause,
};
use crate::observer::Observer;
use crate::orbit::{PreparedElement, Propagator, SatelliteId};
use crate::visibility::{
    LoadTable, Observation, Sampler, VisibilityTracker, VisibilityWindow, WindowChange,
};

/// Everything one observer carries from cycle to cycle.
#[derive(Debug, Clone)]
struct PipelineState {
    serving: Option<SatelliteId>,
    tracker: VisibilityTracker,
    evaluator: EventEvaluator,
    cooldown: Cooldown,
    stats: HandoverStats,
}

/// A planned cycle. Nothing of it is visible until committed.
#[derive(Debug)]
pub struct CycleOutcome {
    pub at: DateTime<Utc>,
    pub decision: HandoverDecision,
    pub transitions: Vec<EventTransition>,
    pub window_changes: Vec<WindowChange>,
    /// Satellites left out this cycle because propagation failed.
    pub excluded: Vec<SatelliteId>,
    next: PipelineState,
}

/// What a committed cycle publishes.
#[derive(Debug, Clone)]
pub struct CycleOutput {
    pub decision: HandoverDecision,
    pub transitions: Vec<EventTransition>,
}

/// Propagate, track visibility, evaluate events and decide, for one observer.
///
/// `plan_cycle` works on a copy of the state; `commit` swaps the copy in,
/// so a cycle is applied entirely or not at all.
#[derive(Debug)]
pub struct ObserverPipeline {
    observer: Observer,
    sampler: Sampler,
    link_budget: LinkBudget,
    loads: LoadTable,
    engine: DecisionEngine,
    state: PipelineState,
}

impl ObserverPipeline {
    pub fn new(observer: Observer, config: &Config, propagator: Propagator) -> Self {
        let state = PipelineState {
            serving: None,
            tracker: VisibilityTracker::new(observer.id.clone(), config.visibility.clone()),
            evaluator: EventEvaluator::new(observer.id.clone(), config.events.clone()),
            cooldown: Cooldown::default(),
            stats: HandoverStats::default(),
        };
        Self {
            sampler: Sampler::new(observer.clone(), propagator, &config.visibility),
            link_budget: config.link_budget.clone(),
            loads: config.loads.clone(),
            engine: DecisionEngine::new(config.decision.clone(), config.link_budget.clone()),
            observer,
            state,
        }
    }

    pub fn observer(&self) -> &Observer {
        &self.observer
    }

    pub fn serving(&self) -> Option<SatelliteId> {
        self.state.serving
    }

    /// Attach to `satellite` without a decision, e.g. to restore a link.
    pub fn set_serving(&mut self, satellite: Option<SatelliteId>) {
        self.state.serving = satellite;
    }

    pub fn stats(&self) -> &HandoverStats {
        &self.state.stats
    }

    pub fn evaluator(&self) -> &EventEvaluator {
        &self.state.evaluator
    }

    pub fn open_windows(&self) -> impl Iterator<Item = &VisibilityWindow> {
        self.state.tracker.open_windows()
    }

    pub fn loads_mut(&mut self) -> &mut LoadTable {
        &mut self.loads
    }

    /// Plan a cycle at `at` against the current element set.
    pub fn plan_cycle(&self, at: DateTime<Utc>, elements: &[Arc<PreparedElement>]) -> CycleOutcome {
        let observation = self.sampler.observe_all(elements, at);
        let by_id: HashMap<SatelliteId, &PreparedElement> = elements
            .iter()
            .map(|p| (p.satellite_id(), p.as_ref()))
            .collect();
        self.plan_observed(&observation, |id, from| {
            by_id
                .get(&id)
                .and_then(|p| self.sampler.predict_exit(p, from))
        })
    }

    /// Plan a cycle from already computed geometry.
    pub fn plan_observed<F>(&self, observation: &Observation, predict_exit: F) -> CycleOutcome
    where
        F: FnMut(SatelliteId, DateTime<Utc>) -> Option<DateTime<Utc>>,
    {
        let at = observation.at;
        let mut next = self.state.clone();

        let window_changes = next
            .tracker
            .update(at, &observation.geometries, predict_exit);
        let pool = next.tracker.pool(at, &observation.geometries, &self.loads);
        next.cooldown.prune(at, self.engine.config().cooldown);
        log::debug!(
            "Observer {}: {} candidates at {}",
            self.observer.id,
            pool.len(),
            at
        );

        let mut transitions = Vec::new();
        let decision = match next.serving {
            None => {
                let decision = self.engine.initial_access(&pool);
                if let Some(target) = decision.target {
                    log::info!(
                        "Observer {}: initial access to satellite {}",
                        self.observer.id,
                        target
                    );
                    next.serving = Some(target);
                }
                decision
            }
            Some(serving) => {
                let samples: Vec<MeasurementSample> = match observation.geometries.get(&serving) {
                    Some(serving_geometry) => pool
                        .others(serving)
                        .map(|c| {
                            MeasurementSample::from_geometry(
                                self.observer.id.clone(),
                                serving_geometry,
                                &c.geometry,
                                &self.link_budget,
                            )
                        })
                        .collect(),
                    None => Vec::new(),
                };
                let evaluation = next.evaluator.evaluate(&samples, &self.loads, at);
                let decision = self.engine.select_handover(
                    serving,
                    &pool,
                    &evaluation.triggered,
                    &next.cooldown,
                );
                transitions = evaluation.transitions;
                next.evaluator = evaluation.next;

                if let Some(target) = decision.target {
                    next.cooldown.record_departure(serving, at);
                    next.serving = Some(target);
                    let reset = next.evaluator.reset(at, TransitionCause::ServingChanged);
                    transitions.extend(reset.transitions);
                    next.evaluator = reset.next;
                } else if decision.reason == ReasonCode::NoCandidate && !pool.contains(serving) {
                    log::warn!(
                        "Observer {}: lost serving satellite {} with no replacement",
                        self.observer.id,
                        serving
                    );
                    next.serving = None;
                }
                decision
            }
        };

        next.stats.record(&decision);
        CycleOutcome {
            at,
            decision,
            transitions,
            window_changes,
            excluded: observation.excluded.iter().map(|(id, _)| *id).collect(),
            next,
        }
    }

    pub fn commit(&mut self, outcome: CycleOutcome) -> CycleOutput {
        self.state = outcome.next;
        CycleOutput {
            decision: outcome.decision,
            transitions: outcome.transitions,
        }
    }

    /// Drop a planned cycle whose inputs went stale.
    pub fn discard(&mut self, outcome: CycleOutcome) {
        log::warn!(
            "Observer {}: discarded cycle at {} after an element update",
            self.observer.id,
            outcome.at
        );
        self.state.stats.record_discard();
    }

    pub fn run_cycle(&mut self, at: DateTime<Utc>, elements: &[Arc<PreparedElement>]) -> CycleOutput {
        let outcome = self.plan_cycle(at, elements);
        self.commit(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orbit::test_support::{leo_element, ISS_LINE1, ISS_LINE2};
    use crate::orbit::{OrbitalElement, PropagationConfig};
    use crate::visibility::ObserverGeometry;
    use chrono::{Duration, TimeZone};
    use std::collections::BTreeMap;

    fn t(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(seconds)
    }

    fn config() -> Config {
        Config::from_str(
            r#"
observers:
  - id: ntpu
    location: { latitude_deg: 24.94, longitude_deg: 121.37 }
"#,
        )
        .unwrap()
    }

    fn pipeline() -> ObserverPipeline {
        let config = config();
        ObserverPipeline::new(
            config.observers[0].clone(),
            &config,
            Propagator::new(PropagationConfig::default()),
        )
    }

    fn observation(at: DateTime<Utc>, sats: &[(u32, f64, f64)]) -> Observation {
        let geometries: BTreeMap<_, _> = sats
            .iter()
            .map(|&(id, elevation_deg, range_km)| {
                (
                    SatelliteId(id),
                    ObserverGeometry {
                        satellite_id: SatelliteId(id),
                        timestamp: at,
                        elevation_deg,
                        azimuth_deg: 0.0,
                        range_km,
                        range_rate_km_s: 0.0,
                        visible: elevation_deg >= 10.0,
                        degraded: false,
                    },
                )
            })
            .collect();
        Observation {
            at,
            geometries,
            excluded: Vec::new(),
        }
    }

    fn far_exit(_: SatelliteId, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        Some(at + Duration::minutes(8))
    }

    #[test]
    fn first_cycle_attaches_to_best_candidate() {
        let mut p = pipeline();
        let outcome = p.plan_observed(&observation(t(0), &[(1, 30.0, 1000.0), (2, 70.0, 580.0)]), far_exit);
        assert_eq!(outcome.decision.reason, ReasonCode::InitialAccess);
        assert_eq!(p.serving(), None);
        let output = p.commit(outcome);
        assert_eq!(output.decision.target, Some(SatelliteId(2)));
        assert_eq!(p.serving(), Some(SatelliteId(2)));
    }

    #[test]
    fn discarded_cycle_leaves_state_untouched() {
        let mut p = pipeline();
        let outcome = p.plan_observed(&observation(t(0), &[(1, 30.0, 1000.0)]), far_exit);
        p.discard(outcome);
        assert_eq!(p.serving(), None);
        assert_eq!(p.stats().cycles, 0);
        assert_eq!(p.stats().discarded_cycles, 1);
        assert_eq!(p.open_windows().count(), 0);
    }

    #[test]
    fn losing_serving_without_candidates_detaches() {
        let mut p = pipeline();
        p.set_serving(Some(SatelliteId(1)));
        let outcome = p.plan_observed(&observation(t(0), &[(1, 2.0, 2500.0)]), far_exit);
        let output = p.commit(outcome);
        assert_eq!(output.decision.reason, ReasonCode::NoCandidate);
        assert!(output.decision.is_degraded());
        assert_eq!(p.serving(), None);
    }

    #[test]
    fn handover_resets_event_state() {
        let mut config = config();
        config.events.time_to_trigger = Duration::zero();
        config.events.enabled = vec![crate::events::EventKind::A4];
        let mut p = ObserverPipeline::new(
            config.observers[0].clone(),
            &config,
            Propagator::new(PropagationConfig::default()),
        );
        p.set_serving(Some(SatelliteId(1)));
        p.loads_mut().set(SatelliteId(1), 0.9);
        p.loads_mut().set(SatelliteId(2), 0.1);

        let output = p.commit(p.plan_observed(
            &observation(t(0), &[(1, 15.0, 1900.0), (2, 80.0, 560.0)]),
            far_exit,
        ));
        assert_eq!(output.decision.reason, ReasonCode::EventTriggeredA4);
        assert_eq!(p.serving(), Some(SatelliteId(2)));
        assert!(output
            .transitions
            .iter()
            .any(|t| t.cause == TransitionCause::ServingChanged));
        assert_eq!(p.evaluator().triggered_count(), 0);
    }

    #[test]
    fn orbit_driven_cycles_run_end_to_end() {
        let mut p = pipeline();
        let elements: Vec<_> = (1..=12)
            .map(|id| {
                let mut e = leo_element(id);
                e.raan_rad = (id as f64) * 0.5;
                e.mean_anomaly_rad = (id as f64) * 0.9;
                Arc::new(PreparedElement::new(e).unwrap())
            })
            .collect();
        let start = elements[0].epoch();
        for i in 0..30 {
            let output = p.run_cycle(start + Duration::seconds(i * 10), &elements);
            assert!((0.0..=1.0).contains(&output.decision.confidence));
        }
        assert_eq!(p.stats().cycles, 30);
    }

    #[test]
    fn stale_elements_are_excluded_or_degrade_without_failing_the_cycle() {
        let config = Config::from_str(
            r#"
observers:
  - id: ottawa
    location: { latitude_deg: 45.42, longitude_deg: -75.70 }
"#,
        )
        .unwrap();
        let mut p = ObserverPipeline::new(
            config.observers[0].clone(),
            &config,
            Propagator::new(config.propagation.clone()),
        );

        let iss = OrbitalElement::from_tle(Some("ISS".into()), ISS_LINE1, ISS_LINE2, None).unwrap();
        let aged = |id: u32, age: Duration| {
            let mut e = iss.clone();
            e.satellite_id = SatelliteId(id);
            e.epoch = iss.epoch - age;
            Arc::new(PreparedElement::new(e).unwrap())
        };
        // current element, but its ground track stays far south of the observer
        let mut equatorial = iss.clone();
        equatorial.satellite_id = SatelliteId(1);
        equatorial.inclination_rad = 5f64.to_radians();
        let elements = vec![
            Arc::new(PreparedElement::new(equatorial).unwrap()),
            aged(2, Duration::days(4)),
            aged(3, Duration::days(8)),
        ];

        let start = iss.epoch;
        let mut access = None;
        for i in 0..2880 {
            let at = start + Duration::seconds(i * 30);
            let observation = p.sampler.observe_all(&elements, at);
            assert!(!observation.geometries[&SatelliteId(1)].degraded);
            assert!(observation.geometries[&SatelliteId(2)].degraded);
            assert!(!observation.geometries.contains_key(&SatelliteId(3)));

            let outcome = p.plan_cycle(at, &elements);
            assert_eq!(outcome.excluded, vec![SatelliteId(3)]);
            assert_ne!(outcome.decision.target, Some(SatelliteId(3)));
            let output = p.commit(outcome);

            let pool = p.state.tracker.pool(at, &observation.geometries, &p.loads);
            assert!(pool.get(SatelliteId(3)).is_none());
            if let Some(candidate) = pool.get(SatelliteId(2)) {
                assert!(candidate.degraded);
            }
            if output.decision.reason == ReasonCode::InitialAccess && access.is_none() {
                access = Some(output.decision);
            }
        }

        assert_eq!(p.stats().cycles, 2880);
        let decision = access.expect("no pass within a day");
        assert_eq!(decision.target, Some(SatelliteId(2)));
        assert!(decision.degraded);
        assert!(decision.confidence <= 0.5);
    }
}
