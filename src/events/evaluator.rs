use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use crate::events::conditions::{
    a4_entering, a4_leaving, a5_entering, a5_leaving, d2_entering, d2_leaving,
};
use crate::events::params::EventConfig;
use crate::events::types::{
    EventKind, EventState, EventTransition, MeasurementSample, TransitionCause, TriggeredEvent,
};
use crate::observer::ObserverId;
use crate::orbit::SatelliteId;
use crate::visibility::LoadTable;

type StateKey = (EventKind, SatelliteId);

/// Result of one evaluation step. Nothing is applied until the caller
/// commits `next`.
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    /// Changes this cycle only.
    pub transitions: Vec<EventTransition>,
    /// Events in the triggered state after this cycle, best candidate first.
    pub triggered: Vec<TriggeredEvent>,
    pub next: EventEvaluator,
}

/// A4/A5/D2 state machines of one observer, keyed by event kind and candidate.
#[derive(Debug, Clone)]
pub struct EventEvaluator {
    observer_id: ObserverId,
    config: EventConfig,
    states: BTreeMap<StateKey, EventState>,
}

impl EventEvaluator {
    pub fn new(observer_id: ObserverId, config: EventConfig) -> Self {
        Self {
            observer_id,
            config,
            states: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &EventConfig {
        &self.config
    }

    /// New parameters apply to future entries; triggered events keep the
    /// hysteresis they triggered with. Triggered events of a kind that is no
    /// longer enabled clear on the next evaluation with
    /// [`TransitionCause::EventDisabled`].
    pub fn set_config(&mut self, config: EventConfig) {
        self.config = config;
    }

    pub fn state(&self, kind: EventKind, candidate: SatelliteId) -> EventState {
        self.states
            .get(&(kind, candidate))
            .copied()
            .unwrap_or(EventState::IDLE)
    }

    pub fn triggered_count(&self) -> usize {
        self.states.values().filter(|s| s.is_triggered()).count()
    }

    pub fn evaluate(
        &self,
        samples: &[MeasurementSample],
        loads: &LoadTable,
        at: DateTime<Utc>,
    ) -> EvaluationOutcome {
        let mut next = BTreeMap::new();
        let mut transitions = Vec::new();
        let mut seen = BTreeSet::new();
        let mut latest: BTreeMap<SatelliteId, &MeasurementSample> = BTreeMap::new();

        for sample in samples.iter().filter(|s| s.candidate != s.serving) {
            if !seen.insert(sample.candidate) {
                continue;
            }
            latest.insert(sample.candidate, sample);

            for &kind in &self.config.enabled {
                let key = (kind, sample.candidate);
                let current = self.state(kind, sample.candidate);
                let updated = match current {
                    EventState::Cleared { entering_since } => {
                        let hysteresis = self.config.hysteresis(kind);
                        if self.entering(kind, sample, hysteresis) {
                            let since = entering_since.unwrap_or(at);
                            if at - since >= self.config.time_to_trigger {
                                transitions.push(self.transition(
                                    kind,
                                    sample.candidate,
                                    true,
                                    TransitionCause::EntryCondition,
                                    at,
                                ));
                                EventState::Triggered {
                                    since: at,
                                    hysteresis,
                                }
                            } else {
                                EventState::Cleared {
                                    entering_since: Some(since),
                                }
                            }
                        } else {
                            EventState::IDLE
                        }
                    }
                    EventState::Triggered { hysteresis, .. } => {
                        if self.leaving(kind, sample, hysteresis) {
                            transitions.push(self.transition(
                                kind,
                                sample.candidate,
                                false,
                                TransitionCause::LeavingCondition,
                                at,
                            ));
                            EventState::IDLE
                        } else {
                            current
                        }
                    }
                };
                if updated != EventState::IDLE {
                    next.insert(key, updated);
                }
            }
        }

        for (&(kind, candidate), state) in &self.states {
            if state.is_triggered() && !next.contains_key(&(kind, candidate)) {
                let cause = if !seen.contains(&candidate) {
                    TransitionCause::CandidateLost
                } else if !self.config.is_enabled(kind) {
                    TransitionCause::EventDisabled
                } else {
                    continue;
                };
                transitions.push(self.transition(kind, candidate, false, cause, at));
            }
        }
        transitions.sort_by_key(|t| (t.candidate, t.kind));

        let mut triggered: Vec<TriggeredEvent> = next
            .iter()
            .filter_map(|(&(kind, candidate), state)| match state {
                EventState::Triggered { since, .. } => {
                    let sample = latest.get(&candidate)?;
                    Some(TriggeredEvent {
                        kind,
                        candidate,
                        since: *since,
                        metric: self.ranking_metric(kind, sample),
                        load: loads.load(candidate),
                    })
                }
                EventState::Cleared { .. } => None,
            })
            .collect();
        triggered.sort_by(rank);

        for t in &transitions {
            log::debug!(
                "Observer {}: {} {} for satellite {} ({})",
                self.observer_id,
                t.kind,
                if t.triggered { "triggered" } else { "cleared" },
                t.candidate,
                t.cause
            );
        }

        EvaluationOutcome {
            transitions,
            triggered,
            next: Self {
                observer_id: self.observer_id.clone(),
                config: self.config.clone(),
                states: next,
            },
        }
    }

    /// Drop every state, reporting triggered events as cleared by `cause`.
    pub fn reset(&self, at: DateTime<Utc>, cause: TransitionCause) -> EvaluationOutcome {
        let transitions = self
            .states
            .iter()
            .filter(|(_, s)| s.is_triggered())
            .map(|(&(kind, candidate), _)| self.transition(kind, candidate, false, cause, at))
            .collect();
        EvaluationOutcome {
            transitions,
            triggered: Vec::new(),
            next: Self::new(self.observer_id.clone(), self.config.clone()),
        }
    }

    /// Apply a staged outcome, returning its transitions.
    pub fn commit(&mut self, outcome: EvaluationOutcome) -> Vec<EventTransition> {
        *self = outcome.next;
        outcome.transitions
    }

    fn entering(&self, kind: EventKind, s: &MeasurementSample, hys: f64) -> bool {
        let ofn = self.config.frequency_offset_db;
        let ocn = self.config.cell_offset_db(s.candidate);
        match kind {
            EventKind::A4 => a4_entering(
                s.candidate_rsrp_dbm,
                ofn,
                ocn,
                hys,
                self.config.a4.threshold_dbm,
            ),
            EventKind::A5 => a5_entering(
                s.serving_rsrp_dbm,
                s.candidate_rsrp_dbm,
                ofn,
                ocn,
                hys,
                self.config.a5.threshold1_dbm,
                self.config.a5.threshold2_dbm,
            ),
            EventKind::D2 => d2_entering(
                s.serving_distance_km,
                s.candidate_distance_km,
                hys,
                self.config.d2.threshold1_km,
                self.config.d2.threshold2_km,
            ),
        }
    }

    fn leaving(&self, kind: EventKind, s: &MeasurementSample, hys: f64) -> bool {
        let ofn = self.config.frequency_offset_db;
        let ocn = self.config.cell_offset_db(s.candidate);
        match kind {
            EventKind::A4 => a4_leaving(
                s.candidate_rsrp_dbm,
                ofn,
                ocn,
                hys,
                self.config.a4.threshold_dbm,
            ),
            EventKind::A5 => a5_leaving(
                s.serving_rsrp_dbm,
                s.candidate_rsrp_dbm,
                ofn,
                ocn,
                hys,
                self.config.a5.threshold1_dbm,
                self.config.a5.threshold2_dbm,
            ),
            EventKind::D2 => d2_leaving(
                s.serving_distance_km,
                s.candidate_distance_km,
                hys,
                self.config.d2.threshold1_km,
                self.config.d2.threshold2_km,
            ),
        }
    }

    fn ranking_metric(&self, kind: EventKind, s: &MeasurementSample) -> f64 {
        match kind {
            EventKind::A4 | EventKind::A5 => {
                s.candidate_rsrp_dbm
                    + self.config.frequency_offset_db
                    + self.config.cell_offset_db(s.candidate)
            }
            EventKind::D2 => s.candidate_distance_km,
        }
    }

    fn transition(
        &self,
        kind: EventKind,
        candidate: SatelliteId,
        triggered: bool,
        cause: TransitionCause,
        at: DateTime<Utc>,
    ) -> EventTransition {
        EventTransition {
            observer_id: self.observer_id.clone(),
            candidate,
            kind,
            triggered,
            cause,
            timestamp: at,
        }
    }
}

/// Signal events before distance events; within signal events the larger
/// `Mn + Ofn + Ocn` wins, within D2 the closer candidate; then lower load.
fn rank(a: &TriggeredEvent, b: &TriggeredEvent) -> Ordering {
    let group = |e: &TriggeredEvent| matches!(e.kind, EventKind::D2) as u8;
    group(a)
        .cmp(&group(b))
        .then_with(|| match a.kind {
            EventKind::D2 => a.metric.total_cmp(&b.metric),
            _ => b.metric.total_cmp(&a.metric),
        })
        .then_with(|| a.load.total_cmp(&b.load))
        .then_with(|| a.candidate.cmp(&b.candidate))
        .then_with(|| a.kind.cmp(&b.kind))
}
