use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::events::signal::LinkBudget;
use crate::observer::ObserverId;
use crate::orbit::SatelliteId;
use crate::visibility::ObserverGeometry;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
)]
pub enum EventKind {
    A4,
    A5,
    D2,
}

/// Condition of one `(event kind, candidate)` pair of an observer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EventState {
    /// `entering_since` is set while the entry condition holds but the
    /// time-to-trigger has not yet elapsed.
    Cleared {
        entering_since: Option<DateTime<Utc>>,
    },
    /// `hysteresis` is the margin in force when the event triggered; it
    /// governs the leaving condition even if the configuration changes.
    Triggered {
        since: DateTime<Utc>,
        hysteresis: f64,
    },
}

impl EventState {
    pub const IDLE: EventState = EventState::Cleared {
        entering_since: None,
    };

    pub fn is_triggered(&self) -> bool {
        matches!(self, EventState::Triggered { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransitionCause {
    EntryCondition,
    LeavingCondition,
    CandidateLost,
    EventDisabled,
    ServingChanged,
}

/// One state change of one event, streamed as a side channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventTransition {
    pub observer_id: ObserverId,
    pub candidate: SatelliteId,
    pub kind: EventKind,
    pub triggered: bool,
    pub cause: TransitionCause,
    pub timestamp: DateTime<Utc>,
}

/// Serving and candidate measurements of one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementSample {
    pub observer_id: ObserverId,
    pub serving: SatelliteId,
    pub candidate: SatelliteId,
    pub timestamp: DateTime<Utc>,
    /// Mp
    pub serving_rsrp_dbm: f64,
    /// Mn
    pub candidate_rsrp_dbm: f64,
    /// Ml1
    pub serving_distance_km: f64,
    /// Ml2
    pub candidate_distance_km: f64,
}

impl MeasurementSample {
    pub fn from_geometry(
        observer_id: ObserverId,
        serving: &ObserverGeometry,
        candidate: &ObserverGeometry,
        budget: &LinkBudget,
    ) -> Self {
        Self {
            observer_id,
            serving: serving.satellite_id,
            candidate: candidate.satellite_id,
            timestamp: candidate.timestamp,
            serving_rsrp_dbm: budget.rsrp_for(serving),
            candidate_rsrp_dbm: budget.rsrp_for(candidate),
            serving_distance_km: serving.range_km,
            candidate_distance_km: candidate.range_km,
        }
    }
}

/// An event currently in the triggered state, with what it is ranked by.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggeredEvent {
    pub kind: EventKind,
    pub candidate: SatelliteId,
    pub since: DateTime<Utc>,
    /// `Mn + Ofn + Ocn` for A4/A5, candidate distance for D2.
    pub metric: f64,
    pub load: f64,
}
