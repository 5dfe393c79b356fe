use chrono::{DateTime, Utc};
use serde::Serialize;
use strum_macros::Display;

use crate::events::EventKind;
use crate::observer::ObserverId;
use crate::orbit::SatelliteId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Display)]
pub enum ReasonCode {
    #[serde(rename = "EVENT_TRIGGERED_A4")]
    #[strum(serialize = "EVENT_TRIGGERED_A4")]
    EventTriggeredA4,
    #[serde(rename = "EVENT_TRIGGERED_A5")]
    #[strum(serialize = "EVENT_TRIGGERED_A5")]
    EventTriggeredA5,
    #[serde(rename = "EVENT_TRIGGERED_D2")]
    #[strum(serialize = "EVENT_TRIGGERED_D2")]
    EventTriggeredD2,
    #[serde(rename = "FORCED_VISIBILITY_LOSS")]
    #[strum(serialize = "FORCED_VISIBILITY_LOSS")]
    ForcedVisibilityLoss,
    #[serde(rename = "INITIAL_ACCESS")]
    #[strum(serialize = "INITIAL_ACCESS")]
    InitialAccess,
    #[serde(rename = "NO_CANDIDATE")]
    #[strum(serialize = "NO_CANDIDATE")]
    NoCandidate,
    #[serde(rename = "NO_CHANGE")]
    #[strum(serialize = "NO_CHANGE")]
    NoChange,
}

impl ReasonCode {
    pub fn for_event(kind: EventKind) -> Self {
        match kind {
            EventKind::A4 => ReasonCode::EventTriggeredA4,
            EventKind::A5 => ReasonCode::EventTriggeredA5,
            EventKind::D2 => ReasonCode::EventTriggeredD2,
        }
    }

    /// Reason for a handover backed by several events: A5, then A4, then D2.
    pub fn for_events(kinds: &[EventKind]) -> Self {
        let kind = [EventKind::A5, EventKind::A4]
            .into_iter()
            .find(|k| kinds.contains(k))
            .unwrap_or(EventKind::D2);
        Self::for_event(kind)
    }
}

/// Why a triggered candidate was not taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Suppression {
    PingPongMargin,
    Cooldown,
}

/// Outcome of one cycle for one observer. Emitted whole or not at all.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandoverDecision {
    pub observer_id: ObserverId,
    pub serving: Option<SatelliteId>,
    /// `None` means no change.
    pub target: Option<SatelliteId>,
    pub timestamp: DateTime<Utc>,
    pub reason: ReasonCode,
    pub events: Vec<EventKind>,
    pub confidence: f64,
    /// A satellite involved was propagated from a stale element.
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suppressed: Option<Suppression>,
}

impl HandoverDecision {
    pub fn no_candidate(
        observer_id: ObserverId,
        serving: Option<SatelliteId>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            observer_id,
            serving,
            target: None,
            timestamp,
            reason: ReasonCode::NoCandidate,
            events: Vec::new(),
            confidence: 0.0,
            degraded: false,
            suppressed: None,
        }
    }

    /// Service is degraded: nothing to connect to, or stale inputs.
    pub fn is_degraded(&self) -> bool {
        self.degraded || self.reason == ReasonCode::NoCandidate
    }

    pub fn is_handover(&self) -> bool {
        self.target.is_some() && self.target != self.serving
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes_use_wire_names() {
        assert_eq!(ReasonCode::EventTriggeredA4.to_string(), "EVENT_TRIGGERED_A4");
        assert_eq!(ReasonCode::ForcedVisibilityLoss.to_string(), "FORCED_VISIBILITY_LOSS");
        assert_eq!(
            serde_json::to_string(&ReasonCode::NoChange).unwrap(),
            "\"NO_CHANGE\""
        );
    }

    #[test]
    fn a5_outranks_a4_outranks_d2() {
        use EventKind::*;
        assert_eq!(ReasonCode::for_events(&[A4, A5, D2]), ReasonCode::EventTriggeredA5);
        assert_eq!(ReasonCode::for_events(&[D2, A4]), ReasonCode::EventTriggeredA4);
        assert_eq!(ReasonCode::for_events(&[D2]), ReasonCode::EventTriggeredD2);
    }
}
