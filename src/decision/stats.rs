use std::collections::BTreeMap;

use serde::Serialize;

use crate::decision::types::{HandoverDecision, ReasonCode, Suppression};

/// Per-observer decision counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HandoverStats {
    pub cycles: u64,
    pub handovers: u64,
    pub by_reason: BTreeMap<ReasonCode, u64>,
    pub ping_pong_suppressed: u64,
    pub cooldown_suppressed: u64,
    pub degraded_decisions: u64,
    pub discarded_cycles: u64,
}

impl HandoverStats {
    pub fn record(&mut self, decision: &HandoverDecision) {
        self.cycles += 1;
        *self.by_reason.entry(decision.reason).or_default() += 1;
        if decision.is_handover() && decision.reason != ReasonCode::InitialAccess {
            self.handovers += 1;
        }
        match decision.suppressed {
            Some(Suppression::PingPongMargin) => self.ping_pong_suppressed += 1,
            Some(Suppression::Cooldown) => self.cooldown_suppressed += 1,
            None => {}
        }
        if decision.is_degraded() {
            self.degraded_decisions += 1;
        }
    }

    pub fn record_discard(&mut self) {
        self.discarded_cycles += 1;
    }

    pub fn count(&self, reason: ReasonCode) -> u64 {
        self.by_reason.get(&reason).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orbit::SatelliteId;
    use chrono::{TimeZone, Utc};

    fn decision(reason: ReasonCode, target: Option<u32>) -> HandoverDecision {
        HandoverDecision {
            observer_id: "ntpu".into(),
            serving: Some(SatelliteId(1)),
            target: target.map(SatelliteId),
            timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            reason,
            events: Vec::new(),
            confidence: 0.5,
            degraded: false,
            suppressed: None,
        }
    }

    #[test]
    fn counts_by_reason_and_handovers() {
        let mut stats = HandoverStats::default();
        stats.record(&decision(ReasonCode::NoChange, None));
        stats.record(&decision(ReasonCode::EventTriggeredA4, Some(2)));
        let mut suppressed = decision(ReasonCode::NoChange, None);
        suppressed.suppressed = Some(Suppression::PingPongMargin);
        stats.record(&suppressed);
        stats.record(&decision(ReasonCode::NoCandidate, None));

        assert_eq!(stats.cycles, 4);
        assert_eq!(stats.handovers, 1);
        assert_eq!(stats.count(ReasonCode::NoChange), 2);
        assert_eq!(stats.ping_pong_suppressed, 1);
        assert_eq!(stats.degraded_decisions, 1);
    }
}
