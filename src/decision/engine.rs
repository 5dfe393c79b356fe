use crate::decision::scoring::DecisionConfig;
use crate::events::LinkBudget;
use crate::visibility::Candidate;

/// Access and handover selection for one observer's candidate pools.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    pub(super) config: DecisionConfig,
    pub(super) link_budget: LinkBudget,
}

impl DecisionEngine {
    pub fn new(config: DecisionConfig, link_budget: LinkBudget) -> Self {
        Self {
            config,
            link_budget,
        }
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    pub fn handover_score(&self, candidate: &Candidate) -> f64 {
        let rsrp = self.link_budget.rsrp_for(&candidate.geometry);
        self.config.handover_score(candidate, rsrp)
    }
}

/// Halve the confidence of anything derived from a stale element.
pub(super) fn confidence(score: f64, degraded: bool) -> f64 {
    let score = score.clamp(0.0, 1.0);
    if degraded {
        score * 0.5
    } else {
        score
    }
}

/// First candidate with the highest score; pool order breaks ties.
pub(super) fn best_by<'a, I, F>(candidates: I, mut score: F) -> Option<(&'a Candidate, f64)>
where
    I: IntoIterator<Item = &'a Candidate>,
    F: FnMut(&Candidate) -> f64,
{
    let mut best: Option<(&Candidate, f64)> = None;
    for candidate in candidates {
        let s = score(candidate);
        if best.map_or(true, |(_, b)| s > b) {
            best = Some((candidate, s));
        }
    }
    best
}
