use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::observer::ObserverId;
use crate::orbit::SatelliteId;
use crate::visibility::pool::{Candidate, CandidatePool, LoadTable};
use crate::visibility::types::{ObserverGeometry, VisibilityConfig, VisibilityWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum WindowChange {
    Opened { satellite_id: SatelliteId },
    Closed { satellite_id: SatelliteId },
}

#[derive(Debug, Clone)]
struct Track {
    window: VisibilityWindow,
    below_since: Option<DateTime<Utc>>,
    exit_checked_at: DateTime<Utc>,
}

/// Per-observer visibility windows, advanced once per cycle.
///
/// The tracker is a plain value: a cycle works on a clone and the pipeline
/// swaps it in when the cycle commits.
#[derive(Debug, Clone)]
pub struct VisibilityTracker {
    observer_id: ObserverId,
    config: VisibilityConfig,
    started: bool,
    tracks: BTreeMap<SatelliteId, Track>,
    closed: Vec<VisibilityWindow>,
}

impl VisibilityTracker {
    pub fn new(observer_id: ObserverId, config: VisibilityConfig) -> Self {
        Self {
            observer_id,
            config,
            started: false,
            tracks: BTreeMap::new(),
            closed: Vec::new(),
        }
    }

    /// Advance to `at`.
    ///
    /// `geometries` holds every satellite that could be propagated this cycle;
    /// a tracked satellite missing from it counts as below the mask.
    /// `predict_exit` is asked for a fresh exit estimate when a window opens
    /// and whenever the refresh interval elapsed.
    pub fn update<F>(
        &mut self,
        at: DateTime<Utc>,
        geometries: &BTreeMap<SatelliteId, ObserverGeometry>,
        mut predict_exit: F,
    ) -> Vec<WindowChange>
    where
        F: FnMut(SatelliteId, DateTime<Utc>) -> Option<DateTime<Utc>>,
    {
        let mut changes = Vec::new();

        for (id, geometry) in geometries.iter().filter(|(_, g)| g.visible) {
            match self.tracks.get_mut(id) {
                Some(track) => {
                    track.below_since = None;
                    let overdue = track.window.predicted_exit.is_some_and(|exit| exit <= at);
                    if overdue || at - track.exit_checked_at >= self.config.exit_refresh {
                        track.window.refine_exit(predict_exit(*id, at));
                        track.exit_checked_at = at;
                    }
                }
                None => {
                    let mut window = VisibilityWindow::open(
                        *id,
                        self.observer_id.clone(),
                        geometry.timestamp,
                        !self.started,
                    );
                    window.refine_exit(predict_exit(*id, at));
                    log::debug!(
                        "Observer {}: window opened for satellite {} (exit {:?})",
                        self.observer_id,
                        id,
                        window.predicted_exit
                    );
                    self.tracks.insert(
                        *id,
                        Track {
                            window,
                            below_since: None,
                            exit_checked_at: at,
                        },
                    );
                    changes.push(WindowChange::Opened { satellite_id: *id });
                }
            }
        }

        let mut closing = Vec::new();
        for (id, track) in self.tracks.iter_mut() {
            if geometries.get(id).is_some_and(|g| g.visible) {
                continue;
            }
            let below_since = *track.below_since.get_or_insert(at);
            if at - below_since >= self.config.dwell {
                closing.push((*id, below_since));
            }
        }
        for (id, closed_at) in closing {
            if let Some(mut track) = self.tracks.remove(&id) {
                track.window.close(closed_at);
                log::debug!(
                    "Observer {}: window closed for satellite {} at {}",
                    self.observer_id,
                    id,
                    closed_at
                );
                self.closed.push(track.window);
                changes.push(WindowChange::Closed { satellite_id: id });
            }
        }

        let retention = self.config.retention;
        self.closed
            .retain(|w| w.closed_at().is_some_and(|closed_at| closed_at + retention >= at));
        self.started = true;
        changes
    }

    /// Open window of `satellite`, including one whose satellite is inside
    /// the dwell period below the mask.
    pub fn window(&self, satellite: SatelliteId) -> Option<&VisibilityWindow> {
        self.tracks.get(&satellite).map(|t| &t.window)
    }

    pub fn open_windows(&self) -> impl Iterator<Item = &VisibilityWindow> {
        self.tracks.values().map(|t| &t.window)
    }

    /// Recently closed windows kept for audit.
    pub fn closed_windows(&self) -> &[VisibilityWindow] {
        &self.closed
    }

    /// Candidates visible at `at`, each with its window and load.
    pub fn pool(
        &self,
        at: DateTime<Utc>,
        geometries: &BTreeMap<SatelliteId, ObserverGeometry>,
        loads: &LoadTable,
    ) -> CandidatePool {
        let candidates = geometries
            .values()
            .filter(|g| g.visible)
            .filter_map(|g| {
                let window = self.window(g.satellite_id)?;
                Some(Candidate {
                    satellite_id: g.satellite_id,
                    geometry: *g,
                    window_entry: window.entry,
                    predicted_exit: window.predicted_exit,
                    remaining_visibility: window.remaining(at, self.config.exit_horizon),
                    load: loads.load(g.satellite_id),
                    degraded: g.degraded,
                })
            })
            .collect();
        CandidatePool::new(self.observer_id.clone(), at, candidates)
    }
}
