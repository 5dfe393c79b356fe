use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::observer::Observer;
use crate::orbit::{PreparedElement, PropagationError, Propagator, SatelliteId};
use crate::visibility::types::{Observation, ObserverGeometry, VisibilityConfig, VisibilityWindow};

/// Propagates single satellites for one observer and locates mask crossings.
#[derive(Debug, Clone)]
pub struct Sampler {
    observer: Observer,
    propagator: Propagator,
    step: Duration,
    resolution: Duration,
    horizon: Duration,
}

impl Sampler {
    pub fn new(observer: Observer, propagator: Propagator, config: &VisibilityConfig) -> Self {
        Self {
            observer,
            propagator,
            step: config.scan_step,
            resolution: config.refine_resolution,
            horizon: config.exit_horizon,
        }
    }

    pub fn observer(&self) -> &Observer {
        &self.observer
    }

    pub fn geometry(
        &self,
        prepared: &PreparedElement,
        at: DateTime<Utc>,
    ) -> Result<ObserverGeometry, PropagationError> {
        let state = self.propagator.propagate(prepared, at)?;
        Ok(ObserverGeometry::compute(&self.observer, &state))
    }

    /// Geometry of every element at one shared instant. Satellites that
    /// fail to propagate are excluded with a logged reason.
    pub fn observe_all(&self, elements: &[Arc<PreparedElement>], at: DateTime<Utc>) -> Observation {
        let mut observation = Observation {
            at,
            geometries: BTreeMap::new(),
            excluded: Vec::new(),
        };
        let states = self
            .propagator
            .propagate_batch(elements.iter().map(|p| p.as_ref()), at);
        for (id, result) in states {
            match result {
                Ok(state) => {
                    observation
                        .geometries
                        .insert(id, ObserverGeometry::compute(&self.observer, &state));
                }
                Err(e) => {
                    log::warn!(
                        "Observer {}: satellite {} excluded at {}: {}",
                        self.observer.id,
                        id,
                        at,
                        e
                    );
                    observation.excluded.push((id, e));
                }
            }
        }
        observation
    }

    /// Satellites that cannot be propagated count as below the mask.
    pub fn above(&self, prepared: &PreparedElement, at: DateTime<Utc>) -> bool {
        self.geometry(prepared, at).is_ok_and(|g| g.visible)
    }

    /// Bisect the crossing between `before` and `after`; returns the first
    /// instant (to within the resolution) that has the same state as `after`.
    pub fn refine_crossing(
        &self,
        prepared: &PreparedElement,
        before: DateTime<Utc>,
        after: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let target = self.above(prepared, after);
        let mut low = before;
        let mut high = after;
        while high - low > self.resolution {
            let mid = low + (high - low) / 2;
            if self.above(prepared, mid) == target {
                high = mid;
            } else {
                low = mid;
            }
        }
        high
    }

    /// First down-crossing after `from` within the exit horizon.
    pub fn predict_exit(
        &self,
        prepared: &PreparedElement,
        from: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let limit = from + self.horizon;
        let mut prev = from;
        while prev < limit {
            let cursor = (prev + self.step).min(limit);
            if !self.above(prepared, cursor) {
                return Some(self.refine_crossing(prepared, prev, cursor));
            }
            prev = cursor;
        }
        None
    }
}

/// Resume point of a [`WindowScan`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanCheckpoint {
    pub origin: DateTime<Utc>,
    pub resume_from: DateTime<Utc>,
    pub last_emitted: Option<(DateTime<Utc>, SatelliteId)>,
}

#[derive(Debug)]
struct ScanTrack {
    entry: DateTime<Utc>,
    entry_clipped: bool,
    below_since: Option<DateTime<Utc>>,
}

type WindowKey = (DateTime<Utc>, SatelliteId);

/// Lazily yields the visibility windows of all satellites over one observer,
/// ordered by `(entry, satellite id)`.
///
/// Sampling runs on a fixed grid anchored at the scan origin, so a scan
/// resumed from a checkpoint reproduces the same crossing times and skips
/// what was already yielded.
pub struct WindowScan {
    sampler: Sampler,
    elements: Vec<Arc<PreparedElement>>,
    dwell: Duration,
    step: Duration,
    origin: DateTime<Utc>,
    end: DateTime<Utc>,
    cursor: DateTime<Utc>,
    prev_sample: Option<DateTime<Utc>>,
    tracks: BTreeMap<SatelliteId, ScanTrack>,
    ready: BTreeMap<WindowKey, VisibilityWindow>,
    last_emitted: Option<WindowKey>,
    failing: BTreeSet<SatelliteId>,
    finished: bool,
}

impl WindowScan {
    pub fn new(
        observer: Observer,
        propagator: Propagator,
        elements: Vec<Arc<PreparedElement>>,
        config: &VisibilityConfig,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            sampler: Sampler::new(observer, propagator, config),
            elements,
            dwell: config.dwell,
            step: config.scan_step,
            origin: start,
            end,
            cursor: start,
            prev_sample: None,
            tracks: BTreeMap::new(),
            ready: BTreeMap::new(),
            last_emitted: None,
            failing: BTreeSet::new(),
            finished: start > end,
        }
    }

    pub fn resume(
        observer: Observer,
        propagator: Propagator,
        elements: Vec<Arc<PreparedElement>>,
        config: &VisibilityConfig,
        end: DateTime<Utc>,
        checkpoint: ScanCheckpoint,
    ) -> Self {
        let mut scan = Self::new(observer, propagator, elements, config, checkpoint.origin, end);
        scan.cursor = checkpoint.resume_from;
        scan.last_emitted = checkpoint.last_emitted;
        scan.finished = checkpoint.resume_from > end;
        scan
    }

    /// Everything before the earliest window not yet yielded can be skipped
    /// on resume.
    pub fn checkpoint(&self) -> ScanCheckpoint {
        let pending = self
            .tracks
            .values()
            .map(|t| t.entry)
            .chain(self.ready.keys().map(|k| k.0))
            .min();
        let scanned = self.prev_sample.unwrap_or(self.cursor);
        let earliest = pending.map_or(scanned, |p| p.min(scanned));
        ScanCheckpoint {
            origin: self.origin,
            resume_from: self.grid_floor(earliest),
            last_emitted: self.last_emitted,
        }
    }

    fn grid_floor(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        if t <= self.origin {
            return self.origin;
        }
        let step_ms = self.step.num_milliseconds().max(1);
        let k = (t - self.origin).num_milliseconds() / step_ms;
        self.origin + Duration::milliseconds(k * step_ms)
    }

    /// Entry of a satellite already visible at the first sample of this scan.
    fn reconstruct_entry(&self, prepared: &PreparedElement, at: DateTime<Utc>) -> (DateTime<Utc>, bool) {
        let mut later = at;
        while later > self.origin {
            let earlier = later - self.step;
            if earlier < self.origin {
                break;
            }
            if !self.sampler.above(prepared, earlier) {
                return (self.sampler.refine_crossing(prepared, earlier, later), false);
            }
            later = earlier;
        }
        (self.origin, true)
    }

    fn advance(&mut self) -> bool {
        if self.finished {
            return false;
        }
        let t = self.cursor;
        if t > self.end {
            self.flush();
            self.finished = true;
            return false;
        }

        let observer_id = self.sampler.observer().id.clone();
        for prepared in &self.elements {
            let id = prepared.satellite_id();
            let visible = match self.sampler.geometry(prepared, t) {
                Ok(g) => {
                    self.failing.remove(&id);
                    g.visible
                }
                Err(e) => {
                    if self.failing.insert(id) {
                        log::warn!("Satellite {} excluded from scan at {}: {}", id, t, e);
                    }
                    false
                }
            };

            match (self.tracks.get_mut(&id), visible) {
                (None, true) => {
                    let (entry, entry_clipped) = match self.prev_sample {
                        Some(prev) => (self.sampler.refine_crossing(prepared, prev, t), false),
                        None => self.reconstruct_entry(prepared, t),
                    };
                    self.tracks.insert(
                        id,
                        ScanTrack {
                            entry,
                            entry_clipped,
                            below_since: None,
                        },
                    );
                }
                (Some(track), true) => track.below_since = None,
                (Some(track), false) => {
                    let prev = self.prev_sample.unwrap_or(t);
                    let below_since = *track
                        .below_since
                        .get_or_insert_with(|| self.sampler.refine_crossing(prepared, prev, t));
                    if t - below_since >= self.dwell {
                        let mut window = VisibilityWindow::open(
                            id,
                            observer_id.clone(),
                            track.entry,
                            track.entry_clipped,
                        );
                        window.close(below_since);
                        self.ready.insert((window.entry, id), window);
                        self.tracks.remove(&id);
                    }
                }
                (None, false) => {}
            }
        }

        self.prev_sample = Some(t);
        self.cursor = if t < self.end {
            (t + self.step).min(self.end)
        } else {
            t + self.step
        };
        true
    }

    /// Windows still open at the end of the range.
    fn flush(&mut self) {
        let observer_id = self.sampler.observer().id.clone();
        let tracks = std::mem::take(&mut self.tracks);
        for (id, track) in tracks {
            let mut window =
                VisibilityWindow::open(id, observer_id.clone(), track.entry, track.entry_clipped);
            match track.below_since {
                Some(below_since) => window.close(below_since),
                None => {
                    let exit = self
                        .elements
                        .iter()
                        .find(|p| p.satellite_id() == id)
                        .and_then(|p| self.sampler.predict_exit(p, self.end));
                    window.refine_exit(exit);
                }
            }
            self.ready.insert((window.entry, id), window);
        }
    }

    fn pop_ready(&mut self) -> Option<VisibilityWindow> {
        let key = *self.ready.keys().next()?;
        let blocked = self
            .tracks
            .iter()
            .map(|(id, t)| (t.entry, *id))
            .min()
            .is_some_and(|open| open < key);
        if blocked && !self.finished {
            return None;
        }
        self.ready.remove(&key)
    }
}

impl Iterator for WindowScan {
    type Item = VisibilityWindow;

    fn next(&mut self) -> Option<VisibilityWindow> {
        loop {
            while let Some(window) = self.pop_ready() {
                let key = (window.entry, window.satellite_id);
                if self.last_emitted.is_some_and(|last| key <= last) {
                    continue;
                }
                self.last_emitted = Some(key);
                return Some(window);
            }
            if !self.advance() && self.ready.is_empty() {
                return None;
            }
        }
    }
}
