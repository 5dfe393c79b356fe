//! Visibility windows and candidate pools of ground observers.

mod pool;
mod scan;
mod tracker;
mod types;

pub use pool::{Candidate, CandidatePool, LoadTable};
pub use scan::{Sampler, ScanCheckpoint, WindowScan};
pub use tracker::{VisibilityTracker, WindowChange};
pub use types::{Observation, ObserverGeometry, VisibilityConfig, VisibilityWindow, WindowStatus};
