//! Per-observer cycles and the runtime that drives them.

mod cycle;
mod error;
mod scheduler;
mod simulate;

pub use cycle::{CycleOutcome, CycleOutput, ObserverPipeline};
pub use error::PipelineError;
pub use scheduler::{load_elements, ObserverStatus, Scheduler};
pub use simulate::simulate;
