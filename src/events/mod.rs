//! Measurement events A4, A5 and D2 evaluated on predicted geometry.

pub mod conditions;
mod evaluator;
mod params;
mod signal;
mod types;

pub use evaluator::{EvaluationOutcome, EventEvaluator};
pub use params::{A4Config, A5Config, D2Config, EventConfig, TIME_TO_TRIGGER_MS};
pub use signal::{atmospheric_loss_db, LinkBudget};
pub use types::{
    EventKind, EventState, EventTransition, MeasurementSample, TransitionCause, TriggeredEvent,
};
