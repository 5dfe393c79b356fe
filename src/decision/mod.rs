//! Initial access and handover selection.

mod access;
mod engine;
mod handover;
mod scoring;
mod stats;
mod types;

pub use engine::DecisionEngine;
pub use handover::Cooldown;
pub use scoring::{AccessWeights, DecisionConfig, HandoverWeights};
pub use stats::HandoverStats;
pub use types::{HandoverDecision, ReasonCode, Suppression};
