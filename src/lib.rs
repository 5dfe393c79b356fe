//! Satellite access and handover decisions for ground observers of a LEO
//! constellation: orbit propagation, visibility windows, 3GPP A4/A5/D2
//! measurement events and the selection that acts on them.

pub mod config;
pub mod decision;
pub mod events;
pub mod observer;
pub mod orbit;
pub mod pipeline;
pub mod visibility;
