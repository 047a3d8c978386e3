//! Domain types and pure logic for the check-in call engine.
//!
//! Nothing in this crate performs I/O: schedule matching, the call status
//! state machine, script rendering, webhook payload modelling and transcript
//! heuristics are all deterministic functions over plain values.

pub mod analysis;
pub mod calls;
pub mod error;
pub mod schedule;
pub mod script;
pub mod webhook;
