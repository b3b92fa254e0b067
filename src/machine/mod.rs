//! Phase state machine
//!
//! A pure `(phase, signal) -> (phase, effects)` function plus [`apply`], which
//! folds the result into a [`SessionContext`](crate::session::SessionContext).

pub mod signal;
pub mod transition;

pub use signal::{Effect, FailedStep, Signal};
pub use transition::{apply, transition, Transition};
