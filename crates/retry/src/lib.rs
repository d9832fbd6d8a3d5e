//! # Mendstream Retry
//!
//! The stateful half of the resilience layer: the retry loop, its backoff,
//! the in-place healing callback handed to runtimes, and a scripted runtime
//! for replays and tests.

pub mod backoff;
pub mod controller;
pub mod in_place;
pub mod outcome;
pub mod scripted;

pub use backoff::Backoff;
pub use controller::{RetryController, StepRequest};
pub use in_place::InPlaceHealer;
pub use outcome::{Completion, StepOutcome, TerminalError};
pub use scripted::{ScriptedOutcome, ScriptedRuntime, ScriptedStream};
