//! # Mendstream Core
//!
//! Domain types and traits for the Mendstream conversation resilience layer.
//! This crate does no I/O. It defines the message model, the failure shapes
//! a streaming runtime can report, and the seams (runtime, store, events)
//! that the other crates implement against.

pub mod error;
pub mod event;
pub mod failure;
pub mod message;
pub mod retryable;
pub mod runtime;
pub mod store;
pub mod workflow;

// Re-export key types at crate root for ergonomics
pub use error::StoreError;
pub use event::{ResilienceEvent, ResilienceEventBus};
pub use failure::{FieldViolation, PathSegment, StreamFailure, TransportCause};
pub use message::{ConversationMessage, MessagePart, PairingViolation, StepId, ToolCallLocation};
pub use retryable::{HealingStrategy, RetryableError, RetryableErrorKind};
pub use runtime::{AttemptContext, AttemptFailure, ErrorCallback, ErrorVerdict, NoHealing, StreamRuntime};
pub use store::ConversationStore;
pub use workflow::{WorkflowContext, WorkflowStep};
