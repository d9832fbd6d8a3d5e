//! # Mendstream Healing
//!
//! The pure half of the resilience layer: classify a stream failure, pick a
//! repair plan for it, and apply that plan to a conversation. Nothing here
//! sleeps, performs I/O, or holds state between calls.

pub mod classify;
pub mod describe;
pub mod repair;
pub mod strategy;
pub mod user_message;

pub use classify::{Classifier, ClassifierOptions, classify};
pub use describe::describe_failure;
pub use repair::{OrphanLocation, find_orphaned_call, repair};
pub use strategy::{StrategyPlan, plan_for, strategy_for};
pub use user_message::user_facing_message;
