//! Application layer containing the payment lifecycle orchestration.
//!
//! `FeeEngine` is the primary entry point. It delegates to one service per
//! concern: the generator bills parents, the selector chooses who to remind,
//! the dispatcher fans reminders out with per-recipient failure isolation,
//! and the tracker records payments and receipts.

pub mod dispatcher;
pub mod engine;
pub mod generator;
pub mod selector;
pub mod tracker;
