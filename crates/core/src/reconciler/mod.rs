//! State reconciler
//!
//! Folds feed events and confirmed command results into an [`OrderView`].
//! The fold tolerates duplicates and out-of-order delivery: phase is
//! last-write-wins by delivery order, approvals are a first-wins set keyed by
//! order id, and vendors are merged field by field.

mod fold;
mod view;

pub use fold::{
    ApprovalChange, Fact, FoldOutcome, Reconciler, TerminalTransition, DEFAULT_LOG_CAPACITY,
};
pub use view::{ActivityEntry, ConnectionState, ConnectionStatus, LogLevel, OrderView};
