//! Mutation engine: the transaction coordinator and its contracts
//!
//! Callers hand the engine a document path, an element reference, and a new
//! value; the engine locks, snapshots, locates, applies the format-aware
//! strategy, validates, and writes atomically. Failures after the snapshot
//! restore the document before surfacing.

mod coordinator;
mod request;

pub use coordinator::MutationEngine;
pub use request::{
    BatchItemOutcome, BatchItemStatus, BatchReport, MutationMode, MutationRequest, MutationResult,
    Preview, UpdateOptions,
};
