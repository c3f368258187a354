//! Task Executor Module
//!
//! Runs storage commands off the caller's task on a fixed-size worker pool and hands back
//! a handle for each result.
//!
//! ## Architecture Overview
//! 1. **Submission**: `TaskQueue::enqueue` wraps a `StorageCommand` into a type-erased job,
//!    pushes it onto the intake channel and returns a `TaskHandle` immediately.
//! 2. **Execution**: every worker pulls the next job and runs it as its own tokio task, so a
//!    panicking command is contained to that task and the worker keeps draining.
//! 3. **Completion**: the job sends its result through a oneshot channel. The handle is
//!    awaited with a timeout that distinguishes success, failure and "still running".
//!
//! ## Submodules
//! - **`command`**: the `StorageCommand` contract every operation implements.
//! - **`queue`**: intake channel, worker loop and shutdown.
//! - **`types`**: task ids, handles and outcomes.

pub mod command;
pub mod queue;
pub mod types;
