//! Units of work and the retrying [`Task`] wrapper.
//!
//! A unit of work receives the current [`ExecutionContext`] and returns the
//! value the driver stores under the task's name, or an error.

mod task;
mod tracker;

pub use task::{Task, TaskRuntime, TaskSuccess};
pub use tracker::TaskStateTracker;

use crate::context::ExecutionContext;
use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;

/// Result of a single attempt of a unit of work.
pub type WorkResult = anyhow::Result<serde_json::Value>;

/// An opaque unit of work.
///
/// Any returned error counts as a failed attempt; the runner does not
/// classify errors. Retries may re-run work that partially succeeded, so
/// side effects must be idempotent.
#[async_trait]
pub trait Work: Send + Sync {
    /// Runs one attempt against the current context.
    async fn run(&self, ctx: &ExecutionContext) -> WorkResult;
}

/// A unit of work backed by a synchronous closure.
pub struct FnWork<F>
where
    F: Fn(&ExecutionContext) -> WorkResult + Send + Sync,
{
    func: F,
}

impl<F> FnWork<F>
where
    F: Fn(&ExecutionContext) -> WorkResult + Send + Sync,
{
    /// Wraps a closure.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Debug for FnWork<F>
where
    F: Fn(&ExecutionContext) -> WorkResult + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnWork").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> Work for FnWork<F>
where
    F: Fn(&ExecutionContext) -> WorkResult + Send + Sync,
{
    async fn run(&self, ctx: &ExecutionContext) -> WorkResult {
        (self.func)(ctx)
    }
}

/// A unit of work backed by an async closure.
///
/// The closure receives an owned snapshot of the context, so its future can
/// outlive the borrow.
pub struct AsyncFnWork<F, Fut>
where
    F: Fn(ExecutionContext) -> Fut + Send + Sync,
    Fut: Future<Output = WorkResult> + Send,
{
    func: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> AsyncFnWork<F, Fut>
where
    F: Fn(ExecutionContext) -> Fut + Send + Sync,
    Fut: Future<Output = WorkResult> + Send,
{
    /// Wraps an async closure.
    pub fn new(func: F) -> Self {
        Self {
            func,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> Debug for AsyncFnWork<F, Fut>
where
    F: Fn(ExecutionContext) -> Fut + Send + Sync,
    Fut: Future<Output = WorkResult> + Send,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncFnWork").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> Work for AsyncFnWork<F, Fut>
where
    F: Fn(ExecutionContext) -> Fut + Send + Sync,
    Fut: Future<Output = WorkResult> + Send + 'static,
{
    async fn run(&self, ctx: &ExecutionContext) -> WorkResult {
        (self.func)(ctx.clone()).await
    }
}
