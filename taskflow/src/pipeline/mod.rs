//! Pipeline building and execution.
//!
//! This module provides:
//! - Retry policies with bounded attempts and configurable backoff
//! - A validating builder for sequential pipelines
//! - The sequential executor and its run result
//! - Conditional routing graphs

mod builder;
mod dag;
mod retry;
mod routing;


pub use builder::PipelineBuilder;
pub use dag::{Pipeline, PipelineRunResult};
pub use retry::{
    BackoffStrategy, JitterStrategy, RetryDecision, RetryPolicy, DEFAULT_MAX_DELAY_MS,
    DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_MS,
};
pub use routing::{
    Route, Router, RoutingFailure, RoutingGraph, RoutingGraphBuilder, RoutingRunResult,
    DEFAULT_MAX_ROUTE_STEPS,
};
