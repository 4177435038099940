//! Conditional routing graphs.
//!
//! A [`RoutingGraph`] generalizes the sequential pipeline: after a node's task
//! succeeds, its outgoing edge decides what runs next. A direct edge always
//! advances to the same node; a conditional edge asks a router, which
//! inspects the context and returns a [`Route`]. Nodes may be revisited; the
//! latest result replaces the earlier context entry.

use super::builder::validate_append;
use crate::cancellation::CancellationToken;
use crate::config::PipelineConfig;
use crate::context::ExecutionContext;
use crate::errors::{PipelineValidationError, RoutingError, TaskFailure};
use crate::events::{event_types, EventSink, LoggingEventSink};
use crate::tasks::{Task, TaskRuntime, TaskStateTracker};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info_span, Instrument};

/// Default bound on node visits per run.
pub const DEFAULT_MAX_ROUTE_STEPS: usize = 64;

/// A routing decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Run the named node next.
    Next(String),
    /// Stop the run successfully.
    End,
}

impl Route {
    /// Routes to `node`.
    pub fn to(node: impl Into<String>) -> Self {
        Self::Next(node.into())
    }
}

/// Picks the next node from the current context.
pub type Router = Arc<dyn Fn(&ExecutionContext) -> Route + Send + Sync>;

enum Edge {
    End,
    Direct(usize),
    Conditional { router: Router, targets: Vec<usize> },
}

struct Node {
    task: Task,
    edge: Edge,
}

/// Why a routing graph run stopped early.
#[derive(Debug, Error)]
pub enum RoutingFailure {
    /// A node's task failed terminally.
    #[error(transparent)]
    Task(#[from] TaskFailure),
    /// The graph itself could not continue.
    #[error(transparent)]
    Routing(#[from] RoutingError),
}

/// Result of a routing graph run.
#[derive(Debug)]
pub struct RoutingRunResult {
    /// The graph name.
    pub graph: String,
    /// Entries written during the run, one per visited node.
    pub context: ExecutionContext,
    /// Nodes visited, in order, including repeats.
    pub path: Vec<String>,
    /// Total run time in milliseconds.
    pub duration_ms: f64,
    /// What stopped the run, if it did not end normally.
    pub failure: Option<RoutingFailure>,
}

impl RoutingRunResult {
    /// Whether the run reached an end without failing.
    #[must_use]
    pub fn success(&self) -> bool {
        self.failure.is_none()
    }

    /// How many times `node` ran successfully.
    #[must_use]
    pub fn visits(&self, node: &str) -> usize {
        self.path.iter().filter(|n| *n == node).count()
    }
}

/// Builder for [`RoutingGraph`].
///
/// Nodes are added first; edges may then refer to any added node, so cycles
/// are allowed. Every edge target is checked when the edge is added.
pub struct RoutingGraphBuilder {
    name: String,
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    entry: Option<usize>,
    max_steps: usize,
    sink: Arc<dyn EventSink>,
    deadline: Option<Duration>,
}

impl RoutingGraphBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            index: HashMap::new(),
            entry: None,
            max_steps: DEFAULT_MAX_ROUTE_STEPS,
            sink: Arc::new(LoggingEventSink::default()),
            deadline: None,
        }
    }

    /// Applies the step limit and deadline from a configuration.
    #[must_use]
    pub fn config(mut self, config: &PipelineConfig) -> Self {
        self.max_steps = config.max_route_steps;
        self.deadline = config.deadline();
        self
    }

    /// Adds a node. The first node added is the entry unless overridden.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty, reserved or taken.
    pub fn node(mut self, task: Task) -> Result<Self, PipelineValidationError> {
        let names: Vec<&str> = self.nodes.iter().map(|n| n.task.name()).collect();
        validate_append(&names, &task)?;

        let id = self.nodes.len();
        self.index.insert(task.name().to_string(), id);
        self.nodes.push(Node { task, edge: Edge::End });
        if self.entry.is_none() {
            self.entry = Some(id);
        }
        Ok(self)
    }

    /// Sets the entry node.
    ///
    /// # Errors
    ///
    /// Returns an error if no node has that name.
    pub fn entry(mut self, node: &str) -> Result<Self, PipelineValidationError> {
        self.entry = Some(self.lookup(node)?);
        Ok(self)
    }

    /// Always continues from `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns an error if either node is unknown or `from` already has an
    /// outgoing edge.
    pub fn edge(mut self, from: &str, to: &str) -> Result<Self, PipelineValidationError> {
        let to = self.lookup(to)?;
        self.set_edge(from, Edge::Direct(to))?;
        Ok(self)
    }

    /// Lets `router` choose among `targets` after `from` succeeds.
    ///
    /// The router may also return [`Route::End`]. Choosing a node outside
    /// `targets` fails the run.
    ///
    /// # Errors
    ///
    /// Returns an error if any node is unknown or `from` already has an
    /// outgoing edge.
    pub fn conditional<F>(mut self, from: &str, router: F, targets: &[&str]) -> Result<Self, PipelineValidationError>
    where
        F: Fn(&ExecutionContext) -> Route + Send + Sync + 'static,
    {
        let targets = targets
            .iter()
            .map(|t| self.lookup(t))
            .collect::<Result<Vec<_>, _>>()?;
        self.set_edge(
            from,
            Edge::Conditional {
                router: Arc::new(router),
                targets,
            },
        )?;
        Ok(self)
    }

    /// Sets the maximum number of node visits per run.
    #[must_use]
    pub fn max_steps(mut self, limit: usize) -> Self {
        self.max_steps = limit;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Bounds every run by `budget` of wall time.
    #[must_use]
    pub fn deadline(mut self, budget: Duration) -> Self {
        self.deadline = Some(budget);
        self
    }

    /// Builds the graph.
    ///
    /// # Errors
    ///
    /// Returns an error if no node was added.
    pub fn build(self) -> Result<RoutingGraph, PipelineValidationError> {
        let entry = self.entry.ok_or_else(PipelineValidationError::missing_entry)?;
        Ok(RoutingGraph {
            name: self.name,
            nodes: self.nodes,
            entry,
            max_steps: self.max_steps,
            sink: self.sink,
            tracker: TaskStateTracker::new(),
            deadline: self.deadline,
        })
    }

    fn lookup(&self, node: &str) -> Result<usize, PipelineValidationError> {
        self.index
            .get(node)
            .copied()
            .ok_or_else(|| PipelineValidationError::unknown_node(node))
    }

    fn set_edge(&mut self, from: &str, edge: Edge) -> Result<(), PipelineValidationError> {
        let id = self.lookup(from)?;
        let node = &mut self.nodes[id];
        if !matches!(node.edge, Edge::End) {
            return Err(PipelineValidationError::edge_exists(from));
        }
        node.edge = edge;
        Ok(())
    }
}

/// Tasks connected by direct and conditional edges.
pub struct RoutingGraph {
    name: String,
    nodes: Vec<Node>,
    entry: usize,
    max_steps: usize,
    sink: Arc<dyn EventSink>,
    tracker: TaskStateTracker,
    deadline: Option<Duration>,
}

impl RoutingGraph {
    /// Starts building a graph.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> RoutingGraphBuilder {
        RoutingGraphBuilder::new(name)
    }

    /// Returns the graph name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the entry node's name.
    #[must_use]
    pub fn entry(&self) -> &str {
        self.nodes[self.entry].task.name()
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns a handle for observing node states while a run is in flight.
    #[must_use]
    pub fn tracker(&self) -> TaskStateTracker {
        self.tracker.clone()
    }

    /// Follows routes from the entry node until one ends the run.
    pub async fn run(&self) -> RoutingRunResult {
        self.run_with_cancellation(Arc::new(CancellationToken::new())).await
    }

    /// Like [`RoutingGraph::run`], stopping early if `cancel` fires.
    pub async fn run_with_cancellation(&self, cancel: Arc<CancellationToken>) -> RoutingRunResult {
        let ctx = ExecutionContext::new();
        let span = info_span!("pipeline.run", pipeline = %self.name, run_id = %ctx.run_id());
        self.execute(ctx, cancel).instrument(span).await
    }

    async fn execute(&self, mut ctx: ExecutionContext, cancel: Arc<CancellationToken>) -> RoutingRunResult {
        let started = Instant::now();
        let run_id = ctx.run_id().to_string();

        let mut rt = TaskRuntime::new(self.sink.clone())
            .with_cancellation(cancel)
            .with_tracker(self.tracker.clone());
        if let Some(budget) = self.deadline {
            rt = rt.with_deadline(budget);
        }

        self.tracker.reset(self.nodes.iter().map(|n| n.task.name()));
        self.sink.try_emit(
            event_types::PIPELINE_STARTED,
            Some(json!({
                "pipeline": &self.name,
                "run_id": &run_id,
                "task_count": self.nodes.len(),
                "entry": self.entry(),
            })),
        );

        let mut path: Vec<String> = Vec::new();
        let mut current = Some(self.entry);
        let mut failure: Option<(String, RoutingFailure)> = None;

        while let Some(id) = current {
            let node = &self.nodes[id];
            let name = node.task.name();

            if path.len() >= self.max_steps {
                let error = RoutingError::StepLimitExceeded { limit: self.max_steps };
                failure = Some((name.to_string(), error.into()));
                break;
            }

            self.tracker.rearm(name);
            match node.task.run(&ctx, &rt).await {
                Ok(success) => ctx.replace(name, success.value),
                Err(task_failure) => {
                    failure = Some((name.to_string(), task_failure.into()));
                    break;
                }
            }
            path.push(name.to_string());

            current = match &node.edge {
                Edge::End => None,
                Edge::Direct(next) => Some(*next),
                Edge::Conditional { router, targets } => match router(&ctx) {
                    Route::End => None,
                    Route::Next(target) => {
                        let chosen = targets
                            .iter()
                            .copied()
                            .find(|&t| self.nodes[t].task.name() == target);
                        if chosen.is_none() {
                            let error = RoutingError::UndeclaredRoute {
                                from: name.to_string(),
                                target,
                            };
                            failure = Some((name.to_string(), error.into()));
                            break;
                        }
                        chosen
                    }
                },
            };

            self.sink.try_emit(
                event_types::ROUTE_SELECTED,
                Some(json!({
                    "pipeline": &self.name,
                    "from": name,
                    "to": current.map(|next| self.nodes[next].task.name()),
                })),
            );
        }

        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.sink.try_emit(
            event_types::PIPELINE_COMPLETED,
            Some(json!({
                "pipeline": &self.name,
                "run_id": &run_id,
                "success": failure.is_none(),
                "duration_ms": duration_ms,
                "steps": path.len(),
                "failed_task": failure.as_ref().map(|(node, _)| node.clone()),
                "error": failure.as_ref().map(|(_, cause)| cause.to_string()),
            })),
        );

        RoutingRunResult {
            graph: self.name.clone(),
            context: ctx,
            path,
            duration_ms,
            failure: failure.map(|(_, cause)| cause),
        }
    }
}

impl std::fmt::Debug for RoutingGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingGraph")
            .field("name", &self.name)
            .field("entry", &self.entry())
            .field("nodes", &self.nodes.len())
            .field("max_steps", &self.max_steps)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for RoutingGraphBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingGraphBuilder")
            .field("name", &self.name)
            .field("nodes", &self.nodes.len())
            .field("max_steps", &self.max_steps)
            .finish_non_exhaustive()
    }
}
