//! Workflow scheduler.
//!
//! `Scheduler` is the central orchestrator:
//! 1. Validates the graph (unique ids, edge endpoints, single start node,
//!    acyclicity, reachability) before anything executes.
//! 2. Runs the start node, then repeatedly spawns every ready node; a node
//!    is ready once all its predecessors are settled and at least one of
//!    its incoming edges was activated.
//! 3. Follows the branch emitted by decision results: labeled edges
//!    activate on a label match, unlabeled "always" edges activate
//!    unconditionally. Nodes whose incoming edges never activate are
//!    skipped, and the skip propagates.
//! 4. Owns the state bag: deltas are merged on the scheduler loop as each
//!    node resolves, one whole delta at a time, so concurrent siblings
//!    never race. A failed node's delta is never merged.
//! 5. Applies the error policy (abort or continue) per node, treats
//!    timeouts and executor panics as node-local failures, and honors
//!    cancellation by letting in-flight nodes finish without scheduling
//!    new ones.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use nodes::{ExecutionContext, ExecutionResult, NodeInfo};

use crate::dag::validate_dag;
use crate::models::{Edge, ErrorPolicy, NodeDefinition, Workflow};
use crate::registry::NodeRegistry;
use crate::run::{NodeRunRecord, RunRecord, RunStatus};
use crate::EngineError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the scheduler.
#[derive(Debug, Clone, Default)]
pub struct SchedulerConfig {
    /// Default per-node timeout; a node's `timeout_ms` overrides it.
    /// `None` means nodes may run unbounded.
    pub node_timeout: Option<Duration>,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Stateless orchestrator; construct once and run any number of workflows.
pub struct Scheduler {
    registry: NodeRegistry,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(registry: NodeRegistry) -> Self {
        Self {
            registry,
            config: SchedulerConfig::default(),
        }
    }

    pub fn with_config(registry: NodeRegistry, config: SchedulerConfig) -> Self {
        Self { registry, config }
    }

    /// Run the workflow to completion.
    ///
    /// # Errors
    /// Returns `EngineError` only for graph-shape problems found before
    /// execution; everything that happens during execution is reported in
    /// the returned [`RunRecord`] (including aborts).
    pub async fn run(
        &self,
        workflow: &Workflow,
        initial_data: Value,
    ) -> Result<RunRecord, EngineError> {
        self.run_with_cancel(workflow, initial_data, CancellationToken::new())
            .await
    }

    /// Like [`Scheduler::run`], but cancellable. Cancellation stops new
    /// nodes from being scheduled; in-flight executor calls finish and
    /// their deltas are merged before the run returns as aborted.
    #[instrument(skip(self, initial_data, cancel), fields(workflow_id = %workflow.id))]
    pub async fn run_with_cancel(
        &self,
        workflow: &Workflow,
        initial_data: Value,
        cancel: CancellationToken,
    ) -> Result<RunRecord, EngineError> {
        let order = validate_dag(workflow)?;
        info!(
            component = "scheduler",
            nodes = order.len(),
            "graph validated, starting run"
        );

        let run_id = Uuid::new_v4();
        let ctx = Arc::new(ExecutionContext {
            workflow_id: workflow.id,
            run_id,
            initial_data,
        });

        let mut run = RunLoop::new(workflow, &self.registry, &self.config, ctx);

        // The start node is the unique entry point (validated above).
        let start_id = workflow
            .nodes
            .iter()
            .find(|n| n.is_start())
            .map(|n| n.id.as_str())
            .ok_or(EngineError::NoStartNode)?;
        run.ready.push_back(start_id);

        loop {
            run.spawn_ready(&cancel);
            match run.in_flight.next().await {
                Some(done) => run.process(done),
                None => break,
            }
        }

        let status = match run.abort.take() {
            Some((node_id, message)) => {
                error!(component = "scheduler", run_id = %run_id, %message, "run aborted");
                RunStatus::Aborted { node_id, message }
            }
            None if run.errors_seen => RunStatus::CompletedWithErrors,
            None => RunStatus::Completed,
        };

        info!(
            component = "scheduler",
            run_id = %run_id,
            executed = run.node_results.len(),
            aborted = status.is_aborted(),
            "run finished"
        );

        Ok(RunRecord {
            run_id,
            workflow_id: workflow.id,
            status,
            final_state: run.state,
            node_results: run.node_results,
        })
    }
}

// ---------------------------------------------------------------------------
// Per-run bookkeeping
// ---------------------------------------------------------------------------

/// What a finished node task hands back to the loop.
struct CompletedNode {
    node_id: String,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    result: ExecutionResult,
}

struct RunLoop<'w> {
    workflow: &'w Workflow,
    registry: &'w NodeRegistry,
    config: &'w SchedulerConfig,
    ctx: Arc<ExecutionContext>,

    node_map: HashMap<&'w str, &'w NodeDefinition>,
    outgoing: HashMap<&'w str, Vec<&'w Edge>>,
    total_in: HashMap<&'w str, usize>,
    settled_in: HashMap<&'w str, usize>,
    activated_in: HashMap<&'w str, usize>,

    ready: VecDeque<&'w str>,
    in_flight: FuturesUnordered<BoxFuture<'static, CompletedNode>>,

    /// The authoritative state bag; merged only on this loop.
    state: Map<String, Value>,
    node_results: Vec<NodeRunRecord>,
    errors_seen: bool,
    /// Set when the run must abort; scheduling stops, in-flight finishes.
    abort: Option<(Option<String>, String)>,
}

impl<'w> RunLoop<'w> {
    fn new(
        workflow: &'w Workflow,
        registry: &'w NodeRegistry,
        config: &'w SchedulerConfig,
        ctx: Arc<ExecutionContext>,
    ) -> Self {
        let node_map: HashMap<&str, &NodeDefinition> =
            workflow.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

        let mut outgoing: HashMap<&str, Vec<&Edge>> = HashMap::new();
        let mut total_in: HashMap<&str, usize> = HashMap::new();
        for node in &workflow.nodes {
            outgoing.entry(node.id.as_str()).or_default();
            total_in.entry(node.id.as_str()).or_insert(0);
        }
        for edge in &workflow.edges {
            outgoing
                .entry(edge.from.as_str())
                .or_default()
                .push(edge);
            *total_in.entry(edge.to.as_str()).or_insert(0) += 1;
        }

        let settled_in = total_in.keys().map(|&id| (id, 0)).collect();
        let activated_in = total_in.keys().map(|&id| (id, 0)).collect();

        Self {
            workflow,
            registry,
            config,
            ctx,
            node_map,
            outgoing,
            total_in,
            settled_in,
            activated_in,
            ready: VecDeque::new(),
            in_flight: FuturesUnordered::new(),
            state: Map::new(),
            node_results: Vec::new(),
            errors_seen: false,
            abort: None,
        }
    }

    /// Spawn every ready node, unless the run is aborting or cancelled.
    fn spawn_ready(&mut self, cancel: &CancellationToken) {
        while let Some(node_id) = self.ready.pop_front() {
            if self.abort.is_some() {
                self.ready.clear();
                return;
            }
            if cancel.is_cancelled() {
                warn!(component = "scheduler", "run cancelled, not scheduling further nodes");
                self.abort = Some((None, "run cancelled".to_string()));
                self.ready.clear();
                return;
            }

            let node = self.node_map[node_id];

            let Some(executor) = self.registry.get(&node.node_type) else {
                // Unknown node type: a node-local failure, subject to the
                // same policy as any other executor error.
                let now = Utc::now();
                self.process(CompletedNode {
                    node_id: node.id.clone(),
                    started_at: now,
                    finished_at: now,
                    result: ExecutionResult::error(
                        format!(
                            "node '{}': no executor registered for type '{}'",
                            node.id, node.node_type
                        ),
                        None,
                    ),
                });
                continue;
            };

            let executor = Arc::clone(executor);
            let info = NodeInfo {
                id: node.id.clone(),
                name: node.name.clone(),
                config: node.config.clone(),
            };
            // Point-in-time read view; the bag itself never leaves the loop.
            let state_view = Value::Object(self.state.clone());
            let ctx = Arc::clone(&self.ctx);
            let timeout = node
                .timeout_ms
                .map(Duration::from_millis)
                .or(self.config.node_timeout);

            debug!(component = "scheduler", node_id = %node.id, "dispatching node");

            let handle = tokio::spawn(async move {
                match timeout {
                    Some(limit) => {
                        match tokio::time::timeout(limit, executor.execute(&info, &state_view, &ctx))
                            .await
                        {
                            Ok(result) => result,
                            Err(_) => ExecutionResult::error(
                                format!(
                                    "node '{}' timed out after {}ms",
                                    info.id,
                                    limit.as_millis()
                                ),
                                None,
                            ),
                        }
                    }
                    None => executor.execute(&info, &state_view, &ctx).await,
                }
            });

            let owned_id = node.id.clone();
            let started_at = Utc::now();
            self.in_flight.push(Box::pin(async move {
                let result = match handle.await {
                    Ok(result) => result,
                    // A panicking executor is a bug; surface it as a
                    // node-local internal error instead of tearing down
                    // the run loop.
                    Err(join_err) => ExecutionResult::error(
                        format!("node '{owned_id}': internal executor error: {join_err}"),
                        None,
                    ),
                };
                CompletedNode {
                    node_id: owned_id,
                    started_at,
                    finished_at: Utc::now(),
                    result,
                }
            }));
        }
    }

    /// Merge a finished node back into the run: state delta, edge
    /// activation, error policy, trace record.
    fn process(&mut self, done: CompletedNode) {
        let node = self.node_map[done.node_id.as_str()];
        let out_edges: Vec<&'w Edge> = self
            .outgoing
            .get(done.node_id.as_str())
            .cloned()
            .unwrap_or_default();

        let decided: Vec<(&'w Edge, bool)> = if done.result.success {
            // Atomic whole-delta apply; last write per key wins.
            if let Some(updates) = &done.result.state_updates {
                for (key, value) in updates {
                    self.state.insert(key.clone(), value.clone());
                }
            }
            info!(component = "scheduler", node_id = %done.node_id, "node succeeded");

            match &done.result.branch {
                Some(branch) => {
                    let has_labeled = out_edges.iter().any(|e| e.branch.is_some());
                    let any_match = out_edges
                        .iter()
                        .any(|e| e.branch.as_deref() == Some(branch.as_str()));
                    if has_labeled && !any_match {
                        error!(
                            component = "scheduler",
                            node_id = %done.node_id,
                            %branch,
                            "no outgoing edge matches the emitted branch"
                        );
                        self.abort = Some((
                            Some(done.node_id.clone()),
                            format!(
                                "node '{}' emitted branch '{}' with no matching edge",
                                done.node_id, branch
                            ),
                        ));
                        out_edges.iter().map(|&e| (e, false)).collect()
                    } else {
                        // Matched label or "always" edges activate.
                        out_edges
                            .iter()
                            .map(|&e| {
                                let take = e.branch.is_none()
                                    || e.branch.as_deref() == Some(branch.as_str());
                                (e, take)
                            })
                            .collect()
                    }
                }
                // Non-branching nodes fan out on every edge.
                None => out_edges.iter().map(|&e| (e, true)).collect(),
            }
        } else {
            let message = done
                .result
                .error
                .as_ref()
                .map(|f| f.message.clone())
                .unwrap_or_else(|| format!("node '{}' failed", done.node_id));
            let policy = node.on_error.unwrap_or(self.workflow.on_error);

            match policy {
                ErrorPolicy::Abort => {
                    error!(
                        component = "scheduler",
                        node_id = %done.node_id,
                        %message,
                        "node failed, aborting run"
                    );
                    self.abort = Some((Some(done.node_id.clone()), message));
                    out_edges.iter().map(|&e| (e, false)).collect()
                }
                ErrorPolicy::Continue => {
                    warn!(
                        component = "scheduler",
                        node_id = %done.node_id,
                        %message,
                        "node failed, continuing via always edges"
                    );
                    self.errors_seen = true;
                    // Bypass: only unlabeled "always" edges stay live.
                    out_edges
                        .iter()
                        .map(|&e| (e, e.branch.is_none()))
                        .collect()
                }
            }
        };

        self.node_results.push(NodeRunRecord {
            node_id: done.node_id,
            result: done.result,
            started_at: done.started_at,
            finished_at: done.finished_at,
        });

        self.settle(decided);
    }

    /// Settle edges and propagate readiness/skips.
    ///
    /// A target whose predecessors are all settled becomes ready if any
    /// incoming edge activated, and is skipped otherwise; a skipped node
    /// settles its own outgoing edges without activating them.
    fn settle(&mut self, decided: Vec<(&'w Edge, bool)>) {
        let mut work = decided;
        while let Some((edge, activated)) = work.pop() {
            let to = edge.to.as_str();
            *self.settled_in.get_mut(to).expect("edge target exists") += 1;
            if activated {
                *self.activated_in.get_mut(to).expect("edge target exists") += 1;
            }

            if self.settled_in[to] == self.total_in[to] {
                if self.activated_in[to] > 0 {
                    debug!(component = "scheduler", node_id = to, "node ready");
                    self.ready.push_back(to);
                } else {
                    debug!(component = "scheduler", node_id = to, "node skipped");
                    if let Some(next) = self.outgoing.get(to) {
                        for e in next.clone() {
                            work.push((e, false));
                        }
                    }
                }
            }
        }
    }
}
