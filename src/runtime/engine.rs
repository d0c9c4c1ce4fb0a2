//! The graph execution engine.
//!
//! `Engine::run` walks a compiled graph from its entry node: each frontier
//! step dispatches every scheduled node concurrently, merges their partial
//! updates into state in declaration order (a deterministic barrier),
//! evaluates outgoing edge conditions against the updated state, and
//! terminates on a `stop` node, a dead end, a node failure, or the
//! iteration cap.

use futures::future::join_all;
use nanoid::nanoid;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    SpecflowError,
    common::Vars,
    executor::Executors,
    graph::Graph,
    resources::ResourceResolver,
    runtime::{
        State,
        state::ERROR_CONTEXT_KEY,
    },
};

/// A terminal run error, carrying the last state so callers can inspect
/// what happened (including `error_context`).
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{error}")]
pub struct RunFailure {
    pub error: SpecflowError,
    pub state: State,
}

/// Executes compiled graphs. One engine can serve many runs; each run owns
/// its own [`State`] exclusively.
pub struct Engine {
    executors: Executors,
    /// Cap applied when the workflow declares none (engine configuration).
    fallback_max_iterations: Option<u32>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            executors: Executors::default(),
            fallback_max_iterations: None,
        }
    }

    pub(crate) fn with_parts(
        executors: Executors,
        fallback_max_iterations: Option<u32>,
    ) -> Self {
        Self {
            executors,
            fallback_max_iterations,
        }
    }

    /// Run a compiled graph to completion over the given input.
    pub async fn run(
        &self,
        graph: &Graph,
        resources: &dyn ResourceResolver,
        input: &str,
    ) -> std::result::Result<State, RunFailure> {
        let rid = nanoid!();
        let max_iterations = graph.max_iterations().or(self.fallback_max_iterations);

        let mut state = State::new(input);
        let mut frontier: Vec<String> = vec![graph.entry_node().id.clone()];

        info!(%rid, entry = %frontier[0], "run started");

        loop {
            // Iteration accounting happens before dispatch so conditions see
            // the counter the re-entry produced.
            for nid in &frontier {
                state.record_execution(nid);
            }

            let step = self.execute_frontier(graph, resources, &state, &frontier).await;

            // Ordered merge barrier: results land in frontier declaration
            // order, never arrival order. A failure drops the failed
            // member's delta and every later member's result for this step.
            let mut failure: Option<(String, SpecflowError)> = None;
            let mut terminal = false;
            for (nid, result) in step {
                match result {
                    Ok(delta) => {
                        debug!(%rid, node = %nid, keys = delta.len(), "merging node output");
                        state.merge(delta);
                        if graph.node(&nid).map(|n| n.stop).unwrap_or(false) {
                            terminal = true;
                        }
                    }
                    Err(error) => {
                        failure = Some((nid, error));
                        break;
                    }
                }
            }

            if let Some((nid, error)) = failure {
                match self.route_failure(graph, &mut state, &nid, &error) {
                    Some(targets) => {
                        info!(%rid, node = %nid, "failure routed through error_context edge");
                        frontier = targets;
                        continue;
                    }
                    None => {
                        warn!(%rid, node = %nid, %error, "run failed");
                        return Err(RunFailure {
                            error,
                            state,
                        });
                    }
                }
            }

            if terminal {
                info!(%rid, iterations = state.iteration_count(), "run completed");
                return Ok(state);
            }

            // Routing: all truthy edges fire; targets dedup into the next
            // frontier preserving declaration order.
            let mut next: Vec<String> = Vec::new();
            for nid in &frontier {
                let targets = match self.route(graph, &state, nid, max_iterations) {
                    Ok(targets) => targets,
                    Err(error) => {
                        return Err(RunFailure {
                            error,
                            state,
                        });
                    }
                };
                for target in targets {
                    if !next.contains(&target) {
                        next.push(target);
                    }
                }
            }

            if next.is_empty() {
                let error = SpecflowError::Routing(format!("dead end: no edge fired after {}", frontier.join(", ")));
                warn!(%rid, %error, "run failed");
                return Err(RunFailure {
                    error,
                    state,
                });
            }

            debug!(%rid, frontier = %next.join(", "), iteration = state.iteration_count(), "advancing frontier");
            frontier = next;
        }
    }

    /// Dispatch every frontier member concurrently. `join_all` returns
    /// results in dispatch order regardless of completion order.
    async fn execute_frontier(
        &self,
        graph: &Graph,
        resources: &dyn ResourceResolver,
        state: &State,
        frontier: &[String],
    ) -> Vec<(String, crate::Result<Vars>)> {
        let tasks = frontier.iter().map(|nid| {
            let nid = nid.clone();
            async move {
                let result = match graph.node(&nid) {
                    Some(node) => match self.executors.get(node.kind) {
                        Some(executor) => executor.execute(node, state, resources).await,
                        None => Err(SpecflowError::NodeExecution {
                            nid: nid.clone(),
                            kind: node.kind.as_ref().to_string(),
                            message: "no executor registered for kind".to_string(),
                        }),
                    },
                    None => Err(SpecflowError::Routing(format!("node '{}' not found in graph", nid))),
                };
                (nid, result)
            }
        });
        join_all(tasks).await
    }

    /// Evaluate the outgoing edges of an executed node against the updated
    /// state, applying the iteration cap.
    fn route(
        &self,
        graph: &Graph,
        state: &State,
        nid: &str,
        max_iterations: Option<u32>,
    ) -> crate::Result<Vec<String>> {
        let edges = graph.outgoing_edges(nid);

        let mut fired: Vec<&crate::graph::GraphEdge> = edges
            .iter()
            .filter(|e| match &e.condition {
                None => true,
                Some(cond) => cond.evaluate(state),
            })
            .copied()
            .collect();

        // Iteration cap: once the counter has reached the cap, edges that
        // would re-enter an already-visited node are suppressed. If that
        // leaves nothing, the forward edges are taken unconditionally; a
        // cycle with no way forward is an error.
        if let Some(max) = max_iterations {
            if state.iteration_count() >= max && fired.iter().any(|e| state.has_executed(&e.target)) {
                fired.retain(|e| !state.has_executed(&e.target));
                if fired.is_empty() {
                    fired = edges.iter().filter(|e| !state.has_executed(&e.target)).copied().collect();
                    if fired.is_empty() {
                        return Err(SpecflowError::IterationLimit {
                            nid: nid.to_string(),
                            max,
                        });
                    }
                    debug!(node = %nid, max, "iteration cap reached, forcing forward edge");
                }
            }
        }

        Ok(fired.into_iter().map(|e| e.target.clone()).collect())
    }

    /// A failed node terminates the run unless an outgoing edge explicitly
    /// inspects `error_context` and fires against the updated state.
    fn route_failure(
        &self,
        graph: &Graph,
        state: &mut State,
        nid: &str,
        error: &SpecflowError,
    ) -> Option<Vec<String>> {
        let kind = graph.node(nid).map(|n| n.kind.as_ref().to_string()).unwrap_or_default();
        state.set_error_context(json!({
            "node": nid,
            "kind": kind,
            "error": error.to_string(),
            "at": chrono::Utc::now().to_rfc3339(),
        }));

        let targets: Vec<String> = graph
            .outgoing_edges(nid)
            .iter()
            .filter(|e| match &e.condition {
                Some(cond) => cond.references(ERROR_CONTEXT_KEY) && cond.evaluate(state),
                None => false,
            })
            .map(|e| e.target.clone())
            .collect();

        if targets.is_empty() { None } else { Some(targets) }
    }
}
