//! The executable workflow graph.
//!
//! A `Graph` is the immutable output of the compiler: nodes and their
//! outgoing transitions in a directed graph, plus an id lookup. It is built
//! once per spec and reused across runs; all per-run mutability lives in
//! [`crate::State`].

use std::collections::HashMap;

use petgraph::{
    Direction,
    graph::{DiGraph, NodeIndex},
};

use crate::{
    model::{NodeKind, WorkflowType},
    template::Condition,
};

/// One compiled workflow step.
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub id: String,
    pub kind: NodeKind,
    /// Key into the spec's resource mapping (agent/tool/judge only).
    pub resource: Option<String>,
    /// Kind-specific configuration block.
    pub config: serde_json::Value,
    /// Terminal flag: the run ends once this node has executed.
    pub stop: bool,
}

/// One compiled transition.
#[derive(Debug, Clone)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    /// Pre-parsed condition; `None` means the edge always fires.
    pub condition: Option<Condition>,
    /// Declaration index, used to keep routing and merges deterministic.
    pub order: usize,
}

/// An immutable compiled workflow graph.
#[derive(Debug)]
pub struct Graph {
    graph: DiGraph<GraphNode, GraphEdge>,
    index: HashMap<String, NodeIndex>,
    entry: String,
    workflow_type: WorkflowType,
    max_iterations: Option<u32>,
}

impl Graph {
    pub(crate) fn new(
        graph: DiGraph<GraphNode, GraphEdge>,
        index: HashMap<String, NodeIndex>,
        entry: String,
        workflow_type: WorkflowType,
        max_iterations: Option<u32>,
    ) -> Self {
        Self {
            graph,
            index,
            entry,
            workflow_type,
            max_iterations,
        }
    }

    /// Look up a node by id.
    pub fn node(
        &self,
        id: &str,
    ) -> Option<&GraphNode> {
        self.index.get(id).map(|idx| &self.graph[*idx])
    }

    /// The node the engine starts from.
    pub fn entry_node(&self) -> &GraphNode {
        // The compiler guarantees the entry id resolves.
        self.node(&self.entry).expect("compiler guarantees an entry node")
    }

    /// Outgoing edges of a node, in declaration order.
    pub fn outgoing_edges(
        &self,
        id: &str,
    ) -> Vec<&GraphEdge> {
        let Some(idx) = self.index.get(id) else {
            return Vec::new();
        };
        let mut edges: Vec<&GraphEdge> = self.graph.edges_directed(*idx, Direction::Outgoing).map(|e| e.weight()).collect();
        // petgraph iterates outgoing edges in reverse insertion order; the
        // declaration index restores it.
        edges.sort_by_key(|e| e.order);
        edges
    }

    /// All node ids, in declaration order.
    pub fn node_ids(&self) -> Vec<String> {
        self.graph.node_indices().map(|idx| self.graph[idx].id.clone()).collect()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn workflow_type(&self) -> WorkflowType {
        self.workflow_type
    }

    /// The declared loop re-entry cap, if any.
    pub fn max_iterations(&self) -> Option<u32> {
        self.max_iterations
    }

    /// Human-readable dump of the compiled graph, for debugging specs.
    pub fn schema(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!(
            "workflow ({}): {} nodes, {} edges, entry: {}",
            self.workflow_type.as_ref(),
            self.node_count(),
            self.edge_count(),
            self.entry
        ));
        for idx in self.graph.node_indices() {
            let node = &self.graph[idx];
            let mut flags = Vec::new();
            if node.stop {
                flags.push("stop");
            }
            if node.id == self.entry {
                flags.push("entry");
            }
            let suffix = if flags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", flags.join(", "))
            };
            lines.push(format!("  [{}] kind: {}{}", node.id, node.kind.as_ref(), suffix));
            for edge in self.outgoing_edges(&node.id) {
                match &edge.condition {
                    Some(cond) => lines.push(format!("    -> {} when {}", edge.target, cond.source())),
                    None => lines.push(format!("    -> {}", edge.target)),
                }
            }
        }
        lines.join("\n")
    }
}
