//! Spec-to-graph compilation and structural validation.
//!
//! The compiler turns a decoded [`SpecModel`] into an executable [`Graph`],
//! failing on the first structural defect found. Validators run in a fixed
//! order so the same broken spec always reports the same error. The single
//! mutation the compiler performs is the `sequential` normalization:
//! auto-generated chain edges and a forced terminal flag on the last node,
//! applied before the structural checks so a bare node list compiles.

use std::collections::{HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{debug, warn};

use crate::{
    Result, SpecflowError,
    graph::{Graph, GraphEdge, GraphNode},
    model::{EdgeModel, NodeKind, SpecModel, WorkflowType},
    template::Condition,
};

/// Compile a validated spec into an executable graph.
pub fn compile(spec: &SpecModel) -> Result<Graph> {
    let workflow = &spec.workflow;

    if workflow.nodes.is_empty() {
        return Err(SpecflowError::Validation("workflow has no nodes".to_string()));
    }

    // Sequential normalization happens before the structural checks so an
    // edgeless chain passes the terminal check.
    let mut nodes = workflow.nodes.clone();
    let mut edges = workflow.edges.clone();
    if workflow.workflow_type == WorkflowType::Sequential && edges.is_empty() {
        for pair in nodes.windows(2) {
            edges.push(EdgeModel {
                source: pair[0].id.clone(),
                target: pair[1].id.clone(),
                condition: None,
            });
        }
        if let Some(last) = nodes.last_mut() {
            last.stop = true;
        }
        debug!(edges = edges.len(), "generated sequential chain edges");
    }

    // Resource references, per node kind.
    for node in &nodes {
        match node.kind {
            NodeKind::Agent | NodeKind::Tool | NodeKind::Judge => {
                let Some(resource) = &node.resource else {
                    return Err(SpecflowError::Validation(format!("node '{}' ({}) requires a 'ref'", node.id, node.kind.as_ref())));
                };
                if !spec.resources.contains_key(resource) {
                    return Err(SpecflowError::Validation(format!(
                        "node '{}' references unknown resource '{}'",
                        node.id, resource
                    )));
                }
            }
            NodeKind::Branch | NodeKind::ExternalTool => {
                if node.resource.is_some() {
                    return Err(SpecflowError::Validation(format!(
                        "node '{}' ({}) must not declare a 'ref'",
                        node.id, node.kind.as_ref()
                    )));
                }
            }
        }
    }

    // Unique node ids.
    let mut seen = HashSet::new();
    for node in &nodes {
        if !seen.insert(node.id.as_str()) {
            return Err(SpecflowError::Validation(format!("duplicate node id '{}'", node.id)));
        }
    }

    // Edge endpoints must exist.
    for edge in &edges {
        if !seen.contains(edge.source.as_str()) {
            return Err(SpecflowError::Validation(format!("edge source '{}' is not a declared node", edge.source)));
        }
        if !seen.contains(edge.target.as_str()) {
            return Err(SpecflowError::Validation(format!("edge target '{}' is not a declared node", edge.target)));
        }
    }

    // At least one terminal node.
    if !nodes.iter().any(|n| n.stop) {
        return Err(SpecflowError::Validation("workflow has no terminal node (set 'stop: true' on at least one node)".to_string()));
    }

    // Entry marking: at most one, and only honored for custom_graph.
    let entries: Vec<&str> = nodes.iter().filter(|n| n.entry).map(|n| n.id.as_str()).collect();
    if entries.len() > 1 {
        return Err(SpecflowError::Validation(format!("multiple entry nodes declared: {}", entries.join(", "))));
    }
    let entry = match (workflow.workflow_type, entries.first()) {
        (WorkflowType::CustomGraph, Some(id)) => id.to_string(),
        (_, Some(id)) => {
            warn!(node = id, "entry marker ignored for non-custom_graph workflow");
            nodes[0].id.clone()
        }
        (_, None) => nodes[0].id.clone(),
    };

    // Build the graph; conditions are parsed here so a bad expression fails
    // the compile, not a run.
    let mut graph: DiGraph<GraphNode, GraphEdge> = DiGraph::new();
    let mut index: HashMap<String, NodeIndex> = HashMap::new();

    for node in &nodes {
        let idx = graph.add_node(GraphNode {
            id: node.id.clone(),
            kind: node.kind,
            resource: node.resource.clone(),
            config: node.config.clone(),
            stop: node.stop,
        });
        index.insert(node.id.clone(), idx);
    }

    for (order, edge) in edges.iter().enumerate() {
        let condition = match &edge.condition {
            Some(text) => Some(Condition::parse(text)?),
            None => None,
        };
        let source = index[edge.source.as_str()];
        let target = index[edge.target.as_str()];
        graph.add_edge(
            source,
            target,
            GraphEdge {
                source: edge.source.clone(),
                target: edge.target.clone(),
                condition,
                order,
            },
        );
    }

    debug!(
        workflow_type = workflow.workflow_type.as_ref(),
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        entry = %entry,
        "compiled workflow graph"
    );

    Ok(Graph::new(graph, index, entry, workflow.workflow_type, workflow.max_iterations))
}
