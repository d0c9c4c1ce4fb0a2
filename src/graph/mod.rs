mod compiler;
mod graph;

pub use compiler::compile;
pub use graph::{Graph, GraphEdge, GraphNode};
