mod edge;
mod node;
mod spec;

pub use edge::EdgeModel;
pub use node::{NodeKind, NodeModel};
pub use spec::{ResourceModel, SpecModel, WorkflowModel, WorkflowType};
