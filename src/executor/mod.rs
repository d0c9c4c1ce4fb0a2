//! Node executors, one per node kind.
//!
//! A `NodeExecutor` is the capability contract between the engine and the
//! outside world: it receives the node, the current state and the run's
//! resource resolver, and returns a partial state update. The set of kinds
//! is closed; the engine dispatches through a fixed table rather than any
//! open-ended lookup.

mod agent;
mod branch;
mod external;
mod judge;
mod tool;

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;

use crate::{
    Result, SpecflowError,
    common::Vars,
    graph::GraphNode,
    model::NodeKind,
    resources::ResourceResolver,
    runtime::State,
};

pub use agent::AgentExecutor;
pub use branch::BranchExecutor;
pub use external::ExternalToolExecutor;
pub use judge::JudgeExecutor;
pub use tool::ToolExecutor;

/// Executes nodes of one kind.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// The kind this executor handles.
    fn kind(&self) -> NodeKind;

    /// Execute the node against the current state, returning a partial
    /// state update or a single terminal failure.
    async fn execute(
        &self,
        node: &GraphNode,
        state: &State,
        resources: &dyn ResourceResolver,
    ) -> Result<Vars>;
}

/// Build a node execution failure tagged with the node's identity.
pub(crate) fn exec_err(
    node: &GraphNode,
    message: impl Into<String>,
) -> SpecflowError {
    SpecflowError::NodeExecution {
        nid: node.id.clone(),
        kind: node.kind.as_ref().to_string(),
        message: message.into(),
    }
}

/// The executor table, one entry per kind.
pub struct Executors {
    table: HashMap<NodeKind, Arc<dyn NodeExecutor>>,
}

impl Default for Executors {
    fn default() -> Self {
        let mut executors = Self {
            table: HashMap::new(),
        };
        executors.register(Arc::new(AgentExecutor));
        executors.register(Arc::new(ToolExecutor));
        executors.register(Arc::new(JudgeExecutor));
        executors.register(Arc::new(BranchExecutor));
        executors.register(Arc::new(ExternalToolExecutor));
        executors
    }
}

impl Executors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the executor for its kind (used to stub out collaborator
    /// calls in embedders and tests).
    pub fn register(
        &mut self,
        executor: Arc<dyn NodeExecutor>,
    ) {
        self.table.insert(executor.kind(), executor);
    }

    /// Look up the executor for a kind. The default table covers every
    /// kind, so this only fails if a caller removed one.
    pub fn get(
        &self,
        kind: NodeKind,
    ) -> Option<Arc<dyn NodeExecutor>> {
        self.table.get(&kind).cloned()
    }
}
