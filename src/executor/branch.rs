//! Branch nodes: pure routing anchors.
//!
//! A branch performs no external call and contributes nothing to state;
//! the conditioned edges leaving it do all the work.

use async_trait::async_trait;

use crate::{
    Result,
    common::Vars,
    executor::NodeExecutor,
    graph::GraphNode,
    model::NodeKind,
    resources::ResourceResolver,
    runtime::State,
};

pub struct BranchExecutor;

#[async_trait]
impl NodeExecutor for BranchExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Branch
    }

    async fn execute(
        &self,
        _node: &GraphNode,
        _state: &State,
        _resources: &dyn ResourceResolver,
    ) -> Result<Vars> {
        Ok(Vars::new())
    }
}
