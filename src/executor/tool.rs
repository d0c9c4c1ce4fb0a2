//! Tool nodes: a loaded function invoked with the run state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    Result,
    common::Vars,
    executor::{NodeExecutor, exec_err},
    graph::GraphNode,
    model::NodeKind,
    resources::{ResourceHandle, ResourceResolver},
    runtime::State,
    template,
};

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
struct ToolConfig {
    /// Static parameters passed to the tool, templated before the call.
    #[serde(default)]
    params: Value,
    /// Extra state key to mirror the tool's `output` under.
    #[serde(default)]
    output_key: Option<String>,
}

impl ToolConfig {
    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "params": {"description": "Static tool parameters"},
                "output_key": {"type": "string", "description": "State key for the tool's output"}
            }
        })
    }

    fn parse(node: &GraphNode) -> Result<Self> {
        if node.config.is_null() {
            return Ok(Self::default());
        }
        jsonschema::validate(&Self::schema(), &node.config).map_err(|e| exec_err(node, format!("invalid config: {}", e)))?;
        serde_json::from_value(node.config.clone()).map_err(|e| exec_err(node, format!("invalid config: {}", e)))
    }
}

pub struct ToolExecutor;

#[async_trait]
impl NodeExecutor for ToolExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Tool
    }

    async fn execute(
        &self,
        node: &GraphNode,
        state: &State,
        resources: &dyn ResourceResolver,
    ) -> Result<Vars> {
        let config = ToolConfig::parse(node)?;

        let resource = node.resource.as_deref().unwrap_or_default();
        let handler = match resources.lookup(resource) {
            Some(ResourceHandle::Tool(handler)) => handler,
            Some(_) => return Err(exec_err(node, format!("resource '{}' is not a tool", resource))),
            None => return Err(exec_err(node, format!("no tool registered for resource '{}'", resource))),
        };

        let params = template::resolve_params(state, &config.params);

        let mut delta = handler.call(state, &params).await.map_err(|e| exec_err(node, e.to_string()))?;

        if let Some(key) = &config.output_key {
            if let Some(output) = delta.get_value("output").cloned() {
                delta.set(key, output);
            }
        }
        Ok(delta)
    }
}
