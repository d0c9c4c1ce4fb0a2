//! Agent nodes: one templated LLM call.

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

/// When no prompt template is configured, the run input is the prompt.
const DEFAULT_PROMPT: &str = "${state.input}";

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub(crate) struct AgentConfig {
    /// Prompt template; `${state.*}` forms are substituted before the call.
    #[serde(default)]
    pub prompt: Option<String>,
    /// State key the response is stored under (besides `output`).
    #[serde(default)]
    pub output_key: Option<String>,
    /// Static provider parameters, also templated.
    #[serde(default)]
    pub params: Value,
}

impl AgentConfig {
    pub fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": {"type": "string", "description": "Prompt template"},
                "output_key": {"type": "string", "description": "State key for the response"},
                "params": {"description": "Static provider parameters"}
            }
        })
    }

    pub fn parse(
        node: &GraphNode,
    ) -> Result<Self> {
        if node.config.is_null() {
            return Ok(Self::default());
        }
        jsonschema::validate(&Self::schema(), &node.config).map_err(|e| exec_err(node, format!("invalid config: {}", e)))?;
        serde_json::from_value(node.config.clone()).map_err(|e| exec_err(node, format!("invalid config: {}", e)))
    }
}

pub struct AgentExecutor;

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn node_with_config(config: Value) -> GraphNode {
        GraphNode {
            id: "a".to_string(),
            kind: NodeKind::Agent,
            resource: Some("llm".to_string()),
            config,
            stop: false,
        }
    }

    #[test]
    fn test_parse_valid_config() {
        let config = AgentConfig::parse(&node_with_config(json!({
            "prompt": "summarize ${state.input}",
            "output_key": "summary"
        })))
        .unwrap();
        assert_eq!(config.prompt.as_deref(), Some("summarize ${state.input}"));
        assert_eq!(config.output_key.as_deref(), Some("summary"));
    }

    #[test]
    fn test_parse_rejects_mistyped_prompt() {
        let err = AgentConfig::parse(&node_with_config(json!({"prompt": 5}))).unwrap_err();
        assert!(matches!(err, crate::SpecflowError::NodeExecution { ref message, .. } if message.contains("invalid config")));
    }

    #[test]
    fn test_null_config_uses_defaults() {
        let config = AgentConfig::parse(&node_with_config(Value::Null)).unwrap();
        assert!(config.prompt.is_none());
        assert!(config.output_key.is_none());
    }
}

#[async_trait]
impl NodeExecutor for AgentExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Agent
    }

    async fn execute(
        &self,
        node: &GraphNode,
        state: &State,
        resources: &dyn ResourceResolver,
    ) -> Result<Vars> {
        let config = AgentConfig::parse(node)?;

        let resource = node.resource.as_deref().unwrap_or_default();
        let client = match resources.lookup(resource) {
            Some(ResourceHandle::Llm(client)) => client,
            Some(_) => return Err(exec_err(node, format!("resource '{}' is not an LLM client", resource))),
            None => return Err(exec_err(node, format!("no client registered for resource '{}'", resource))),
        };

        let prompt = template::resolve_text(state, config.prompt.as_deref().unwrap_or(DEFAULT_PROMPT));
        let params = template::resolve_params(state, &config.params);

        let response = client.invoke(&prompt, &params).await.map_err(|e| exec_err(node, e.to_string()))?;

        let mut delta = Vars::new();
        if let Some(key) = &config.output_key {
            delta.set(key, response.clone());
        }
        delta.set("output", response);
        Ok(delta)
    }
}
