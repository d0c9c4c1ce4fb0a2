//! External-tool nodes: a tool served by an external process.
//!
//! Unlike the other kinds, external-tool nodes carry their collaborator
//! configuration inline (server, command, tool name, parameters) instead of
//! a `ref` into the resource mapping. The `server` name is what the
//! resource resolver is asked for.

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

#[derive(Serialize, Deserialize, Debug, Clone)]
struct ExternalToolConfig {
    /// Name the resolver is asked for to obtain the protocol client.
    server: String,
    /// Command line that serves the tool.
    command: String,
    #[serde(default)]
    working_dir: Option<String>,
    /// Tool name within the server.
    tool: String,
    /// Tool parameters, templated before the call.
    #[serde(default)]
    parameters: Value,
    #[serde(default)]
    output_key: Option<String>,
}

impl ExternalToolConfig {
    fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["server", "command", "tool"],
            "properties": {
                "server": {"type": "string", "description": "Resolver name of the protocol client"},
                "command": {"type": "string", "description": "Command line serving the tool"},
                "working_dir": {"type": "string"},
                "tool": {"type": "string", "description": "Tool name within the server"},
                "parameters": {"description": "Tool parameters"},
                "output_key": {"type": "string", "description": "State key for the tool's output"}
            }
        })
    }

    fn parse(node: &GraphNode) -> Result<Self> {
        jsonschema::validate(&Self::schema(), &node.config).map_err(|e| exec_err(node, format!("invalid config: {}", e)))?;
        serde_json::from_value(node.config.clone()).map_err(|e| exec_err(node, format!("invalid config: {}", e)))
    }
}

pub struct ExternalToolExecutor;

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn node_with_config(config: Value) -> GraphNode {
        GraphNode {
            id: "ext".to_string(),
            kind: NodeKind::ExternalTool,
            resource: None,
            config,
            stop: false,
        }
    }

    #[test]
    fn test_parse_requires_server_command_and_tool() {
        let err = ExternalToolConfig::parse(&node_with_config(json!({
            "server": "files",
            "command": "npx server"
        })))
        .unwrap_err();
        assert!(matches!(err, crate::SpecflowError::NodeExecution { ref message, .. } if message.contains("invalid config")));
    }

    #[test]
    fn test_parse_valid_config() {
        let config = ExternalToolConfig::parse(&node_with_config(json!({
            "server": "files",
            "command": "npx server",
            "tool": "read_file",
            "parameters": {"path": "${state.path}"}
        })))
        .unwrap();
        assert_eq!(config.server, "files");
        assert_eq!(config.tool, "read_file");
        assert!(config.working_dir.is_none());
    }
}

#[async_trait]
impl NodeExecutor for ExternalToolExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::ExternalTool
    }

    async fn execute(
        &self,
        node: &GraphNode,
        state: &State,
        resources: &dyn ResourceResolver,
    ) -> Result<Vars> {
        let config = ExternalToolConfig::parse(node)?;

        let client = match resources.lookup(&config.server) {
            Some(ResourceHandle::Protocol(client)) => client,
            Some(_) => return Err(exec_err(node, format!("resource '{}' is not a protocol tool client", config.server))),
            None => return Err(exec_err(node, format!("no protocol client registered for server '{}'", config.server))),
        };

        let parameters = template::resolve_params(state, &config.parameters);

        let response = client
            .call(&config.command, config.working_dir.as_deref(), &config.tool, &parameters)
            .await
            .map_err(|e| exec_err(node, e.to_string()))?;

        let mut delta = Vars::new();
        if let Some(key) = &config.output_key {
            delta.set(key, response.clone());
        }
        delta.set("output", response);
        Ok(delta)
    }
}
