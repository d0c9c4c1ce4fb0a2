//! Judge nodes: an LLM call whose response must carry a numeric score.
//!
//! The evaluator half of the evaluator-optimizer idiom. The response is
//! parsed as JSON with a `score` field; failing that, the first numeric
//! literal in the text is taken. A response with no extractable score is a
//! node failure, like any other collaborator failure.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use crate::{
    Result,
    common::Vars,
    executor::{NodeExecutor, agent::AgentConfig, exec_err},
    graph::GraphNode,
    model::NodeKind,
    resources::{ResourceHandle, ResourceResolver},
    runtime::State,
    template,
};

const DEFAULT_SCORE_KEY: &str = "score";

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-?\d+(\.\d+)?").unwrap())
}

/// Pull a numeric score out of a judge response.
fn extract_score(response: &str) -> Option<f64> {
    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(response.trim()) {
        if let Some(score) = obj.get(DEFAULT_SCORE_KEY).and_then(|v| v.as_f64()) {
            return Some(score);
        }
    }
    number_re().find(response).and_then(|m| m.as_str().parse::<f64>().ok())
}

pub struct JudgeExecutor;

#[async_trait]
impl NodeExecutor for JudgeExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Judge
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

        let prompt = template::resolve_text(state, config.prompt.as_deref().unwrap_or("${state.output}"));
        let params = template::resolve_params(state, &config.params);

        let response = client.invoke(&prompt, &params).await.map_err(|e| exec_err(node, e.to_string()))?;

        let score = extract_score(&response).ok_or_else(|| exec_err(node, format!("no numeric score in judge response: {response:?}")))?;

        let mut delta = Vars::new();
        delta.set(config.output_key.as_deref().unwrap_or(DEFAULT_SCORE_KEY), score);
        delta.set("output", response);
        Ok(delta)
    }
}
