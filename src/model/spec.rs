use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    Result, SpecflowError,
    model::{EdgeModel, NodeModel},
};

/// The declared shape of a workflow graph.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WorkflowType {
    /// A straight chain; edges may be omitted and are auto-generated.
    Sequential,
    /// An explicit node/edge graph with conditional routing.
    CustomGraph,
    /// A generate/evaluate cycle bounded by `max_iterations`. Not a distinct
    /// engine mode: an ordinary cyclic graph using the iteration cap.
    EvaluatorOptimizer,
    /// A reason-and-act loop over agent and tool nodes.
    React,
}

/// A named resource configuration (LLM config, tool config). Opaque to the
/// core beyond name and type; the concrete client is supplied at run time
/// through a [`crate::ResourceResolver`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceModel {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

/// The workflow block of a spec document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowModel {
    #[serde(rename = "type")]
    pub workflow_type: WorkflowType,
    pub nodes: Vec<NodeModel>,
    #[serde(default)]
    pub edges: Vec<EdgeModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
}

/// A fully merged, decoded spec document.
///
/// A `SpecModel` is built once (load + merge + decode) and can be compiled
/// into a [`crate::Graph`] that is reused for many runs. Any `reference`
/// keys have already been consumed by the resolver by the time a document
/// decodes into this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecModel {
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub runtime: String,
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceModel>,
    pub workflow: WorkflowModel,
}

impl SpecModel {
    /// Decode a merged generic tree into the typed model.
    ///
    /// Missing or mistyped top-level fields and unrecognized node kinds
    /// surface here as validation errors.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value::<SpecModel>(value).map_err(|e| SpecflowError::Validation(format!("invalid spec: {}", e)))
    }

    /// Decode a spec from YAML text (JSON is a subset and also accepted).
    pub fn from_yaml(s: &str) -> Result<Self> {
        let value: serde_json::Value = serde_yaml::from_str(s)?;
        Self::from_value(value)
    }
}
