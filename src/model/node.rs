use serde::{Deserialize, Serialize};

/// The kind of a workflow step, a closed set.
///
/// Each kind has exactly one executor implementation; see
/// [`crate::executor`].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NodeKind {
    /// One LLM call with a templated prompt.
    Agent,
    /// A loaded function invoked with the run state.
    Tool,
    /// An LLM call whose response is parsed into a numeric score.
    Judge,
    /// A routing anchor; executes as a no-op.
    Branch,
    /// A tool served by an external process over a command protocol.
    #[serde(rename = "external-tool")]
    #[strum(serialize = "external-tool")]
    ExternalTool,
}

/// One step declared in a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeModel {
    /// Node id, unique within the workflow.
    pub id: String,
    /// Node kind.
    pub kind: NodeKind,
    /// Key into the spec's resource mapping. Required for agent/tool/judge,
    /// forbidden for branch and external-tool.
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// Kind-specific configuration block (prompt, output key, parameters).
    /// Opaque at this level; each executor validates its own shape.
    #[serde(default)]
    pub config: serde_json::Value,
    /// Terminal flag: the run ends once this node has executed.
    #[serde(default)]
    pub stop: bool,
    /// Explicit entry marker for `custom_graph` workflows. At most one node
    /// may set it; other workflow types start at the first declared node.
    #[serde(default)]
    pub entry: bool,
}
