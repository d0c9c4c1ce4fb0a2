use serde::{Deserialize, Serialize};

/// A possible transition between two nodes.
///
/// An edge without a condition always fires; a conditioned edge fires iff
/// its condition evaluates truthy against the run state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdgeModel {
    pub source: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}
