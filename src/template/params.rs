//! Parameter templating over run state.
//!
//! Two substitution forms are recognized inside string parameters:
//! - `${state.KEY}` - the stringified value of `State[KEY]`, or the empty
//!   string when the key is absent (or null).
//! - `${state.json.FIELD}` - `State.output` parsed as JSON with `FIELD`
//!   extracted; when output is not parseable JSON or the field is absent,
//!   the template text is left in place untouched. Never an error.
//!
//! Non-template values pass through unchanged.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::runtime::State;

/// Format: `${state.json.FIELD}`
const STATE_JSON_PATTERN: &str = r"\$\{state\.json\.([A-Za-z0-9_]+)\}";
/// Format: `${state.KEY}`
const STATE_KEY_PATTERN: &str = r"\$\{state\.([A-Za-z0-9_]+)\}";

fn state_json_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(STATE_JSON_PATTERN).unwrap())
}

fn state_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(STATE_KEY_PATTERN).unwrap())
}

/// Substitute both template forms in a string.
pub fn resolve_text(
    state: &State,
    template: &str,
) -> String {
    let mut result = template.to_string();

    // `${state.json.FIELD}` first: the plain key pattern cannot match these
    // (the extra dot), but resolving json fields before keys keeps the
    // precedence obvious.
    let parsed_output = parsed_output(state);
    for caps in state_json_re().captures_iter(template) {
        let full_match = &caps[0];
        let field = &caps[1];

        if let Some(value) = parsed_output.as_ref().and_then(|o| o.get(field)) {
            result = result.replace(full_match, &stringify(value));
        }
        // Unresolvable: leave the template text as-is.
    }

    let intermediate = result.clone();
    for caps in state_key_re().captures_iter(&intermediate) {
        let full_match = &caps[0];
        let key = &caps[1];

        let replacement = state.get(key).map(stringify).unwrap_or_default();
        result = result.replace(full_match, &replacement);
    }

    result
}

/// Substitute templates recursively through a JSON parameter tree.
pub fn resolve_params(
    state: &State,
    value: &Value,
) -> Value {
    match value {
        Value::String(s) => Value::String(resolve_text(state, s)),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve_params(state, v)).collect()),
        Value::Object(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), resolve_params(state, v))).collect()),
        _ => value.clone(),
    }
}

/// `State.output` as a JSON tree, when it holds one. A string output is
/// parsed as JSON text; a structured output is used directly.
fn parsed_output(state: &State) -> Option<Value> {
    match state.output() {
        Some(Value::String(s)) => serde_json::from_str(s).ok(),
        Some(v @ Value::Object(_)) | Some(v @ Value::Array(_)) => Some(v.clone()),
        _ => None,
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}
