mod condition;
mod params;

pub use condition::Condition;
pub use params::{resolve_params, resolve_text};
