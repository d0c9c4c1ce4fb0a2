mod engine;
mod state;

pub use engine::{Engine, RunFailure};
pub use state::State;
