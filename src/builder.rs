use std::sync::Arc;

use crate::{
    Engine, Result,
    config::EngineConfig,
    executor::{Executors, NodeExecutor},
};

pub struct EngineBuilder {
    config: EngineConfig,
    executors: Executors,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
            executors: Executors::default(),
        }
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(
        mut self,
        config: EngineConfig,
    ) -> Self {
        self.config = config;
        self
    }

    pub fn default_max_iterations(
        mut self,
        max: u32,
    ) -> Self {
        self.config.default_max_iterations = Some(max);
        self
    }

    /// Replace the executor for its kind.
    pub fn executor(
        mut self,
        executor: Arc<dyn NodeExecutor>,
    ) -> Self {
        self.executors.register(executor);
        self
    }

    pub fn build(self) -> Result<Engine> {
        let engine = Engine::with_parts(self.executors, self.config.default_max_iterations);

        Ok(engine)
    }
}
