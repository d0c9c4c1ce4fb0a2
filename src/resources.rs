//! Collaborator contracts consumed by the engine.
//!
//! The core never talks to a provider, loads a function, or spawns a
//! subprocess itself. Each run receives a [`ResourceResolver`] that maps
//! resource names from the spec to concrete client handles; the node
//! executors invoke those handles with templated parameters. Retry and
//! backoff for flaky calls live behind these traits: an implementation
//! either succeeds, retries internally up to its own bound, or returns a
//! single terminal failure. The engine performs no retries of its own.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::{Result, common::Vars, runtime::State};

/// An LLM provider client.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run one completion over the templated prompt.
    async fn invoke(
        &self,
        prompt: &str,
        params: &Value,
    ) -> Result<String>;
}

/// A loaded tool function.
///
/// Receives the current run state (read-only) plus the node's templated
/// static parameters, and returns a partial state update.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(
        &self,
        state: &State,
        params: &Value,
    ) -> Result<Vars>;
}

/// A client for tools served by an external process over a command
/// protocol.
#[async_trait]
pub trait ProtocolToolClient: Send + Sync {
    async fn call(
        &self,
        command: &str,
        working_dir: Option<&str>,
        tool: &str,
        parameters: &Value,
    ) -> Result<String>;
}

/// A concrete client handle, one variant per collaborator contract.
#[derive(Clone)]
pub enum ResourceHandle {
    Llm(Arc<dyn LlmClient>),
    Tool(Arc<dyn ToolHandler>),
    Protocol(Arc<dyn ProtocolToolClient>),
}

impl ResourceHandle {
    pub fn llm(client: impl LlmClient + 'static) -> Self {
        Self::Llm(Arc::new(client))
    }

    pub fn tool(handler: impl ToolHandler + 'static) -> Self {
        Self::Tool(Arc::new(handler))
    }

    pub fn protocol(client: impl ProtocolToolClient + 'static) -> Self {
        Self::Protocol(Arc::new(client))
    }
}

/// Maps resource names declared in the spec to concrete client handles.
pub trait ResourceResolver: Send + Sync {
    fn lookup(
        &self,
        name: &str,
    ) -> Option<ResourceHandle>;
}

/// A fixed name-to-handle table, sufficient for most embedders and for
/// tests.
#[derive(Default)]
pub struct StaticResources {
    handles: std::collections::HashMap<String, ResourceHandle>,
}

impl StaticResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(
        mut self,
        name: &str,
        handle: ResourceHandle,
    ) -> Self {
        self.handles.insert(name.to_string(), handle);
        self
    }
}

impl ResourceResolver for StaticResources {
    fn lookup(
        &self,
        name: &str,
    ) -> Option<ResourceHandle> {
        self.handles.get(name).cloned()
    }
}
