//! # Specflow
//!
//! Specflow is a lightweight declarative workflow engine written in Rust.
//! Workflows are YAML documents describing a graph of LLM, tool and routing
//! nodes; the engine compiles them once and executes them to completion
//! over a shared key-value state.
//!
//! ## Core Features
//!
//! - **Declarative Specs**: Workflows are data, composed across files via
//!   `reference` with deterministic deep-merge
//! - **Compiled Graphs**: Specs are validated and compiled into an
//!   immutable graph before any execution
//! - **Deterministic Branching**: Conditioned edges use a closed expression
//!   language; fan-out results merge in declaration order
//! - **Async Execution**: Powered by `tokio`, frontier nodes run concurrently
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use specflow::{EngineBuilder, StaticResources};
//!
//! let spec = specflow::load_and_merge_spec("workflow.yaml")?;
//! let graph = specflow::compile_spec(&spec)?;
//!
//! let engine = EngineBuilder::new().build()?;
//! let resources = StaticResources::new();
//! let state = engine.run(&graph, &resources, "draft a haiku").await?;
//! println!("{:?}", state.output());
//! ```

mod builder;
mod common;
mod config;
mod error;
mod executor;
mod graph;
mod model;
mod resolver;
mod resources;
mod runtime;
mod template;

use std::path::Path;

pub use builder::EngineBuilder;
pub use common::Vars;
pub use config::{Config, EngineConfig};
pub use error::SpecflowError;
pub use executor::{Executors, NodeExecutor};
pub use graph::{Graph, GraphEdge, GraphNode};
pub use model::*;
pub use resolver::{DocumentSource, FsSource, MemSource, SpecLoader, deep_merge};
pub use resources::{LlmClient, ProtocolToolClient, ResourceHandle, ResourceResolver, StaticResources, ToolHandler};
pub use runtime::{Engine, RunFailure, State};
pub use template::{Condition, resolve_params, resolve_text};

/// Result type alias for Specflow operations.
pub type Result<T> = std::result::Result<T, SpecflowError>;

/// Load a spec document from the filesystem, resolving its `reference`
/// chain and deep-merging the documents into one model.
pub fn load_and_merge_spec<T: AsRef<Path>>(path: T) -> Result<SpecModel> {
    load_and_merge_spec_with(&SpecLoader::new(FsSource), path)
}

/// Like [`load_and_merge_spec`] but through a caller-provided loader, so
/// embedders can supply their own document source or share a cache.
pub fn load_and_merge_spec_with<S: DocumentSource, T: AsRef<Path>>(
    loader: &SpecLoader<S>,
    path: T,
) -> Result<SpecModel> {
    let merged = loader.resolve(path.as_ref())?;
    SpecModel::from_value(merged)
}

/// Validate a spec model and compile it into an executable graph.
pub fn compile_spec(spec: &SpecModel) -> Result<Graph> {
    graph::compile(spec)
}
