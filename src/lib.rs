//! Rust-flavored building blocks for AGNO cookbook agents.
//!
//! The crate provides:
//! - A language model abstraction (`LanguageModel`) with an OpenAI-compatible client.
//! - A simple tool interface (`Tool` and `ToolRegistry`) plus file and shell toolkits.
//! - An `Agent` that loops between the model and tools, atomically or as a stream.
//! - Configuration schemas for memory, pgvector storage and container deployment.
//! - HTTP routers for health, agent and assistant endpoints (feature `server`).

mod agent;
mod api;
mod config;
mod deployment;
mod error;
mod knowledge;
mod llm;
mod logging;
mod memory;
mod message;
mod time;
mod tool;
mod toolkit;
mod vectordb;

#[cfg(feature = "server")]
pub mod server;
pub mod tools;

pub use agent::{
    Agent, AgentResponse, ResponseStream, RunEvent, RunOptions, RunResponse, ToolExecution,
};
pub use api::{ApiResponse, ApiStatus};
pub use config::{
    AppConfig, LoggingConfig, ModelConfig, Provider, RuntimeEnv, ServerConfig, RUNTIME_ENV_VAR,
};
pub use deployment::{PgVectorDb, PgVectorDbOverrides, PgVectorPreset};
pub use error::{AgnoError, Result};
pub use knowledge::{
    Document, Embedder, InMemoryVectorStore, KnowledgeBase, Retriever, ScoredDocument,
    VectorStore, WhitespaceEmbedder,
};
pub use llm::{LanguageModel, ModelCompletion, ModelDelta, ModelStream, OpenAIClient, StubModel};
pub use logging::init_logging;
pub use memory::{
    ConversationMemory, InMemoryMemoryDb, MemoryDb, MemoryRecord, MemoryRetrieval, MemoryRow,
};
pub use message::{Message, Role, ToolCall, ToolResult};
pub use time::{current_utc_seconds_str, current_utc_str, format_utc_micros, format_utc_seconds};
pub use tool::{Tool, ToolDescription, ToolRegistry};
pub use toolkit::file_toolkit;
pub use vectordb::{
    Distance, HnswIndex, IndexType, IvfflatIndex, PgVectorSettings, SearchType, VectorIndex,
};
