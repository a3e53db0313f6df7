//! AgentVerse-State: memory records and collaborator services
//!
//! This crate provides the data layer for the AgentVerse memory pipeline.
//! It defines the record schema and the narrow service interfaces that
//! memory manipulators call through.
//!
//! ## Key Components
//!
//! - `MemoryRecord`: a single conversational memory with optional scores
//! - `EmbeddingService` / `LlmService` / `MemoryStore`: async collaborator traits
//! - `OpenAiClient`: HTTP implementation of the LLM and embedding traits
//! - `JsonFileStore`: memory store over a JSON file
//! - `fakes`: deterministic in-memory implementations for tests

mod error;
pub mod fakes;
mod file_store;
mod http;
mod record;
pub mod service_traits;

pub use error::ServiceError;
pub use file_store::JsonFileStore;
pub use http::{ClientConfig, OpenAiClient};
pub use record::MemoryRecord;
pub use service_traits::{EmbeddingService, LlmResponse, LlmService, MemoryStore, ServiceResult};
