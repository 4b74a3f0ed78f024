//! Ollama LLM integration module
//!
//! This module provides a client for Ollama's `/api/generate` endpoint,
//! decoding its newline-delimited JSON stream into text fragments.

pub mod client;
pub mod frames;
pub mod stop;

pub use client::{
    ChunkStream, GenerateRequest, GenerateResponse, GenerateStats, OllamaClient, StreamChunk,
    StreamError,
};
pub use stop::StopFlag;
