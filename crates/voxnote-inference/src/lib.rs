//! # voxnote-inference
//!
//! Backends for the external model calls voxnote makes.
//!
//! This crate provides:
//! - OpenAI-compatible embeddings and chat generation
//! - An LLM-backed classifier with a strict reply contract
//! - Whisper-compatible audio transcription
//! - A recognizer segment accumulator for long dictations
//! - Deterministic mock backends (feature `mock`)
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use voxnote_inference::{LlmClassifier, OpenAIBackend};
//!
//! let backend = Arc::new(OpenAIBackend::from_env().unwrap());
//! let classifier = LlmClassifier::new(backend);
//! ```

pub mod classifier;
pub mod openai;
pub mod recognition;
pub mod transcription;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use classifier::LlmClassifier;
pub use openai::{OpenAIBackend, OpenAIConfig};
pub use recognition::{RecognitionState, SegmentAccumulator};
pub use transcription::{
    language_hint, TranscriptionBackend, TranscriptionResult, WhisperBackend, WhisperConfig,
};
