// Outline Core Library
//
// Evidence-weighted heading classification: decoded text fragments in,
// Title/H1/H2/H3 outline out.

pub mod config;
pub mod embedding;
pub mod error;
pub mod language;
pub mod processor;
pub mod rules;
pub mod types;

// Re-export main types and functions for easy use
pub use config::ClassifierConfig;
pub use embedding::{EmbeddingProvider, PrototypeSet};
pub use error::{OutlineError, Result};
pub use language::{Language, LanguageIdentifier, LanguageProfile, ScriptLanguageIdentifier};
pub use processor::{ClassificationTrace, OutlineClassifier};
pub use types::*;
