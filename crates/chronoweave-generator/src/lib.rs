//! Chronoweave Generator — infrastructure adapter for the narrative
//! generator contract.
//!
//! `HttpNarrativeGenerator` posts each `GenerationRequest` as JSON to a
//! hosted endpoint and decodes the `GenerationOutput` it answers with.
//! Retries belong to the engine; each `generate` call is one HTTP attempt.

pub mod http_generator;

pub use http_generator::{HttpGeneratorConfig, HttpNarrativeGenerator};
