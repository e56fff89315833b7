//! Parsons Forge · adaptive Parsons puzzle generation.
//!
//! Core: a resilient model client, a tolerant response parser, a sanitizer, a
//! difficulty scheduler and a skill model, composed by `orchestrator`. The `state`,
//! `protocol` and `routes` modules are a thin in-memory HTTP host around the core.

pub mod config;
pub mod domain;
pub mod error;
pub mod learner;
pub mod llm;
pub mod orchestrator;
pub mod parser;
pub mod prompts;
pub mod protocol;
pub mod routes;
pub mod sanitize;
pub mod scheduler;
pub mod state;
pub mod telemetry;
pub mod util;
