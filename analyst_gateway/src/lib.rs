//! Secure Analyst Gateway
//!
//! Mediates between free-text chat input and an LLM-backed financial
//! analyst:
//! - Classifies every message for prompt-injection risk before it reaches a model
//! - Tracks per-session trust state and escalates from warning to blocking
//! - Enforces per-session sliding-window rate limits
//! - Routes messages to question answering, watchlist registration or comparison
//! - Assembles responses with text, charts and downloadable reports
//!
//! PIPELINE:
//! SESSION → BLOCKED? → RATE LIMIT → CLASSIFY → ROUTE → DISPATCH → ASSEMBLE

pub mod api;
pub mod assembler;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod intent;
pub mod models;
pub mod orchestrator;
pub mod rate_limit;
pub mod session;
pub mod symbols;
pub mod threat;

pub use error::{GatewayError, Result};

// Re-export common types
pub use config::GatewayConfig;
pub use intent::{Intent, IntentStrategy, LexicalRouter};
pub use models::*;
pub use orchestrator::Orchestrator;
pub use threat::{ThreatClassifier, ThreatLevel};
