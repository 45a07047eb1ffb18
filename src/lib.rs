//! Consolidation Agent Core
//!
//! Orchestration core of an AI assistant for group-consolidation auditors:
//! - Time-boxed per-user authorization modes (Explain / Action)
//! - Pluggable tools with declared authorization and batch support
//! - Intent resolution with trigger phrases and an advisory language model
//! - Uniform reasoning chains, quality indicators and provenance
//! - Append-only, hash-sealed audit trail of requests and user decisions
//!
//! REQUEST LOOP:
//! MODE → SPECIAL COMMAND? → INTENT → AUTHORIZE → DISPATCH → RESPOND → AUDIT

pub mod agent;
pub mod audit;
pub mod config;
pub mod disclaimer;
pub mod error;
pub mod intent;
pub mod llm;
pub mod mode;
pub mod models;
pub mod provenance;
pub mod reasoning;
pub mod store;
pub mod structured;
pub mod tools;

pub use error::{OrchestrationError, Result};

// Re-export common types
pub use agent::Orchestrator;
pub use audit::{AuditFilter, AuditRecorder, DateRange, InMemoryAuditStore};
pub use config::AgentConfig;
pub use mode::ModeManager;
pub use models::*;
pub use tools::{Tool, ToolRegistry};
