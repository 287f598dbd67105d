// src/lib.rs

pub mod config;
pub mod core;
pub mod corpus;
pub mod error;
pub mod persistence;

pub use crate::config::EngineConfig;
pub use crate::core::decoder::ViterbiDecoder;
pub use crate::core::engine::{CorrectionEngine, ModelPaths};
pub use crate::core::keyboard::{EmissionModel, KeyboardLayout, KeyboardModel};
pub use crate::core::language::{LanguageModel, TransitionModel, TransitionTable};
pub use crate::core::session::Session;
pub use crate::core::types::{AuditEntry, CorrectionResult, Identified, RankedCandidate, START_TOKEN};
pub use crate::error::{KeyboardError, Result};
