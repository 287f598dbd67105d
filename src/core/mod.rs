// src/core/mod.rs
pub mod audit;
pub mod decoder;
pub mod engine;
pub mod keyboard;
pub mod language;
pub mod session;
pub mod types;
