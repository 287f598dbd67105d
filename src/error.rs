//! Error types for the keyboard correction engine.
//!
//! Only model construction and persistence can fail. Per-word anomalies
//! (unknown keys, unseen bigrams) are absorbed into score penalties and never
//! surface here.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeyboardError {
    /// I/O errors while reading or writing model files
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON (de)serialization of vocabularies, layouts, matrices and configs
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary snapshot (de)serialization
    #[error("Snapshot encoding error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Atomic rename of a temporary snapshot file failed
    #[error("Could not persist file: {0}")]
    Persist(#[from] tempfile::PersistError),

    /// A backing model file could not be located. Fatal at startup.
    #[error("Model unavailable: {} not found", path.display())]
    ModelUnavailable { path: PathBuf },

    /// Model data or configuration that violates an invariant
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    /// A cancellable decode was stopped before reaching `position`
    #[error("Decoding cancelled before position {position}")]
    Cancelled { position: usize },
}

pub type Result<T> = std::result::Result<T, KeyboardError>;

impl KeyboardError {
    pub fn invalid_model<S: Into<String>>(msg: S) -> Self {
        KeyboardError::InvalidModel(msg.into())
    }

    pub fn model_unavailable<P: Into<PathBuf>>(path: P) -> Self {
        KeyboardError::ModelUnavailable { path: path.into() }
    }

    /// Whether this error must abort startup rather than a single request.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, KeyboardError::Cancelled { .. })
    }
}
