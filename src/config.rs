// File: src/config.rs
use crate::error::{KeyboardError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Tunables for the keyboard geometry (emission) model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyboardConfig {
    /// Standard deviation of the per-character Gaussian key error.
    pub sigma: f64,
    /// Whole-word log-probability when a character has no key position.
    pub unknown_char_penalty: f64,
    /// Subtracted once per character of length difference.
    pub length_penalty: f64,
    /// Maximum candidates kept per typed word.
    pub candidate_limit: usize,
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            sigma: 2.0,
            unknown_char_penalty: -50.0,
            length_penalty: 2.0,
            candidate_limit: 20,
        }
    }
}

impl KeyboardConfig {
    pub fn variance(&self) -> f64 {
        self.sigma * self.sigma
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageConfig {
    /// Backoff log-probability for bigrams absent from the table.
    pub unk_log_prob: f64,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self { unk_log_prob: -15.0 }
    }
}

/// Weights of the linear score `alpha * transition + beta * emission`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    pub alpha: f64,
    pub beta: f64,
    /// Ranked alternatives kept per audit entry.
    pub audit_size: usize,
}

impl DecoderConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, weight) in [("alpha", self.alpha), ("beta", self.beta)] {
            if !(weight.is_finite() && weight >= 0.0) {
                return Err(KeyboardError::invalid_model(format!(
                    "{name} must be a non-negative number, got {weight}"
                )));
            }
        }
        if self.audit_size == 0 {
            return Err(KeyboardError::invalid_model("audit_size must be at least 1"));
        }
        Ok(())
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 2.0,
            audit_size: 5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub keyboard: KeyboardConfig,
    pub language: LanguageConfig,
    pub decoder: DecoderConfig,
}

impl EngineConfig {
    /// Loads a JSON config. Missing sections and fields fall back to defaults.
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(KeyboardError::model_unavailable(path));
        }
        let raw = fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        tracing::info!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let kb = &self.keyboard;
        if !(kb.sigma.is_finite() && kb.sigma > 0.0) {
            return Err(KeyboardError::invalid_model(format!(
                "sigma must be positive, got {}",
                kb.sigma
            )));
        }
        if !kb.unknown_char_penalty.is_finite() || !kb.length_penalty.is_finite() {
            return Err(KeyboardError::invalid_model("keyboard penalties must be finite"));
        }
        if kb.candidate_limit == 0 {
            return Err(KeyboardError::invalid_model("candidate_limit must be at least 1"));
        }
        if !self.language.unk_log_prob.is_finite() {
            return Err(KeyboardError::invalid_model("unk_log_prob must be finite"));
        }
        self.decoder.validate()
    }
}
