// File: src/persistence.rs
use crate::core::keyboard::KeyboardLayout;
use crate::core::language::TransitionTable;
use crate::core::types::KeyPosition;
use crate::error::{KeyboardError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Everything the engine needs, in one binary file that loads much faster
/// than the JSON matrix it was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub vocabulary: Vec<String>,
    pub layout: KeyboardLayout,
    pub table: TransitionTable,
}

fn ensure_exists(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(KeyboardError::model_unavailable(path))
    }
}

fn open_existing(path: &Path) -> Result<File> {
    ensure_exists(path)?;
    Ok(File::open(path)?)
}

/// Writes through a temp file in the target directory and renames it into
/// place, so readers never observe a half-written file.
fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<&mut File>) -> Result<()>,
{
    let parent_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent_dir)?;

    let mut temp_file = NamedTempFile::new_in(parent_dir)?;
    {
        let mut writer = BufWriter::new(temp_file.as_file_mut());
        write(&mut writer)?;
        writer.flush()?;
    }
    temp_file.persist(path)?;
    Ok(())
}

/// Reads a vocabulary either as a JSON array of strings or as plain text with
/// one word per line.
pub fn load_vocabulary(path: &Path) -> Result<Vec<String>> {
    ensure_exists(path)?;
    let raw = fs::read_to_string(path)?;

    let words: Vec<String> = if raw.trim_start().starts_with('[') {
        serde_json::from_str(&raw)?
    } else {
        raw.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    };

    tracing::info!(path = %path.display(), words = words.len(), "loaded vocabulary");
    Ok(words)
}

/// Reads a `{"a": {"x": 0.25, "y": 1.0}, ...}` layout file.
pub fn load_layout(path: &Path) -> Result<KeyboardLayout> {
    let reader = BufReader::new(open_existing(path)?);
    let raw: HashMap<String, KeyPosition> = serde_json::from_reader(reader)?;
    let layout = KeyboardLayout::from_map(raw)?;
    tracing::info!(path = %path.display(), keys = layout.len(), "loaded keyboard layout");
    Ok(layout)
}

pub fn save_layout(layout: &KeyboardLayout, path: &Path) -> Result<()> {
    write_atomically(path, |writer| Ok(serde_json::to_writer_pretty(writer, &layout.to_map())?))
}

/// Reads the `{prev: {curr: probability}}` JSON matrix produced offline.
pub fn load_transition_table(path: &Path) -> Result<TransitionTable> {
    let reader = BufReader::new(open_existing(path)?);
    let table: TransitionTable = serde_json::from_reader(reader)?;
    tracing::info!(path = %path.display(), bigrams = table.len(), "loaded transition table");
    Ok(table)
}

pub fn save_transition_table(table: &TransitionTable, path: &Path) -> Result<()> {
    write_atomically(path, |writer| Ok(serde_json::to_writer(writer, table)?))?;
    tracing::info!(path = %path.display(), bigrams = table.len(), "saved transition table");
    Ok(())
}

pub fn save_vocabulary(words: &[String], path: &Path) -> Result<()> {
    write_atomically(path, |writer| {
        for word in words {
            writeln!(writer, "{word}")?;
        }
        Ok(())
    })
}

pub fn save_snapshot(snapshot: &ModelSnapshot, path: &Path) -> Result<()> {
    write_atomically(path, |writer| Ok(bincode::serialize_into(writer, snapshot)?))?;
    tracing::info!(path = %path.display(), "saved model snapshot");
    Ok(())
}

pub fn load_snapshot(path: &Path) -> Result<ModelSnapshot> {
    let reader = BufReader::new(open_existing(path)?);
    let snapshot: ModelSnapshot = bincode::deserialize_from(reader)?;
    tracing::info!(
        path = %path.display(),
        words = snapshot.vocabulary.len(),
        bigrams = snapshot.table.len(),
        "loaded model snapshot"
    );
    Ok(snapshot)
}
