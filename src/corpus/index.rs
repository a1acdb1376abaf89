//! Prompt folder naming and the per-category sidecar index.
//!
//! Folder names are a lossy rendering of the prompt text. The sidecar
//! `prompt_index.json` written next to the prompt folders keeps the
//! original text so the analysis stage never has to guess it back.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// File name of the sidecar index inside each category directory.
pub const INDEX_FILE_NAME: &str = "prompt_index.json";

/// Folder name used when sanitizing leaves nothing behind.
const EMPTY_FOLDER_FALLBACK: &str = "prompt";

/// Turn prompt text into a filesystem-safe folder name.
///
/// Keeps alphanumerics, spaces and underscores, trims trailing whitespace and
/// replaces spaces with underscores.
pub fn sanitize_prompt(prompt: &str) -> String {
    let kept: String = prompt
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '_')
        .collect();

    let folder = kept.trim_end().replace(' ', "_");
    if folder.is_empty() {
        EMPTY_FOLDER_FALLBACK.to_string()
    } else {
        folder
    }
}

/// Best-effort inverse of [`sanitize_prompt`] for folders without an index entry.
pub fn folder_to_prompt(folder: &str) -> String {
    folder.replace('_', " ")
}

/// Mapping from prompt folder name to the original prompt text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptIndex {
    pub prompts: BTreeMap<String, String>,
}

impl PromptIndex {
    /// Load the index stored in `category_dir`, if there is one.
    pub fn load(category_dir: &Path) -> Result<Option<Self>> {
        let path = category_dir.join(INDEX_FILE_NAME);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read prompt index: {}", path.display()))?;
        let index = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse prompt index: {}", path.display()))?;

        Ok(Some(index))
    }

    /// Write the index into `category_dir`, replacing any previous one.
    pub fn save(&self, category_dir: &Path) -> Result<()> {
        let path = category_dir.join(INDEX_FILE_NAME);
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write prompt index: {}", path.display()))
    }

    /// Reserve a folder for `prompt`.
    ///
    /// The same prompt always gets the same folder. A different prompt that
    /// sanitizes to an already-taken name gets a numeric suffix instead.
    pub fn assign(&mut self, prompt: &str) -> String {
        if let Some((folder, _)) = self.prompts.iter().find(|(_, text)| text.as_str() == prompt) {
            return folder.clone();
        }

        let base = sanitize_prompt(prompt);
        let mut folder = base.clone();
        let mut suffix = 2;
        while self.prompts.contains_key(&folder) {
            folder = format!("{}_{}", base, suffix);
            suffix += 1;
        }

        self.prompts.insert(folder.clone(), prompt.to_string());
        folder
    }

    /// Prompt text for a folder, falling back to the lossy inverse.
    pub fn resolve(&self, folder: &str) -> String {
        self.prompts
            .get(folder)
            .cloned()
            .unwrap_or_else(|| folder_to_prompt(folder))
    }
}
