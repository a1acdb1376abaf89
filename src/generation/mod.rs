//! Corpus generation.
//!
//! Runs every prompt of the framework through a [`Synthesizer`] and lays the
//! images out the way the corpus walker expects them.

pub mod synthesizer;

pub use synthesizer::{HttpSynthesizer, SynthesisOptions, Synthesizer};

use crate::corpus::PromptIndex;
use crate::error::AuditError;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Prompts to audit, grouped by category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptFramework {
    pub categories: BTreeMap<String, Vec<String>>,
}

impl PromptFramework {
    /// Load a JSON object mapping category names to prompt lists.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read prompt framework: {}", path.display()))?;

        let framework: PromptFramework =
            serde_json::from_str(&content).map_err(|e| AuditError::PromptFramework {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if let Some(category) = framework.categories.keys().find(|c| !is_safe_category(c)) {
            return Err(AuditError::PromptFramework {
                path: path.to_path_buf(),
                reason: format!("category name '{}' cannot be used as a directory", category),
            }
            .into());
        }

        Ok(framework)
    }

    pub fn prompt_count(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }
}

fn is_safe_category(name: &str) -> bool {
    !name.trim().is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

/// Counts from a generation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationSummary {
    pub prompts: usize,
    pub images_written: usize,
    pub failures: usize,
}

/// Planned image count for the progress bar, clamped instead of wrapping.
fn total_images(prompts: usize, images_per_prompt: usize) -> u64 {
    u64::try_from(prompts.saturating_mul(images_per_prompt)).unwrap_or(u64::MAX)
}

/// Generate `images_per_prompt` images for every prompt under `output_root`.
///
/// A failed synthesis skips that one image; the run continues.
pub fn generate<S: Synthesizer>(
    framework: &PromptFramework,
    synthesizer: &S,
    output_root: &Path,
    images_per_prompt: usize,
    show_progress: bool,
) -> Result<GenerationSummary> {
    fs::create_dir_all(output_root)
        .with_context(|| format!("Failed to create output directory: {}", output_root.display()))?;

    let total = total_images(framework.prompt_count(), images_per_prompt);
    let progress = if show_progress {
        let pb = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    } else {
        ProgressBar::hidden()
    };

    let mut summary = GenerationSummary::default();

    for (category, prompts) in &framework.categories {
        let category_dir = output_root.join(category);
        fs::create_dir_all(&category_dir)
            .with_context(|| format!("Failed to create directory: {}", category_dir.display()))?;

        let mut index = match PromptIndex::load(&category_dir) {
            Ok(index) => index.unwrap_or_default(),
            Err(e) => {
                warn!("Rebuilding prompt index for {}: {:#}", category, e);
                PromptIndex::default()
            }
        };

        for prompt in prompts {
            let folder = index.assign(prompt);
            let prompt_dir = category_dir.join(&folder);
            fs::create_dir_all(&prompt_dir)
                .with_context(|| format!("Failed to create directory: {}", prompt_dir.display()))?;
            // Persist after every prompt so an interrupted run keeps its mapping.
            index.save(&category_dir)?;

            info!("Generating {} images for prompt: '{}'", images_per_prompt, prompt);
            summary.prompts += 1;

            for ordinal in 1..=images_per_prompt {
                match synthesizer.synthesize(prompt) {
                    Ok(Some(bytes)) => {
                        let path = prompt_dir.join(format!("{}.png", ordinal));
                        match fs::write(&path, bytes) {
                            Ok(()) => summary.images_written += 1,
                            Err(e) => {
                                warn!("Failed to save {}: {}", path.display(), e);
                                summary.failures += 1;
                            }
                        }
                    }
                    Ok(None) => {
                        warn!("No image returned for '{}' iteration {}", prompt, ordinal);
                        summary.failures += 1;
                    }
                    Err(e) => {
                        warn!("Error generating image {} for '{}': {:#}", ordinal, prompt, e);
                        summary.failures += 1;
                    }
                }
                progress.inc(1);
            }
        }
    }

    progress.finish_and_clear();
    Ok(summary)
}
