//! Corpus walker for discovering generated images.
//!
//! The generation stage lays images out as
//! `root/<category>/<prompt folder>/<ordinal>.<ext>`. The walker turns that
//! tree into a lazy stream of classification jobs, one per image file.

pub mod index;

pub use index::PromptIndex;

use crate::error::AuditError;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// One image to classify, with the category and prompt it was generated for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageJob {
    pub category: String,
    pub prompt: String,
    pub image_path: PathBuf,
}

/// Lazy stream of [`ImageJob`]s in filesystem enumeration order.
pub struct CorpusWalk {
    inner: Box<dyn Iterator<Item = ImageJob>>,
}

impl Iterator for CorpusWalk {
    type Item = ImageJob;

    fn next(&mut self) -> Option<ImageJob> {
        self.inner.next()
    }
}

/// Walker over a generated corpus directory.
#[derive(Debug, Clone)]
pub struct CorpusWalker {
    root: PathBuf,
    extension: String,
}

impl CorpusWalker {
    /// Create a walker for images with the given extension (without dot).
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start a walk over the corpus.
    ///
    /// Fails only when the root directory is missing. Each call starts a
    /// fresh walk; the filesystem is the only state.
    pub fn walk(&self) -> Result<CorpusWalk, AuditError> {
        if !self.root.is_dir() {
            return Err(AuditError::MissingCorpus {
                path: self.root.clone(),
            });
        }

        let extension = self.extension.clone();
        let jobs = subdirectories(&self.root).flat_map(move |(category, category_dir)| {
            category_jobs(category, category_dir, extension.clone())
        });

        Ok(CorpusWalk {
            inner: Box::new(jobs),
        })
    }
}

/// Jobs for every image under one category directory.
fn category_jobs(
    category: String,
    category_dir: PathBuf,
    extension: String,
) -> impl Iterator<Item = ImageJob> {
    debug!("Walking category '{}'", category);

    let index = match PromptIndex::load(&category_dir) {
        Ok(index) => index.unwrap_or_default(),
        Err(e) => {
            warn!("Ignoring prompt index in {}: {:#}", category_dir.display(), e);
            PromptIndex::default()
        }
    };

    subdirectories(&category_dir).flat_map(move |(folder, prompt_dir)| {
        let prompt = index.resolve(&folder);
        let category = category.clone();
        image_files(&prompt_dir, &extension).map(move |image_path| ImageJob {
            category: category.clone(),
            prompt: prompt.clone(),
            image_path,
        })
    })
}

/// Immediate subdirectories of `dir` as (name, path) pairs.
fn subdirectories(dir: &Path) -> impl Iterator<Item = (String, PathBuf)> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_dir())
        .map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            (name, entry.into_path())
        })
}

/// Files directly in `dir` whose name ends in `.<extension>`, ignoring case.
fn image_files(dir: &Path, extension: &str) -> impl Iterator<Item = PathBuf> {
    let suffix = format!(".{}", extension.to_lowercase());

    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(move |entry| {
            entry
                .file_name()
                .to_string_lossy()
                .to_lowercase()
                .ends_with(&suffix)
        })
        .map(|entry| entry.into_path())
}
