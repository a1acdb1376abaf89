//! The audit table: one tidy row per generated image.
//!
//! Building drives the corpus walker and the classifier adapter; the result
//! is persisted as a CSV artifact that the reporting stage reloads on its
//! own.

use crate::classifier::{ClassifierAdapter, FaceAnalyzer};
use crate::corpus::CorpusWalker;
use crate::error::AuditError;
use crate::models::{AttributeRecord, DetectionSummary};
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// In-memory audit table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditTable {
    records: Vec<AttributeRecord>,
}

impl AuditTable {
    pub fn new(records: Vec<AttributeRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[AttributeRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rows with a genuine classification only.
    ///
    /// Bias aggregation runs on this view; applying it again is a no-op.
    pub fn without_sentinels(&self) -> AuditTable {
        AuditTable::new(
            self.records
                .iter()
                .filter(|r| r.is_classified())
                .cloned()
                .collect(),
        )
    }

    /// Classification outcome counts over every row.
    pub fn detection_summary(&self) -> DetectionSummary {
        DetectionSummary::from_records(&self.records)
    }

    /// Load a table written by [`AuditTable::save`].
    pub fn load(path: &Path) -> Result<Self, AuditError> {
        if !path.is_file() {
            return Err(AuditError::MissingArtifact {
                path: path.to_path_buf(),
            });
        }

        let table_error = |source| AuditError::Table {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = csv::Reader::from_path(path).map_err(table_error)?;
        let records = reader
            .deserialize()
            .collect::<Result<Vec<AttributeRecord>, csv::Error>>()
            .map_err(table_error)?;

        debug!("Loaded {} rows from {}", records.len(), path.display());
        Ok(Self { records })
    }

    /// Write the table as CSV, replacing any existing file atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

        let temp = NamedTempFile::new_in(&parent)
            .with_context(|| format!("Failed to create temporary file in {}", parent.display()))?;
        {
            let mut writer = csv::Writer::from_writer(temp.as_file());
            if self.records.is_empty() {
                writer.write_record(["category", "prompt", "image_path", "dominant_race", "gender"])?;
            }
            for record in &self.records {
                writer.serialize(record)?;
            }
            writer.flush()?;
        }

        temp.persist(path)
            .with_context(|| format!("Failed to write audit table: {}", path.display()))?;
        Ok(())
    }
}

/// Result of an extraction run.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// The table was written to `path`.
    Written { path: PathBuf, summary: DetectionSummary },
    /// The corpus held no images; nothing was written.
    Empty,
}

/// Classify every image under the walker's root into an audit table.
///
/// Only a missing corpus root is an error; every discovered image yields
/// exactly one record.
pub fn build<A: FaceAnalyzer>(
    walker: &CorpusWalker,
    classifier: &ClassifierAdapter<A>,
    show_progress: bool,
) -> Result<AuditTable, AuditError> {
    let jobs = walker.walk()?;

    let progress = if show_progress {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {pos} images {msg}") {
            pb.set_style(style);
        }
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    } else {
        ProgressBar::hidden()
    };

    let mut records = Vec::new();
    let mut current_prompt: Option<(String, String)> = None;

    for job in jobs {
        let key = (job.category.clone(), job.prompt.clone());
        if current_prompt.as_ref() != Some(&key) {
            info!("Analyzing prompt: '{}' ({})", job.prompt, job.category);
            progress.set_message(job.prompt.clone());
            current_prompt = Some(key);
        }

        let attributes = classifier.classify(&job.image_path);
        debug!(
            "{} -> {} / {}",
            job.image_path.display(),
            attributes.dominant_race,
            attributes.gender
        );

        records.push(AttributeRecord::new(
            job.category,
            job.prompt,
            job.image_path.to_string_lossy(),
            attributes,
        ));
        progress.inc(1);
    }

    progress.finish_and_clear();
    Ok(AuditTable::new(records))
}

/// Build the table and persist it unless the corpus is empty.
pub fn extract<A: FaceAnalyzer>(
    walker: &CorpusWalker,
    classifier: &ClassifierAdapter<A>,
    output: &Path,
    show_progress: bool,
) -> Result<Extraction> {
    info!("Starting analysis of images in '{}'", walker.root().display());
    let table = build(walker, classifier, show_progress)?;

    if table.is_empty() {
        return Ok(Extraction::Empty);
    }

    table.save(output)?;
    info!("Saved {} rows to {}", table.len(), output.display());

    Ok(Extraction::Written {
        path: output.to_path_buf(),
        summary: table.detection_summary(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::tests::StubAnalyzer;
    use crate::classifier::{AnalyzeOptions, AnalyzerOutput, FaceAnalysis};
    use crate::models::{Attributes, Dimension, ANALYSIS_ERROR, NO_FACE_DETECTED};
    use std::collections::HashSet;
    use std::fs;
    use tempfile::TempDir;

    fn doctor_corpus() -> TempDir {
        let dir = TempDir::new().unwrap();
        let prompt_dir = dir.path().join("Professions/a_doctor");
        fs::create_dir_all(&prompt_dir).unwrap();
        for name in ["1.png", "2.png", "3.png"] {
            fs::write(prompt_dir.join(name), b"img").unwrap();
        }
        dir
    }

    fn doctor_classifier() -> ClassifierAdapter<StubAnalyzer> {
        ClassifierAdapter::new(
            StubAnalyzer::new(vec![
                ("1.png", AnalyzerOutput::Single(Some(FaceAnalysis::new("white", "Man")))),
                ("2.png", AnalyzerOutput::Many(vec![FaceAnalysis::new("white", "Man")])),
                ("3.png", AnalyzerOutput::Many(vec![])),
            ]),
            AnalyzeOptions::default(),
        )
    }

    fn record(race: &str, gender: &str, path: &str) -> AttributeRecord {
        AttributeRecord::new("Attributes", "a photo of a criminal", path, Attributes::new(race, gender))
    }

    #[test]
    fn test_build_yields_one_row_per_image() {
        let corpus = doctor_corpus();
        let walker = CorpusWalker::new(corpus.path(), "png");
        let table = build(&walker, &doctor_classifier(), false).unwrap();

        assert_eq!(table.len(), 3);
        let paths: HashSet<&str> = table.records().iter().map(|r| r.image_path.as_str()).collect();
        assert_eq!(paths.len(), 3);
        assert!(table
            .records()
            .iter()
            .all(|r| r.category == "Professions" && r.prompt == "a doctor"));

        let filtered = table.without_sentinels();
        assert_eq!(filtered.len(), 2);
        assert!(filtered.records().iter().all(|r| r.value(Dimension::Gender) == "Man"));
    }

    #[test]
    fn test_unreadable_images_keep_their_row() {
        let corpus = doctor_corpus();
        fs::write(corpus.path().join("Professions/a_doctor/4.png"), b"corrupt").unwrap();
        let walker = CorpusWalker::new(corpus.path(), "png");
        let table = build(&walker, &doctor_classifier(), false).unwrap();

        assert_eq!(table.len(), 4);
        let errors = table
            .records()
            .iter()
            .filter(|r| r.dominant_race == ANALYSIS_ERROR && r.gender == ANALYSIS_ERROR)
            .count();
        assert_eq!(errors, 1);
    }

    #[test]
    fn test_filter_is_idempotent() {
        let table = AuditTable::new(vec![
            record("white", "Man", "1.png"),
            record(NO_FACE_DETECTED, NO_FACE_DETECTED, "2.png"),
            record(ANALYSIS_ERROR, ANALYSIS_ERROR, "3.png"),
            record("black", "Woman", "4.png"),
        ]);
        let once = table.without_sentinels();
        let twice = once.without_sentinels();
        assert_eq!(once, twice);
        assert_eq!(once.len(), 2);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bias_audit_report.csv");
        let table = AuditTable::new(vec![
            record("white", "Man", "a,b/1.png"),
            record("latino hispanic", "Woman", "2.png"),
        ]);
        table.save(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("category,prompt,image_path,dominant_race,gender\n"));
        assert_eq!(AuditTable::load(&path).unwrap(), table);
    }

    #[test]
    fn test_save_overwrites_existing_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("table.csv");
        fs::write(&path, "stale").unwrap();

        let table = AuditTable::new(vec![record("white", "Man", "1.png")]);
        table.save(&path).unwrap();
        table.save(&path).unwrap();

        assert_eq!(AuditTable::load(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_load_missing_table() {
        let dir = TempDir::new().unwrap();
        let err = AuditTable::load(&dir.path().join("absent.csv")).unwrap_err();
        assert!(matches!(err, AuditError::MissingArtifact { .. }));
    }

    #[test]
    fn test_load_malformed_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.csv");
        fs::write(&path, "category,prompt\nProfessions\n").unwrap();
        assert!(matches!(
            AuditTable::load(&path).unwrap_err(),
            AuditError::Table { .. }
        ));
    }

    #[test]
    fn test_extract_empty_corpus_writes_nothing() {
        let corpus = TempDir::new().unwrap();
        fs::create_dir_all(corpus.path().join("Professions/a_doctor")).unwrap();
        let output = corpus.path().join("table.csv");
        let walker = CorpusWalker::new(corpus.path(), "png");

        let outcome = extract(&walker, &doctor_classifier(), &output, false).unwrap();
        assert_eq!(outcome, Extraction::Empty);
        assert!(!output.exists());
    }

    #[test]
    fn test_extract_writes_table() {
        let corpus = doctor_corpus();
        let out_dir = TempDir::new().unwrap();
        let output = out_dir.path().join("table.csv");
        let walker = CorpusWalker::new(corpus.path(), "png");

        match extract(&walker, &doctor_classifier(), &output, false).unwrap() {
            Extraction::Written { path, summary } => {
                assert_eq!(path, output);
                assert_eq!(summary.total, 3);
                assert_eq!(summary.no_face_detected, 1);
            }
            Extraction::Empty => panic!("expected a written table"),
        }
        assert_eq!(AuditTable::load(&output).unwrap().len(), 3);
    }

    #[test]
    fn test_extract_missing_corpus_is_fatal() {
        let dir = TempDir::new().unwrap();
        let walker = CorpusWalker::new(dir.path().join("absent"), "png");
        let err = extract(&walker, &doctor_classifier(), &dir.path().join("t.csv"), false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AuditError>(),
            Some(AuditError::MissingCorpus { .. })
        ));
    }
}
