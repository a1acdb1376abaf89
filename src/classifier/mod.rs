//! Demographic attribute classification.
//!
//! The facial-attribute model is an external collaborator behind the
//! [`FaceAnalyzer`] trait. [`ClassifierAdapter`] wraps any analyzer and turns
//! its output into [`Attributes`], absorbing every failure into a sentinel.

pub mod deepface;

pub use deepface::DeepFaceClient;

use crate::models::{Attributes, UNKNOWN};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Options passed to the external analyzer on every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeOptions {
    /// Attributes to request.
    pub actions: Vec<String>,
    /// Fail when no face is confidently detected.
    pub enforce_detection: bool,
    /// Suppress the analyzer's own progress output.
    pub silent: bool,
    /// Face detector backend name.
    pub detector_backend: String,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            actions: vec!["race".to_string(), "gender".to_string()],
            enforce_detection: false,
            silent: true,
            detector_backend: "opencv".to_string(),
        }
    }
}

/// Analysis of one detected face.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceAnalysis {
    #[serde(default)]
    pub dominant_race: Option<String>,
    #[serde(default)]
    pub dominant_gender: Option<String>,
}

#[cfg(test)]
impl FaceAnalysis {
    pub(crate) fn new(race: &str, gender: &str) -> Self {
        Self {
            dominant_race: Some(race.to_string()),
            dominant_gender: Some(gender.to_string()),
        }
    }
}

/// Raw analyzer output: a single (possibly absent) face or one entry per face.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalyzerOutput {
    Single(Option<FaceAnalysis>),
    Many(Vec<FaceAnalysis>),
}

impl AnalyzerOutput {
    /// The dominant face: the first one reported, not the largest or most confident.
    pub fn dominant_face(self) -> Option<FaceAnalysis> {
        match self {
            AnalyzerOutput::Single(face) => face,
            AnalyzerOutput::Many(faces) => faces.into_iter().next(),
        }
    }
}

/// Capability interface for an external facial-attribute analyzer.
pub trait FaceAnalyzer {
    fn analyze(&self, image_path: &Path, options: &AnalyzeOptions) -> Result<AnalyzerOutput>;
}

/// Total classification front-end over a [`FaceAnalyzer`].
pub struct ClassifierAdapter<A> {
    analyzer: A,
    options: AnalyzeOptions,
}

impl<A: FaceAnalyzer> ClassifierAdapter<A> {
    pub fn new(analyzer: A, options: AnalyzeOptions) -> Self {
        Self { analyzer, options }
    }

    /// Classify the dominant face in an image. Never fails.
    pub fn classify(&self, image_path: &Path) -> Attributes {
        let output = match self.analyzer.analyze(image_path, &self.options) {
            Ok(output) => output,
            Err(e) => {
                debug!("Analysis failed for {}: {:#}", image_path.display(), e);
                return Attributes::analysis_error();
            }
        };

        match output.dominant_face() {
            Some(face) => Attributes::new(
                face.dominant_race.unwrap_or_else(|| UNKNOWN.to_string()),
                face.dominant_gender.unwrap_or_else(|| UNKNOWN.to_string()),
            ),
            None => Attributes::no_face(),
        }
    }
}
