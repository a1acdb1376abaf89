//! Data models for the bias auditor.
//!
//! This module contains the core data structures shared by every stage:
//! classified attributes, audit table records, report dimensions and
//! render requests.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel: the classifier ran but found no face.
pub const NO_FACE_DETECTED: &str = "no_face_detected";

/// Sentinel: the classifier (or reading the image) failed.
pub const ANALYSIS_ERROR: &str = "analysis_error";

/// Value used when a detected face lacks one of the requested attributes.
pub const UNKNOWN: &str = "unknown";

/// Returns true if `value` is one of the reserved sentinel values.
pub fn is_sentinel(value: &str) -> bool {
    value == NO_FACE_DETECTED || value == ANALYSIS_ERROR
}

/// Demographic attributes of the dominant face in one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    pub dominant_race: String,
    pub gender: String,
}

impl Attributes {
    pub fn new(dominant_race: impl Into<String>, gender: impl Into<String>) -> Self {
        Self {
            dominant_race: dominant_race.into(),
            gender: gender.into(),
        }
    }

    /// Attributes for an image in which no face was found.
    pub fn no_face() -> Self {
        Self::new(NO_FACE_DETECTED, NO_FACE_DETECTED)
    }

    /// Attributes for an image that could not be analyzed.
    pub fn analysis_error() -> Self {
        Self::new(ANALYSIS_ERROR, ANALYSIS_ERROR)
    }
}

/// One row of the audit table: a single generated image and its attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRecord {
    pub category: String,
    pub prompt: String,
    pub image_path: String,
    pub dominant_race: String,
    pub gender: String,
}

impl AttributeRecord {
    /// Merge a classification job's identity with the classifier's answer.
    pub fn new(
        category: impl Into<String>,
        prompt: impl Into<String>,
        image_path: impl Into<String>,
        attributes: Attributes,
    ) -> Self {
        Self {
            category: category.into(),
            prompt: prompt.into(),
            image_path: image_path.into(),
            dominant_race: attributes.dominant_race,
            gender: attributes.gender,
        }
    }

    /// Value of this record along a report dimension.
    pub fn value(&self, dimension: Dimension) -> &str {
        match dimension {
            Dimension::DominantRace => &self.dominant_race,
            Dimension::Gender => &self.gender,
            Dimension::Category => &self.category,
            Dimension::Prompt => &self.prompt,
        }
    }

    /// Whether the record carries a genuine classification.
    pub fn is_classified(&self) -> bool {
        !is_sentinel(&self.dominant_race)
    }
}

/// A categorical column of the audit table usable in aggregate reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    DominantRace,
    Gender,
    Category,
    Prompt,
}

impl Dimension {
    /// All report dimensions, in sweep order.
    pub const ALL: [Dimension; 4] = [
        Dimension::DominantRace,
        Dimension::Gender,
        Dimension::Category,
        Dimension::Prompt,
    ];

    /// Column name in the audit table.
    pub fn column(&self) -> &'static str {
        match self {
            Dimension::DominantRace => "dominant_race",
            Dimension::Gender => "gender",
            Dimension::Category => "category",
            Dimension::Prompt => "prompt",
        }
    }

    /// Human-readable axis title.
    pub fn title(&self) -> &'static str {
        match self {
            Dimension::DominantRace => "Dominant Race",
            Dimension::Gender => "Gender",
            Dimension::Category => "Category",
            Dimension::Prompt => "Prompt",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.column())
    }
}

/// Kind of aggregate chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    /// Horizontal bar chart of row counts, split by a coloring dimension.
    GroupedCount,
    /// Row-normalized percentage cross-tabulation.
    Heatmap,
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChartKind::GroupedCount => write!(f, "countplot"),
            ChartKind::Heatmap => write!(f, "heatmap"),
        }
    }
}

/// A request to render one chart over a pair of dimensions.
///
/// For grouped counts `first` is the grouping axis and `second` the coloring
/// dimension; for heatmaps they are the row and column dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenderRequest {
    pub kind: ChartKind,
    pub first: Dimension,
    pub second: Dimension,
}

impl RenderRequest {
    pub fn grouped_count(group: Dimension, hue: Dimension) -> Self {
        Self {
            kind: ChartKind::GroupedCount,
            first: group,
            second: hue,
        }
    }

    pub fn heatmap(row: Dimension, column: Dimension) -> Self {
        Self {
            kind: ChartKind::Heatmap,
            first: row,
            second: column,
        }
    }

    /// Artifact file name; identical requests always map to the same name.
    pub fn file_name(&self) -> String {
        match self.kind {
            ChartKind::GroupedCount => format!("count_{}_by_{}.png", self.first, self.second),
            ChartKind::Heatmap => format!("heatmap_{}_by_{}_rowpct.png", self.first, self.second),
        }
    }
}

impl fmt::Display for RenderRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} by {}", self.kind, self.first, self.second)
    }
}

/// Classification outcome counts over the unfiltered audit table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionSummary {
    /// Total number of rows.
    pub total: usize,
    /// Rows with a genuine classification.
    pub classified: usize,
    /// Rows where no face was detected.
    pub no_face_detected: usize,
    /// Rows where analysis failed.
    pub analysis_error: usize,
}

impl DetectionSummary {
    pub fn from_records(records: &[AttributeRecord]) -> Self {
        let mut summary = Self {
            total: records.len(),
            ..Self::default()
        };

        for record in records {
            match record.dominant_race.as_str() {
                NO_FACE_DETECTED => summary.no_face_detected += 1,
                ANALYSIS_ERROR => summary.analysis_error += 1,
                _ => summary.classified += 1,
            }
        }

        summary
    }

    /// Fraction of images without a usable classification (0.0 when empty).
    pub fn failure_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.no_face_detected + self.analysis_error) as f64 / self.total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(race: &str) -> AttributeRecord {
        AttributeRecord::new(
            "Professions",
            "a doctor",
            format!("audit_results/Professions/a_doctor/{race}.png"),
            Attributes::new(race, "Man"),
        )
    }

    #[test]
    fn test_sentinels_are_distinct() {
        assert_ne!(Attributes::no_face(), Attributes::analysis_error());
        assert!(is_sentinel(NO_FACE_DETECTED));
        assert!(is_sentinel(ANALYSIS_ERROR));
        assert!(!is_sentinel(UNKNOWN));
        assert!(!is_sentinel("white"));
    }

    #[test]
    fn test_record_value_by_dimension() {
        let r = record("asian");
        assert_eq!(r.value(Dimension::DominantRace), "asian");
        assert_eq!(r.value(Dimension::Gender), "Man");
        assert_eq!(r.value(Dimension::Category), "Professions");
        assert_eq!(r.value(Dimension::Prompt), "a doctor");
        assert!(r.is_classified());
        assert!(!record(NO_FACE_DETECTED).is_classified());
    }

    #[test]
    fn test_render_request_file_names() {
        let count = RenderRequest::grouped_count(Dimension::Gender, Dimension::Category);
        assert_eq!(count.file_name(), "count_gender_by_category.png");

        let heat = RenderRequest::heatmap(Dimension::Prompt, Dimension::DominantRace);
        assert_eq!(heat.file_name(), "heatmap_prompt_by_dominant_race_rowpct.png");
    }

    #[test]
    fn test_detection_summary() {
        let records = vec![
            record("white"),
            record("black"),
            record(NO_FACE_DETECTED),
            record(ANALYSIS_ERROR),
        ];
        let summary = DetectionSummary::from_records(&records);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.classified, 2);
        assert_eq!(summary.no_face_detected, 1);
        assert_eq!(summary.analysis_error, 1);
        assert!((summary.failure_rate() - 0.5).abs() < f64::EPSILON);
        assert_eq!(DetectionSummary::default().failure_rate(), 0.0);
    }
}
