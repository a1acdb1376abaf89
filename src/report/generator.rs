//! Report generation.
//!
//! Loads the audit table, drops sentinel rows, renders the fixed reports and
//! every chart the planner approves as PNG, then writes an index of what was
//! produced.

use super::chart::{self, ChartLabels};
use super::planner::{self, Legibility};
use super::raster::Rasterizer;
use crate::analysis::{crosstab_row_percent, grouped_counts, GroupedCounts};
use crate::models::{AttributeRecord, ChartKind, DetectionSummary, Dimension, RenderRequest};
use crate::table::AuditTable;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const OVERALL_RACE_FILE: &str = "overall_race_distribution.png";
pub const FOCUS_GENDER_FILE: &str = "profession_gender_distribution.png";
pub const CONTRAST_RACE_FILE: &str = "attribute_race_comparison.png";

/// Format of the report index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum IndexFormat {
    /// Markdown index (default)
    #[default]
    Markdown,
    /// JSON index
    Json,
}

impl IndexFormat {
    pub fn file_name(&self) -> &'static str {
        match self {
            IndexFormat::Markdown => "index.md",
            IndexFormat::Json => "index.json",
        }
    }

    const ALL: [IndexFormat; 2] = [IndexFormat::Markdown, IndexFormat::Json];
}

/// Settings for one reporting run.
#[derive(Debug, Clone)]
pub struct ReportSettings {
    pub reports_dir: PathBuf,
    pub legibility: Legibility,
    /// Category whose gender split gets its own chart.
    pub focus_category: String,
    /// Prompts whose race distributions are compared side by side.
    pub contrast_prompts: Vec<String>,
    pub index_format: IndexFormat,
}

/// A report that was not written, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedReport {
    pub name: String,
    pub reason: String,
}

/// Everything a reporting run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportIndex {
    pub generated_at: DateTime<Utc>,
    pub table: String,
    pub detection: DetectionSummary,
    /// Rows left after dropping sentinel values.
    pub classified_rows: usize,
    /// Artifact file names, in render order.
    pub artifacts: Vec<String>,
    pub skipped: Vec<SkippedReport>,
    pub failed: Vec<SkippedReport>,
}

/// Render every report for the table at `table_path`.
///
/// A missing table is fatal. A failing chart is logged and recorded in the
/// index; it never stops the remaining charts. Charts and indexes left by an
/// earlier run are removed first, so the directory always matches the index.
pub fn generate_reports(table_path: &Path, settings: &ReportSettings) -> Result<ReportIndex> {
    let table = AuditTable::load(table_path)?;
    let filtered = table.without_sentinels();

    std::fs::create_dir_all(&settings.reports_dir).with_context(|| {
        format!(
            "Failed to create reports directory: {}",
            settings.reports_dir.display()
        )
    })?;
    remove_previous_artifacts(&settings.reports_dir);

    let mut index = ReportIndex {
        generated_at: Utc::now(),
        table: table_path.display().to_string(),
        detection: table.detection_summary(),
        classified_rows: filtered.len(),
        artifacts: Vec::new(),
        skipped: Vec::new(),
        failed: Vec::new(),
    };

    info!(
        "Generating reports from {} of {} rows",
        filtered.len(),
        table.len()
    );

    if filtered.is_empty() {
        warn!("No classified faces in the audit table; no charts generated");
        index.skipped.push(SkippedReport {
            name: "all charts".to_string(),
            reason: "no rows left after dropping no_face_detected/analysis_error".to_string(),
        });
    } else {
        let records = filtered.records();
        let rasterizer = Rasterizer::with_system_fonts();
        render_fixed_reports(records, settings, &rasterizer, &mut index);

        let report_plan = planner::plan(records, &settings.legibility);
        for (request, reason) in &report_plan.skipped {
            info!("Skipped {}: {}", request, reason);
            index.skipped.push(SkippedReport {
                name: request.file_name(),
                reason: reason.to_string(),
            });
        }

        for request in &report_plan.approved {
            let outcome = render_request(records, request, &settings.reports_dir, &rasterizer);
            record_outcome(&mut index, request.file_name(), outcome.map(Some));
        }
    }

    write_index(&index, settings)?;
    Ok(index)
}

/// Every file name this module may write, whatever the table holds.
fn managed_file_names() -> impl Iterator<Item = String> {
    [OVERALL_RACE_FILE, FOCUS_GENDER_FILE, CONTRAST_RACE_FILE]
        .into_iter()
        .chain(IndexFormat::ALL.into_iter().map(|format| format.file_name()))
        .map(String::from)
        .chain(
            planner::candidate_requests()
                .into_iter()
                .map(|request| request.file_name()),
        )
}

fn remove_previous_artifacts(dir: &Path) {
    for name in managed_file_names() {
        let path = dir.join(&name);
        if !path.is_file() {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => debug!("Removed previous {}", name),
            Err(e) => warn!("Failed to remove previous {}: {}", path.display(), e),
        }
    }
}

/// Draw one planned chart and write it into `dir`.
pub fn render_request(
    records: &[AttributeRecord],
    request: &RenderRequest,
    dir: &Path,
    rasterizer: &Rasterizer,
) -> Result<PathBuf> {
    let group = request.first;
    let other = request.second;

    let svg = match request.kind {
        ChartKind::GroupedCount => {
            let data = grouped_counts(records, group, other);
            if data.groups.is_empty() {
                anyhow::bail!("no rows to count");
            }
            chart::count_chart(
                &data,
                &ChartLabels {
                    title: format!("{} by {}", group.title(), other.title()),
                    x_label: "Count".to_string(),
                    y_label: group.title().to_string(),
                    legend: Some(other.title().to_string()),
                },
            )
        }
        ChartKind::Heatmap => {
            let data = crosstab_row_percent(records, group, other);
            if data.is_empty() {
                anyhow::bail!("empty cross-tabulation");
            }
            chart::heatmap(
                &data,
                &ChartLabels {
                    title: format!("% of {} by {}", group.title(), other.title()),
                    x_label: other.title().to_string(),
                    y_label: group.title().to_string(),
                    legend: None,
                },
            )
        }
    };

    write_chart(dir, &request.file_name(), &svg, rasterizer)
}

fn render_fixed_reports(
    records: &[AttributeRecord],
    settings: &ReportSettings,
    rasterizer: &Rasterizer,
    index: &mut ReportIndex,
) {
    let dir = &settings.reports_dir;

    let overall = write_count_chart(
        rasterizer,
        dir,
        OVERALL_RACE_FILE,
        &GroupedCounts::ungrouped(records, Dimension::DominantRace),
        ChartLabels {
            title: "Overall Race Distribution Across All Generated Images".to_string(),
            x_label: "Count".to_string(),
            y_label: Dimension::DominantRace.title().to_string(),
            legend: None,
        },
    );
    record_outcome(index, OVERALL_RACE_FILE.to_string(), overall.map(Some));

    let focus: Vec<AttributeRecord> = records
        .iter()
        .filter(|r| r.category == settings.focus_category)
        .cloned()
        .collect();
    let focus_outcome = if focus.is_empty() {
        Ok(None)
    } else {
        write_count_chart(
            rasterizer,
            dir,
            FOCUS_GENDER_FILE,
            &grouped_counts(&focus, Dimension::Prompt, Dimension::Gender),
            ChartLabels {
                title: format!("Gender Distribution by Prompt in {}", settings.focus_category),
                x_label: "Count".to_string(),
                y_label: Dimension::Prompt.title().to_string(),
                legend: Some(Dimension::Gender.title().to_string()),
            },
        )
        .map(Some)
    };
    record_outcome(index, FOCUS_GENDER_FILE.to_string(), focus_outcome);

    let contrast: Vec<AttributeRecord> = records
        .iter()
        .filter(|r| settings.contrast_prompts.contains(&r.prompt))
        .cloned()
        .collect();
    let contrast_outcome = if contrast.is_empty() {
        Ok(None)
    } else {
        let quoted: Vec<String> = settings
            .contrast_prompts
            .iter()
            .map(|p| format!("\"{}\"", p))
            .collect();
        write_count_chart(
            rasterizer,
            dir,
            CONTRAST_RACE_FILE,
            &grouped_counts(&contrast, Dimension::DominantRace, Dimension::Prompt),
            ChartLabels {
                title: format!("Race Distribution for {}", quoted.join(" vs. ")),
                x_label: "Count".to_string(),
                y_label: Dimension::DominantRace.title().to_string(),
                legend: Some(Dimension::Prompt.title().to_string()),
            },
        )
        .map(Some)
    };
    record_outcome(index, CONTRAST_RACE_FILE.to_string(), contrast_outcome);
}

fn write_count_chart(
    rasterizer: &Rasterizer,
    dir: &Path,
    name: &str,
    data: &GroupedCounts,
    labels: ChartLabels,
) -> Result<PathBuf> {
    let svg = chart::count_chart(data, &labels);
    write_chart(dir, name, &svg, rasterizer)
}

fn write_chart(dir: &Path, name: &str, svg: &str, rasterizer: &Rasterizer) -> Result<PathBuf> {
    let png = rasterizer
        .render_png(svg)
        .with_context(|| format!("Failed to rasterize {}", name))?;
    write_artifact(dir, name, &png)
}

fn write_artifact(dir: &Path, name: &str, content: impl AsRef<[u8]>) -> Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// `Ok(None)` means the report had no matching rows.
fn record_outcome(index: &mut ReportIndex, name: String, outcome: Result<Option<PathBuf>>) {
    match outcome {
        Ok(Some(_)) => {
            info!("Saved {}", name);
            index.artifacts.push(name);
        }
        Ok(None) => {
            info!("Skipped {}: no matching rows", name);
            index.skipped.push(SkippedReport {
                name,
                reason: "no matching rows".to_string(),
            });
        }
        Err(e) => {
            warn!("Skipped {}: {:#}", name, e);
            index.failed.push(SkippedReport {
                name,
                reason: format!("{:#}", e),
            });
        }
    }
}

fn write_index(index: &ReportIndex, settings: &ReportSettings) -> Result<()> {
    let content = match settings.index_format {
        IndexFormat::Markdown => generate_markdown_index(index),
        IndexFormat::Json => generate_json_index(index)?,
    };
    write_artifact(&settings.reports_dir, settings.index_format.file_name(), &content)?;
    Ok(())
}

/// Markdown summary of a reporting run.
pub fn generate_markdown_index(index: &ReportIndex) -> String {
    let mut output = String::new();

    output.push_str("# Bias Audit Reports\n\n");

    output.push_str("## Metadata\n\n");
    output.push_str(&format!(
        "- **Generated:** {}\n",
        index.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    output.push_str(&format!("- **Audit Table:** `{}`\n", index.table));
    output.push_str(&format!("- **Classified Rows:** {}\n\n", index.classified_rows));

    output.push_str(&generate_detection_section(&index.detection));

    output.push_str("## Charts\n\n");
    if index.artifacts.is_empty() {
        output.push_str("No charts were generated.\n\n");
    } else {
        for name in &index.artifacts {
            output.push_str(&format!("- [{}]({})\n", name, name));
        }
        output.push('\n');
    }

    if !index.skipped.is_empty() {
        output.push_str("## Skipped\n\n");
        output.push_str("| Chart | Reason |\n");
        output.push_str("|:---|:---|\n");
        for skipped in &index.skipped {
            output.push_str(&format!("| {} | {} |\n", skipped.name, skipped.reason));
        }
        output.push('\n');
    }

    if !index.failed.is_empty() {
        output.push_str("## Failed\n\n");
        for failed in &index.failed {
            output.push_str(&format!("- `{}`: {}\n", failed.name, failed.reason));
        }
        output.push('\n');
    }

    output
}

fn generate_detection_section(detection: &DetectionSummary) -> String {
    let mut section = String::new();

    section.push_str("## Face Detection\n\n");
    section.push_str("| Classified | No Face Detected | Analysis Error | **Total** | Failure Rate |\n");
    section.push_str("|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | **{}** | {:.1}% |\n\n",
        detection.classified,
        detection.no_face_detected,
        detection.analysis_error,
        detection.total,
        detection.failure_rate() * 100.0
    ));

    section
}

/// JSON summary of a reporting run.
pub fn generate_json_index(index: &ReportIndex) -> Result<String> {
    serde_json::to_string_pretty(index).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuditError;
    use crate::models::Attributes;
    use std::collections::BTreeSet;
    use std::fs;
    use tempfile::TempDir;

    fn settings(dir: &Path) -> ReportSettings {
        ReportSettings {
            reports_dir: dir.join("reports"),
            legibility: Legibility::default(),
            focus_category: "Professions".to_string(),
            contrast_prompts: vec![
                "a photo of a criminal".to_string(),
                "a photo of a trustworthy person".to_string(),
            ],
            index_format: IndexFormat::Markdown,
        }
    }

    fn doctor_table(dir: &Path) -> PathBuf {
        let path = dir.join("bias_audit_report.csv");
        AuditTable::new(vec![
            AttributeRecord::new("Professions", "a doctor", "1.png", Attributes::new("white", "Man")),
            AttributeRecord::new("Professions", "a doctor", "2.png", Attributes::new("white", "Man")),
            AttributeRecord::new("Professions", "a doctor", "3.png", Attributes::no_face()),
        ])
        .save(&path)
        .unwrap();
        path
    }

    fn listing(dir: &Path) -> BTreeSet<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_doctor_scenario() {
        let dir = TempDir::new().unwrap();
        let table = doctor_table(dir.path());
        let settings = settings(dir.path());

        let index = generate_reports(&table, &settings).unwrap();
        assert_eq!(index.detection.total, 3);
        assert_eq!(index.detection.no_face_detected, 1);
        assert_eq!(index.classified_rows, 2);
        assert!(index.failed.is_empty());

        let chart = fs::read(settings.reports_dir.join("count_gender_by_category.png")).unwrap();
        assert_eq!(chart[..8], [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]);
        let (width, height) = image::load_from_memory(&chart).unwrap().to_rgba8().dimensions();
        assert!(width > 0 && height > 0);

        assert!(index.artifacts.contains(&OVERALL_RACE_FILE.to_string()));
        assert!(index.artifacts.contains(&FOCUS_GENDER_FILE.to_string()));
        // No contrast prompts in this table.
        assert!(index.skipped.iter().any(|s| s.name == CONTRAST_RACE_FILE));
        assert!(!settings.reports_dir.join(CONTRAST_RACE_FILE).exists());
        assert!(settings.reports_dir.join("index.md").exists());
    }

    #[test]
    fn test_rerun_overwrites_same_files() {
        let dir = TempDir::new().unwrap();
        let table = doctor_table(dir.path());
        let settings = settings(dir.path());

        generate_reports(&table, &settings).unwrap();
        let first = listing(&settings.reports_dir);
        let chart_path = settings.reports_dir.join("heatmap_prompt_by_gender_rowpct.png");
        let first_chart = fs::read(&chart_path).unwrap();

        generate_reports(&table, &settings).unwrap();
        assert_eq!(listing(&settings.reports_dir), first);
        assert_eq!(fs::read(&chart_path).unwrap(), first_chart);
    }

    #[test]
    fn test_missing_table_is_fatal() {
        let dir = TempDir::new().unwrap();
        let err = generate_reports(&dir.path().join("absent.csv"), &settings(dir.path())).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AuditError>(),
            Some(AuditError::MissingArtifact { .. })
        ));
    }

    #[test]
    fn test_one_failing_chart_does_not_stop_others() {
        let dir = TempDir::new().unwrap();
        let table = doctor_table(dir.path());
        let settings = settings(dir.path());
        // A directory where the chart file should go makes that write fail.
        fs::create_dir_all(settings.reports_dir.join("count_gender_by_category.png")).unwrap();

        let index = generate_reports(&table, &settings).unwrap();
        assert_eq!(index.failed.len(), 1);
        assert_eq!(index.failed[0].name, "count_gender_by_category.png");
        assert!(index.artifacts.contains(&"count_category_by_gender.png".to_string()));
        assert!(settings.reports_dir.join("heatmap_gender_by_category_rowpct.png").exists());
    }

    #[test]
    fn test_all_sentinel_table_generates_no_charts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.csv");
        AuditTable::new(vec![AttributeRecord::new(
            "Professions",
            "a doctor",
            "1.png",
            Attributes::analysis_error(),
        )])
        .save(&path)
        .unwrap();

        let settings = settings(dir.path());
        let index = generate_reports(&path, &settings).unwrap();
        assert!(index.artifacts.is_empty());
        assert_eq!(index.detection.analysis_error, 1);
        assert_eq!(listing(&settings.reports_dir), BTreeSet::from(["index.md".to_string()]));
    }

    #[test]
    fn test_rerun_removes_charts_from_earlier_runs() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings(dir.path());
        generate_reports(&doctor_table(dir.path()), &settings).unwrap();
        settings.index_format = IndexFormat::Json;
        generate_reports(&doctor_table(dir.path()), &settings).unwrap();
        assert!(settings.reports_dir.join("count_gender_by_category.png").exists());

        let path = dir.path().join("t.csv");
        AuditTable::new(vec![AttributeRecord::new(
            "Professions",
            "a doctor",
            "1.png",
            Attributes::no_face(),
        )])
        .save(&path)
        .unwrap();
        // Files the run does not own stay put.
        fs::write(settings.reports_dir.join("notes.txt"), "keep").unwrap();

        settings.index_format = IndexFormat::Markdown;
        generate_reports(&path, &settings).unwrap();
        assert_eq!(
            listing(&settings.reports_dir),
            BTreeSet::from(["index.md".to_string(), "notes.txt".to_string()])
        );
    }

    #[test]
    fn test_contrast_report() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.csv");
        AuditTable::new(vec![
            AttributeRecord::new("Attributes", "a photo of a criminal", "1.png", Attributes::new("black", "Man")),
            AttributeRecord::new(
                "Attributes",
                "a photo of a trustworthy person",
                "2.png",
                Attributes::new("white", "Man"),
            ),
        ])
        .save(&path)
        .unwrap();

        let mut settings = settings(dir.path());
        settings.index_format = IndexFormat::Json;
        let index = generate_reports(&path, &settings).unwrap();

        assert!(index.artifacts.contains(&CONTRAST_RACE_FILE.to_string()));
        assert!(index.skipped.iter().any(|s| s.name == FOCUS_GENDER_FILE));
        let json = fs::read_to_string(settings.reports_dir.join("index.json")).unwrap();
        assert!(json.contains("\"classified_rows\": 2"));
    }

    #[test]
    fn test_render_request_rejects_empty_data() {
        let dir = TempDir::new().unwrap();
        let request = RenderRequest::heatmap(Dimension::Prompt, Dimension::Gender);
        let rasterizer = Rasterizer::with_system_fonts();
        assert!(render_request(&[], &request, dir.path(), &rasterizer).is_err());
        assert!(!dir.path().join(request.file_name()).exists());
    }

    #[test]
    fn test_markdown_index() {
        let index = ReportIndex {
            generated_at: Utc::now(),
            table: "bias_audit_report.csv".to_string(),
            detection: DetectionSummary {
                total: 4,
                classified: 3,
                no_face_detected: 1,
                analysis_error: 0,
            },
            classified_rows: 3,
            artifacts: vec!["overall_race_distribution.png".to_string()],
            skipped: vec![SkippedReport {
                name: "count_gender_by_prompt.png".to_string(),
                reason: "prompt has 50 distinct values (limit 10)".to_string(),
            }],
            failed: vec![],
        };

        let markdown = generate_markdown_index(&index);
        assert!(markdown.contains("# Bias Audit Reports"));
        assert!(markdown.contains("25.0%"));
        assert!(markdown.contains("[overall_race_distribution.png](overall_race_distribution.png)"));
        assert!(markdown.contains("limit 10"));
        assert!(!markdown.contains("## Failed"));
    }
}
