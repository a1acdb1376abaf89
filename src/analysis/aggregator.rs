//! Attribute aggregation and statistics.
//!
//! Pure functions over audit records. All orderings are deterministic so
//! that re-rendering an unchanged table produces identical charts.

use crate::models::{AttributeRecord, Dimension};
use std::collections::{BTreeMap, BTreeSet};

/// Count rows per value, most frequent first (ties by value, ascending).
pub fn value_counts(records: &[AttributeRecord], dimension: Dimension) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for record in records {
        *counts.entry(record.value(dimension)).or_default() += 1;
    }

    let mut counts: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(value, count)| (value.to_string(), count))
        .collect();
    // Stable sort keeps the ascending value order among ties.
    counts.sort_by_key(|(_, count)| std::cmp::Reverse(*count));
    counts
}

/// Distinct values of a dimension, ascending. The empty (missing) value counts.
pub fn distinct_values(records: &[AttributeRecord], dimension: Dimension) -> Vec<String> {
    records
        .iter()
        .map(|r| r.value(dimension))
        .collect::<BTreeSet<&str>>()
        .into_iter()
        .map(String::from)
        .collect()
}

/// Number of distinct values of a dimension.
pub fn cardinality(records: &[AttributeRecord], dimension: Dimension) -> usize {
    records
        .iter()
        .map(|r| r.value(dimension))
        .collect::<BTreeSet<&str>>()
        .len()
}

/// Row counts for a grouping dimension split by a coloring dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedCounts {
    /// Grouping values, most frequent first.
    pub groups: Vec<String>,
    /// Coloring values, ascending.
    pub hues: Vec<String>,
    /// `counts[g][h]` is the number of rows with `groups[g]` and `hues[h]`.
    pub counts: Vec<Vec<usize>>,
}

impl GroupedCounts {
    /// Plain per-value counts as a chart with a single series.
    pub fn ungrouped(records: &[AttributeRecord], dimension: Dimension) -> Self {
        let (groups, counts): (Vec<String>, Vec<Vec<usize>>) = value_counts(records, dimension)
            .into_iter()
            .map(|(value, count)| (value, vec![count]))
            .unzip();
        Self {
            groups,
            hues: vec!["count".to_string()],
            counts,
        }
    }

    /// Largest single bar.
    pub fn max_count(&self) -> usize {
        self.counts
            .iter()
            .flat_map(|row| row.iter().copied())
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
impl GroupedCounts {
    fn count(&self, group: &str, hue: &str) -> usize {
        let g = self.groups.iter().position(|v| v == group);
        let h = self.hues.iter().position(|v| v == hue);
        match (g, h) {
            (Some(g), Some(h)) => self.counts[g][h],
            _ => 0,
        }
    }
}

pub fn grouped_counts(
    records: &[AttributeRecord],
    group: Dimension,
    hue: Dimension,
) -> GroupedCounts {
    let groups: Vec<String> = value_counts(records, group)
        .into_iter()
        .map(|(value, _)| value)
        .collect();
    let hues = distinct_values(records, hue);

    let mut counts = vec![vec![0usize; hues.len()]; groups.len()];
    for record in records {
        let g = groups.iter().position(|v| v == record.value(group));
        let h = hues.iter().position(|v| v == record.value(hue));
        if let (Some(g), Some(h)) = (g, h) {
            counts[g][h] += 1;
        }
    }

    GroupedCounts {
        groups,
        hues,
        counts,
    }
}

/// Cross-tabulation with each row expressed as percentages of its total.
#[derive(Debug, Clone, PartialEq)]
pub struct Crosstab {
    /// Row values, sorted by descending row maximum.
    pub rows: Vec<String>,
    /// Column values, ascending.
    pub columns: Vec<String>,
    /// `percent[r][c]`; every row sums to 100.
    pub percent: Vec<Vec<f64>>,
}

impl Crosstab {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.columns.is_empty()
    }
}

pub fn crosstab_row_percent(
    records: &[AttributeRecord],
    row: Dimension,
    column: Dimension,
) -> Crosstab {
    let rows = distinct_values(records, row);
    let columns = distinct_values(records, column);

    let mut counts = vec![vec![0usize; columns.len()]; rows.len()];
    for record in records {
        let r = rows.iter().position(|v| v == record.value(row));
        let c = columns.iter().position(|v| v == record.value(column));
        if let (Some(r), Some(c)) = (r, c) {
            counts[r][c] += 1;
        }
    }

    let mut table: Vec<(String, Vec<f64>)> = rows
        .into_iter()
        .zip(counts)
        .map(|(value, cells)| {
            let total: usize = cells.iter().sum();
            let percent = cells
                .iter()
                .map(|&n| n as f64 * 100.0 / total as f64)
                .collect();
            (value, percent)
        })
        .collect();

    // Most skewed rows first; stable, so ties stay in ascending value order.
    table.sort_by(|a, b| row_max(&b.1).total_cmp(&row_max(&a.1)));

    let (rows, percent): (Vec<String>, Vec<Vec<f64>>) = table.into_iter().unzip();
    Crosstab {
        rows,
        columns,
        percent,
    }
}

fn row_max(cells: &[f64]) -> f64 {
    cells.iter().copied().fold(f64::MIN, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Attributes;

    fn record(category: &str, prompt: &str, race: &str, gender: &str) -> AttributeRecord {
        AttributeRecord::new(
            category,
            prompt,
            format!("{}/{}/{}-{}.png", category, prompt, race, gender),
            Attributes::new(race, gender),
        )
    }

    fn sample() -> Vec<AttributeRecord> {
        vec![
            record("Professions", "a doctor", "white", "Man"),
            record("Professions", "a doctor", "white", "Man"),
            record("Professions", "a nurse", "white", "Woman"),
            record("Professions", "a nurse", "asian", "Woman"),
            record("Attributes", "a criminal", "black", "Man"),
            record("Attributes", "a criminal", "black", "Man"),
            record("Attributes", "a criminal", "white", "Man"),
        ]
    }

    #[test]
    fn test_value_counts_order() {
        let counts = value_counts(&sample(), Dimension::DominantRace);
        assert_eq!(
            counts,
            vec![
                ("white".to_string(), 4),
                ("black".to_string(), 2),
                ("asian".to_string(), 1)
            ]
        );

        let ties = value_counts(&sample(), Dimension::Prompt);
        assert_eq!(ties[0], ("a criminal".to_string(), 3));
        assert_eq!(ties[1], ("a doctor".to_string(), 2));
        assert_eq!(ties[2], ("a nurse".to_string(), 2));
    }

    #[test]
    fn test_cardinality_counts_missing_value() {
        let mut records = sample();
        assert_eq!(cardinality(&records, Dimension::Gender), 2);
        records.push(record("Professions", "a judge", "white", ""));
        assert_eq!(cardinality(&records, Dimension::Gender), 3);
    }

    #[test]
    fn test_grouped_counts() {
        let counts = grouped_counts(&sample(), Dimension::Gender, Dimension::Category);
        assert_eq!(counts.groups, vec!["Man", "Woman"]);
        assert_eq!(counts.hues, vec!["Attributes", "Professions"]);
        assert_eq!(counts.count("Man", "Professions"), 2);
        assert_eq!(counts.count("Man", "Attributes"), 3);
        assert_eq!(counts.count("Woman", "Attributes"), 0);
        assert_eq!(counts.count("Other", "Attributes"), 0);
        assert_eq!(counts.max_count(), 3);
    }

    #[test]
    fn test_ungrouped_counts() {
        let counts = GroupedCounts::ungrouped(&sample(), Dimension::DominantRace);
        assert_eq!(counts.groups, vec!["white", "black", "asian"]);
        assert_eq!(counts.counts, vec![vec![4], vec![2], vec![1]]);
        assert_eq!(counts.count("black", "count"), 2);
    }

    #[test]
    fn test_crosstab_rows_sum_to_100() {
        let ct = crosstab_row_percent(&sample(), Dimension::Prompt, Dimension::DominantRace);
        assert_eq!(ct.columns, vec!["asian", "black", "white"]);
        for row in &ct.percent {
            let sum: f64 = row.iter().sum();
            assert!((sum - 100.0).abs() < 1e-9, "row sums to {}", sum);
        }
    }

    #[test]
    fn test_crosstab_sorted_by_row_max() {
        let ct = crosstab_row_percent(&sample(), Dimension::Prompt, Dimension::DominantRace);
        // a doctor: 100% white; a criminal: 67% black; a nurse: 50/50.
        assert_eq!(ct.rows, vec!["a doctor", "a criminal", "a nurse"]);
        assert!((ct.percent[1][1] - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_crosstab_empty() {
        let ct = crosstab_row_percent(&[], Dimension::Prompt, Dimension::Gender);
        assert!(ct.is_empty());
    }
}
