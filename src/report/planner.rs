//! Report planning.
//!
//! Enumerates every (dimension, dimension) chart over the audit table and
//! decides which are legible enough to draw. Planning is pure: it never
//! touches the filesystem.

use crate::analysis::cardinality;
use crate::models::{AttributeRecord, ChartKind, Dimension, RenderRequest};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Cardinality limits above which a chart is not drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Legibility {
    /// Most distinct coloring values a grouped-count legend may show.
    pub max_hue_values: usize,
    /// Most distinct values a heatmap row or column dimension may have.
    pub max_heatmap_values: usize,
}

impl Default for Legibility {
    fn default() -> Self {
        Self {
            max_hue_values: 10,
            max_heatmap_values: 40,
        }
    }
}

/// Why a candidate chart was not drawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipReason {
    pub dimension: Dimension,
    pub values: usize,
    pub limit: usize,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} has {} distinct values (limit {})",
            self.dimension, self.values, self.limit
        )
    }
}

/// Outcome of planning: charts to draw and charts ruled out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportPlan {
    pub approved: Vec<RenderRequest>,
    pub skipped: Vec<(RenderRequest, SkipReason)>,
}

/// Every candidate chart: grouped counts for each ordered dimension pair,
/// then heatmaps for each ordered pair.
pub fn candidate_requests() -> Vec<RenderRequest> {
    let pairs: Vec<(Dimension, Dimension)> = Dimension::ALL
        .iter()
        .flat_map(|&a| {
            Dimension::ALL
                .iter()
                .filter(move |&&b| b != a)
                .map(move |&b| (a, b))
        })
        .collect();

    pairs
        .iter()
        .map(|&(group, hue)| RenderRequest::grouped_count(group, hue))
        .chain(pairs.iter().map(|&(row, col)| RenderRequest::heatmap(row, col)))
        .collect()
}

/// Decide which candidate charts are drawn for `records`.
pub fn plan(records: &[AttributeRecord], limits: &Legibility) -> ReportPlan {
    let cardinalities: HashMap<Dimension, usize> = Dimension::ALL
        .iter()
        .map(|&d| (d, cardinality(records, d)))
        .collect();

    let mut report_plan = ReportPlan::default();
    for request in candidate_requests() {
        match check(&request, &cardinalities, limits) {
            Some(reason) => report_plan.skipped.push((request, reason)),
            None => report_plan.approved.push(request),
        }
    }
    report_plan
}

fn check(
    request: &RenderRequest,
    cardinalities: &HashMap<Dimension, usize>,
    limits: &Legibility,
) -> Option<SkipReason> {
    let values = |d: Dimension| cardinalities.get(&d).copied().unwrap_or(0);

    match request.kind {
        ChartKind::GroupedCount => {
            let hue = request.second;
            (values(hue) > limits.max_hue_values).then(|| SkipReason {
                dimension: hue,
                values: values(hue),
                limit: limits.max_hue_values,
            })
        }
        ChartKind::Heatmap => [request.first, request.second]
            .into_iter()
            .find(|&d| values(d) > limits.max_heatmap_values)
            .map(|d| SkipReason {
                dimension: d,
                values: values(d),
                limit: limits.max_heatmap_values,
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Attributes;

    /// `n` rows with `n` distinct prompts and `genders` distinct genders.
    fn records(prompts: usize, genders: usize) -> Vec<AttributeRecord> {
        (0..prompts.max(genders))
            .map(|i| {
                AttributeRecord::new(
                    "Professions",
                    format!("prompt {}", i % prompts),
                    format!("{}.png", i),
                    Attributes::new("white", format!("g{}", i % genders)),
                )
            })
            .collect()
    }

    fn approved(plan: &ReportPlan, request: RenderRequest) -> bool {
        plan.approved.contains(&request)
    }

    #[test]
    fn test_candidates_cover_all_ordered_pairs() {
        let candidates = candidate_requests();
        assert_eq!(candidates.len(), 24);
        assert!(candidates[..12].iter().all(|r| r.kind == ChartKind::GroupedCount));
        assert!(candidates[12..].iter().all(|r| r.kind == ChartKind::Heatmap));
        assert!(candidates.iter().all(|r| r.first != r.second));
        assert_eq!(
            candidates[0],
            RenderRequest::grouped_count(Dimension::DominantRace, Dimension::Gender)
        );
    }

    #[test]
    fn test_hue_limit_boundary() {
        let limits = Legibility::default();
        let at_limit = plan(&records(1, 10), &limits);
        assert!(approved(
            &at_limit,
            RenderRequest::grouped_count(Dimension::Prompt, Dimension::Gender)
        ));

        let over_limit = plan(&records(1, 11), &limits);
        let request = RenderRequest::grouped_count(Dimension::Prompt, Dimension::Gender);
        assert!(!approved(&over_limit, request));
        let (_, reason) = over_limit.skipped.iter().find(|(r, _)| *r == request).unwrap();
        assert_eq!(reason.dimension, Dimension::Gender);
        assert_eq!(reason.values, 11);
        assert_eq!(reason.limit, 10);
        // Gender as the grouping axis is still drawn.
        assert!(approved(
            &over_limit,
            RenderRequest::grouped_count(Dimension::Gender, Dimension::Prompt)
        ));
    }

    #[test]
    fn test_heatmap_limit_boundary() {
        let limits = Legibility::default();
        let at_limit = plan(&records(40, 1), &limits);
        assert!(approved(
            &at_limit,
            RenderRequest::heatmap(Dimension::Prompt, Dimension::Gender)
        ));

        let over_limit = plan(&records(41, 1), &limits);
        assert!(!approved(
            &over_limit,
            RenderRequest::heatmap(Dimension::Prompt, Dimension::Gender)
        ));
        assert!(!approved(
            &over_limit,
            RenderRequest::heatmap(Dimension::Gender, Dimension::Prompt)
        ));
    }

    #[test]
    fn test_fifty_prompts() {
        let plan = plan(&records(50, 2), &Legibility::default());

        for request in candidate_requests() {
            let involves_prompt = request.first == Dimension::Prompt || request.second == Dimension::Prompt;
            match request.kind {
                ChartKind::Heatmap if involves_prompt => assert!(!approved(&plan, request)),
                ChartKind::GroupedCount if request.second == Dimension::Prompt => {
                    assert!(!approved(&plan, request))
                }
                _ => assert!(approved(&plan, request), "{} should be drawn", request),
            }
        }
        assert_eq!(plan.approved.len() + plan.skipped.len(), 24);
    }

    #[test]
    fn test_custom_limits() {
        let limits = Legibility {
            max_hue_values: 1,
            max_heatmap_values: 1,
        };
        let plan = plan(&records(2, 2), &limits);
        assert!(!approved(
            &plan,
            RenderRequest::grouped_count(Dimension::Prompt, Dimension::Gender)
        ));
        assert!(approved(
            &plan,
            RenderRequest::grouped_count(Dimension::Prompt, Dimension::Category)
        ));
    }
}
