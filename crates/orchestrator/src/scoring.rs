//! Score aggregation: pure functions over a workshop and the engines'
//! merged signals. Every score is in [0, 100].

use serde::{Deserialize, Serialize};

use atelier_core::analysis::CoherenceSource;
use atelier_core::workshop::{Section, WorkshopData};

/// Weight of one compliance criterion; eight criteria sum to 100.
const CRITERION_WEIGHT: f64 = 12.5;

/// Numeric signals extracted from engine results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineSignals {
    /// Semantic coherence in [0, 1], when a semantic engine completed
    pub semantic_coherence: Option<f64>,
    /// Predicted overall quality in [0, 100]
    pub predicted_quality: Option<f64>,
}

/// Every aggregated score of one analysis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub completion: f64,
    pub detail_level: f64,
    pub coherence: f64,
    pub coherence_source: CoherenceSource,
    pub compliance: f64,
    pub quality: f64,
}

/// Declared and resolving parent links.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub declared: usize,
    pub resolved: usize,
}

impl LinkStats {
    pub fn all_resolved(&self) -> bool {
        self.declared == self.resolved
    }
}

/// Link statistics for one child section, or for all of them.
pub fn link_stats(workshop: &WorkshopData, only: Option<Section>) -> LinkStats {
    let mut stats = LinkStats::default();
    for section in [Section::EssentialAssets, Section::SupportingAssets, Section::DreadedEvents] {
        if only.is_some_and(|s| s != section) {
            continue;
        }
        let Some(parent) = section.parent() else {
            continue;
        };
        let parents = workshop.ids(parent);
        for item in workshop.section(section) {
            if let Some(target) = section.parent_ref(item) {
                stats.declared += 1;
                if parents.contains(target) {
                    stats.resolved += 1;
                }
            }
        }
    }
    stats
}

/// 25 points per non-empty section.
pub fn completion(workshop: &WorkshopData) -> f64 {
    Section::ALL
        .iter()
        .filter(|s| !workshop.section(**s).is_empty())
        .count() as f64
        * 25.0
}

/// Average description length across items, scaled so that
/// `target_length` maps to 100. Capped at 100.
pub fn detail_level(workshop: &WorkshopData, target_length: usize) -> f64 {
    let count = workshop.total_items();
    if count == 0 || target_length == 0 {
        return 0.0;
    }
    let total: usize = workshop.items().map(|(_, item)| item.description_len()).sum();
    let average = total as f64 / count as f64;
    (average / target_length as f64 * 100.0).min(100.0)
}

/// Share of declared parent links that resolve. Without any declared
/// link, an empty workshop scores 0 and a non-empty one 100.
pub fn structural_coherence(workshop: &WorkshopData) -> f64 {
    let stats = link_stats(workshop, None);
    if stats.declared == 0 {
        return if workshop.is_empty() { 0.0 } else { 100.0 };
    }
    stats.resolved as f64 / stats.declared as f64 * 100.0
}

/// Semantic coherence when available, structural otherwise.
pub fn coherence(workshop: &WorkshopData, signals: &EngineSignals) -> (f64, CoherenceSource) {
    match signals.semantic_coherence {
        Some(v) if v.is_finite() => ((v * 100.0).clamp(0.0, 100.0), CoherenceSource::Semantic),
        _ => (structural_coherence(workshop), CoherenceSource::Structural),
    }
}

/// Eight equally weighted structural criteria.
pub fn compliance(workshop: &WorkshopData) -> f64 {
    let any_resolves = |section| {
        let stats = link_stats(workshop, Some(section));
        stats.resolved > 0
    };
    let all = link_stats(workshop, None);

    let criteria = [
        !workshop.business_values.is_empty(),
        !workshop.essential_assets.is_empty(),
        !workshop.supporting_assets.is_empty(),
        !workshop.dreaded_events.is_empty(),
        any_resolves(Section::EssentialAssets),
        any_resolves(Section::SupportingAssets),
        any_resolves(Section::DreadedEvents),
        all.declared > 0 && all.all_resolved(),
    ];
    criteria.iter().filter(|c| **c).count() as f64 * CRITERION_WEIGHT
}

/// Mean of the four structural scores, averaged with a predicted quality
/// when an engine supplied one.
pub fn quality(completion: f64, detail: f64, coherence: f64, compliance: f64, predicted: Option<f64>) -> f64 {
    let structural = (completion + detail + coherence + compliance) / 4.0;
    let q = match predicted {
        Some(p) if p.is_finite() => (structural + p.clamp(0.0, 100.0)) / 2.0,
        _ => structural,
    };
    q.clamp(0.0, 100.0)
}

pub fn aggregate(workshop: &WorkshopData, signals: &EngineSignals, target_length: usize) -> Scores {
    let completion = completion(workshop);
    let detail_level = detail_level(workshop, target_length);
    let (coherence, coherence_source) = coherence(workshop, signals);
    let compliance = compliance(workshop);
    let quality = quality(completion, detail_level, coherence, compliance, signals.predicted_quality);
    Scores {
        completion,
        detail_level,
        coherence,
        coherence_source,
        compliance,
        quality,
    }
}

/// Hints for the sections still missing, or a wrap-up list when the
/// workshop is complete.
pub fn next_steps(workshop: &WorkshopData) -> Vec<String> {
    let bv = !workshop.business_values.is_empty();
    let ea = !workshop.essential_assets.is_empty();
    let sa = !workshop.supporting_assets.is_empty();
    let de = !workshop.dreaded_events.is_empty();

    let mut steps = Vec::new();
    if !bv {
        steps.push("Define at least one business value".to_string());
    }
    if bv && !ea {
        steps.push("Identify the essential assets supporting each business value".to_string());
    }
    if ea && !sa {
        steps.push("Catalogue the supporting assets carrying each essential asset".to_string());
    }
    if bv && !de {
        steps.push("Define the dreaded events for each business value".to_string());
    }
    if bv && ea && sa && de {
        steps.extend([
            "Review and refine the descriptions".to_string(),
            "Verify the links between sections".to_string(),
            "Prepare the next workshop".to_string(),
        ]);
    }
    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_core::workshop::WorkshopItem;

    fn item(id: &str, desc_len: usize) -> WorkshopItem {
        WorkshopItem::new(id, id, "d".repeat(desc_len))
    }

    /// Mission M1: 2/3/5/1 items, every link resolving.
    fn m1() -> WorkshopData {
        WorkshopData {
            business_values: vec![item("bv1", 100), item("bv2", 100)],
            essential_assets: (1..=3)
                .map(|i| item(&format!("ea{i}"), 100).with_business_value("bv1"))
                .collect(),
            supporting_assets: (1..=5)
                .map(|i| item(&format!("sa{i}"), 100).with_essential_asset("ea2"))
                .collect(),
            dreaded_events: vec![item("de1", 100).with_business_value("bv2")],
            current_step: None,
        }
    }

    #[test]
    fn m1_scores() {
        let data = m1();
        assert_eq!(completion(&data), 100.0);
        assert_eq!(compliance(&data), 100.0);
        assert_eq!(structural_coherence(&data), 100.0);
        assert_eq!(detail_level(&data, 100), 100.0);
        let scores = aggregate(&data, &EngineSignals::default(), 100);
        assert_eq!(scores.coherence_source, CoherenceSource::Structural);
        assert_eq!(scores.quality, 100.0);
    }

    #[test]
    fn completion_counts_present_sections() {
        assert_eq!(completion(&WorkshopData::default()), 0.0);
        let data = WorkshopData {
            business_values: vec![item("bv1", 0)],
            dreaded_events: vec![item("de1", 0)],
            ..Default::default()
        };
        assert_eq!(completion(&data), 50.0);
    }

    #[test]
    fn detail_level_scales_and_caps() {
        let data = WorkshopData {
            business_values: vec![item("bv1", 20), item("bv2", 60)],
            ..Default::default()
        };
        assert_eq!(detail_level(&data, 100), 40.0);
        assert_eq!(detail_level(&data, 10), 100.0);
        assert_eq!(detail_level(&data, 0), 0.0);
        assert_eq!(detail_level(&WorkshopData::default(), 100), 0.0);
    }

    #[test]
    fn structural_coherence_is_resolved_ratio() {
        let mut data = m1();
        data.supporting_assets[0].essential_asset_id = Some("ghost".into());
        data.supporting_assets[1].essential_asset_id = Some("ghost".into());
        // 9 declared, 7 resolved
        let expected = 7.0 / 9.0 * 100.0;
        assert!((structural_coherence(&data) - expected).abs() < 1e-9);
        assert_eq!(compliance(&data), 87.5);
    }

    #[test]
    fn structural_coherence_without_links() {
        assert_eq!(structural_coherence(&WorkshopData::default()), 0.0);
        let data = WorkshopData {
            business_values: vec![item("bv1", 0)],
            ..Default::default()
        };
        assert_eq!(structural_coherence(&data), 100.0);
    }

    #[test]
    fn semantic_signal_overrides_structure() {
        let signals = EngineSignals {
            semantic_coherence: Some(0.42),
            predicted_quality: None,
        };
        let (value, source) = coherence(&WorkshopData::default(), &signals);
        assert!((value - 42.0).abs() < 1e-9);
        assert_eq!(source, CoherenceSource::Semantic);

        let nan = EngineSignals {
            semantic_coherence: Some(f64::NAN),
            predicted_quality: None,
        };
        assert_eq!(coherence(&WorkshopData::default(), &nan).1, CoherenceSource::Structural);
    }

    #[test]
    fn compliance_criteria_are_equal_weight() {
        assert_eq!(compliance(&WorkshopData::default()), 0.0);
        let data = WorkshopData {
            business_values: vec![item("bv1", 0)],
            essential_assets: vec![item("ea1", 0).with_business_value("bv1")],
            ..Default::default()
        };
        // two sections, one resolving EA link, all declared links resolve
        assert_eq!(compliance(&data), 50.0);
    }

    #[test]
    fn quality_blends_prediction() {
        assert_eq!(quality(100.0, 50.0, 50.0, 0.0, None), 50.0);
        assert_eq!(quality(100.0, 50.0, 50.0, 0.0, Some(90.0)), 70.0);
        assert_eq!(quality(100.0, 50.0, 50.0, 0.0, Some(f64::INFINITY)), 50.0);
    }

    #[test]
    fn next_steps_follow_gaps() {
        assert_eq!(next_steps(&WorkshopData::default()), vec!["Define at least one business value"]);
        let data = WorkshopData {
            business_values: vec![item("bv1", 0)],
            ..Default::default()
        };
        let steps = next_steps(&data);
        assert_eq!(steps.len(), 2);
        assert!(steps[0].contains("essential assets"));
        assert!(steps[1].contains("dreaded events"));
        assert_eq!(next_steps(&m1()).len(), 3);
    }
}
