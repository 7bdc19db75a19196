//! Statistical engine: feature extraction, completion scoring, quality
//! prediction and a structural risk estimate.
//!
//! Quality blends a weighted heuristic with a nearest-profile estimate
//! over a small set of built-in reference workshops.

use async_trait::async_trait;
use tracing::debug;

use atelier_core::analysis::{metric, PartialAnalysisResult, Suggestion, SuggestionPriority};
use atelier_core::context::UserContext;
use atelier_core::engine::AnalysisEngine;
use atelier_core::error::EngineError;
use atelier_core::workshop::{Section, WorkshopData};

/// Minimum expected item count per section, in [`Section::ALL`] order.
const SECTION_MINIMUMS: [f64; 4] = [2.0, 3.0, 5.0, 2.0];
/// Neighbours consulted by the profile estimate.
const NEIGHBOURS: usize = 2;
const HEURISTIC_WEIGHT: f64 = 0.6;

/// Numeric summary of a workshop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Features {
    /// Item count per section, in [`Section::ALL`] order
    pub counts: [f64; 4],
    pub avg_description_length: f64,
    pub min_description_length: f64,
    pub max_description_length: f64,
    pub description_variance: f64,
    /// 1 - std of section proportions; 0 for an empty workshop
    pub balance: f64,
    /// Fraction of child items whose declared parent exists
    pub link_resolution: f64,
    /// From the user's "experience" progress, 0.5 when unknown
    pub experience: f64,
}

impl Features {
    pub fn extract(workshop: &WorkshopData, context: &UserContext) -> Self {
        let mut counts = [0.0; 4];
        for (i, section) in Section::ALL.iter().enumerate() {
            counts[i] = workshop.section(*section).len() as f64;
        }

        let lengths: Vec<f64> = workshop
            .items()
            .map(|(_, item)| item.description_len())
            .filter(|len| *len > 0)
            .map(|len| len as f64)
            .collect();
        let (avg, min, max, variance) = if lengths.is_empty() {
            (0.0, 0.0, 0.0, 0.0)
        } else {
            let n = lengths.len() as f64;
            let avg = lengths.iter().sum::<f64>() / n;
            let min = lengths.iter().copied().fold(f64::INFINITY, f64::min);
            let max = lengths.iter().copied().fold(0.0, f64::max);
            let variance = lengths.iter().map(|l| (l - avg).powi(2)).sum::<f64>() / n;
            (avg, min, max, variance)
        };

        let total: f64 = counts.iter().sum();
        let balance = if total > 0.0 {
            let proportions = counts.map(|c| c / total);
            let mean = proportions.iter().sum::<f64>() / 4.0;
            let std = (proportions.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / 4.0).sqrt();
            1.0 - std
        } else {
            0.0
        };

        let mut children = 0usize;
        let mut resolved = 0usize;
        for section in [Section::EssentialAssets, Section::SupportingAssets, Section::DreadedEvents] {
            let Some(parent) = section.parent() else {
                continue;
            };
            let parents = workshop.ids(parent);
            for item in workshop.section(section) {
                children += 1;
                if section.parent_ref(item).is_some_and(|id| parents.contains(id)) {
                    resolved += 1;
                }
            }
        }
        let link_resolution = if children == 0 {
            0.0
        } else {
            resolved as f64 / children as f64
        };

        Self {
            counts,
            avg_description_length: avg,
            min_description_length: min,
            max_description_length: max,
            description_variance: variance,
            balance,
            link_resolution,
            experience: context.progress("experience").unwrap_or(0.5),
        }
    }

    pub fn total(&self) -> f64 {
        self.counts.iter().sum()
    }

    fn values(&self) -> [f64; 11] {
        [
            self.counts[0],
            self.counts[1],
            self.counts[2],
            self.counts[3],
            self.avg_description_length,
            self.min_description_length,
            self.max_description_length,
            self.description_variance,
            self.balance,
            self.link_resolution,
            self.experience,
        ]
    }
}

/// A reference workshop with a known quality.
#[derive(Debug, Clone, Copy)]
struct Profile {
    counts: [f64; 4],
    avg_description_length: f64,
    balance: f64,
    quality: f64,
}

const PROFILES: &[Profile] = &[
    Profile { counts: [0.0, 0.0, 0.0, 0.0], avg_description_length: 0.0, balance: 0.0, quality: 0.0 },
    Profile { counts: [1.0, 0.0, 0.0, 0.0], avg_description_length: 30.0, balance: 0.57, quality: 15.0 },
    Profile { counts: [2.0, 2.0, 0.0, 0.0], avg_description_length: 45.0, balance: 0.75, quality: 35.0 },
    Profile { counts: [2.0, 3.0, 4.0, 2.0], avg_description_length: 80.0, balance: 0.6, quality: 65.0 },
    Profile { counts: [3.0, 4.0, 5.0, 3.0], avg_description_length: 100.0, balance: 0.7, quality: 75.0 },
    Profile { counts: [3.0, 5.0, 8.0, 4.0], avg_description_length: 120.0, balance: 0.8, quality: 85.0 },
    Profile { counts: [4.0, 6.0, 10.0, 5.0], avg_description_length: 150.0, balance: 0.9, quality: 95.0 },
    Profile { counts: [6.0, 2.0, 1.0, 0.0], avg_description_length: 60.0, balance: 0.72, quality: 40.0 },
];

/// Per-dimension scales used to normalize the profile distance.
const PROFILE_SCALES: [f64; 6] = [5.0, 6.0, 10.0, 5.0, 150.0, 1.0];

fn profile_distance(f: &Features, p: &Profile) -> f64 {
    let a = [f.counts[0], f.counts[1], f.counts[2], f.counts[3], f.avg_description_length, f.balance];
    let b = [p.counts[0], p.counts[1], p.counts[2], p.counts[3], p.avg_description_length, p.balance];
    a.iter()
        .zip(b.iter())
        .zip(PROFILE_SCALES.iter())
        .map(|((x, y), s)| ((x - y) / s).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Inverse-distance weighted quality of the nearest reference profiles.
pub fn profile_estimate(features: &Features) -> f64 {
    let mut ranked: Vec<(f64, f64)> = PROFILES
        .iter()
        .map(|p| (profile_distance(features, p), p.quality))
        .collect();
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

    let nearest = &ranked[..NEIGHBOURS.min(ranked.len())];
    if let Some((_, quality)) = nearest.iter().find(|(d, _)| *d < 1e-9) {
        return *quality;
    }
    let weights: f64 = nearest.iter().map(|(d, _)| 1.0 / d).sum();
    nearest.iter().map(|(d, q)| q / d).sum::<f64>() / weights
}

/// Weighted completion against per-section minimums, in [0, 1].
pub fn completion_score(features: &Features, target_description_length: usize) -> f64 {
    let section_mean = features
        .counts
        .iter()
        .zip(SECTION_MINIMUMS.iter())
        .map(|(count, min)| (count / min).min(1.0))
        .sum::<f64>()
        / 4.0;
    let desc_quality = if target_description_length == 0 {
        0.0
    } else {
        (features.avg_description_length / target_description_length as f64).min(1.0)
    };
    (section_mean * 0.7 + desc_quality * 0.2 + features.link_resolution * 0.1).min(1.0)
}

/// Heuristic quality in [0, 100].
pub fn heuristic_quality(features: &Features) -> f64 {
    let c = features.counts;
    let completeness = ((c[0] * 0.2 + c[1] * 0.15 + c[2] * 0.1 + c[3] * 0.2) / 4.0).min(1.0);
    let description = (features.avg_description_length / 200.0).min(1.0);
    ((completeness * 0.4 + features.link_resolution * 0.3 + description * 0.3) * 100.0).min(100.0)
}

/// Structural risk in [0, 1]: incomplete (+0.3), weakly linked (+0.2),
/// short descriptions (+0.15).
pub fn risk_score(features: &Features, completion: f64) -> f64 {
    let mut risk = 0.0;
    if completion < 0.5 {
        risk += 0.3;
    }
    if features.link_resolution < 0.5 {
        risk += 0.2;
    }
    if features.avg_description_length < 30.0 {
        risk += 0.15;
    }
    risk
}

fn model_confidence(features: &Features) -> f64 {
    let values = features.values();
    let present = values.iter().filter(|v| **v > 0.0).count();
    let mut confidence = present as f64 / values.len() as f64;
    if features.avg_description_length > 50.0 {
        confidence += 0.1;
    }
    if features.link_resolution > 0.7 {
        confidence += 0.1;
    }
    confidence.min(1.0)
}

pub struct StatisticalEngine {
    target_description_length: usize,
    min_description_length: usize,
}

impl StatisticalEngine {
    pub fn new(target_description_length: usize, min_description_length: usize) -> Self {
        Self {
            target_description_length,
            min_description_length,
        }
    }
}

impl Default for StatisticalEngine {
    fn default() -> Self {
        Self::new(100, 50)
    }
}

#[async_trait]
impl AnalysisEngine for StatisticalEngine {
    fn name(&self) -> &str {
        "statistical"
    }

    fn features(&self) -> Vec<String> {
        vec![
            "completion_scoring".into(),
            "quality_prediction".into(),
            "risk_assessment".into(),
        ]
    }

    async fn probe(&self) -> Result<(), EngineError> {
        if PROFILES.len() < NEIGHBOURS {
            return Err(EngineError::Unavailable("not enough reference profiles".into()));
        }
        Ok(())
    }

    async fn analyze(
        &self,
        workshop: &WorkshopData,
        context: &UserContext,
    ) -> Result<PartialAnalysisResult, EngineError> {
        let features = Features::extract(workshop, context);
        let completion = completion_score(&features, self.target_description_length);
        let heuristic = heuristic_quality(&features);
        let estimate = profile_estimate(&features);
        let quality = (HEURISTIC_WEIGHT * heuristic + (1.0 - HEURISTIC_WEIGHT) * estimate).clamp(0.0, 100.0);
        let risk = risk_score(&features, completion);

        debug!(completion, heuristic, estimate, risk, "Statistical scores computed");

        let mut partial = PartialAnalysisResult::new(self.name(), model_confidence(&features))
            .with_metric(metric::OVERALL_QUALITY, quality)
            .with_metric(metric::COMPLETION_SCORE, completion)
            .with_metric(metric::RISK_SCORE, risk);

        if features.counts[0] < SECTION_MINIMUMS[0] {
            partial.push_suggestion(Suggestion::new(
                "add_business_values",
                "Add at least 2 business values for a complete analysis.",
                0.9,
                SuggestionPriority::High,
                "business_values",
            ));
        }
        if features.counts[1] < SECTION_MINIMUMS[1] {
            partial.push_suggestion(Suggestion::new(
                "add_essential_assets",
                "Identify at least 3 essential assets supporting your business values.",
                0.85,
                SuggestionPriority::High,
                "essential_assets",
            ));
        }
        if features.total() > 0.0 && features.avg_description_length < self.min_description_length as f64 {
            partial.push_suggestion(Suggestion::new(
                "improve_descriptions",
                "Enrich the descriptions to sharpen the analysis.",
                0.8,
                SuggestionPriority::Medium,
                "quality",
            ));
        }
        if features.total() > 0.0 && features.balance < 0.7 {
            partial.push_suggestion(Suggestion::new(
                "balance_sections",
                "Balance the number of elements across sections.",
                0.7,
                SuggestionPriority::Low,
                "structure",
            ));
        }
        if risk >= 0.5 {
            partial.push_suggestion(Suggestion::new(
                "structural_risk",
                "Complete and link the analysis before moving to the next workshop.",
                0.7,
                SuggestionPriority::High,
                "risk",
            ));
        }

        Ok(partial)
    }
}
