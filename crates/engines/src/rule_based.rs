//! Rule-based engine: deterministic checks over section counts, links
//! and description length.
//!
//! Each rule inspects the workshop and either fires one suggestion or
//! stays silent. At most [`MAX_SUGGESTIONS`] are returned, most urgent
//! first.

use async_trait::async_trait;
use atelier_core::analysis::{PartialAnalysisResult, Suggestion, SuggestionPriority};
use atelier_core::context::UserContext;
use atelier_core::engine::AnalysisEngine;
use atelier_core::error::EngineError;
use atelier_core::workshop::{Section, WorkshopData};

/// Upper bound on suggestions per call.
pub const MAX_SUGGESTIONS: usize = 5;

const CONFIDENCE: f64 = 0.9;

/// One rule: a stable id and a check.
struct Rule {
    id: &'static str,
    check: fn(&WorkshopData, &RuleSettings) -> Option<Suggestion>,
}

struct RuleSettings {
    min_description_length: usize,
}

const RULES: &[Rule] = &[
    Rule { id: "bv_missing", check: business_values_missing },
    Rule { id: "ea_missing", check: essential_assets_missing },
    Rule { id: "sa_without_ea", check: supporting_without_essential },
    Rule { id: "de_missing", check: dreaded_events_missing },
    Rule { id: "dangling_links", check: dangling_links },
    Rule { id: "bv_detail", check: business_value_detail },
    Rule { id: "unlinked_items", check: unlinked_items },
];

fn business_values_missing(data: &WorkshopData, _: &RuleSettings) -> Option<Suggestion> {
    data.business_values.is_empty().then(|| {
        Suggestion::new(
            "bv_missing",
            "Define your business values: start with what has value for the organisation.",
            0.95,
            SuggestionPriority::Critical,
            "completeness",
        )
    })
}

fn essential_assets_missing(data: &WorkshopData, _: &RuleSettings) -> Option<Suggestion> {
    (!data.business_values.is_empty() && data.essential_assets.is_empty()).then(|| {
        Suggestion::new(
            "ea_missing",
            "Identify the information, processes and know-how that support your business values.",
            0.9,
            SuggestionPriority::High,
            "completeness",
        )
    })
}

fn supporting_without_essential(data: &WorkshopData, _: &RuleSettings) -> Option<Suggestion> {
    (!data.supporting_assets.is_empty() && data.essential_assets.is_empty()).then(|| {
        Suggestion::new(
            "sa_without_ea",
            "Supporting assets exist without essential assets; each supporting asset must serve an essential asset.",
            0.85,
            SuggestionPriority::High,
            "coherence",
        )
    })
}

fn dreaded_events_missing(data: &WorkshopData, _: &RuleSettings) -> Option<Suggestion> {
    (!data.business_values.is_empty() && data.dreaded_events.is_empty()).then(|| {
        Suggestion::new(
            "de_missing",
            "Describe the dreaded events: how each business value could be harmed and with what impact.",
            0.85,
            SuggestionPriority::High,
            "completeness",
        )
    })
}

fn dangling_links(data: &WorkshopData, _: &RuleSettings) -> Option<Suggestion> {
    let mut dangling = Vec::new();
    for section in [Section::EssentialAssets, Section::SupportingAssets, Section::DreadedEvents] {
        let Some(parent) = section.parent() else {
            continue;
        };
        let parent_ids = data.ids(parent);
        for item in data.section(section) {
            if let Some(target) = section.parent_ref(item) {
                if !parent_ids.contains(target) {
                    dangling.push(item.id.as_str());
                }
            }
        }
    }
    if dangling.is_empty() {
        return None;
    }
    Some(Suggestion::new(
        "dangling_links",
        format!(
            "{} element(s) reference a parent that does not exist: {}.",
            dangling.len(),
            dangling.join(", ")
        ),
        0.8,
        SuggestionPriority::High,
        "coherence",
    ))
}

fn business_value_detail(data: &WorkshopData, settings: &RuleSettings) -> Option<Suggestion> {
    if data.business_values.is_empty() {
        return None;
    }
    let total: usize = data.business_values.iter().map(|bv| bv.description_len()).sum();
    let average = total as f64 / data.business_values.len() as f64;
    (average < settings.min_description_length as f64).then(|| {
        Suggestion::new(
            "bv_detail",
            format!(
                "Business value descriptions average {average:.0} characters; aim for at least {} so risks can be assessed.",
                settings.min_description_length
            ),
            0.75,
            SuggestionPriority::Medium,
            "detail",
        )
    })
}

fn unlinked_items(data: &WorkshopData, _: &RuleSettings) -> Option<Suggestion> {
    let unlinked = [Section::EssentialAssets, Section::SupportingAssets, Section::DreadedEvents]
        .into_iter()
        .flat_map(move |s| data.section(s).iter().filter(move |i| s.parent_ref(i).is_none()))
        .count();
    (unlinked > 0).then(|| {
        Suggestion::new(
            "unlinked_items",
            format!("{unlinked} element(s) are not linked to a parent; link them to keep the analysis traceable."),
            0.7,
            SuggestionPriority::Medium,
            "coherence",
        )
    })
}

/// Deterministic rule engine.
pub struct RuleBasedEngine {
    settings: RuleSettings,
}

impl RuleBasedEngine {
    pub fn new(min_description_length: usize) -> Self {
        Self {
            settings: RuleSettings {
                min_description_length,
            },
        }
    }

    /// Ids of every rule, in evaluation order.
    pub fn rule_ids() -> Vec<&'static str> {
        RULES.iter().map(|r| r.id).collect()
    }
}

impl Default for RuleBasedEngine {
    fn default() -> Self {
        Self::new(50)
    }
}

#[async_trait]
impl AnalysisEngine for RuleBasedEngine {
    fn name(&self) -> &str {
        "rule_based"
    }

    fn features(&self) -> Vec<String> {
        vec!["completeness_rules".into(), "link_rules".into(), "detail_rules".into()]
    }

    async fn probe(&self) -> Result<(), EngineError> {
        Ok(())
    }

    async fn analyze(
        &self,
        workshop: &WorkshopData,
        _context: &UserContext,
    ) -> Result<PartialAnalysisResult, EngineError> {
        let mut fired: Vec<Suggestion> = RULES
            .iter()
            .filter_map(|rule| (rule.check)(workshop, &self.settings))
            .collect();
        fired.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.confidence.total_cmp(&a.confidence))
        });
        fired.truncate(MAX_SUGGESTIONS);

        let mut partial = PartialAnalysisResult::new(self.name(), CONFIDENCE)
            .with_metric("rules_fired", fired.len() as f64);
        for suggestion in fired {
            partial.push_suggestion(suggestion);
        }
        Ok(partial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_core::workshop::WorkshopItem;
    use chrono::Utc;

    fn ctx() -> UserContext {
        UserContext::new("u1", "m1", Utc::now())
    }

    fn ids(p: &PartialAnalysisResult) -> Vec<&str> {
        p.suggestions.iter().map(|s| s.id.as_str()).collect()
    }

    fn long(text: &str) -> String {
        format!("{text} {}", "with enough supporting detail to pass the length threshold")
    }

    #[tokio::test]
    async fn empty_workshop_asks_for_business_values() {
        let engine = RuleBasedEngine::default();
        let p = engine.analyze(&WorkshopData::default(), &ctx()).await.unwrap();
        assert_eq!(ids(&p), vec!["bv_missing"]);
        assert_eq!(p.suggestions[0].priority, SuggestionPriority::Critical);
        assert_eq!(p.confidence, CONFIDENCE);
    }

    #[tokio::test]
    async fn business_values_without_assets() {
        let engine = RuleBasedEngine::default();
        let data = WorkshopData {
            business_values: vec![WorkshopItem::new("bv1", "Billing", "short")],
            ..Default::default()
        };
        let p = engine.analyze(&data, &ctx()).await.unwrap();
        let ids = ids(&p);
        assert!(ids.contains(&"ea_missing"));
        assert!(ids.contains(&"de_missing"));
        assert!(ids.contains(&"bv_detail"));
        assert!(!ids.contains(&"bv_missing"));
    }

    #[tokio::test]
    async fn supporting_assets_without_essential_assets_warns() {
        let engine = RuleBasedEngine::default();
        let data = WorkshopData {
            business_values: vec![WorkshopItem::new("bv1", "Billing", long("Invoicing"))],
            supporting_assets: vec![WorkshopItem::new("sa1", "Server", "").with_essential_asset("ea1")],
            dreaded_events: vec![WorkshopItem::new("de1", "Outage", "").with_business_value("bv1")],
            ..Default::default()
        };
        let p = engine.analyze(&data, &ctx()).await.unwrap();
        let ids = ids(&p);
        assert!(ids.contains(&"sa_without_ea"));
        assert!(ids.contains(&"dangling_links"));
    }

    #[tokio::test]
    async fn complete_linked_workshop_is_quiet() {
        let engine = RuleBasedEngine::default();
        let data = WorkshopData {
            business_values: vec![WorkshopItem::new("bv1", "Billing", long("Invoicing"))],
            essential_assets: vec![WorkshopItem::new("ea1", "Ledger", "").with_business_value("bv1")],
            supporting_assets: vec![WorkshopItem::new("sa1", "Server", "").with_essential_asset("ea1")],
            dreaded_events: vec![WorkshopItem::new("de1", "Outage", "").with_business_value("bv1")],
            current_step: None,
        };
        let p = engine.analyze(&data, &ctx()).await.unwrap();
        assert!(p.suggestions.is_empty());
        assert_eq!(p.metric("rules_fired"), Some(0.0));
    }

    #[tokio::test]
    async fn suggestions_are_capped_and_ordered() {
        let engine = RuleBasedEngine::new(500);
        let data = WorkshopData {
            business_values: vec![WorkshopItem::new("bv1", "Billing", "short")],
            supporting_assets: vec![WorkshopItem::new("sa1", "Server", "")],
            dreaded_events: vec![],
            essential_assets: vec![],
            current_step: None,
        };
        let p = engine.analyze(&data, &ctx()).await.unwrap();
        assert!(p.suggestions.len() <= MAX_SUGGESTIONS);
        for pair in p.suggestions.windows(2) {
            assert!(pair[0].priority >= pair[1].priority);
        }
    }

    #[test]
    fn rule_ids_are_unique() {
        let mut ids = RuleBasedEngine::rule_ids();
        let before = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), before);
    }
}
