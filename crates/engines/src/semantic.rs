//! Semantic engine: coherence from text similarity between workshop items.
//!
//! Items are embedded with a hashed bag-of-words (SHA-256 of each token
//! picks a dimension and a sign) and compared with cosine similarity.
//! Coherence is the mean pairwise similarity, penalized for every
//! inconsistency: items of one section that share little vocabulary,
//! items of different sections that read the same, and items similar to
//! nothing else.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::debug;

use atelier_core::analysis::{metric, PartialAnalysisResult, Suggestion, SuggestionPriority};
use atelier_core::context::UserContext;
use atelier_core::engine::AnalysisEngine;
use atelier_core::error::EngineError;
use atelier_core::workshop::{Section, WorkshopData, WorkshopItem};

/// Same-section pairs below this do not speak the same language.
const SAME_SECTION_FLOOR: f32 = 0.3;
/// Cross-section pairs above this blur the boundary between sections.
const CROSS_SECTION_CEILING: f32 = 0.8;
/// An item whose mean similarity to the others is below this is isolated.
const ISOLATION_THRESHOLD: f32 = 0.2;
/// Pairs above this are linked in the similarity graph.
const EDGE_THRESHOLD: f32 = 0.5;
/// Fewer items than this and the engine asks for more (and skips clustering).
const MIN_ELEMENTS: usize = 3;
const MAX_CLUSTERS: usize = 5;
const CLUSTER_ROUNDS: usize = 10;
/// Suggestions kept per finding kind; the penalty still counts every finding.
const MAX_PER_KIND: usize = 5;
const INCONSISTENCY_PENALTY: f64 = 5.0;

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if the lengths differ, either vector is empty, or either
/// has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

fn distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt()
}

/// Lowercased alphanumeric tokens of three characters or more.
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .map(str::to_lowercase)
}

/// Hashed bag-of-words embedding, L2-normalized. Empty text yields a
/// zero vector.
pub fn embed(text: &str, dimensions: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; dimensions];
    if dimensions == 0 {
        return v;
    }
    for token in tokenize(text) {
        let digest = Sha256::digest(token.as_bytes());
        let mut idx = [0u8; 8];
        idx.copy_from_slice(&digest[..8]);
        let slot = (u64::from_le_bytes(idx) % dimensions as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        v[slot] += sign;
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

struct Element {
    section: Section,
    id: String,
    name: String,
    vector: Vec<f32>,
}

impl Element {
    fn embed(section: Section, item: WorkshopItem, dimensions: usize) -> Self {
        Self {
            vector: embed(&item.text(), dimensions),
            section,
            id: item.id,
            name: item.name,
        }
    }
}

/// The `cap` most severe findings of one kind, plus a count of all of them.
struct Shortlist {
    cap: usize,
    seen: usize,
    kept: Vec<(f32, usize, usize)>,
}

impl Shortlist {
    fn new(cap: usize) -> Self {
        Self {
            cap,
            seen: 0,
            kept: Vec::with_capacity(cap),
        }
    }

    fn offer(&mut self, severity: f32, a: usize, b: usize) {
        self.seen += 1;
        if self.kept.len() < self.cap {
            self.kept.push((severity, a, b));
            return;
        }
        let weakest = self
            .kept
            .iter()
            .enumerate()
            .min_by(|(_, x), (_, y)| x.0.total_cmp(&y.0))
            .map(|(pos, entry)| (pos, entry.0));
        if let Some((pos, floor)) = weakest {
            if severity > floor {
                self.kept[pos] = (severity, a, b);
            }
        }
    }

    /// Kept findings, most severe first.
    fn into_sorted(mut self) -> Vec<(usize, usize)> {
        self.kept
            .sort_by(|x, y| y.0.total_cmp(&x.0).then(x.1.cmp(&y.1)).then(x.2.cmp(&y.2)));
        self.kept.into_iter().map(|(_, a, b)| (a, b)).collect()
    }
}

/// Items grouped around one theme.
struct Cluster {
    members: Vec<usize>,
    /// Member closest to the centroid; its name is the theme
    representative: usize,
    /// 1 − mean distance of the members to the centroid, in [0, 1]
    coherence: f64,
}

struct Comparison {
    mean_similarity: f64,
    isolated: Shortlist,
    divergent: Shortlist,
    blurred: Shortlist,
    clusters: Vec<Cluster>,
    edges: usize,
    components: usize,
}

impl Comparison {
    fn inconsistencies(&self) -> usize {
        self.isolated.seen + self.divergent.seen + self.blurred.seen
    }

    /// Mean pairwise similarity, averaged with mean cluster coherence when
    /// clusters exist, minus the inconsistency penalty. In [0, 100].
    fn coherence(&self) -> f64 {
        let mut scores = vec![self.mean_similarity * 100.0];
        if !self.clusters.is_empty() {
            let mean = self.clusters.iter().map(|c| c.coherence).sum::<f64>() / self.clusters.len() as f64;
            scores.push(mean * 100.0);
        }
        let base = scores.iter().sum::<f64>() / scores.len() as f64;
        (base - INCONSISTENCY_PENALTY * self.inconsistencies() as f64).clamp(0.0, 100.0)
    }

    fn graph_density(&self, n: usize) -> f64 {
        if n < 2 {
            return 0.0;
        }
        2.0 * self.edges as f64 / (n * (n - 1)) as f64
    }
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Pairwise comparison of at least two elements. Returns `None` as soon as
/// `cancelled` is set.
fn compare(elements: &[Element], cancelled: &AtomicBool) -> Option<Comparison> {
    let n = elements.len();
    let mut sums = vec![0.0f64; n];
    let mut total = 0.0f64;
    let mut divergent = Shortlist::new(MAX_PER_KIND);
    let mut blurred = Shortlist::new(MAX_PER_KIND);
    let mut parent: Vec<usize> = (0..n).collect();
    let mut edges = 0;

    for i in 0..n {
        if cancelled.load(Ordering::Relaxed) {
            return None;
        }
        for j in (i + 1)..n {
            let (a, b) = (&elements[i], &elements[j]);
            let sim = cosine_similarity(&a.vector, &b.vector);
            sums[i] += sim as f64;
            sums[j] += sim as f64;
            total += 2.0 * sim as f64;

            if a.section == b.section && sim < SAME_SECTION_FLOOR {
                divergent.offer(SAME_SECTION_FLOOR - sim, i, j);
            } else if a.section != b.section && sim > CROSS_SECTION_CEILING {
                blurred.offer(sim, i, j);
            }
            if sim > EDGE_THRESHOLD {
                edges += 1;
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    parent[ri] = rj;
                }
            }
        }
    }

    let mut isolated = Shortlist::new(MAX_PER_KIND);
    for (i, sum) in sums.iter().enumerate() {
        let mean = *sum / (n - 1) as f64;
        if mean < ISOLATION_THRESHOLD as f64 {
            isolated.offer(-(mean as f32), i, i);
        }
    }

    let components = (0..n).filter(|i| find(&mut parent, *i) == *i).count();
    let clusters = if n >= MIN_ELEMENTS {
        cluster(elements, cancelled)?
    } else {
        Vec::new()
    };

    Some(Comparison {
        mean_similarity: total / (n * (n - 1)) as f64,
        isolated,
        divergent,
        blurred,
        clusters,
        edges,
        components,
    })
}

fn nearest_centroid(vector: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best = (0, f32::INFINITY);
    for (c, centroid) in centroids.iter().enumerate() {
        let d = distance(vector, centroid);
        if d < best.1 {
            best = (c, d);
        }
    }
    best.0
}

/// Deterministic k-means with farthest-point seeding,
/// k = clamp(n / 3, 2, 5). Empty clusters are dropped.
fn cluster(elements: &[Element], cancelled: &AtomicBool) -> Option<Vec<Cluster>> {
    let n = elements.len();
    let k = (n / 3).clamp(2, MAX_CLUSTERS).min(n);
    let dimensions = elements[0].vector.len();

    let mut centroids = vec![elements[0].vector.clone()];
    let mut nearest: Vec<f32> = elements
        .iter()
        .map(|e| distance(&e.vector, &centroids[0]))
        .collect();
    while centroids.len() < k {
        let (far, gap) = nearest
            .iter()
            .copied()
            .enumerate()
            .fold((0, 0.0f32), |best, (i, d)| if d > best.1 { (i, d) } else { best });
        if gap <= 0.0 {
            break;
        }
        let seed = elements[far].vector.clone();
        for (d, e) in nearest.iter_mut().zip(elements) {
            *d = d.min(distance(&e.vector, &seed));
        }
        centroids.push(seed);
    }

    let mut assignment = vec![usize::MAX; n];
    for _ in 0..CLUSTER_ROUNDS {
        if cancelled.load(Ordering::Relaxed) {
            return None;
        }
        let mut changed = false;
        for (slot, e) in assignment.iter_mut().zip(elements) {
            let c = nearest_centroid(&e.vector, &centroids);
            if *slot != c {
                *slot = c;
                changed = true;
            }
        }
        if !changed {
            break;
        }
        for (c, centroid) in centroids.iter_mut().enumerate() {
            let mut sum = vec![0.0f32; dimensions];
            let mut count = 0usize;
            for (e, _) in elements.iter().zip(&assignment).filter(|(_, a)| **a == c) {
                sum.iter_mut().zip(&e.vector).for_each(|(s, x)| *s += x);
                count += 1;
            }
            if count > 0 {
                sum.iter_mut().for_each(|s| *s /= count as f32);
                *centroid = sum;
            }
        }
    }

    let clusters = centroids
        .iter()
        .enumerate()
        .filter_map(|(c, centroid)| {
            let members: Vec<usize> = (0..n).filter(|i| assignment[*i] == c).collect();
            let distances: Vec<f32> = members
                .iter()
                .map(|i| distance(&elements[*i].vector, centroid))
                .collect();
            let (closest, _) = distances
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.total_cmp(b.1))?;
            let mean = distances.iter().map(|d| *d as f64).sum::<f64>() / members.len() as f64;
            Some(Cluster {
                representative: members[closest],
                members,
                coherence: (1.0 - mean).clamp(0.0, 1.0),
            })
        })
        .collect();
    Some(clusters)
}

/// Sets the flag when the owning future is dropped, so a timed-out call
/// stops its blocking computation.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

pub struct SemanticEngine {
    dimensions: usize,
}

impl SemanticEngine {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Default for SemanticEngine {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl AnalysisEngine for SemanticEngine {
    fn name(&self) -> &str {
        "semantic"
    }

    fn features(&self) -> Vec<String> {
        vec![
            "semantic_coherence".into(),
            "duplicate_detection".into(),
            "isolation_detection".into(),
            "clustering".into(),
            "similarity_graph".into(),
        ]
    }

    async fn probe(&self) -> Result<(), EngineError> {
        if self.dimensions == 0 {
            return Err(EngineError::Unavailable("embedding dimensions must be > 0".into()));
        }
        Ok(())
    }

    async fn analyze(
        &self,
        workshop: &WorkshopData,
        _context: &UserContext,
    ) -> Result<PartialAnalysisResult, EngineError> {
        if self.dimensions == 0 {
            return Err(EngineError::Unavailable("embedding dimensions must be > 0".into()));
        }

        let dimensions = self.dimensions;
        let items: Vec<(Section, WorkshopItem)> = workshop
            .items()
            .map(|(section, item)| (section, item.clone()))
            .collect();

        let cancelled = Arc::new(AtomicBool::new(false));
        let _cancel_on_drop = CancelOnDrop(Arc::clone(&cancelled));
        let (elements, comparison) = tokio::task::spawn_blocking(move || {
            let elements: Vec<Element> = items
                .into_iter()
                .map(|(section, item)| Element::embed(section, item, dimensions))
                .collect();
            let comparison = match elements.len() {
                0 | 1 => None,
                _ => Some(compare(&elements, &cancelled)?),
            };
            Some((elements, comparison))
        })
        .await
        .map_err(|e| {
            if e.is_panic() {
                EngineError::Panicked(e.to_string())
            } else {
                EngineError::Failed(e.to_string())
            }
        })?
        .ok_or_else(|| EngineError::Failed("similarity computation cancelled".into()))?;

        let n = elements.len();
        let confidence = 0.5 + 0.4 * (n as f64 / 10.0).min(1.0);
        let mut partial = PartialAnalysisResult::new(self.name(), confidence);

        if let Some(comparison) = comparison {
            let coherence = comparison.coherence();
            debug!(
                items = n,
                isolated = comparison.isolated.seen,
                inconsistencies = comparison.inconsistencies(),
                clusters = comparison.clusters.len(),
                coherence,
                "Semantic coherence computed"
            );
            partial = partial
                .with_metric(metric::SEMANTIC_COHERENCE, coherence / 100.0)
                .with_metric(metric::GRAPH_DENSITY, comparison.graph_density(n))
                .with_metric(metric::GRAPH_COMPONENTS, comparison.components as f64);
            if !comparison.clusters.is_empty() {
                partial = partial.with_metric(metric::SEMANTIC_CLUSTERS, comparison.clusters.len() as f64);
            }

            let Comparison {
                isolated,
                divergent,
                blurred,
                clusters,
                ..
            } = comparison;

            for (i, _) in isolated.into_sorted() {
                let e = &elements[i];
                partial.push_suggestion(Suggestion::new(
                    format!("clarify:{}:{}", e.section, e.id),
                    format!(
                        "'{}' shares little vocabulary with the rest of the analysis; clarify or enrich its description.",
                        e.name
                    ),
                    0.6,
                    SuggestionPriority::High,
                    "coherence",
                ));
            }
            for (i, j) in divergent.into_sorted() {
                let (a, b) = (&elements[i], &elements[j]);
                partial.push_suggestion(Suggestion::new(
                    format!("harmonize:{}:{}:{}", a.section, a.id, b.id),
                    format!(
                        "'{}' and '{}' belong to {} but are worded very differently; harmonize their vocabulary.",
                        a.name, b.name, a.section
                    ),
                    0.5,
                    SuggestionPriority::Medium,
                    "consistency",
                ));
            }
            for (i, j) in blurred.into_sorted() {
                let (a, b) = (&elements[i], &elements[j]);
                partial.push_suggestion(Suggestion::new(
                    format!("review_section:{}:{}", a.id, b.id),
                    format!(
                        "'{}' ({}) and '{}' ({}) are described almost identically; check each is in the right section.",
                        a.name, a.section, b.name, b.section
                    ),
                    0.4,
                    SuggestionPriority::Low,
                    "consistency",
                ));
            }
            for c in clusters.iter().filter(|c| c.members.len() == 1).take(MAX_PER_KIND) {
                let e = &elements[c.representative];
                partial.push_suggestion(Suggestion::new(
                    format!("expand_cluster:{}", e.id),
                    format!("'{}' stands alone in its theme; consider adding related elements.", e.name),
                    0.5,
                    SuggestionPriority::Medium,
                    "completeness",
                ));
            }
        }

        if n < MIN_ELEMENTS {
            partial.push_suggestion(Suggestion::new(
                "add_elements",
                "Add more elements so their relationships can be assessed.",
                0.5,
                SuggestionPriority::Low,
                "completeness",
            ));
        }

        Ok(partial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn ctx() -> UserContext {
        UserContext::new("u1", "m1", Utc::now())
    }

    fn ids(p: &PartialAnalysisResult) -> Vec<&str> {
        p.suggestions.iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn cosine_identical_and_orthogonal() {
        assert!((cosine_similarity(&[1.0, 2.0], &[1.0, 2.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn embedding_is_normalized_and_deterministic() {
        let a = embed("Customer billing records", 64);
        let b = embed("customer BILLING records", 64);
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!(embed("", 64).iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn single_item_has_no_coherence_metric() {
        let engine = SemanticEngine::default();
        let data = WorkshopData {
            business_values: vec![WorkshopItem::new("bv1", "Billing", "Invoices")],
            ..Default::default()
        };
        let p = engine.analyze(&data, &ctx()).await.unwrap();
        assert_eq!(p.metric(metric::SEMANTIC_COHERENCE), None);
        assert_eq!(ids(&p), vec!["add_elements"]);
        assert!((p.confidence - 0.54).abs() < 1e-9);
    }

    #[tokio::test]
    async fn identical_items_score_full_coherence() {
        let engine = SemanticEngine::new(4096);
        let item = |id: &str| WorkshopItem::new(id, "Customer billing", "Monthly invoices sent to customers");
        let data = WorkshopData {
            business_values: vec![item("bv1"), item("bv2"), item("bv3")],
            ..Default::default()
        };
        let p = engine.analyze(&data, &ctx()).await.unwrap();
        assert!(p.suggestions.is_empty());
        let coherence = p.metric(metric::SEMANTIC_COHERENCE).unwrap();
        assert!((coherence - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn unrelated_items_are_isolated_and_divergent() {
        let engine = SemanticEngine::new(65_536);
        let data = WorkshopData {
            business_values: vec![
                WorkshopItem::new("bv1", "Payroll processing", "salary payments employees"),
                WorkshopItem::new("bv2", "Zebra", "quantum giraffe"),
            ],
            ..Default::default()
        };
        let p = engine.analyze(&data, &ctx()).await.unwrap();
        let ids = ids(&p);
        assert!(ids.contains(&"clarify:business_values:bv1"));
        assert!(ids.contains(&"clarify:business_values:bv2"));
        assert!(ids.contains(&"harmonize:business_values:bv1:bv2"));
        assert!(ids.contains(&"add_elements"));
        assert_eq!(p.metric(metric::SEMANTIC_COHERENCE), Some(0.0));
    }

    #[tokio::test]
    async fn same_text_across_sections_is_reviewed() {
        let engine = SemanticEngine::new(4096);
        let text = "Customer database with contracts";
        let data = WorkshopData {
            business_values: vec![WorkshopItem::new("bv1", "Customers", text)],
            essential_assets: vec![WorkshopItem::new("ea1", "Customers", text)],
            ..Default::default()
        };
        let p = engine.analyze(&data, &ctx()).await.unwrap();
        assert!(ids(&p).contains(&"review_section:bv1:ea1"));
        let coherence = p.metric(metric::SEMANTIC_COHERENCE).unwrap();
        assert!((coherence - 0.95).abs() < 1e-5);
    }

    #[tokio::test]
    async fn zero_dimensions_is_unavailable() {
        let engine = SemanticEngine::new(0);
        assert!(matches!(engine.probe().await, Err(EngineError::Unavailable(_))));
    }

    fn themed(id: &str, text: &str) -> WorkshopItem {
        WorkshopItem::new(id, id, text)
    }

    const BILLING: &str = "customer billing invoices payment";
    const NETWORK: &str = "server network firewall datacenter";

    #[tokio::test]
    async fn two_themes_form_two_clusters() {
        let engine = SemanticEngine::new(65_536);
        let data = WorkshopData {
            business_values: vec![themed("bv1", BILLING), themed("bv2", BILLING), themed("bv3", BILLING)],
            supporting_assets: vec![themed("sa1", NETWORK), themed("sa2", NETWORK), themed("sa3", NETWORK)],
            ..Default::default()
        };
        let p = engine.analyze(&data, &ctx()).await.unwrap();

        assert_eq!(p.metric(metric::SEMANTIC_CLUSTERS), Some(2.0));
        assert_eq!(p.metric(metric::GRAPH_COMPONENTS), Some(2.0));
        assert!((p.metric(metric::GRAPH_DENSITY).unwrap() - 0.4).abs() < 1e-9);
        // mean similarity 0.4, cluster coherence 1.0
        let coherence = p.metric(metric::SEMANTIC_COHERENCE).unwrap();
        assert!((coherence - 0.7).abs() < 1e-5, "coherence {coherence}");
        assert!(p.suggestions.is_empty());
    }

    #[tokio::test]
    async fn lone_theme_asks_for_expansion() {
        let engine = SemanticEngine::new(65_536);
        let data = WorkshopData {
            business_values: vec![themed("bv1", BILLING), themed("bv2", BILLING)],
            supporting_assets: vec![themed("sa1", NETWORK)],
            ..Default::default()
        };
        let p = engine.analyze(&data, &ctx()).await.unwrap();
        let ids = ids(&p);
        assert!(ids.contains(&"expand_cluster:sa1"));
        assert!(ids.contains(&"clarify:supporting_assets:sa1"));
        assert!(!ids.iter().any(|id| id.starts_with("expand_cluster:bv")));
    }

    #[tokio::test]
    async fn suggestions_are_capped_per_kind() {
        let engine = SemanticEngine::new(65_536);
        let data = WorkshopData {
            business_values: (0..40)
                .map(|i| themed(&format!("bv{i}"), &format!("unique{i}word")))
                .collect(),
            ..Default::default()
        };
        let p = engine.analyze(&data, &ctx()).await.unwrap();
        let count = |prefix: &str| p.suggestions.iter().filter(|s| s.id.starts_with(prefix)).count();

        assert_eq!(count("harmonize:"), MAX_PER_KIND);
        assert_eq!(count("clarify:"), MAX_PER_KIND);
        assert!(count("expand_cluster:") <= MAX_PER_KIND);
        assert!(p.suggestions.len() <= 4 * MAX_PER_KIND + 1);
        // every divergent pair still weighs on the score
        assert_eq!(p.metric(metric::SEMANTIC_COHERENCE), Some(0.0));
    }

    #[test]
    fn shortlist_keeps_the_most_severe() {
        let mut list = Shortlist::new(2);
        for (severity, i) in [(0.1, 0), (0.9, 1), (0.5, 2), (0.9, 3)] {
            list.offer(severity, i, i);
        }
        assert_eq!(list.seen, 4);
        assert_eq!(list.into_sorted(), vec![(1, 1), (3, 3)]);
    }

    #[test]
    fn comparison_stops_when_cancelled() {
        let elements: Vec<Element> = (0..10)
            .map(|i| Element::embed(Section::BusinessValues, themed(&format!("bv{i}"), BILLING), 64))
            .collect();
        assert!(compare(&elements, &AtomicBool::new(true)).is_none());
        assert!(compare(&elements, &AtomicBool::new(false)).is_some());
    }
}
