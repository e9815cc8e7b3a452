//! Chunk-fusion synthesizer (C8): clusters retrieved chunks by pairwise
//! coherence and synthesizes one scored, provenance-bearing answer per
//! cluster.

use std::collections::{BTreeMap, HashSet};

use crate::bm25::tokenize;

/// One retrieved chunk, in the shape C8 needs — a narrowed view of a
/// [`crate::hybrid::HybridResultItem`] plus its position within the
/// parent document.
#[derive(Debug, Clone)]
pub struct ChunkForFusion {
    pub chunk_id: String,
    pub document_id: String,
    pub content: String,
    pub title: Option<String>,
    pub position: i64,
    pub relevance: f64,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy)]
pub struct FusionConfig {
    pub coherence_threshold: f64,
    pub min_chunks_for_fusion: usize,
    pub deduplication_threshold: f64,
    pub max_key_points: usize,
    pub min_sentence_chars: usize,
    pub max_contradictions: usize,
    pub w_completeness: f64,
    pub w_coherence: f64,
    pub w_relevance: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            coherence_threshold: 0.6,
            min_chunks_for_fusion: 2,
            deduplication_threshold: 0.8,
            max_key_points: 10,
            min_sentence_chars: 20,
            max_contradictions: 5,
            w_completeness: 0.3,
            w_coherence: 0.4,
            w_relevance: 0.3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChunkCluster {
    pub chunks: Vec<ChunkForFusion>,
    pub topic_coherence: f64,
    pub temporal_coherence: f64,
    pub semantic_density: f64,
}

impl ChunkCluster {
    pub fn average_relevance(&self) -> f64 {
        if self.chunks.is_empty() {
            return 0.0;
        }
        self.chunks.iter().map(|c| c.relevance).sum::<f64>() / self.chunks.len() as f64
    }

    pub fn chunk_ids(&self) -> Vec<String> {
        self.chunks.iter().map(|c| c.chunk_id.clone()).collect()
    }

    fn ranking_key(&self) -> f64 {
        self.average_relevance() * self.topic_coherence * self.semantic_density
    }
}

#[derive(Debug, Clone)]
pub struct FusedAnswer {
    pub content: String,
    pub source_chunks: Vec<String>,
    pub coherence_score: f64,
    pub confidence: f64,
    pub key_points: Vec<String>,
    pub contradictions: Vec<(String, String)>,
}

impl FusedAnswer {
    pub fn num_sources(&self) -> usize {
        self.source_chunks.len()
    }
}

const NEGATION_MARKERS: &[&str] = &["not", "never", "no", "cannot", "can't", "doesn't", "don't", "isn't", "won't"];

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

fn token_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// Pairwise coherence between two chunks, clamped to `[0.0, 1.0]` (§4.8).
pub fn coherence(a: &ChunkForFusion, b: &ChunkForFusion, query_terms: &[String]) -> f64 {
    let mut score = 0.0;

    if a.document_id == b.document_id {
        score += 0.3;
        let gap = (a.position - b.position).abs();
        if gap == 1 {
            score += 0.2;
        } else if gap <= 3 {
            score += 0.1;
        }
    }

    let shared_meta_keys = a
        .metadata
        .iter()
        .filter(|(k, v)| b.metadata.get(*k) == Some(v))
        .count();
    score += 0.1 * shared_meta_keys as f64;

    let a_tokens = token_set(&a.content);
    let b_tokens = token_set(&b.content);

    if !query_terms.is_empty() {
        let both = query_terms
            .iter()
            .filter(|t| a_tokens.contains(t.as_str()) && b_tokens.contains(t.as_str()))
            .count();
        score += 0.3 * (both as f64 / query_terms.len() as f64);
    }

    score += 0.3 * jaccard(&a_tokens, &b_tokens);

    let shared_non_query: HashSet<&String> = a_tokens
        .intersection(&b_tokens)
        .filter(|t| !query_terms.contains(t))
        .collect();
    let denom = a_tokens.len().max(b_tokens.len()).max(1) as f64;
    score += 0.2 * (shared_non_query.len() as f64 / denom).min(1.0);

    score.min(1.0)
}

/// Greedy clustering: walk results in relevance order, seed a cluster,
/// and absorb any unused chunk whose coherence with the seed clears the
/// threshold. Clusters below `min_chunks_for_fusion` are dropped.
pub fn cluster_chunks(
    results: &[ChunkForFusion],
    query_terms: &[String],
    config: &FusionConfig,
) -> Vec<ChunkCluster> {
    let mut ordered: Vec<&ChunkForFusion> = results.iter().collect();
    ordered.sort_by(|a, b| b.relevance.partial_cmp(&a.relevance).unwrap_or(std::cmp::Ordering::Equal));

    let mut used = vec![false; ordered.len()];
    let mut clusters = Vec::new();

    for seed_idx in 0..ordered.len() {
        if used[seed_idx] {
            continue;
        }
        let seed = ordered[seed_idx];
        let mut members = vec![seed.clone()];
        used[seed_idx] = true;

        for (i, candidate) in ordered.iter().enumerate() {
            if used[i] {
                continue;
            }
            if coherence(seed, candidate, query_terms) >= config.coherence_threshold {
                members.push((*candidate).clone());
                used[i] = true;
            }
        }

        if members.len() >= config.min_chunks_for_fusion {
            let topic_coherence = topic_coherence(&members);
            let temporal_coherence = temporal_coherence(&members);
            let semantic_density = semantic_density(&members, query_terms);
            clusters.push(ChunkCluster {
                chunks: members,
                topic_coherence,
                temporal_coherence,
                semantic_density,
            });
        }
    }

    clusters.sort_by(|a, b| b.ranking_key().partial_cmp(&a.ranking_key()).unwrap_or(std::cmp::Ordering::Equal));
    clusters
}

/// Fraction of unique terms shared across ≥ 40% of chunks, plus a bonus
/// for very high-frequency terms.
fn topic_coherence(chunks: &[ChunkForFusion]) -> f64 {
    if chunks.is_empty() {
        return 0.0;
    }
    let mut term_doc_count: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    let mut all_terms: HashSet<String> = HashSet::new();
    for chunk in chunks {
        let tokens: HashSet<String> = token_set(&chunk.content);
        for term in &tokens {
            *term_doc_count.entry(term.clone()).or_insert(0) += 1;
            all_terms.insert(term.clone());
        }
    }
    if all_terms.is_empty() {
        return 0.0;
    }
    let threshold_count = (chunks.len() as f64 * 0.4).ceil() as usize;
    let shared = term_doc_count.values().filter(|&&c| c >= threshold_count.max(1)).count();
    let base = shared as f64 / all_terms.len() as f64;
    let max_freq_ratio = term_doc_count.values().copied().max().unwrap_or(0) as f64 / chunks.len() as f64;
    (base + max_freq_ratio * 0.1).min(1.0)
}

/// Exponential decay in the average position gap within a document.
fn temporal_coherence(chunks: &[ChunkForFusion]) -> f64 {
    let mut by_doc: std::collections::HashMap<&str, Vec<i64>> = std::collections::HashMap::new();
    for chunk in chunks {
        by_doc.entry(chunk.document_id.as_str()).or_default().push(chunk.position);
    }
    let mut gaps = Vec::new();
    for positions in by_doc.values() {
        if positions.len() < 2 {
            continue;
        }
        let mut sorted = positions.clone();
        sorted.sort();
        for pair in sorted.windows(2) {
            gaps.push((pair[1] - pair[0]).unsigned_abs() as f64);
        }
    }
    if gaps.is_empty() {
        return 1.0;
    }
    let avg_gap = gaps.iter().sum::<f64>() / gaps.len() as f64;
    (-avg_gap / 5.0).exp()
}

/// Query-term coverage blended with a chunk-length preference around
/// ~200 chars.
fn semantic_density(chunks: &[ChunkForFusion], query_terms: &[String]) -> f64 {
    if chunks.is_empty() {
        return 0.0;
    }
    let union_tokens: HashSet<String> = chunks.iter().flat_map(|c| token_set(&c.content)).collect();
    let coverage = if query_terms.is_empty() {
        0.0
    } else {
        query_terms.iter().filter(|t| union_tokens.contains(t.as_str())).count() as f64 / query_terms.len() as f64
    };
    let avg_len = chunks.iter().map(|c| c.content.chars().count()).sum::<usize>() as f64 / chunks.len() as f64;
    let length_pref = (1.0 - (avg_len - 200.0).abs() / 200.0).clamp(0.0, 1.0);
    (0.7 * coverage + 0.3 * length_pref).min(1.0)
}

fn split_sentences(text: &str) -> Vec<String> {
    text.split(['.', '!', '?'])
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Sentences containing at least one query term, deduplicated by Jaccard
/// similarity, capped at `max_key_points`.
fn key_points(cluster: &ChunkCluster, query_terms: &[String], config: &FusionConfig) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();
    for chunk in &cluster.chunks {
        for sentence in split_sentences(&chunk.content) {
            if sentence.len() < config.min_sentence_chars {
                continue;
            }
            let lower = sentence.to_lowercase();
            if query_terms.iter().any(|t| lower.contains(t.as_str())) {
                candidates.push(sentence);
            }
        }
    }

    let mut kept: Vec<String> = Vec::new();
    let mut kept_tokens: Vec<HashSet<String>> = Vec::new();
    for candidate in candidates {
        let tokens = token_set(&candidate);
        let is_dup = kept_tokens.iter().any(|k| jaccard(k, &tokens) >= config.deduplication_threshold);
        if !is_dup {
            kept_tokens.push(tokens);
            kept.push(candidate);
            if kept.len() >= config.max_key_points {
                break;
            }
        }
    }
    kept
}

/// Pairwise heuristic contradiction detection: ≥3 overlapping tokens but
/// differing on the presence of a negation marker.
fn contradictions(cluster: &ChunkCluster, config: &FusionConfig) -> Vec<(String, String)> {
    let mut sentences: Vec<String> = Vec::new();
    for chunk in &cluster.chunks {
        sentences.extend(split_sentences(&chunk.content));
    }

    let mut found = Vec::new();
    for i in 0..sentences.len() {
        if found.len() >= config.max_contradictions {
            break;
        }
        for j in (i + 1)..sentences.len() {
            if found.len() >= config.max_contradictions {
                break;
            }
            if are_contradictory(&sentences[i], &sentences[j]) {
                found.push((sentences[i].clone(), sentences[j].clone()));
            }
        }
    }
    found
}

fn are_contradictory(a: &str, b: &str) -> bool {
    let a_tokens = token_set(a);
    let b_tokens = token_set(b);
    let overlap = a_tokens.intersection(&b_tokens).count();
    if overlap < 3 {
        return false;
    }
    let a_neg = NEGATION_MARKERS.iter().any(|m| a.to_lowercase().contains(m));
    let b_neg = NEGATION_MARKERS.iter().any(|m| b.to_lowercase().contains(m));
    a_neg != b_neg
}

/// Build the fused content block: an introduction (multi-document
/// clusters only), numbered key points, then per-document detailed
/// sections sorted by `(document_id, position)`.
fn build_content(cluster: &ChunkCluster, key_points: &[String]) -> String {
    let mut sorted_chunks = cluster.chunks.clone();
    sorted_chunks.sort_by(|a, b| a.document_id.cmp(&b.document_id).then(a.position.cmp(&b.position)));

    let documents: HashSet<&str> = sorted_chunks.iter().map(|c| c.document_id.as_str()).collect();

    let mut content = String::new();
    if documents.len() > 1 {
        content.push_str(&format!(
            "This answer draws on {} related sources.\n\n",
            documents.len()
        ));
    }

    if !key_points.is_empty() {
        content.push_str("Key points:\n");
        for (i, point) in key_points.iter().enumerate() {
            content.push_str(&format!("{}. {}\n", i + 1, point));
        }
        content.push('\n');
    }

    let mut by_doc: BTreeMap<String, Vec<&ChunkForFusion>> = BTreeMap::new();
    for chunk in &sorted_chunks {
        by_doc.entry(chunk.document_id.clone()).or_default().push(chunk);
    }
    for (doc_id, chunks) in &by_doc {
        content.push_str(&format!("From {doc_id}:\n"));
        for chunk in chunks {
            if let Some(title) = &chunk.title {
                content.push_str(&format!("{title}\n"));
            }
            content.push_str(&chunk.content);
            content.push('\n');
        }
        content.push('\n');
    }

    content.trim_end().to_string()
}

fn completeness(key_points: &[String], query_terms: &[String]) -> f64 {
    if query_terms.is_empty() {
        return 1.0;
    }
    let covered: HashSet<String> = key_points
        .iter()
        .flat_map(|p| token_set(p))
        .collect();
    let hit = query_terms.iter().filter(|t| covered.contains(t.as_str())).count();
    hit as f64 / query_terms.len() as f64
}

/// Synthesize one fused answer from a cluster.
pub fn synthesize(cluster: &ChunkCluster, query: &str, config: &FusionConfig) -> FusedAnswer {
    let query_terms = tokenize(query);
    let points = key_points(cluster, &query_terms, config);
    let contradicts = contradictions(cluster, config);
    let content = build_content(cluster, &points);

    let completeness_score = completeness(&points, &query_terms);
    let relevance = cluster.average_relevance().min(1.0);
    let coherence_score = cluster.topic_coherence;

    let confidence = config.w_completeness * completeness_score
        + config.w_coherence * coherence_score
        + config.w_relevance * relevance;

    FusedAnswer {
        content,
        source_chunks: cluster.chunk_ids(),
        coherence_score,
        confidence,
        key_points: points,
        contradictions: contradicts,
    }
}

/// Fuse a ranked result list into zero or more fused answers.
pub fn fuse_chunks(results: &[ChunkForFusion], query: &str, config: &FusionConfig) -> Vec<FusedAnswer> {
    let query_terms = tokenize(query);
    let clusters = cluster_chunks(results, &query_terms, config);
    clusters.iter().map(|c| synthesize(c, query, config)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, doc: &str, position: i64, content: &str, relevance: f64) -> ChunkForFusion {
        ChunkForFusion {
            chunk_id: id.to_string(),
            document_id: doc.to_string(),
            content: content.to_string(),
            title: None,
            position,
            relevance,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn adjacent_same_document_chunks_are_highly_coherent() {
        let a = chunk("a", "deploy", 1, "Overview of the deploy process and steps", 0.9);
        let b = chunk("b", "deploy", 2, "Details of the deploy process and steps", 0.8);
        let terms = vec!["deploy".to_string(), "process".to_string(), "steps".to_string()];
        assert!(coherence(&a, &b, &terms) >= 0.6);
    }

    #[test]
    fn unrelated_chunks_have_low_coherence() {
        let a = chunk("a", "deploy", 1, "Overview of the deploy process", 0.9);
        let b = chunk("b", "gardening", 99, "How to plant tomatoes in spring", 0.1);
        let terms = vec!["deploy".to_string()];
        assert!(coherence(&a, &b, &terms) < 0.5);
    }

    #[test]
    fn cluster_requires_minimum_chunk_count() {
        let a = chunk("a", "deploy", 1, "Overview of the deploy process", 0.9);
        let b = chunk("b", "gardening", 99, "How to plant tomatoes", 0.1);
        let config = FusionConfig::default();
        let clusters = cluster_chunks(&[a, b], &["deploy".to_string()], &config);
        assert!(clusters.iter().all(|c| c.chunks.len() >= config.min_chunks_for_fusion));
    }

    #[test]
    fn fusion_of_two_adjacent_sections_orders_overview_before_details() {
        let overview = chunk("deploy.overview", "deploy", 1, "Overview of the deploy process and steps", 0.9);
        let details = chunk("deploy.details", "deploy", 2, "Details of the deploy process and steps", 0.85);
        let config = FusionConfig::default();
        let answers = fuse_chunks(&[overview, details], "deploy process steps", &config);
        assert_eq!(answers.len(), 1);
        let answer = &answers[0];
        assert_eq!(answer.source_chunks.len(), 2);
        assert!(answer.coherence_score >= 0.0);
        let overview_pos = answer.content.find("Overview of the deploy process").unwrap();
        let details_pos = answer.content.find("Details of the deploy process").unwrap();
        assert!(overview_pos < details_pos);
    }

    #[test]
    fn contradiction_detection_flags_negated_overlap() {
        assert!(are_contradictory(
            "The service supports automatic retries",
            "The service does not support automatic retries"
        ));
        assert!(!are_contradictory("The sky is blue", "Paint is wet"));
    }

    #[test]
    fn confidence_blends_completeness_coherence_relevance() {
        let cluster = ChunkCluster {
            chunks: vec![chunk("a", "d", 1, "deploy process steps guide", 1.0)],
            topic_coherence: 1.0,
            temporal_coherence: 1.0,
            semantic_density: 1.0,
        };
        let config = FusionConfig::default();
        let answer = synthesize(&cluster, "deploy process steps", &config);
        assert!(answer.confidence > 0.0 && answer.confidence <= 1.0);
    }
}
