//! Hybrid ranker (C6): weighted fusion of dense and lexical rankings
//! with exact-match and field-match boosts.

use std::collections::HashMap;

use crate::bm25::tokenize;
use crate::store::SimilarityHit;

#[derive(Debug, Clone, Copy)]
pub struct HybridWeights {
    pub w_sem: f64,
    pub w_lex: f64,
}

impl HybridWeights {
    /// Normalize so the two weights sum to 1. Panics-free: if both are
    /// zero, falls back to an even split.
    pub fn normalized(self) -> Self {
        let total = self.w_sem + self.w_lex;
        if total <= 0.0 {
            Self { w_sem: 0.5, w_lex: 0.5 }
        } else {
            Self {
                w_sem: self.w_sem / total,
                w_lex: self.w_lex / total,
            }
        }
    }
}

/// Metadata needed to compute field-match boosts and render a result,
/// keyed by the same stable id used by both rankings (`chunk_id` for
/// chunk hits, `"{store_type}.{document_id}"` otherwise).
#[derive(Debug, Clone)]
pub struct ItemMeta {
    pub store_type: String,
    pub document_id: String,
    pub is_chunk: bool,
    pub title: Option<String>,
    pub chunk_title: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreExplanation {
    pub semantic_score: f64,
    pub lexical_score: f64,
    pub w_sem: f64,
    pub w_lex: f64,
    pub base: f64,
    pub exact_phrase_boost: f64,
    pub consecutive_token_boost: f64,
    pub title_boost: f64,
    pub chunk_title_boost: f64,
    pub document_id_boost: f64,
}

impl ScoreExplanation {
    pub fn total_boost(&self) -> f64 {
        self.exact_phrase_boost
            + self.consecutive_token_boost
            + self.title_boost
            + self.chunk_title_boost
            + self.document_id_boost
    }
}

#[derive(Debug, Clone)]
pub struct HybridResultItem {
    pub id: String,
    pub score: f64,
    pub store_type: String,
    pub document_id: String,
    pub is_chunk: bool,
    pub title: Option<String>,
    pub chunk_title: Option<String>,
    pub content_preview: String,
    pub explain: Option<ScoreExplanation>,
}

const EXACT_PHRASE_BOOST: f64 = 0.20;
const CONSECUTIVE_TOKEN_BOOST: f64 = 0.15;
const TITLE_BOOST: f64 = 0.15;
const CHUNK_TITLE_BOOST: f64 = 0.10;
const DOCUMENT_ID_BOOST: f64 = 0.05;

fn consecutive_match(content_lower: &str, query_terms: &[String]) -> bool {
    if query_terms.len() < 2 {
        return false;
    }
    query_terms.windows(2).any(|pair| {
        let phrase = format!("{} {}", pair[0], pair[1]);
        content_lower.contains(&phrase)
    })
}

/// Merge a dense ranking and a lexical ranking into one hybrid-scored
/// list (§4.6).
///
/// `meta` supplies metadata (for boost computation) for any id that
/// appears only in the lexical ranking; dense hits already carry their
/// own metadata from [`SimilarityHit`].
pub fn merge(
    query: &str,
    dense: &[SimilarityHit],
    lexical: &[(String, f64)],
    meta: &HashMap<String, ItemMeta>,
    weights: HybridWeights,
    k: usize,
    explain: bool,
) -> Vec<HybridResultItem> {
    let weights = weights.normalized();
    let query_lower = query.to_lowercase();
    let query_terms = tokenize(query);

    struct Entry {
        semantic: f64,
        lexical: f64,
        store_type: String,
        document_id: String,
        is_chunk: bool,
        title: Option<String>,
        chunk_title: Option<String>,
        content: String,
    }

    let mut table: HashMap<String, Entry> = HashMap::new();

    for hit in dense {
        table.insert(
            hit.id.clone(),
            Entry {
                semantic: hit.similarity_score as f64,
                lexical: 0.0,
                store_type: hit.store_type.clone(),
                document_id: hit.document_id.clone(),
                is_chunk: hit.is_chunk,
                title: hit.title.clone(),
                chunk_title: if hit.is_chunk { hit.title.clone() } else { None },
                content: hit.content_preview.clone(),
            },
        );
    }

    for (id, score) in lexical {
        if let Some(entry) = table.get_mut(id) {
            entry.lexical = *score;
        } else if let Some(m) = meta.get(id) {
            table.insert(
                id.clone(),
                Entry {
                    semantic: 0.0,
                    lexical: *score,
                    store_type: m.store_type.clone(),
                    document_id: m.document_id.clone(),
                    is_chunk: m.is_chunk,
                    title: m.title.clone(),
                    chunk_title: m.chunk_title.clone(),
                    content: m.content.clone(),
                },
            );
        }
    }

    let mut items: Vec<HybridResultItem> = table
        .into_iter()
        .map(|(id, entry)| {
            let base = weights.w_sem * entry.semantic + weights.w_lex * entry.lexical;
            let content_lower = entry.content.to_lowercase();
            let title_lower = entry.title.as_deref().unwrap_or_default().to_lowercase();
            let chunk_title_lower = entry.chunk_title.as_deref().unwrap_or_default().to_lowercase();
            let id_lower = id.to_lowercase();

            let exact_phrase_boost = if !query_lower.trim().is_empty() && content_lower.contains(&query_lower) {
                EXACT_PHRASE_BOOST
            } else {
                0.0
            };
            let consecutive_token_boost = if consecutive_match(&content_lower, &query_terms) {
                CONSECUTIVE_TOKEN_BOOST
            } else {
                0.0
            };
            let title_boost = if !query_lower.trim().is_empty() && title_lower.contains(&query_lower) {
                TITLE_BOOST
            } else {
                0.0
            };
            let chunk_title_boost = if !query_lower.trim().is_empty() && chunk_title_lower.contains(&query_lower) {
                CHUNK_TITLE_BOOST
            } else {
                0.0
            };
            let document_id_boost = if !query_lower.trim().is_empty() && id_lower.contains(&query_lower) {
                DOCUMENT_ID_BOOST
            } else {
                0.0
            };

            let total = base
                + exact_phrase_boost
                + consecutive_token_boost
                + title_boost
                + chunk_title_boost
                + document_id_boost;

            let explanation = explain.then(|| ScoreExplanation {
                semantic_score: entry.semantic,
                lexical_score: entry.lexical,
                w_sem: weights.w_sem,
                w_lex: weights.w_lex,
                base,
                exact_phrase_boost,
                consecutive_token_boost,
                title_boost,
                chunk_title_boost,
                document_id_boost,
            });

            HybridResultItem {
                id,
                score: total,
                store_type: entry.store_type,
                document_id: entry.document_id,
                is_chunk: entry.is_chunk,
                title: entry.title,
                chunk_title: entry.chunk_title,
                content_preview: entry.content,
                explain: explanation,
            }
        })
        .collect();

    items.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    items.truncate(k);
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense_hit(id: &str, score: f32) -> SimilarityHit {
        SimilarityHit {
            id: id.to_string(),
            store_type: "notes".to_string(),
            document_id: "doc".to_string(),
            is_chunk: true,
            similarity_score: score,
            content_preview: "run make deploy across the fleet".to_string(),
            title: Some("Setup".to_string()),
        }
    }

    #[test]
    fn hybrid_alpha_zero_equals_lexical_plus_boosts() {
        let dense = vec![dense_hit("a", 0.9)];
        let lexical = vec![("a".to_string(), 0.4)];
        let meta = HashMap::new();
        let items = merge(
            "deploy",
            &dense,
            &lexical,
            &meta,
            HybridWeights { w_sem: 0.0, w_lex: 1.0 },
            10,
            false,
        );
        assert_eq!(items.len(), 1);
        assert!((items[0].score - (0.4 + EXACT_PHRASE_BOOST)).abs() < 1e-9);
    }

    #[test]
    fn hybrid_alpha_one_equals_semantic_plus_boosts() {
        let dense = vec![dense_hit("a", 0.9)];
        let lexical = vec![("a".to_string(), 0.4)];
        let meta = HashMap::new();
        let items = merge(
            "deploy",
            &dense,
            &lexical,
            &meta,
            HybridWeights { w_sem: 1.0, w_lex: 0.0 },
            10,
            false,
        );
        assert!((items[0].score - (0.9 + EXACT_PHRASE_BOOST)).abs() < 1e-6);
    }

    #[test]
    fn exact_phrase_in_content_adds_fixed_boost() {
        let dense = vec![dense_hit("a", 0.5)];
        let meta = HashMap::new();
        let items = merge(
            "make deploy",
            &dense,
            &[],
            &meta,
            HybridWeights { w_sem: 1.0, w_lex: 0.0 },
            10,
            true,
        );
        let explain = items[0].explain.unwrap();
        assert_eq!(explain.exact_phrase_boost, EXACT_PHRASE_BOOST);
    }

    #[test]
    fn title_substring_adds_title_boost() {
        let dense = vec![dense_hit("a", 0.1)];
        let meta = HashMap::new();
        let items = merge("setup", &dense, &[], &meta, HybridWeights { w_sem: 1.0, w_lex: 0.0 }, 10, true);
        let explain = items[0].explain.unwrap();
        assert_eq!(explain.title_boost, TITLE_BOOST);
    }

    #[test]
    fn ties_break_by_ascending_id() {
        let dense = vec![dense_hit("zeta", 0.5), dense_hit("alpha", 0.5)];
        let meta = HashMap::new();
        let items = merge("", &dense, &[], &meta, HybridWeights { w_sem: 1.0, w_lex: 0.0 }, 10, false);
        assert_eq!(items[0].id, "alpha");
        assert_eq!(items[1].id, "zeta");
    }

    #[test]
    fn weights_are_normalized_to_sum_one() {
        let w = HybridWeights { w_sem: 2.0, w_lex: 2.0 }.normalized();
        assert!((w.w_sem - 0.5).abs() < 1e-9);
        assert!((w.w_lex - 0.5).abs() < 1e-9);
    }
}
