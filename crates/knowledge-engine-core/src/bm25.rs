//! BM25 lexical scorer (C5): corpus statistics, tokenization, and
//! ranking over the same chunk set as the vector index.
//!
//! The corpus is the one cache the core keeps (§9) — it is rebuilt
//! wholesale from whatever [`crate::store::Store`] currently holds
//! whenever C3 signals a structural change, or lazily on first use.

use std::collections::HashMap;

use crate::models::IndexedChunk;

/// Fixed stop-word set, checked after lowercasing and tokenizing.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "can", "had", "her", "was",
    "one", "our", "out", "day", "get", "has", "him", "his", "how", "man", "new", "now",
    "old", "see", "two", "way", "who", "boy", "did", "its", "let", "put", "say", "she",
    "too", "use", "this", "that", "with", "from", "have", "will", "your", "what", "when",
    "where", "which", "there", "their", "about", "into", "than", "then", "them", "these",
    "those", "some", "such", "only", "over", "also", "more", "most", "other", "been",
    "being", "does", "doing", "both", "each", "few", "further", "just", "itself",
];

fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

/// Lowercase, replace non-alphanumeric runs with a single space, split on
/// whitespace, drop tokens of length ≤ 2, drop stop words.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut normalized = String::with_capacity(lowered.len());
    let mut last_was_space = false;
    for c in lowered.chars() {
        if c.is_alphanumeric() {
            normalized.push(c);
            last_was_space = false;
        } else if !last_was_space {
            normalized.push(' ');
            last_was_space = true;
        }
    }
    normalized
        .split_whitespace()
        .filter(|t| t.chars().count() > 2 && !is_stop_word(t))
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

impl Bm25Params {
    pub fn new(k1: f64, b: f64) -> Self {
        Self { k1, b: b.clamp(0.0, 1.0) }
    }
}

const IDF_FLOOR: f64 = 0.01;

struct DocEntry {
    chunk_id: String,
    store_type: String,
    is_chunk: bool,
    term_freqs: HashMap<String, u32>,
    length: usize,
}

/// Rebuildable BM25 corpus statistics.
pub struct Bm25Corpus {
    params: Bm25Params,
    docs: Vec<DocEntry>,
    doc_freq: HashMap<String, u32>,
    avg_doc_len: f64,
}

impl Bm25Corpus {
    pub fn empty(params: Bm25Params) -> Self {
        Self {
            params,
            docs: Vec::new(),
            doc_freq: HashMap::new(),
            avg_doc_len: 0.0,
        }
    }

    /// Rebuild corpus statistics from scratch over the given chunk set.
    pub fn build(chunks: &[IndexedChunk], params: Bm25Params) -> Self {
        let mut docs = Vec::with_capacity(chunks.len());
        let mut doc_freq: HashMap<String, u32> = HashMap::new();
        let mut total_len = 0usize;

        for chunk in chunks {
            let tokens = tokenize(&chunk.content);
            let mut term_freqs: HashMap<String, u32> = HashMap::new();
            for t in &tokens {
                *term_freqs.entry(t.clone()).or_insert(0) += 1;
            }
            for term in term_freqs.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            total_len += tokens.len();
            docs.push(DocEntry {
                chunk_id: chunk.chunk_id.clone(),
                store_type: chunk.store_type.clone(),
                is_chunk: chunk.is_chunk,
                term_freqs,
                length: tokens.len(),
            });
        }

        let avg_doc_len = if docs.is_empty() {
            0.0
        } else {
            total_len as f64 / docs.len() as f64
        };

        Self {
            params,
            docs,
            doc_freq,
            avg_doc_len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    fn idf(&self, term: &str) -> f64 {
        let n = self.docs.len() as f64;
        let df = *self.doc_freq.get(term).unwrap_or(&0) as f64;
        let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
        idf.max(IDF_FLOOR)
    }

    /// Score every indexed document against `query`, applying the
    /// `store_filter`/`include_chunks` rules C3 also applies, and
    /// normalizing each score by the query term count.
    pub fn score(
        &self,
        query: &str,
        store_filter: Option<&str>,
        include_chunks: bool,
    ) -> Vec<(String, f64)> {
        let query_terms = tokenize(query);
        if query_terms.is_empty() || self.docs.is_empty() {
            return Vec::new();
        }

        let k1 = self.params.k1;
        let b = self.params.b;
        let mut scores: Vec<(String, f64)> = Vec::new();

        for doc in &self.docs {
            if let Some(filter) = store_filter {
                if doc.store_type != filter {
                    continue;
                }
            }
            if !include_chunks && doc.is_chunk {
                continue;
            }

            let mut score = 0.0;
            for term in &query_terms {
                let tf = *doc.term_freqs.get(term).unwrap_or(&0) as f64;
                if tf == 0.0 {
                    continue;
                }
                let idf = self.idf(term);
                let denom = tf + k1 * (1.0 - b + b * (doc.length as f64 / self.avg_doc_len.max(1.0)));
                score += idf * (tf * (k1 + 1.0)) / denom;
            }
            if score > 0.0 {
                scores.push((doc.chunk_id.clone(), score / query_terms.len() as f64));
            }
        }

        scores.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scores
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, store_type: &str, content: &str) -> IndexedChunk {
        IndexedChunk {
            chunk_id: id.to_string(),
            store_type: store_type.to_string(),
            document_id: "doc".to_string(),
            is_chunk: true,
            content: content.to_string(),
        }
    }

    #[test]
    fn tokenize_drops_short_tokens_and_stop_words() {
        let tokens = tokenize("The Rust Programming Language is fun, a-ok!");
        assert!(!tokens.contains(&"is".to_string()));
        assert!(!tokens.contains(&"the".to_string()));
        assert!(tokens.contains(&"rust".to_string()));
        assert!(tokens.contains(&"programming".to_string()));
    }

    #[test]
    fn scores_rank_documents_with_more_term_overlap_higher() {
        let chunks = vec![
            chunk("a", "notes", "rust programming language tutorial for beginners"),
            chunk("b", "notes", "a completely unrelated document about gardening"),
        ];
        let corpus = Bm25Corpus::build(&chunks, Bm25Params::default());
        let scores = corpus.score("rust programming tutorial", None, true);
        assert_eq!(scores[0].0, "a");
    }

    #[test]
    fn store_filter_excludes_other_store_types() {
        let chunks = vec![
            chunk("a", "notes", "rust programming"),
            chunk("b", "github.repos", "rust programming"),
        ];
        let corpus = Bm25Corpus::build(&chunks, Bm25Params::default());
        let scores = corpus.score("rust programming", Some("notes"), true);
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].0, "a");
    }

    #[test]
    fn ties_break_by_ascending_chunk_id() {
        let chunks = vec![
            chunk("zeta", "notes", "rust programming language"),
            chunk("alpha", "notes", "rust programming language"),
        ];
        let corpus = Bm25Corpus::build(&chunks, Bm25Params::default());
        let scores = corpus.score("rust programming", None, true);
        assert_eq!(scores[0].0, "alpha");
        assert_eq!(scores[1].0, "zeta");
    }

    #[test]
    fn b_param_is_clamped_to_unit_range() {
        let p = Bm25Params::new(1.5, 4.0);
        assert_eq!(p.b, 1.0);
        let p2 = Bm25Params::new(1.5, -1.0);
        assert_eq!(p2.b, 0.0);
    }

    #[test]
    fn empty_query_yields_no_scores() {
        let chunks = vec![chunk("a", "notes", "rust programming")];
        let corpus = Bm25Corpus::build(&chunks, Bm25Params::default());
        assert!(corpus.score("   ", None, true).is_empty());
    }
}
