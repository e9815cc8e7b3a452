//! Query expander (C7): a stateless language processor that turns one
//! question into several search strategies.
//!
//! Intent detection, synonym expansion, and related-term lookup are all
//! driven by fixed, in-memory tables — no network calls, no persisted
//! state, safe to call from anywhere in the pure core.

use regex::Regex;

use crate::bm25::tokenize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Factual,
    Procedural,
    Comparative,
    Troubleshooting,
    Conceptual,
    Definitional,
    Listing,
    Configuration,
    Example,
    General,
}

/// First-match-wins regex table; falls back to [`Intent::General`].
fn intent_patterns() -> Vec<(Intent, Regex)> {
    let table: &[(Intent, &str)] = &[
        (Intent::Troubleshooting, r"(?i)\b(error|fail(ed|ing|ure)?|broken|bug|crash|not working|issue)\b"),
        (Intent::Procedural, r"(?i)\b(how (do|to|can)|steps? to|guide|tutorial|set ?up|configure|install)\b"),
        (Intent::Comparative, r"(?i)\b(vs\.?|versus|compare|difference between|better than)\b"),
        (Intent::Definitional, r"(?i)\b(what is|what are|define|definition of|meaning of)\b"),
        (Intent::Configuration, r"(?i)\b(config(uration)?|settings?|options?|parameters?)\b"),
        (Intent::Listing, r"(?i)\b(list|enumerate|all (of )?the|which ones?)\b"),
        (Intent::Example, r"(?i)\b(example|sample|demo|show me)\b"),
        (Intent::Factual, r"(?i)\b(who|when|where|how many|how much)\b"),
        (Intent::Conceptual, r"(?i)\b(why|explain|concept|overview|understand)\b"),
    ];
    table
        .iter()
        .map(|(intent, pattern)| (*intent, Regex::new(pattern).expect("static pattern")))
        .collect()
}

pub fn detect_intent(query: &str) -> Intent {
    for (intent, re) in intent_patterns() {
        if re.is_match(query) {
            return intent;
        }
    }
    Intent::General
}

/// Tokenize, drop stop words and short tokens, sort by descending length
/// then lexicographically.
pub fn key_terms(query: &str) -> Vec<String> {
    let mut terms = tokenize(query);
    terms.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    terms.dedup();
    terms
}

const THESAURUS: &[(&str, &[&str])] = &[
    ("kubernetes", &["k8s"]),
    ("container", &["docker"]),
    ("configuration", &["config", "settings"]),
    ("documentation", &["docs"]),
    ("repository", &["repo"]),
    ("application", &["app"]),
    ("database", &["db"]),
    ("authentication", &["auth"]),
    ("authorization", &["authz"]),
    ("deployment", &["deploy"]),
    ("environment", &["env"]),
    ("dependency", &["dependencies", "deps"]),
];

const DOMAIN_SYNONYMS: &[(&str, &[(&str, &[&str])])] = &[
    (
        "python",
        &[
            ("package", &["module", "library"]),
            ("virtualenv", &["venv"]),
        ],
    ),
    (
        "kubernetes",
        &[
            ("pod", &["container group"]),
            ("ingress", &["route", "gateway"]),
        ],
    ),
];

const RELATED_TERMS: &[(&str, &[&str])] = &[
    ("kubernetes", &["cluster", "helm", "pod", "ingress", "deployment"]),
    ("docker", &["container", "image", "dockerfile"]),
    ("python", &["pip", "virtualenv", "package"]),
    ("database", &["schema", "migration", "query"]),
    ("api", &["endpoint", "request", "response"]),
];

const GENERIC_RELATED_TERMS: &[&str] = &["configuration", "documentation", "setup"];

fn is_technical_term(term: &str) -> bool {
    THESAURUS.iter().any(|(k, _)| *k == term) || RELATED_TERMS.iter().any(|(k, _)| *k == term)
}

/// Simple morphological variants: plural/singular, `-ing`/`-ed` stems,
/// and dotted-version splits (e.g. `"v1.28"` → `["v1", "28"]`).
fn morphological_variants(term: &str) -> Vec<String> {
    let mut variants = Vec::new();
    if let Some(stem) = term.strip_suffix('s') {
        if stem.len() > 2 {
            variants.push(stem.to_string());
        }
    } else {
        variants.push(format!("{term}s"));
    }
    if let Some(stem) = term.strip_suffix("ing") {
        variants.push(stem.to_string());
    }
    if let Some(stem) = term.strip_suffix("ed") {
        variants.push(stem.to_string());
    }
    if term.contains('.') {
        variants.extend(term.split('.').map(str::to_string));
    }
    variants.retain(|v| !v.is_empty() && v != term);
    variants
}

/// Synonyms for one key term: static thesaurus entries, plus
/// `domain_context`-specific entries, plus morphological variants.
pub fn synonyms_for(term: &str, domain_context: Option<&str>) -> Vec<String> {
    let mut out = Vec::new();
    if let Some((_, syns)) = THESAURUS.iter().find(|(k, _)| *k == term) {
        out.extend(syns.iter().map(|s| s.to_string()));
    }
    if let Some(domain) = domain_context {
        if let Some((_, entries)) = DOMAIN_SYNONYMS.iter().find(|(d, _)| *d == domain) {
            if let Some((_, syns)) = entries.iter().find(|(k, _)| *k == term) {
                out.extend(syns.iter().map(|s| s.to_string()));
            }
        }
    }
    out.extend(morphological_variants(term));
    out.dedup();
    out
}

/// Related terms for the whole query's key terms: domain adjacency plus
/// generic terms when any technical term is present. Deduplicated, with
/// the original key terms removed.
pub fn related_terms(terms: &[String]) -> Vec<String> {
    let mut related: Vec<String> = Vec::new();
    let mut any_technical = false;
    for term in terms {
        if let Some((_, rel)) = RELATED_TERMS.iter().find(|(k, _)| *k == term.as_str()) {
            related.extend(rel.iter().map(|s| s.to_string()));
        }
        if is_technical_term(term) {
            any_technical = true;
        }
    }
    if any_technical {
        related.extend(GENERIC_RELATED_TERMS.iter().map(|s| s.to_string()));
    }
    related.retain(|r| !terms.contains(r));
    related.sort();
    related.dedup();
    related
}

/// Search parameters attached to one strategy.
#[derive(Debug, Clone, Copy)]
pub struct StrategyParams {
    pub similarity_threshold: f32,
    pub k: usize,
}

#[derive(Debug, Clone)]
pub struct Strategy {
    pub label: &'static str,
    pub query: String,
    pub intent: Intent,
    pub params: StrategyParams,
}

/// Everything the orchestrator needs to run an expanded query (§4.7).
#[derive(Debug, Clone)]
pub struct ExpandedQuery {
    pub intent: Intent,
    pub key_terms: Vec<String>,
    pub synonyms: Vec<String>,
    pub related_terms: Vec<String>,
    pub expanded_queries: Vec<String>,
    pub strategies: Vec<Strategy>,
}

fn intent_template_prefix(intent: Intent) -> Option<&'static str> {
    match intent {
        Intent::Factual => Some("what is"),
        Intent::Definitional => Some("define"),
        Intent::Procedural => Some("how to"),
        _ => None,
    }
}

/// Intent-specific terms appended as one more expanded query, distinct
/// from the prefix template above (which only fires when the query
/// doesn't already read that way). Covers cases like a procedural
/// question that already starts with "how to": it still gains a
/// "... steps tutorial guide" variant for recall.
fn intent_augmentation_terms(intent: Intent) -> &'static [&'static str] {
    match intent {
        Intent::Procedural => &["steps", "tutorial", "guide"],
        Intent::Troubleshooting => &["fix", "solution", "workaround"],
        Intent::Comparative => &["differences", "comparison"],
        _ => &[],
    }
}

pub fn expand(query: &str, domain_context: Option<&str>) -> ExpandedQuery {
    let intent = detect_intent(query);
    let terms = key_terms(query);

    let mut synonyms: Vec<String> = Vec::new();
    for term in &terms {
        synonyms.extend(synonyms_for(term, domain_context));
    }
    synonyms.sort();
    synonyms.dedup();

    let related = related_terms(&terms);

    let mut expanded_queries = vec![query.to_string()];
    for term in &terms {
        for syn in synonyms_for(term, domain_context) {
            expanded_queries.push(query.replacen(term.as_str(), &syn, 1));
        }
    }
    if !related.is_empty() {
        expanded_queries.push(format!("{query} {}", related.join(" ")));
    }
    if let Some(prefix) = intent_template_prefix(intent) {
        if !query.to_lowercase().starts_with(prefix) {
            expanded_queries.push(format!("{prefix} {query}"));
        }
    }
    let augmentation_terms = intent_augmentation_terms(intent);
    if !augmentation_terms.is_empty() {
        expanded_queries.push(format!("{query} {}", augmentation_terms.join(" ")));
    }
    expanded_queries.dedup();

    let mut strategies = vec![Strategy {
        label: "primary",
        query: query.to_string(),
        intent,
        params: StrategyParams { similarity_threshold: 0.5, k: 10 },
    }];
    if let Some(syn_query) = expanded_queries.get(1) {
        strategies.push(Strategy {
            label: "synonym-enhanced",
            query: syn_query.clone(),
            intent,
            params: StrategyParams { similarity_threshold: 0.45, k: 12 },
        });
    }
    if !related.is_empty() {
        strategies.push(Strategy {
            label: "related-terms",
            query: format!("{query} {}", related.join(" ")),
            intent,
            params: StrategyParams { similarity_threshold: 0.4, k: 15 },
        });
    }
    strategies.push(Strategy {
        label: "broad-recall",
        query: query.to_string(),
        intent,
        params: StrategyParams { similarity_threshold: 0.25, k: 30 },
    });

    ExpandedQuery {
        intent,
        key_terms: terms,
        synonyms,
        related_terms: related,
        expanded_queries,
        strategies,
    }
}

/// Reason a reformulation was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReformulationReason {
    PoorRecall,
    LowQuality,
}

/// Generate broader, more-specific, or more-focused variants of `query`
/// on poor recall or low result quality.
pub fn reformulate(query: &str, reason: ReformulationReason) -> Vec<String> {
    let terms = key_terms(query);
    match reason {
        ReformulationReason::PoorRecall => {
            // Broader: drop the least distinctive (shortest) key term.
            let mut broader = terms.clone();
            broader.pop();
            vec![broader.join(" ")].into_iter().filter(|q| !q.is_empty()).collect()
        }
        ReformulationReason::LowQuality => {
            // More specific: keep only the two longest (most distinctive) terms.
            let focused: Vec<String> = terms.into_iter().take(2).collect();
            vec![focused.join(" ")].into_iter().filter(|q| !q.is_empty()).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_procedural_intent() {
        assert_eq!(detect_intent("how to configure kubernetes ingress"), Intent::Procedural);
    }

    #[test]
    fn detects_troubleshooting_intent() {
        assert_eq!(detect_intent("deployment is failing with a crash loop"), Intent::Troubleshooting);
    }

    #[test]
    fn defaults_to_general_intent() {
        assert_eq!(detect_intent("banana smoothie recipe"), Intent::General);
    }

    #[test]
    fn key_terms_sort_by_length_then_lexicographic() {
        let terms = key_terms("kubernetes ingress setup tutorial");
        assert_eq!(terms[0], "kubernetes");
    }

    #[test]
    fn kubernetes_expands_to_k8s() {
        let syns = synonyms_for("kubernetes", None);
        assert!(syns.contains(&"k8s".to_string()));
    }

    #[test]
    fn expand_produces_multiple_strategies() {
        let expanded = expand("how to configure kubernetes ingress", None);
        assert!(expanded.strategies.len() > 1);
        assert!(expanded.expanded_queries.len() > 1);
    }

    #[test]
    fn procedural_expansion_includes_tutorial_or_steps() {
        let expanded = expand("how to configure kubernetes ingress", None);
        assert_eq!(expanded.intent, Intent::Procedural);
        assert!(expanded
            .expanded_queries
            .iter()
            .any(|q| q.contains("tutorial") || q.contains("steps")));
        assert!(expanded.synonyms.contains(&"k8s".to_string()));
        assert!(expanded.strategies.iter().any(|s| s.label != "primary"));
    }

    #[test]
    fn related_terms_exclude_original_key_terms() {
        let terms = key_terms("kubernetes cluster");
        let related = related_terms(&terms);
        assert!(!related.contains(&"cluster".to_string()));
    }

    #[test]
    fn reformulate_poor_recall_drops_a_term() {
        let reformed = reformulate("kubernetes ingress setup", ReformulationReason::PoorRecall);
        assert!(!reformed.is_empty());
        assert!(reformed[0].split_whitespace().count() < 3);
    }
}
