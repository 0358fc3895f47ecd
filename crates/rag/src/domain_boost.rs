//! Keyword boosting for retrieval
//!
//! Pure semantic similarity under-ranks short factual documents whose
//! title holds the exact query term. Two additive terms correct for it:
//!
//! - **cluster boost**: the query and the document's title/keywords both
//!   mention a term from the same synonym cluster (first cluster wins)
//! - **literal boost**: per query token found in title, content or
//!   keywords, counted twice when it is in the title or keywords

use campus_assist_config::constants::rag::{
    CATEGORY_BOOST, MIN_TOKEN_CHARS, TOKEN_BOOST, TOKEN_BOOST_CAP, TOTAL_BOOST_CAP,
};
use campus_assist_core::Document;

/// A named group of synonyms
#[derive(Debug, Clone, PartialEq)]
pub struct BoostCluster {
    pub name: String,
    pub terms: Vec<String>,
}

impl BoostCluster {
    pub fn new(name: &str, terms: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            terms: terms.iter().map(|t| t.to_lowercase()).collect(),
        }
    }

    fn mentioned_in(&self, text: &str) -> bool {
        self.terms.iter().any(|t| text.contains(t.as_str()))
    }
}

/// The five built-in clusters
pub fn default_clusters() -> Vec<BoostCluster> {
    vec![
        BoostCluster::new(
            "fee",
            &["fee", "fees", "pay", "payment", "tuition", "finance", "money", "cost"],
        ),
        BoostCluster::new(
            "accommodation",
            &["accommodation", "housing", "halls", "room", "rent", "living"],
        ),
        BoostCluster::new("visa", &["visa", "immigration", "international", "tier 4", "cas"]),
        BoostCluster::new(
            "academic",
            &["exam", "assignment", "deadline", "extension", "grade", "marks"],
        ),
        BoostCluster::new(
            "wellbeing",
            &["mental", "health", "counselling", "stress", "anxiety", "support"],
        ),
    ]
}

/// Lowercased query with its countable tokens
#[derive(Debug, Clone)]
pub struct PreparedQuery {
    lower: String,
    tokens: Vec<String>,
}

impl PreparedQuery {
    pub fn new(query: &str) -> Self {
        let lower = query.to_lowercase();
        let tokens = lower
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|w| w.chars().count() > MIN_TOKEN_CHARS)
            .map(str::to_string)
            .collect();
        Self { lower, tokens }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }
}

/// Computes the keyword boost for a query against a document
#[derive(Debug, Clone)]
pub struct KeywordBooster {
    clusters: Vec<BoostCluster>,
}

impl Default for KeywordBooster {
    fn default() -> Self {
        Self::new(default_clusters())
    }
}

impl KeywordBooster {
    pub fn new(clusters: Vec<BoostCluster>) -> Self {
        Self { clusters }
    }

    pub fn clusters(&self) -> &[BoostCluster] {
        &self.clusters
    }

    /// First cluster mentioned by both the query and the document's title/keywords
    pub fn matched_cluster(&self, query: &PreparedQuery, doc: &Document) -> Option<&BoostCluster> {
        let fields = DocFields::new(doc);
        self.matched_cluster_in(query, &fields)
    }

    fn matched_cluster_in(&self, query: &PreparedQuery, fields: &DocFields) -> Option<&BoostCluster> {
        self.clusters.iter().find(|cluster| {
            cluster.mentioned_in(&query.lower)
                && (cluster.mentioned_in(&fields.keywords) || cluster.mentioned_in(&fields.title))
        })
    }

    /// Total boost in [0, TOTAL_BOOST_CAP]
    pub fn boost(&self, query: &PreparedQuery, doc: &Document) -> f32 {
        let fields = DocFields::new(doc);

        let mut boost = 0.0;
        if self.matched_cluster_in(query, &fields).is_some() {
            boost += CATEGORY_BOOST;
        }

        let mut matches = 0usize;
        for token in &query.tokens {
            if fields.all.contains(token.as_str()) {
                matches += 1;
                if fields.title.contains(token.as_str()) || fields.keywords.contains(token.as_str()) {
                    matches += 1;
                }
            }
        }
        boost += (matches as f32 * TOKEN_BOOST).min(TOKEN_BOOST_CAP);

        boost.min(TOTAL_BOOST_CAP)
    }
}

struct DocFields {
    title: String,
    keywords: String,
    all: String,
}

impl DocFields {
    fn new(doc: &Document) -> Self {
        let title = doc.title.to_lowercase();
        let keywords = doc.keywords.join(" ").to_lowercase();
        let all = format!("{} {} {}", title, doc.content.to_lowercase(), keywords);
        Self { title, keywords, all }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(title: &str, content: &str, keywords: &[&str]) -> Document {
        Document {
            id: title.to_lowercase().replace(' ', "-"),
            title: title.to_string(),
            content: content.to_string(),
            url: String::new(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            category: "General".to_string(),
        }
    }

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_tokens_skip_short_words() {
        let q = PreparedQuery::new("How do I get an ID card?");
        assert_eq!(q.tokens(), &["how", "get", "card"]);
    }

    #[test]
    fn test_cluster_boost_needs_both_sides() {
        let booster = KeywordBooster::default();
        let fees = doc("Paying Tuition Fees", "Instalment plans are available.", &["fees"]);
        let q = PreparedQuery::new("when is payment due");
        assert_eq!(booster.matched_cluster(&q, &fees).unwrap().name, "fee");

        let unrelated = doc("Library Opening Hours", "Open late in term.", &["library"]);
        assert!(booster.matched_cluster(&q, &unrelated).is_none());
    }

    #[test]
    fn test_literal_boost_counts_title_twice() {
        let booster = KeywordBooster::new(Vec::new());
        let d = doc("Student Card", "Replacement costs apply.", &[]);

        // "card" in title: 2 matches; "replacement" in content only: 1 match
        let q = PreparedQuery::new("card replacement");
        assert!(approx(booster.boost(&q, &d), 0.15));
    }

    #[test]
    fn test_literal_boost_capped() {
        let booster = KeywordBooster::new(Vec::new());
        let d = doc("alpha beta gamma delta", "", &[]);
        let q = PreparedQuery::new("alpha beta gamma delta");
        assert!(approx(booster.boost(&q, &d), TOKEN_BOOST_CAP));
    }

    #[test]
    fn test_total_boost_capped() {
        let booster = KeywordBooster::default();
        let d = doc(
            "Accommodation rent halls room",
            "Accommodation rent halls room housing",
            &["accommodation", "housing"],
        );
        let q = PreparedQuery::new("accommodation rent halls room housing");
        assert!(approx(booster.boost(&q, &d), TOTAL_BOOST_CAP));
    }

    #[test]
    fn test_no_overlap_no_boost() {
        let booster = KeywordBooster::default();
        let d = doc("Graduation Ceremonies", "Tickets are allocated in May.", &["graduation"]);
        let q = PreparedQuery::new("wifi password");
        assert_eq!(booster.boost(&q, &d), 0.0);
    }
}
