//! Lemmatization of page and query text
//!
//! Text is lowercased, split on anything outside the configured alphabet,
//! stripped of function words, and reduced to base forms. The result maps
//! each lemma to its number of occurrences.

mod morphology;

pub use morphology::*;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

/// Text to lemma-frequency transform
///
/// Holds no mutable state, so one instance is shared by every crawl task.
#[derive(Clone)]
pub struct Lemmatizer {
    language: Language,
    morphology: Arc<dyn Morphology>,
    stopwords: Arc<HashSet<&'static str>>,
}

impl Lemmatizer {
    /// Lemmatizer backed by the built-in Snowball morphology
    pub fn new(language: Language) -> Self {
        Self::with_morphology(language, Arc::new(SnowballMorphology::new(language)))
    }

    /// Lemmatizer backed by an external morphology implementation
    pub fn with_morphology(language: Language, morphology: Arc<dyn Morphology>) -> Self {
        Self {
            language,
            morphology,
            stopwords: Arc::new(stopwords(language).iter().copied().collect()),
        }
    }

    /// Map every content lemma in `text` to its occurrence count
    pub fn extract_lemmas(&self, text: &str) -> BTreeMap<String, u32> {
        let mut lemmas = BTreeMap::new();
        let lowered = text.to_lowercase();

        for token in lowered
            .split(|c: char| !self.language.is_letter(c))
            .filter(|t| !t.is_empty())
        {
            if self
                .morphology
                .parts_of_speech(token)
                .iter()
                .any(|pos| pos.is_function_word())
            {
                continue;
            }

            let Some(lemma) = self.morphology.normal_forms(token).into_iter().next() else {
                continue;
            };

            if lemma.is_empty() || self.stopwords.contains(lemma.as_str()) {
                continue;
            }

            *lemmas.entry(lemma).or_insert(0) += 1;
        }

        lemmas
    }

    /// Deduplicated lemma set of a search query
    pub fn query_lemmas(&self, query: &str) -> BTreeSet<String> {
        self.extract_lemmas(query).into_keys().collect()
    }

    /// All base forms of a single word, for highlighting any surface form
    pub fn word_lemmas(&self, word: &str) -> Vec<String> {
        let cleaned: String = word
            .to_lowercase()
            .chars()
            .filter(|c| self.language.is_letter(*c))
            .collect();

        if cleaned.is_empty() {
            return Vec::new();
        }

        self.morphology.normal_forms(&cleaned)
    }
}

/// Short high-frequency words the tagger does not reliably flag
fn stopwords(language: Language) -> &'static [&'static str] {
    match language {
        Language::English => &[
            "the", "a", "an", "be", "is", "are", "was", "were", "it", "this", "that",
        ],
        Language::Russian => &["и", "в", "на", "с", "по", "за", "из", "у", "для"],
    }
}
