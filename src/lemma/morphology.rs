//! Morphology capability: base forms and coarse part-of-speech tags

use crate::error::{Error, Result};
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Languages the lemmatizer can index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    English,
    Russian,
}

impl Language {
    /// Whether `c` (already lowercased) belongs to the language's alphabet
    pub fn is_letter(self, c: char) -> bool {
        match self {
            Language::English => c.is_ascii_lowercase(),
            Language::Russian => matches!(c, 'а'..='я' | 'ё'),
        }
    }

    fn algorithm(self) -> Algorithm {
        match self {
            Language::English => Algorithm::English,
            Language::Russian => Algorithm::Russian,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Language::English => write!(f, "english"),
            Language::Russian => write!(f, "russian"),
        }
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "english" | "en" => Ok(Language::English),
            "russian" | "ru" => Ok(Language::Russian),
            _ => Err(Error::Config(format!("Unknown language: {}", s))),
        }
    }
}

/// Coarse word class as far as indexing cares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartOfSpeech {
    Preposition,
    Conjunction,
    Particle,
    Interjection,
    Content,
}

impl PartOfSpeech {
    /// Non-content classes carry no retrieval value
    pub fn is_function_word(self) -> bool {
        !matches!(self, PartOfSpeech::Content)
    }
}

/// Morphological analysis of a single lowercase word
pub trait Morphology: Send + Sync {
    /// All base forms of `word`, most likely first; empty if unknown
    fn normal_forms(&self, word: &str) -> Vec<String>;

    /// Every part-of-speech reading of `word`
    fn parts_of_speech(&self, word: &str) -> Vec<PartOfSpeech>;
}

/// Snowball stemming plus closed-class word tables
pub struct SnowballMorphology {
    language: Language,
    stemmer: Stemmer,
}

impl SnowballMorphology {
    pub fn new(language: Language) -> Self {
        Self {
            language,
            stemmer: Stemmer::create(language.algorithm()),
        }
    }
}

impl Morphology for SnowballMorphology {
    fn normal_forms(&self, word: &str) -> Vec<String> {
        if word.is_empty() || !word.chars().all(|c| self.language.is_letter(c)) {
            return Vec::new();
        }
        vec![self.stemmer.stem(word).into_owned()]
    }

    fn parts_of_speech(&self, word: &str) -> Vec<PartOfSpeech> {
        let tables = closed_classes(self.language);
        let mut tags = Vec::new();
        if tables.prepositions.contains(&word) {
            tags.push(PartOfSpeech::Preposition);
        }
        if tables.conjunctions.contains(&word) {
            tags.push(PartOfSpeech::Conjunction);
        }
        if tables.particles.contains(&word) {
            tags.push(PartOfSpeech::Particle);
        }
        if tables.interjections.contains(&word) {
            tags.push(PartOfSpeech::Interjection);
        }
        if tags.is_empty() {
            tags.push(PartOfSpeech::Content);
        }
        tags
    }
}

struct ClosedClasses {
    prepositions: &'static [&'static str],
    conjunctions: &'static [&'static str],
    particles: &'static [&'static str],
    interjections: &'static [&'static str],
}

fn closed_classes(language: Language) -> &'static ClosedClasses {
    match language {
        Language::English => &ENGLISH,
        Language::Russian => &RUSSIAN,
    }
}

static ENGLISH: ClosedClasses = ClosedClasses {
    prepositions: &[
        "about", "above", "across", "after", "against", "along", "among", "around", "at",
        "before", "behind", "below", "beneath", "beside", "between", "beyond", "by", "during",
        "except", "for", "from", "in", "inside", "into", "near", "of", "off", "on", "onto",
        "outside", "over", "past", "since", "through", "throughout", "till", "to", "toward",
        "towards", "under", "underneath", "until", "upon", "via", "with", "within", "without",
    ],
    conjunctions: &[
        "and", "but", "or", "nor", "so", "yet", "because", "although", "though", "while",
        "whereas", "if", "unless", "whether", "than", "either", "neither", "both",
    ],
    particles: &["not", "no"],
    interjections: &[
        "oh", "ah", "aha", "wow", "hey", "oops", "ouch", "alas", "hmm", "um", "uh", "hurray",
    ],
};

static RUSSIAN: ClosedClasses = ClosedClasses {
    prepositions: &[
        "в", "во", "на", "с", "со", "по", "за", "из", "у", "для", "к", "ко", "от", "до", "о",
        "об", "обо", "при", "про", "без", "над", "под", "перед", "через", "между", "около",
        "вокруг", "после", "возле", "среди", "сквозь", "ради",
    ],
    conjunctions: &[
        "и", "а", "но", "или", "да", "либо", "что", "чтобы", "если", "когда", "хотя", "потому",
        "также", "тоже", "зато", "однако", "будто", "словно",
    ],
    particles: &[
        "не", "ни", "же", "ли", "бы", "вот", "вон", "даже", "лишь", "только", "уже", "ещё", "еще",
        "разве", "неужели", "пусть", "именно",
    ],
    interjections: &["ах", "ох", "ой", "эх", "ух", "увы", "ура", "эй", "ну", "ага", "ого"],
};
