use crate::crawler::html_to_text;
use crate::morphology::Morphology;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A word found inside a whitespace-separated token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchWord {
    /// Lower-cased letters of the word
    pub word: String,
    /// Byte offset of the word inside the token
    pub start: usize,
    /// Byte offset just past the word inside the token
    pub end: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Cyrillic,
    Latin,
    Hyphen,
    Other,
}

fn classify(lower: char) -> CharClass {
    match lower {
        'а'..='я' | 'ё' => CharClass::Cyrillic,
        'a'..='z' => CharClass::Latin,
        '-' => CharClass::Hyphen,
        _ => CharClass::Other,
    }
}

fn lower_char(c: char) -> char {
    let mut lower = c.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(l), None) => l,
        _ => c,
    }
}

/// Trims a token to its longest run of Cyrillic or Latin letters
///
/// Hyphens are kept only between two Cyrillic letters, as in "кто-то".
/// The first run wins on ties. Returns None when the token has no letters.
pub fn search_word(token: &str) -> Option<SearchWord> {
    let chars: Vec<(usize, char, CharClass)> = token
        .char_indices()
        .map(|(i, c)| {
            let lower = lower_char(c);
            (i, lower, classify(lower))
        })
        .collect();

    let in_word = |k: usize| -> bool {
        match chars[k].2 {
            CharClass::Cyrillic | CharClass::Latin => true,
            CharClass::Hyphen => {
                k > 0
                    && k + 1 < chars.len()
                    && chars[k - 1].2 == CharClass::Cyrillic
                    && chars[k + 1].2 == CharClass::Cyrillic
            }
            CharClass::Other => false,
        }
    };

    let mut best: Option<(usize, usize)> = None;
    let mut k = 0;
    while k < chars.len() {
        if !in_word(k) {
            k += 1;
            continue;
        }
        let run_start = k;
        while k < chars.len() && in_word(k) {
            k += 1;
        }
        let longer = best.map_or(true, |(s, e)| k - run_start > e - s);
        if longer {
            best = Some((run_start, k));
        }
    }

    let (first, last) = best?;
    let start = chars[first].0;
    let end = chars
        .get(last)
        .map(|(i, _, _)| *i)
        .unwrap_or(token.len());
    let word = chars[first..last].iter().map(|(_, c, _)| *c).collect();

    Some(SearchWord { word, start, end })
}

/// Reduces text to lemma counts
///
/// Tokens are split on whitespace, trimmed to their letters, assigned a
/// language and filtered for particles before their first normal form is
/// counted.
#[derive(Clone)]
pub struct LemmaExtractor {
    morphology: Arc<Morphology>,
}

impl LemmaExtractor {
    pub fn new(morphology: Arc<Morphology>) -> Self {
        Self { morphology }
    }

    /// Counts lemma occurrences in plain text
    ///
    /// # Example
    ///
    /// ```
    /// use site_search::{LemmaExtractor, Morphology};
    /// use std::sync::Arc;
    ///
    /// let extractor = LemmaExtractor::new(Arc::new(Morphology::builtin()));
    /// let lemmas = extractor.find_lemmas("Кот и кот, а потом пёс.");
    /// assert_eq!(lemmas.get("кот"), Some(&2));
    /// assert!(!lemmas.contains_key("и"));
    /// ```
    pub fn find_lemmas(&self, text: &str) -> HashMap<String, usize> {
        let mut lemmas = HashMap::new();
        for token in text.split_whitespace() {
            if let Some(lemma) = self.lemma_of(token) {
                *lemmas.entry(lemma).or_insert(0) += 1;
            }
        }
        lemmas
    }

    /// Strips HTML markup, then counts lemma occurrences
    pub fn find_lemmas_in_html(&self, html: &str) -> HashMap<String, usize> {
        self.find_lemmas(&html_to_text(html))
    }

    /// Distinct lemmas of a text, used for search queries
    pub fn lemma_set(&self, text: &str) -> HashSet<String> {
        self.find_lemmas(text).into_keys().collect()
    }

    /// Lemma of a single whitespace-free token
    pub fn lemma_of(&self, token: &str) -> Option<String> {
        let found = search_word(token)?;
        self.lemma_of_word(&found.word)
    }

    /// Lemma of an already trimmed, lower-case word
    pub fn lemma_of_word(&self, word: &str) -> Option<String> {
        if word.trim().is_empty() {
            return None;
        }
        self.morphology.normal_form(word)
    }
}
