//! Morphology capability: language detection, normal forms and tags
//!
//! Words are resolved by an ordered list of language providers. The first
//! provider whose alphabet accepts the word is used for it, Russian before
//! English.

mod builtin;
mod dictionary;

pub use dictionary::DictionaryMorphology;

use crate::config::MorphologyConfig;
use crate::ConfigResult;
use std::path::Path;

/// Morphological tags marking closed-class words that carry no search signal
///
/// Interjection, conjunction, preposition and particle for Russian; preposition
/// and forms of "to be" for English.
pub const PARTICLES: &[&str] = &["МЕЖД", "СОЮЗ", "ПРЕДЛ", "ЧАСТ", "PREP", "VBE"];

/// Languages with a morphology provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Russian,
    English,
}

impl Language {
    /// Parses a configuration language code
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_lowercase().as_str() {
            "ru" => Some(Self::Russian),
            "en" => Some(Self::English),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Russian => "ru",
            Self::English => "en",
        }
    }

    /// Returns true if the character belongs to the language's word alphabet
    pub fn accepts_char(&self, c: char) -> bool {
        match self {
            Self::Russian => matches!(c, 'а'..='я' | 'ё' | '-'),
            Self::English => c.is_ascii_lowercase(),
        }
    }
}

/// A morphology provider for a single language
///
/// Implementations receive lower-case words.
pub trait LanguageMorphology: Send + Sync {
    fn language(&self) -> Language;

    /// Returns true if the word can be analyzed by this provider
    fn validate(&self, word: &str) -> bool;

    /// Normal forms of the word, most specific first; never empty for a valid word
    fn normal_forms(&self, word: &str) -> Vec<String>;

    /// Morphological tags of the word, possibly several per entry
    fn tags(&self, word: &str) -> Vec<String>;
}

/// Ordered chain of language providers
pub struct Morphology {
    providers: Vec<Box<dyn LanguageMorphology>>,
}

impl Morphology {
    pub fn new(providers: Vec<Box<dyn LanguageMorphology>>) -> Self {
        Self { providers }
    }

    /// Russian and English providers backed only by the built-in lexicon
    pub fn builtin() -> Self {
        Self::new(vec![
            Box::new(DictionaryMorphology::builtin(Language::Russian)),
            Box::new(DictionaryMorphology::builtin(Language::English)),
        ])
    }

    /// Built-in providers extended with the configured dictionary files
    pub fn from_config(config: &MorphologyConfig) -> ConfigResult<Self> {
        let mut russian = DictionaryMorphology::builtin(Language::Russian);
        let mut english = DictionaryMorphology::builtin(Language::English);

        for entry in &config.dictionaries {
            let path = Path::new(&entry.path);
            match Language::from_code(&entry.language) {
                Some(Language::Russian) => russian.load_file(path)?,
                Some(Language::English) => english.load_file(path)?,
                None => {
                    return Err(crate::ConfigError::Validation(format!(
                        "Unknown dictionary language '{}'",
                        entry.language
                    )))
                }
            }
            tracing::debug!("Loaded {} dictionary from {}", entry.language, entry.path);
        }

        Ok(Self::new(vec![Box::new(russian), Box::new(english)]))
    }

    /// Returns the first provider that validates the word
    pub fn qualify(&self, word: &str) -> Option<&dyn LanguageMorphology> {
        self.providers
            .iter()
            .find(|provider| provider.validate(word))
            .map(|provider| provider.as_ref())
    }

    /// Returns true if any tag of the word marks a closed-class word
    pub fn is_particle(provider: &dyn LanguageMorphology, word: &str) -> bool {
        provider
            .tags(word)
            .iter()
            .filter(|tag| !tag.trim().is_empty())
            .flat_map(|tag| {
                tag.split_whitespace()
                    .map(|part| part.to_uppercase())
                    .collect::<Vec<_>>()
            })
            .any(|part| PARTICLES.contains(&part.as_str()))
    }

    /// Lemma of a lower-case word, or None when it is unknown or a particle
    pub fn normal_form(&self, word: &str) -> Option<String> {
        let provider = self.qualify(word)?;
        if Self::is_particle(provider, word) {
            return None;
        }
        provider.normal_forms(word).into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_codes() {
        assert_eq!(Language::from_code("ru"), Some(Language::Russian));
        assert_eq!(Language::from_code(" EN "), Some(Language::English));
        assert_eq!(Language::from_code("de"), None);
        assert_eq!(Language::Russian.code(), "ru");
    }

    #[test]
    fn test_russian_is_tried_first() {
        let morphology = Morphology::builtin();
        assert_eq!(
            morphology.qualify("кот").map(|p| p.language()),
            Some(Language::Russian)
        );
        assert_eq!(
            morphology.qualify("cat").map(|p| p.language()),
            Some(Language::English)
        );
        assert!(morphology.qualify("кotё").is_none());
        assert!(morphology.qualify("123").is_none());
    }

    #[test]
    fn test_particles_have_no_normal_form() {
        let morphology = Morphology::builtin();
        assert_eq!(morphology.normal_form("и"), None);
        assert_eq!(morphology.normal_form("на"), None);
        assert_eq!(morphology.normal_form("is"), None);
        assert_eq!(morphology.normal_form("of"), None);
        assert_eq!(morphology.normal_form("кот"), Some("кот".to_string()));
    }

    #[test]
    fn test_custom_provider_order() {
        struct Upper;
        impl LanguageMorphology for Upper {
            fn language(&self) -> Language {
                Language::English
            }
            fn validate(&self, word: &str) -> bool {
                word.chars().all(|c| c.is_ascii_lowercase())
            }
            fn normal_forms(&self, word: &str) -> Vec<String> {
                vec![word.to_uppercase(), word.to_string()]
            }
            fn tags(&self, _word: &str) -> Vec<String> {
                vec!["NOUN  sg".to_string()]
            }
        }

        let morphology = Morphology::new(vec![Box::new(Upper)]);
        assert_eq!(morphology.normal_form("cats"), Some("CATS".to_string()));
    }
}
