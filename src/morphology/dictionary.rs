use super::builtin;
use super::{Language, LanguageMorphology};
use crate::{ConfigError, ConfigResult};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Default)]
struct Entry {
    normal_forms: Vec<String>,
    tags: Vec<String>,
}

/// Dictionary-backed provider for one language
///
/// Words absent from the dictionary are their own normal form and carry no tags.
#[derive(Debug, Clone)]
pub struct DictionaryMorphology {
    language: Language,
    entries: HashMap<String, Entry>,
}

impl DictionaryMorphology {
    /// Creates an empty dictionary
    pub fn new(language: Language) -> Self {
        Self {
            language,
            entries: HashMap::new(),
        }
    }

    /// Creates a dictionary preloaded with the closed-class lexicon
    pub fn builtin(language: Language) -> Self {
        let mut dictionary = Self::new(language);
        for (form, normal, tag) in builtin::lexicon(language) {
            dictionary.insert(form, &[normal], &[tag]);
        }
        dictionary
    }

    /// Adds normal forms and tags for a word form
    ///
    /// Repeated forms accumulate; duplicate normal forms are kept once.
    pub fn insert(&mut self, form: &str, normal_forms: &[&str], tags: &[&str]) {
        let entry = self.entries.entry(form.to_lowercase()).or_default();
        for normal in normal_forms {
            let normal = normal.trim().to_lowercase();
            if !normal.is_empty() && !entry.normal_forms.contains(&normal) {
                entry.normal_forms.push(normal);
            }
        }
        for tag in tags {
            let tag = tag.trim();
            if !tag.is_empty() {
                entry.tags.push(tag.to_string());
            }
        }
    }

    /// Number of known word forms
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Loads a tab-separated dictionary file
    ///
    /// Each line is `form<TAB>normal[,normal...][<TAB>tags]`. Blank lines and
    /// lines starting with `#` are ignored.
    pub fn load_file(&mut self, path: &Path) -> ConfigResult<()> {
        let content = std::fs::read_to_string(path)?;
        self.load_str(&content)
            .map_err(|(line, message)| ConfigError::Dictionary {
                path: path.display().to_string(),
                line,
                message,
            })
    }

    fn load_str(&mut self, content: &str) -> Result<(), (usize, String)> {
        for (number, line) in content.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                continue;
            }

            let mut fields = line.split('\t');
            let form = fields.next().unwrap_or_default().trim();
            let normals = fields.next().unwrap_or_default().trim();
            let tags = fields.next().unwrap_or_default().trim();

            if form.is_empty() || normals.is_empty() {
                return Err((number + 1, "expected form<TAB>normal forms".to_string()));
            }

            let form = form.to_lowercase();
            if !self.validate(&form) {
                return Err((
                    number + 1,
                    format!("'{}' is not a {} word", form, self.language.code()),
                ));
            }

            let normals: Vec<&str> = normals.split(',').collect();
            let tags: Vec<&str> = if tags.is_empty() { Vec::new() } else { vec![tags] };
            self.insert(&form, &normals, &tags);
        }
        Ok(())
    }
}

impl LanguageMorphology for DictionaryMorphology {
    fn language(&self) -> Language {
        self.language
    }

    fn validate(&self, word: &str) -> bool {
        !word.is_empty() && word.chars().all(|c| self.language.accepts_char(c))
    }

    fn normal_forms(&self, word: &str) -> Vec<String> {
        match self.entries.get(word) {
            Some(entry) if !entry.normal_forms.is_empty() => entry.normal_forms.clone(),
            _ => vec![word.to_string()],
        }
    }

    fn tags(&self, word: &str) -> Vec<String> {
        self.entries
            .get(word)
            .map(|entry| entry.tags.clone())
            .unwrap_or_default()
    }
}
