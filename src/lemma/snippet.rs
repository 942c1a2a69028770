use super::extractor::{search_word, LemmaExtractor};
use std::collections::HashSet;

const ELLIPSIS: &str = "...";
const SPOILER_OPEN: &str = "<details>";
const SPOILER_CLOSE: &str = "</details>";
const HIGHLIGHT_OPEN: &str = "<b>";
const HIGHLIGHT_CLOSE: &str = "</b>";

/// Builds highlighted excerpts around lemma hits
#[derive(Clone)]
pub struct SnippetBuilder {
    extractor: LemmaExtractor,
    words_range: usize,
    spoiler_threshold: usize,
}

impl SnippetBuilder {
    /// # Arguments
    ///
    /// * `words_range` - Words of context kept on each side of a hit
    /// * `spoiler_threshold` - Snippet length in chars after which the rest is folded
    pub fn new(extractor: LemmaExtractor, words_range: usize, spoiler_threshold: usize) -> Self {
        Self {
            extractor,
            words_range,
            spoiler_threshold,
        }
    }

    /// Builds a snippet of plain text for the given lemma set
    ///
    /// Hits are wrapped in `<b>`, up to `words_range` words of context are kept
    /// around them and `...` marks every place where words were left out.
    /// Once the snippet grows past the spoiler threshold the remainder is
    /// wrapped in `<details>`.
    ///
    /// # Example
    ///
    /// ```
    /// use site_search::{LemmaExtractor, Morphology, SnippetBuilder};
    /// use std::collections::HashSet;
    /// use std::sync::Arc;
    ///
    /// let extractor = LemmaExtractor::new(Arc::new(Morphology::builtin()));
    /// let builder = SnippetBuilder::new(extractor, 2, 270);
    /// let lemmas: HashSet<String> = ["кот".to_string()].into_iter().collect();
    ///
    /// let snippet = builder.build("Один два три кот четыре пять шесть", &lemmas);
    /// assert_eq!(snippet, "... два три <b>кот</b> четыре пять ...");
    /// ```
    pub fn build(&self, text: &str, lemmas: &HashSet<String>) -> String {
        let mut out = SnippetWriter::default();

        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            self.build_line(line, lemmas, &mut out);
        }

        out.finish()
    }

    fn build_line(&self, line: &str, lemmas: &HashSet<String>, out: &mut SnippetWriter) {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let mut next_unprinted = 0;
        let mut last_hit: Option<usize> = None;
        let mut printed = false;

        for (i, token) in tokens.iter().enumerate() {
            let hit = self
                .extractor
                .lemma_of(token)
                .map_or(false, |lemma| lemmas.contains(&lemma));

            if hit {
                let left_start = i.saturating_sub(self.words_range).max(next_unprinted);
                if left_start > next_unprinted {
                    out.gap = true;
                }
                if out.gap {
                    out.ellipsis();
                }

                if !out.spoiler_opened && out.char_len() > self.spoiler_threshold {
                    out.open_spoiler();
                }

                for context in &tokens[left_start..i] {
                    out.word(context);
                }
                out.highlight(token);

                next_unprinted = i + 1;
                last_hit = Some(i);
                printed = true;
                continue;
            }

            if let Some(hit_index) = last_hit {
                if i <= hit_index + self.words_range && i == next_unprinted {
                    out.word(token);
                    next_unprinted = i + 1;
                }
            }
        }

        if next_unprinted < tokens.len() {
            out.gap = true;
            if printed {
                out.ellipsis();
            }
        }
    }
}

/// Accumulates snippet pieces separated by single spaces
#[derive(Default)]
struct SnippetWriter {
    buf: String,
    /// Words were skipped since the last emitted piece
    gap: bool,
    last_was_ellipsis: bool,
    /// The last piece is a highlight that a following adjacent hit may extend
    mergeable: bool,
    spoiler_opened: bool,
}

impl SnippetWriter {
    fn char_len(&self) -> usize {
        self.buf.chars().count()
    }

    fn separate(&mut self) {
        if !self.buf.is_empty() && !self.buf.ends_with(SPOILER_OPEN) {
            self.buf.push(' ');
        }
    }

    fn word(&mut self, word: &str) {
        self.separate();
        self.buf.push_str(word);
        self.gap = false;
        self.last_was_ellipsis = false;
        self.mergeable = false;
    }

    fn ellipsis(&mut self) {
        if self.last_was_ellipsis {
            return;
        }
        self.separate();
        self.buf.push_str(ELLIPSIS);
        self.last_was_ellipsis = true;
        self.mergeable = false;
    }

    fn open_spoiler(&mut self) {
        self.separate();
        self.buf.push_str(SPOILER_OPEN);
        self.spoiler_opened = true;
        self.mergeable = false;
    }

    fn highlight(&mut self, token: &str) {
        let (prefix, core, suffix) = match search_word(token) {
            Some(found) => (
                &token[..found.start],
                &token[found.start..found.end],
                &token[found.end..],
            ),
            None => ("", token, ""),
        };

        if self.mergeable && prefix.is_empty() {
            self.buf.truncate(self.buf.len() - HIGHLIGHT_CLOSE.len());
            self.buf.push(' ');
        } else {
            self.separate();
            self.buf.push_str(prefix);
            self.buf.push_str(HIGHLIGHT_OPEN);
        }
        self.buf.push_str(core);
        self.buf.push_str(HIGHLIGHT_CLOSE);
        self.buf.push_str(suffix);

        self.gap = false;
        self.last_was_ellipsis = false;
        self.mergeable = suffix.is_empty();
    }

    fn finish(mut self) -> String {
        if self.spoiler_opened {
            self.buf.push_str(SPOILER_CLOSE);
        }
        self.buf.trim().to_string()
    }
}
