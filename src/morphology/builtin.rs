//! Closed-class lexicon shipped with the crate

use super::Language;

const RU_PREPOSITIONS: &[&str] = &[
    "в", "во", "на", "с", "со", "к", "ко", "по", "о", "об", "обо", "от", "ото", "до", "из",
    "изо", "у", "за", "над", "надо", "под", "подо", "при", "про", "для", "без", "безо",
    "через", "перед", "передо", "между", "около", "после", "вокруг", "среди", "сквозь",
    "из-за", "из-под",
];

const RU_CONJUNCTIONS: &[&str] = &[
    "и", "а", "но", "или", "либо", "да", "что", "чтобы", "если", "как", "когда", "потому",
    "поэтому", "также", "тоже", "зато", "однако", "хотя", "пока", "ибо", "будто", "словно",
];

const RU_PARTICLES: &[&str] = &[
    "не", "ни", "же", "ли", "ль", "бы", "б", "вот", "вон", "даже", "уже", "лишь", "только",
    "ведь", "разве", "неужели", "пусть", "ка",
];

const RU_INTERJECTIONS: &[&str] = &[
    "ах", "ох", "эх", "ой", "ай", "ух", "ого", "ура", "увы", "эй", "ну", "ага", "угу",
];

const EN_PREPOSITIONS: &[&str] = &[
    "in", "on", "at", "of", "to", "for", "with", "from", "by", "about", "into", "onto",
    "over", "under", "between", "through", "after", "before", "without", "within", "upon",
    "during", "against", "among", "toward", "towards", "across", "behind", "beyond",
];

const EN_BE_FORMS: &[&str] = &["be", "am", "is", "are", "was", "were", "been", "being"];

/// Lexicon entries for a language as `(form, normal form, tag)`
pub(super) fn lexicon(language: Language) -> Vec<(&'static str, &'static str, &'static str)> {
    match language {
        Language::Russian => tagged(RU_PREPOSITIONS, "ПРЕДЛ")
            .chain(tagged(RU_CONJUNCTIONS, "СОЮЗ"))
            .chain(tagged(RU_PARTICLES, "ЧАСТ"))
            .chain(tagged(RU_INTERJECTIONS, "МЕЖД"))
            .collect(),
        Language::English => tagged(EN_PREPOSITIONS, "PREP")
            .chain(EN_BE_FORMS.iter().map(|form| (*form, "be", "VBE")))
            .collect(),
    }
}

fn tagged(
    words: &'static [&'static str],
    tag: &'static str,
) -> impl Iterator<Item = (&'static str, &'static str, &'static str)> {
    words.iter().map(move |word| (*word, *word, tag))
}
