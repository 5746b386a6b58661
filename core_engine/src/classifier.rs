//! Highlight eligibility for single whitespace-delimited words.
//!
//! This is a shape heuristic, not a linguistic analyzer: it looks for proper
//! nouns, acronyms and long words, and false positives are expected.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::language::{detect, is_czech_diacritic, Language};

/// Characters that disqualify a raw word outright.
const SYMBOLS: &str = "!@#$%^&*()_+-=[]{};':\"\\|,.<>/?";

const MIN_CLEANED_LEN: usize = 3;
const CZECH_LONG_WORD: usize = 10;
const OTHER_LONG_WORD: usize = 8;

static CZECH_TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-ZÁČĎÉĚÍŇÓŘŠŤÚŮÝŽ][a-záčďéěíňóřšťúůýž]+$").expect("valid regex")
});
static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][a-z]+$").expect("valid regex"));
static ACRONYM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{2,}$").expect("valid regex"));
static LOWER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]+$").expect("valid regex"));

static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        // English
        "the", "a", "an", "in", "on", "at", "to", "for", "with", "by", "from", "of", "about",
        "and", "or", "but", "nor", "yet", "so", "because", "although", "unless",
        // Czech
        "aby", "ale", "ani", "ano", "asi", "až", "bez", "bude", "budem", "by", "byl", "byla",
        "byli", "bylo", "být", "co", "či", "článek", "další", "dnes", "do", "ho", "i", "já",
        "jak", "jako", "je", "jeho", "jej", "její", "jejich", "jen", "ještě", "již", "jsem",
        "jsi", "jsme", "jsou", "jí", "k", "kam", "kde", "kdo", "kdy", "když", "ke", "která",
        "které", "který", "kteří", "má", "máte", "mezi", "mi", "mít", "mě", "může", "na", "nad",
        "nam", "napište", "náš", "ne", "nebo", "není", "nové", "nový", "než", "o", "od", "pak",
        "po", "pod", "podle", "pokud", "pouze", "pro", "proto", "před", "přes", "při", "rok",
        "roce", "roku", "s", "se", "si", "sice", "své", "svých", "svým", "svými", "ta", "tak",
        "také", "takže", "tato", "tedy", "ten", "tento", "této", "tím", "to", "tohle", "toho",
        "též", "tu", "tuto", "ty", "u", "už", "v", "ve", "více", "však", "všech", "všechny",
        "všichni", "z", "za", "zde", "ze", "že",
    ]
    .into_iter()
    .collect()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub raw: String,
    pub cleaned: String,
    pub language: Language,
}

pub fn classify(word: &str) -> Token {
    Token {
        raw: word.to_string(),
        cleaned: clean(word),
        language: detect(word),
    }
}

/// Keeps Latin and Czech letters only, lower-cased.
pub fn clean(word: &str) -> String {
    word.chars()
        .filter(|ch| ch.is_ascii_alphabetic() || is_czech_diacritic(*ch))
        .flat_map(char::to_lowercase)
        .collect()
}

pub fn is_stop_word(cleaned: &str) -> bool {
    STOP_WORDS.contains(cleaned)
}

pub fn is_candidate(word: &str) -> bool {
    let token = classify(word);
    if token.cleaned.chars().count() <= MIN_CLEANED_LEN || is_stop_word(&token.cleaned) {
        return false;
    }
    if word.chars().any(|ch| ch.is_ascii_digit() || SYMBOLS.contains(ch)) {
        return false;
    }

    match token.language {
        Language::Czech => {
            CZECH_TITLE_RE.is_match(word)
                || word.chars().count() > CZECH_LONG_WORD
                || word.contains('-')
        }
        Language::Other => {
            TITLE_RE.is_match(word)
                || ACRONYM_RE.is_match(word)
                || (word.len() > OTHER_LONG_WORD && LOWER_RE.is_match(word))
        }
    }
}
