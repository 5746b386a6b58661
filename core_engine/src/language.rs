use serde::{Deserialize, Serialize};

/// Czech alphabet letters that never occur in plain English text.
pub const CZECH_DIACRITICS: &str = "áčďéěíňóřšťúůýžÁČĎÉĚÍŇÓŘŠŤÚŮÝŽ";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Czech,
    #[default]
    Other,
}

impl Language {
    /// Lets a document-level locale pick Czech when the text itself carries no
    /// diacritics. Only message localization consults this.
    pub fn or_locale(self, locale: Option<&str>) -> Self {
        match (self, locale) {
            (Language::Czech, _) => Language::Czech,
            (Language::Other, Some(locale)) if is_czech_locale(locale) => Language::Czech,
            (Language::Other, _) => Language::Other,
        }
    }

    /// Name used inside generation prompts.
    pub fn prompt_name(self) -> &'static str {
        match self {
            Language::Czech => "Czech",
            Language::Other => "English",
        }
    }
}

pub fn detect(text: &str) -> Language {
    if text.chars().any(is_czech_diacritic) {
        Language::Czech
    } else {
        Language::Other
    }
}

pub fn is_czech_diacritic(ch: char) -> bool {
    CZECH_DIACRITICS.contains(ch)
}

pub fn localize(czech: &'static str, english: &'static str, language: Language) -> &'static str {
    match language {
        Language::Czech => czech,
        Language::Other => english,
    }
}

fn is_czech_locale(locale: &str) -> bool {
    let primary = locale.split(['-', '_']).next().unwrap_or_default();
    primary.eq_ignore_ascii_case("cs")
}
