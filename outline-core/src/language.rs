use crate::config::LanguageConfig;
use crate::rules::validation::ValidationReport;
use crate::types::{LanguageGuess, TextFragment, UNKNOWN_LANGUAGE_TAG};
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Language {
    English,
    Japanese,
    Chinese,
    Korean,
    Arabic,
    Spanish,
    French,
    German,
    Unknown,
}

impl Language {
    /// Parse a BCP-47-ish tag ("ja", "zh-Hans", "en_US", "eng").
    pub fn from_tag(tag: &str) -> Self {
        let lowered = tag.trim().to_ascii_lowercase();
        let primary = lowered
            .split(|c| c == '-' || c == '_')
            .next()
            .unwrap_or("");
        match primary {
            "en" | "eng" | "english" => Language::English,
            "ja" | "jpn" | "japanese" => Language::Japanese,
            "zh" | "zho" | "chi" | "chinese" => Language::Chinese,
            "ko" | "kor" | "korean" => Language::Korean,
            "ar" | "ara" | "arabic" => Language::Arabic,
            "es" | "spa" | "spanish" => Language::Spanish,
            "fr" | "fra" | "fre" | "french" => Language::French,
            "de" | "deu" | "ger" | "german" => Language::German,
            _ => Language::Unknown,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Japanese => "ja",
            Language::Chinese => "zh",
            Language::Korean => "ko",
            Language::Arabic => "ar",
            Language::Spanish => "es",
            Language::French => "fr",
            Language::German => "de",
            Language::Unknown => UNKNOWN_LANGUAGE_TAG,
        }
    }

    pub fn is_known(&self) -> bool {
        *self != Language::Unknown
    }
}

/// External seam: anything able to guess a language from a text sample.
pub trait LanguageIdentifier: Send + Sync {
    fn identify(&self, sample: &str) -> Option<LanguageGuess>;
}

/// Script-counting identifier. Distinguishes scripts, not Latin languages:
/// all Latin text is reported as English.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptLanguageIdentifier;

#[derive(Debug, Default)]
struct ScriptCounts {
    kana: usize,
    han: usize,
    hangul: usize,
    arabic: usize,
    latin: usize,
}

impl ScriptCounts {
    fn tally(sample: &str) -> Self {
        let mut counts = Self::default();
        for c in sample.chars() {
            match c {
                '\u{3040}'..='\u{30FF}' | '\u{31F0}'..='\u{31FF}' => counts.kana += 1,
                '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}' => counts.han += 1,
                '\u{AC00}'..='\u{D7AF}' | '\u{1100}'..='\u{11FF}' => counts.hangul += 1,
                '\u{0600}'..='\u{06FF}' | '\u{0750}'..='\u{077F}' => counts.arabic += 1,
                c if c.is_ascii_alphabetic() => counts.latin += 1,
                '\u{00C0}'..='\u{024F}' => counts.latin += 1,
                _ => {}
            }
        }
        counts
    }

    fn total(&self) -> usize {
        self.kana + self.han + self.hangul + self.arabic + self.latin
    }
}

impl LanguageIdentifier for ScriptLanguageIdentifier {
    fn identify(&self, sample: &str) -> Option<LanguageGuess> {
        let counts = ScriptCounts::tally(sample);
        let total = counts.total();
        if total == 0 {
            return None;
        }
        let share = |n: usize| n as f32 / total as f32;

        // Kana only appears in Japanese; kanji is shared with Chinese
        if counts.kana > 0 && share(counts.kana + counts.han) >= 0.3 {
            return Some(LanguageGuess::new(
                Language::Japanese.tag(),
                share(counts.kana + counts.han),
            ));
        }

        let (language, count) = [
            (Language::Korean, counts.hangul),
            (Language::Arabic, counts.arabic),
            (Language::Chinese, counts.han),
            (Language::English, counts.latin),
        ]
        .into_iter()
        .max_by_key(|(_, n)| *n)?;

        if count == 0 {
            return None;
        }
        Some(LanguageGuess::new(language.tag(), share(count)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LanguageSource {
    /// Document-level guess supplied with the input
    Document,
    /// Majority vote over fragment tags
    Fragments,
    /// Language identifier run on sampled text
    Identifier,
    Fallback,
}

#[derive(Debug, Clone, Serialize)]
pub struct LanguageProfile {
    pub language: Language,
    pub confidence: f32,
    pub source: LanguageSource,
}

impl LanguageProfile {
    pub fn unknown() -> Self {
        Self {
            language: Language::Unknown,
            confidence: 0.0,
            source: LanguageSource::Fallback,
        }
    }

    /// Language governing a fragment: its own tag when recognised,
    /// otherwise the document language.
    pub fn resolve(&self, fragment_tag: &str) -> Language {
        match Language::from_tag(fragment_tag) {
            Language::Unknown => self.language,
            lang => lang,
        }
    }
}

pub struct LanguageProfileBuilder<'a> {
    config: &'a LanguageConfig,
    identifier: Option<&'a dyn LanguageIdentifier>,
}

impl<'a> LanguageProfileBuilder<'a> {
    pub fn new(config: &'a LanguageConfig, identifier: Option<&'a dyn LanguageIdentifier>) -> Self {
        Self { config, identifier }
    }

    pub fn build(
        &self,
        document_guess: Option<&LanguageGuess>,
        fragments: &[TextFragment],
        validation: &ValidationReport,
    ) -> LanguageProfile {
        if let Some(profile) = self.from_document_guess(document_guess) {
            return profile;
        }
        if let Some(profile) = self.from_fragment_tags(fragments, validation) {
            return profile;
        }
        if let Some(profile) = self.from_identifier(fragments, validation) {
            return profile;
        }
        debug!("No usable language evidence, falling back to generic rules");
        LanguageProfile::unknown()
    }

    fn from_document_guess(&self, guess: Option<&LanguageGuess>) -> Option<LanguageProfile> {
        let guess = guess?;
        let language = Language::from_tag(&guess.tag);
        if !language.is_known() || guess.confidence < self.config.confidence_floor {
            debug!(
                "Ignoring document language guess '{}' ({:.2})",
                guess.tag, guess.confidence
            );
            return None;
        }
        Some(LanguageProfile {
            language,
            confidence: guess.confidence.min(1.0),
            source: LanguageSource::Document,
        })
    }

    /// Tags vote with the character count of their fragment
    fn from_fragment_tags(
        &self,
        fragments: &[TextFragment],
        validation: &ValidationReport,
    ) -> Option<LanguageProfile> {
        let mut votes: BTreeMap<Language, usize> = BTreeMap::new();
        let mut total = 0usize;
        for (i, fragment) in fragments.iter().enumerate() {
            if !validation.is_usable(i) {
                continue;
            }
            let language = Language::from_tag(&fragment.language_tag);
            if !language.is_known() {
                continue;
            }
            let weight = fragment.char_count().max(1);
            *votes.entry(language).or_insert(0) += weight;
            total += weight;
        }
        if total == 0 {
            return None;
        }

        // BTreeMap order makes ties resolve to the first language in enum order
        let (language, count) = votes
            .into_iter()
            .fold(None, |best: Option<(Language, usize)>, (lang, n)| match best {
                Some((_, best_n)) if best_n >= n => best,
                _ => Some((lang, n)),
            })?;
        let share = count as f32 / total as f32;
        if share < self.config.fragment_vote_share {
            return None;
        }
        Some(LanguageProfile {
            language,
            confidence: share,
            source: LanguageSource::Fragments,
        })
    }

    fn from_identifier(
        &self,
        fragments: &[TextFragment],
        validation: &ValidationReport,
    ) -> Option<LanguageProfile> {
        let identifier = self.identifier?;
        let sample = sample_text(fragments, validation, self.config.sample_chars);
        if sample.is_empty() {
            return None;
        }
        let guess = identifier.identify(&sample)?;
        let language = Language::from_tag(&guess.tag);
        if !language.is_known() || guess.confidence < self.config.confidence_floor {
            return None;
        }
        Some(LanguageProfile {
            language,
            confidence: guess.confidence.min(1.0),
            source: LanguageSource::Identifier,
        })
    }
}

/// Leading text of the document, up to `max_chars` characters
fn sample_text(fragments: &[TextFragment], validation: &ValidationReport, max_chars: usize) -> String {
    let mut sample = String::new();
    let mut taken = 0usize;
    for (i, fragment) in fragments.iter().enumerate() {
        if taken >= max_chars {
            break;
        }
        if !validation.is_usable(i) {
            continue;
        }
        let remaining = max_chars - taken;
        let piece: String = fragment.text.trim().chars().take(remaining).collect();
        taken += piece.chars().count();
        if !sample.is_empty() {
            sample.push(' ');
        }
        sample.push_str(&piece);
    }
    sample
}
