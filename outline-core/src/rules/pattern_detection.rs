use crate::config::PatternConfig;
use crate::error::{OutlineError, Result};
use crate::language::Language;
use crate::types::{PatternCategory, SignalScore, SignalSource};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, LazyLock};
use unicode_normalization::UnicodeNormalization;

use super::engine::{DocumentContext, SignalDetector};

use PatternCategory::*;

// (name, regex, base confidence, category)
type RuleSpec = (&'static str, &'static str, f32, PatternCategory);

const KEYWORD_LEADING_CONFIDENCE: f32 = 0.7;
const KEYWORD_CONTAINED_CONFIDENCE: f32 = 0.5;

/// Rules for one language. Compiled in the order structural → leading
/// keyword → shape → contained keyword; the first matching rule wins.
struct LanguageRules {
    language: Language,
    structural: &'static [RuleSpec],
    /// Follow the structural rules with the Latin section-numbering rules
    inherit_numbering: bool,
    keywords: &'static [&'static str],
    shape: &'static [RuleSpec],
    /// Whether keywords need word boundaries (false for scripts without spaces)
    word_bounded: bool,
}

// Section numbering shared by every Latin-script set
const LATIN_NUMBERING: &[RuleSpec] = &[
    ("sub_numbered", r"^\d+(?:\.\d+)+\.?\s+\S", 0.9, SubNumbered),
    ("numbered", r"^\d{1,3}[.)]?\s+\p{Lu}", 0.9, Numbered),
    ("roman_numeral", r"^[IVXLC]{1,6}[.)]\s+\p{Lu}", 0.8, RomanNumeral),
];

// Latin-script fallback, applied after any language-specific set
const GENERIC_RULES: LanguageRules = LanguageRules {
    language: Language::Unknown,
    structural: &[
        (
            "chapter",
            r"^(?i:chapter|part)\s+(?:\d+|[IVXLC]+|(?i:one|two|three|four|five|six|seven|eight|nine|ten))\b",
            0.95,
            Chapter,
        ),
        (
            "section",
            r"^(?i:section|appendix|annex)\s+(?:\d+(?:\.\d+)*|[A-Za-z])\b",
            0.85,
            Section,
        ),
    ],
    inherit_numbering: true,
    keywords: &[
        "introduction",
        "overview",
        "background",
        "methodology",
        "methods",
        "results",
        "discussion",
        "conclusions",
        "conclusion",
        "summary",
        "abstract",
        "table of contents",
        "contents",
        "appendix",
        "references",
        "bibliography",
        "acknowledgements",
        "acknowledgments",
        "preface",
        "foreword",
        "glossary",
    ],
    shape: &[
        (
            "all_caps",
            r"^\p{Lu}{2,}[\p{Lu}\d&,:'’\-]*(?:\s+[\p{Lu}\d&,:'’\-]+)*$",
            0.7,
            AllCaps,
        ),
        (
            "title_case",
            r"^\p{Lu}\p{Ll}+(?:\s+(?:\p{Lu}[\p{L}\d'’\-]*|\d+|of|and|the|for|in|on|to|a|an|with|&))*:?$",
            0.55,
            TitleCase,
        ),
    ],
    word_bounded: true,
};

const JAPANESE_RULES: LanguageRules = LanguageRules {
    language: Language::Japanese,
    structural: &[
        ("ja_chapter", r"^第[0-9一二三四五六七八九十百千]+章", 0.95, Chapter),
        ("ja_section", r"^第[0-9一二三四五六七八九十百千]+[節节]", 0.9, Section),
        ("ja_sub_numbered", r"^[0-9]+(?:\.[0-9]+)+\.?\s*\S", 0.85, SubNumbered),
        ("ja_numbered", r"^[0-9]+[.)、]\s*\S", 0.8, Numbered),
        ("ja_kanji_numbered", r"^[一二三四五六七八九十]+[、.]\s*\S", 0.75, Numbered),
        ("ja_bracketed", r"^【[^】]+】$", 0.7, Bracketed),
        ("ja_quoted", r"^「[^」]+」$", 0.65, Quoted),
        ("ja_bullet", r"^[■◆●○□◇]\s*\S", 0.6, Bullet),
    ],
    inherit_numbering: false,
    keywords: &[
        "はじめに", "序論", "序章", "概要", "概観", "背景", "目的", "手法", "方法論", "方法",
        "実験", "分析", "結果", "考察", "検討", "結論", "まとめ", "おわりに", "謝辞", "参考文献",
        "付録", "目次", "索引",
    ],
    shape: &[],
    word_bounded: false,
};

const CHINESE_RULES: LanguageRules = LanguageRules {
    language: Language::Chinese,
    structural: &[
        ("zh_chapter", r"^第[0-9一二三四五六七八九十百千]+章", 0.95, Chapter),
        ("zh_section", r"^第[0-9一二三四五六七八九十百千]+[节節]", 0.9, Section),
        ("zh_sub_numbered", r"^[0-9]+(?:\.[0-9]+)+\.?\s*\S", 0.85, SubNumbered),
        ("zh_numbered", r"^[0-9]+[.)、]\s*\S", 0.8, Numbered),
        ("zh_hanzi_numbered", r"^[一二三四五六七八九十]+[、.]\s*\S", 0.8, Numbered),
        ("zh_paren_numbered", r"^\([一二三四五六七八九十]+\)\s*\S", 0.7, Numbered),
        ("zh_bracketed", r"^【[^】]+】$", 0.7, Bracketed),
    ],
    inherit_numbering: false,
    keywords: &[
        "引言", "前言", "概述", "背景", "方法论", "方法", "实验", "分析", "结果", "讨论", "结论",
        "总结", "摘要", "目录", "参考文献", "附录", "索引", "致谢",
    ],
    shape: &[],
    word_bounded: false,
};

const KOREAN_RULES: LanguageRules = LanguageRules {
    language: Language::Korean,
    structural: &[
        ("ko_chapter", r"^제\s*[0-9]+\s*장", 0.95, Chapter),
        ("ko_section", r"^제\s*[0-9]+\s*절", 0.9, Section),
        ("ko_sub_numbered", r"^[0-9]+(?:\.[0-9]+)+\.?\s*\S", 0.85, SubNumbered),
        ("ko_numbered", r"^[0-9]+\.\s*\S", 0.8, Numbered),
    ],
    inherit_numbering: false,
    keywords: &[
        "서론", "개요", "배경", "목적", "방법", "결과", "논의", "고찰", "결론", "요약", "참고문헌",
        "부록", "목차",
    ],
    shape: &[],
    word_bounded: false,
};

const ARABIC_RULES: LanguageRules = LanguageRules {
    language: Language::Arabic,
    structural: &[
        ("ar_chapter", r"^الفصل\s+\S+", 0.9, Chapter),
        ("ar_section", r"^(?:القسم|المبحث)\s+\S+", 0.85, Section),
        ("ar_sub_numbered", r"^[0-9٠-٩]+(?:\.[0-9٠-٩]+)+\.?\s*\S", 0.85, SubNumbered),
        ("ar_numbered", r"^[0-9٠-٩]+[.)\-]\s*\S", 0.8, Numbered),
        ("ar_bullet", r"^[•\-]\s+\S", 0.55, Bullet),
    ],
    inherit_numbering: false,
    keywords: &[
        "المقدمة", "مقدمة", "الخلاصة", "النتائج", "المنهجية", "الخلفية", "الهدف", "التحليل",
        "الاستنتاج", "المناقشة", "المراجع", "الملاحق", "الفهرس", "المحتويات",
    ],
    shape: &[],
    word_bounded: false,
};

const SPANISH_RULES: LanguageRules = LanguageRules {
    language: Language::Spanish,
    structural: &[
        (
            "es_chapter",
            r"^(?i:capítulo|capitulo|parte)\s+(?:\d+|[IVXLC]+)\b",
            0.95,
            Chapter,
        ),
        (
            "es_section",
            r"^(?i:sección|seccion|apéndice|apendice|anexo)\s+(?:\d+(?:\.\d+)*|[A-Za-z])\b",
            0.85,
            Section,
        ),
    ],
    inherit_numbering: true,
    keywords: &[
        "introducción", "introduccion", "resumen", "antecedentes", "metodología", "metodologia",
        "resultados", "análisis", "discusión", "conclusiones", "conclusión", "referencias",
        "bibliografía", "índice", "anexos",
    ],
    shape: &[],
    word_bounded: true,
};

const FRENCH_RULES: LanguageRules = LanguageRules {
    language: Language::French,
    structural: &[
        (
            "fr_chapter",
            r"^(?i:chapitre|partie)\s+(?:\d+|[IVXLC]+)\b",
            0.95,
            Chapter,
        ),
        (
            "fr_section",
            r"^(?i:section|annexe|appendice)\s+(?:\d+(?:\.\d+)*|[A-Za-z])\b",
            0.85,
            Section,
        ),
    ],
    inherit_numbering: true,
    keywords: &[
        "introduction", "résumé", "contexte", "méthodologie", "résultats", "analyse", "discussion",
        "conclusions", "conclusion", "références", "bibliographie", "sommaire", "annexes",
    ],
    shape: &[],
    word_bounded: true,
};

const GERMAN_RULES: LanguageRules = LanguageRules {
    language: Language::German,
    structural: &[
        (
            "de_chapter",
            r"^(?i:kapitel|teil)\s+(?:\d+|[IVXLC]+)\b",
            0.95,
            Chapter,
        ),
        (
            "de_section",
            r"^(?i:abschnitt|anhang)\s+(?:\d+(?:\.\d+)*|[A-Za-z])\b",
            0.85,
            Section,
        ),
    ],
    inherit_numbering: true,
    keywords: &[
        "einführung", "einleitung", "zusammenfassung", "hintergrund", "methodik", "methodologie",
        "ergebnisse", "analyse", "diskussion", "schlussfolgerung", "fazit", "literaturverzeichnis",
        "inhaltsverzeichnis", "anhang",
    ],
    shape: &[],
    word_bounded: true,
};

const LANGUAGE_RULES: [&LanguageRules; 7] = [
    &JAPANESE_RULES,
    &CHINESE_RULES,
    &KOREAN_RULES,
    &ARABIC_RULES,
    &SPANISH_RULES,
    &FRENCH_RULES,
    &GERMAN_RULES,
];

fn extra_for(extra: &HashMap<Language, Vec<String>>, language: Language) -> &[String] {
    extra.get(&language).map(|v| v.as_slice()).unwrap_or(&[])
}

/// Config key selecting the generic rule set for extra keywords
pub const GENERIC_KEYWORD_KEY: &str = "generic";

#[derive(Debug, Clone)]
pub struct PatternRule {
    pub name: String,
    regex: Regex,
    pub base_confidence: f32,
    pub category: PatternCategory,
}

impl PatternRule {
    fn compile(name: &str, pattern: &str, base_confidence: f32, category: PatternCategory) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|source| OutlineError::PatternRule {
            name: name.to_string(),
            source,
        })?;
        Ok(Self {
            name: name.to_string(),
            regex,
            base_confidence,
            category,
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

#[derive(Debug, Clone)]
pub struct RuleSet {
    pub language: Language,
    rules: Vec<PatternRule>,
}

impl RuleSet {
    fn compile(definition: &LanguageRules, extra_keywords: &[String]) -> Result<Self> {
        let mut rules = Vec::new();
        for (name, pattern, confidence, category) in definition.structural {
            rules.push(PatternRule::compile(name, pattern, *confidence, *category)?);
        }
        if definition.inherit_numbering {
            for (name, pattern, confidence, category) in LATIN_NUMBERING {
                rules.push(PatternRule::compile(name, pattern, *confidence, *category)?);
            }
        }

        let keywords: Vec<String> = definition
            .keywords
            .iter()
            .map(|k| k.to_string())
            .chain(extra_keywords.iter().map(|k| normalize_for_matching(k)))
            .filter(|k| !k.is_empty())
            .collect();
        let (leading, contained) = if keywords.is_empty() {
            (None, None)
        } else {
            let alternation = keywords
                .iter()
                .map(|k| regex::escape(k))
                .collect::<Vec<_>>()
                .join("|");
            let (leading, contained) = if definition.word_bounded {
                (
                    format!(r"(?i)^(?:{})\b", alternation),
                    format!(r"(?i)\b(?:{})\b", alternation),
                )
            } else {
                (format!("^(?:{})", alternation), format!("(?:{})", alternation))
            };
            (Some(leading), Some(contained))
        };

        if let Some(pattern) = leading {
            rules.push(PatternRule::compile(
                "keyword_leading",
                &pattern,
                KEYWORD_LEADING_CONFIDENCE,
                Keyword,
            )?);
        }
        for (name, pattern, confidence, category) in definition.shape {
            rules.push(PatternRule::compile(name, pattern, *confidence, *category)?);
        }
        if let Some(pattern) = contained {
            rules.push(PatternRule::compile(
                "keyword_contained",
                &pattern,
                KEYWORD_CONTAINED_CONFIDENCE,
                Keyword,
            )?);
        }

        Ok(Self {
            language: definition.language,
            rules,
        })
    }

    pub fn first_match(&self, text: &str) -> Option<&PatternRule> {
        self.rules.iter().find(|rule| rule.is_match(text))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// All compiled rule sets. Built once per classifier and shared read-only.
#[derive(Debug, Clone)]
pub struct PatternLibrary {
    language_sets: HashMap<Language, RuleSet>,
    generic: RuleSet,
}

impl PatternLibrary {
    pub fn builtin() -> Result<Self> {
        Self::with_extra_keywords(&BTreeMap::new())
    }

    pub fn from_config(config: &PatternConfig) -> Result<Self> {
        Self::with_extra_keywords(&config.extra_keywords)
    }

    fn with_extra_keywords(extra: &BTreeMap<String, Vec<String>>) -> Result<Self> {
        // Unrecognised tags extend the generic set
        let mut per_language: HashMap<Language, Vec<String>> = HashMap::new();
        for (tag, keywords) in extra {
            let language = if tag.eq_ignore_ascii_case(GENERIC_KEYWORD_KEY) {
                Language::Unknown
            } else {
                Language::from_tag(tag)
            };
            per_language
                .entry(language)
                .or_default()
                .extend(keywords.iter().cloned());
        }
        let mut language_sets = HashMap::new();
        for definition in LANGUAGE_RULES {
            let set = RuleSet::compile(definition, extra_for(&per_language, definition.language))?;
            language_sets.insert(definition.language, set);
        }
        // Languages without a dedicated set (English) only get extra keywords
        // through the generic set
        let mut generic_extra = extra_for(&per_language, Language::Unknown).to_vec();
        generic_extra.extend_from_slice(extra_for(&per_language, Language::English));
        let generic = RuleSet::compile(&GENERIC_RULES, &generic_extra)?;

        Ok(Self {
            language_sets,
            generic,
        })
    }

    /// Rule sets to try for `language`, most specific first; always ends
    /// with the generic set
    pub fn chain(&self, language: Language) -> impl Iterator<Item = &RuleSet> {
        self.language_sets
            .get(&language)
            .into_iter()
            .chain(std::iter::once(&self.generic))
    }

    pub fn has_dedicated_rules(&self, language: Language) -> bool {
        self.language_sets.contains_key(&language)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternMatch {
    pub rule: String,
    pub confidence: f32,
    pub category: PatternCategory,
    pub rule_language: Language,
}

// PatternMatcher - scores fragment text against the language-appropriate rule chain
pub struct PatternMatcher {
    library: Arc<PatternLibrary>,
    max_heading_chars: usize,
    max_heading_words: usize,
    min_heading_chars: usize,
}

impl PatternMatcher {
    pub fn new(library: Arc<PatternLibrary>, config: &PatternConfig) -> Self {
        Self {
            library,
            max_heading_chars: config.max_heading_chars,
            max_heading_words: config.max_heading_words,
            min_heading_chars: config.min_heading_chars,
        }
    }

    pub fn match_text(&self, text: &str, language: Language) -> Option<PatternMatch> {
        let normalized = normalize_for_matching(text);
        let chars = normalized.chars().count();
        if chars < self.min_heading_chars
            || chars > self.max_heading_chars
            || normalized.split_whitespace().count() > self.max_heading_words
        {
            return None;
        }

        self.library.chain(language).find_map(|set| {
            set.first_match(&normalized).map(|rule| PatternMatch {
                rule: rule.name.clone(),
                confidence: rule.base_confidence,
                category: rule.category,
                rule_language: set.language,
            })
        })
    }

    pub fn score_text(&self, text: &str, language: Language) -> SignalScore {
        match self.match_text(text, language) {
            Some(m) => SignalScore::new(SignalSource::Pattern, m.confidence).with_category(m.category),
            None => SignalScore::zero(SignalSource::Pattern),
        }
    }
}

impl SignalDetector for PatternMatcher {
    fn source(&self) -> SignalSource {
        SignalSource::Pattern
    }

    fn score(&self, index: usize, ctx: &DocumentContext<'_>) -> Option<SignalScore> {
        let fragment = ctx.fragment(index);
        let language = ctx.language.resolve(&fragment.language_tag);
        Some(self.score_text(&fragment.text, language))
    }
}

/// NFKC-normalize and collapse whitespace
pub fn normalize_for_matching(text: &str) -> String {
    let normalized: String = text.nfkc().collect();
    normalized.split_whitespace().collect::<Vec<_>>().join(" ")
}

static LEADING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+(?:\.\d+)*)").unwrap());

/// Depth of a leading section number: "2" → 1, "2.1" → 2, "2.1.3" → 3
pub fn numbering_depth(text: &str) -> Option<usize> {
    let normalized = normalize_for_matching(text);
    LEADING_NUMBER
        .captures(&normalized)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().split('.').filter(|p| !p.is_empty()).count())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> PatternMatcher {
        PatternMatcher::new(
            Arc::new(PatternLibrary::builtin().unwrap()),
            &PatternConfig::default(),
        )
    }

    fn category(text: &str, language: Language) -> Option<PatternCategory> {
        matcher().match_text(text, language).map(|m| m.category)
    }

    #[test]
    fn builtin_rules_compile() {
        let library = PatternLibrary::builtin().unwrap();
        assert!(library.has_dedicated_rules(Language::Japanese));
        assert!(!library.has_dedicated_rules(Language::English));
        assert_eq!(library.chain(Language::English).count(), 1);
        assert_eq!(library.chain(Language::Korean).count(), 2);
    }

    #[test]
    fn latin_structural_patterns() {
        assert_eq!(category("1. Introduction", Language::English), Some(Numbered));
        assert_eq!(category("2.1 Sampling Strategy", Language::English), Some(SubNumbered));
        assert_eq!(category("Chapter 3 Results", Language::English), Some(Chapter));
        assert_eq!(category("Part did not arrive", Language::English), None);
        assert_eq!(category("Appendix A", Language::English), Some(Section));
        assert_eq!(category("IV. Findings", Language::English), Some(RomanNumeral));
        assert_eq!(category("SUMMARY OF RESULTS", Language::English), Some(Keyword));
        assert_eq!(category("EXECUTIVE SUMMARY", Language::English), Some(AllCaps));
        assert_eq!(category("FINANCIAL HIGHLIGHTS", Language::English), Some(AllCaps));
        assert_eq!(category("Company Confidential", Language::English), Some(TitleCase));
    }

    #[test]
    fn keyword_position_changes_confidence() {
        let m = matcher();
        let leading = m.match_text("Summary of findings", Language::English).unwrap();
        assert_eq!(leading.confidence, KEYWORD_LEADING_CONFIDENCE);
        let inner = m
            .match_text("a brief summary follows below", Language::English)
            .unwrap();
        assert_eq!(inner.confidence, KEYWORD_CONTAINED_CONFIDENCE);
    }

    #[test]
    fn long_text_never_matches() {
        let sentence = "1. The committee reviewed every quarterly filing and found that the \
                        totals agreed with the ledger in all material respects this year";
        assert!(matcher().match_text(sentence, Language::English).is_none());
        assert_eq!(matcher().score_text(sentence, Language::English).value, 0.0);
    }

    #[test]
    fn cjk_rules_need_the_language_set() {
        assert_eq!(category("第1章 概要", Language::Japanese), Some(Chapter));
        assert_eq!(category("第１章　概要", Language::Japanese), Some(Chapter));
        assert_eq!(category("第一章 引言", Language::Chinese), Some(Chapter));
        assert_eq!(category("제1장 서론", Language::Korean), Some(Chapter));
        assert_eq!(category("【概要】", Language::Japanese), Some(Bracketed));
        // Generic Latin rules do not recognise CJK markers
        assert_eq!(category("第1章 概要", Language::Unknown), None);
    }

    #[test]
    fn language_set_falls_through_to_generic() {
        assert_eq!(category("1. Introducción", Language::Spanish), Some(Numbered));
        assert_eq!(category("Capítulo 2", Language::Spanish), Some(Chapter));
        assert_eq!(category("Zusammenfassung", Language::German), Some(Keyword));
    }

    #[test]
    fn extra_keywords_extend_sets() {
        let mut config = PatternConfig::default();
        config
            .extra_keywords
            .insert("generic".to_string(), vec!["Milestones".to_string()]);
        let m = PatternMatcher::new(Arc::new(PatternLibrary::from_config(&config).unwrap()), &config);
        let hit = m.match_text("milestones reached", Language::English).unwrap();
        assert_eq!(hit.category, Keyword);
    }

    #[test]
    fn numbering_depth_counts_components() {
        assert_eq!(numbering_depth("1. Introduction"), Some(1));
        assert_eq!(numbering_depth("2.1 Sampling"), Some(2));
        assert_eq!(numbering_depth("３.２.１ 詳細"), Some(3));
        assert_eq!(numbering_depth("Introduction"), None);
    }
}
