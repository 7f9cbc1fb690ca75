use serde::{Deserialize, Serialize};

/// Tag used by decoders and identifiers when no language could be determined.
pub const UNKNOWN_LANGUAGE_TAG: &str = "unknown";

// ===== INPUT TYPES =====
// Produced by the document decoder (external). Coordinates use a top-left
// origin: `y` grows downward and marks the top of the line box.

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center_x(&self) -> f32 {
        self.x + self.width / 2.0
    }

    /// Finite coordinates and non-negative extents
    pub fn is_valid(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
            && self.width >= 0.0
            && self.height >= 0.0
    }

    /// Decoders that do not report geometry leave the box zeroed
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 && self.height <= 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFragment {
    pub text: String,
    /// Page number (1-indexed)
    pub page: u32,
    pub font_size: f32,
    pub is_bold: bool,
    pub is_italic: bool,
    pub position: BoundingBox,
    pub language_tag: String,
}

impl TextFragment {
    pub fn new(text: impl Into<String>, page: u32, font_size: f32) -> Self {
        Self {
            text: text.into(),
            page,
            font_size,
            is_bold: false,
            is_italic: false,
            position: BoundingBox::default(),
            language_tag: UNKNOWN_LANGUAGE_TAG.to_string(),
        }
    }

    pub fn bold(mut self) -> Self {
        self.is_bold = true;
        self
    }

    pub fn italic(mut self) -> Self {
        self.is_italic = true;
        self
    }

    pub fn at(mut self, x: f32, y: f32, width: f32, height: f32) -> Self {
        self.position = BoundingBox::new(x, y, width, height);
        self
    }

    pub fn with_language(mut self, tag: impl Into<String>) -> Self {
        self.language_tag = tag.into();
        self
    }

    /// A usable size the font statistics can count
    pub fn has_font_size(&self) -> bool {
        self.font_size.is_finite() && self.font_size > 0.0
    }

    /// Decoders report 0 (or NaN) when they could not read the font
    pub fn is_font_size_missing(&self) -> bool {
        self.font_size.is_nan() || self.font_size == 0.0
    }

    /// Negative or infinite: the fragment itself is suspect
    pub fn is_font_size_malformed(&self) -> bool {
        !self.is_font_size_missing() && !self.has_font_size()
    }

    /// Geometry usable for layout analysis
    pub fn has_geometry(&self) -> bool {
        self.position.is_valid() && !self.position.is_empty()
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    pub fn char_count(&self) -> usize {
        self.text.trim().chars().count()
    }
}

/// Document-level verdict of the language identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageGuess {
    pub tag: String,
    pub confidence: f32,
}

impl LanguageGuess {
    pub fn new(tag: impl Into<String>, confidence: f32) -> Self {
        Self {
            tag: tag.into(),
            confidence,
        }
    }
}

/// Everything the classifier needs for one document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInput {
    pub document_id: String,
    pub fragments: Vec<TextFragment>,
    pub page_count: u32,
    pub language: Option<LanguageGuess>,
}

impl DocumentInput {
    /// Page count defaults to the highest page referenced by a fragment
    pub fn new(document_id: impl Into<String>, fragments: Vec<TextFragment>) -> Self {
        let page_count = fragments.iter().map(|f| f.page).max().unwrap_or(0);
        Self {
            document_id: document_id.into(),
            fragments,
            page_count,
            language: None,
        }
    }

    pub fn with_page_count(mut self, page_count: u32) -> Self {
        self.page_count = page_count;
        self
    }

    pub fn with_language(mut self, tag: impl Into<String>, confidence: f32) -> Self {
        self.language = Some(LanguageGuess::new(tag, confidence));
        self
    }

    /// Declared page count, widened to cover every referenced page
    pub fn effective_page_count(&self) -> u32 {
        let referenced = self.fragments.iter().map(|f| f.page).max().unwrap_or(0);
        self.page_count.max(referenced)
    }
}

// ===== SIGNAL TYPES =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SignalSource {
    Pattern,
    Font,
    Structural,
    Semantic,
}

impl SignalSource {
    pub const ALL: [SignalSource; 4] = [
        SignalSource::Pattern,
        SignalSource::Font,
        SignalSource::Structural,
        SignalSource::Semantic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalSource::Pattern => "pattern",
            SignalSource::Font => "font",
            SignalSource::Structural => "structural",
            SignalSource::Semantic => "semantic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternCategory {
    Chapter,
    Section,
    Numbered,
    SubNumbered,
    RomanNumeral,
    Bracketed,
    Quoted,
    Bullet,
    Keyword,
    AllCaps,
    TitleCase,
}

impl PatternCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternCategory::Chapter => "chapter",
            PatternCategory::Section => "section",
            PatternCategory::Numbered => "numbered",
            PatternCategory::SubNumbered => "sub_numbered",
            PatternCategory::RomanNumeral => "roman_numeral",
            PatternCategory::Bracketed => "bracketed",
            PatternCategory::Quoted => "quoted",
            PatternCategory::Bullet => "bullet",
            PatternCategory::Keyword => "keyword",
            PatternCategory::AllCaps => "all_caps",
            PatternCategory::TitleCase => "title_case",
        }
    }

    /// Categories that open a new heading on their own (a section number or
    /// chapter marker), as opposed to continuing a wrapped one
    pub fn opens_heading(&self) -> bool {
        matches!(
            self,
            PatternCategory::Chapter
                | PatternCategory::Section
                | PatternCategory::Numbered
                | PatternCategory::SubNumbered
                | PatternCategory::RomanNumeral
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalScore {
    pub source: SignalSource,
    /// Always within [0, 1]
    pub value: f32,
    pub category: Option<PatternCategory>,
}

impl SignalScore {
    pub fn new(source: SignalSource, value: f32) -> Self {
        Self {
            source,
            value: clamp_unit(value),
            category: None,
        }
    }

    pub fn zero(source: SignalSource) -> Self {
        Self::new(source, 0.0)
    }

    pub fn with_category(mut self, category: PatternCategory) -> Self {
        self.category = Some(category);
        self
    }
}

/// Clamp into [0, 1]; non-finite values collapse to 0
pub(crate) fn clamp_unit(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

pub(crate) fn find_score(scores: &[SignalScore], source: SignalSource) -> Option<&SignalScore> {
    scores.iter().find(|s| s.source == source)
}

/// Per-fragment result of the scoring stage, kept for every fragment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FragmentSignals {
    pub index: usize,
    pub scores: Vec<SignalScore>,
    pub merged_confidence: f32,
    pub retained: bool,
}

impl FragmentSignals {
    /// Unusable fragments carry no evidence and are never retained
    pub fn excluded(index: usize) -> Self {
        Self {
            index,
            scores: Vec::new(),
            merged_confidence: 0.0,
            retained: false,
        }
    }

    pub fn score(&self, source: SignalSource) -> Option<f32> {
        find_score(&self.scores, source).map(|s| s.value)
    }

    pub fn pattern_category(&self) -> Option<PatternCategory> {
        find_score(&self.scores, SignalSource::Pattern).and_then(|s| s.category)
    }
}

/// A fragment that cleared the confidence threshold
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    /// Position of the fragment in the decoder's reading order
    pub index: usize,
    pub fragment: TextFragment,
    pub scores: Vec<SignalScore>,
    pub merged_confidence: f32,
}

impl Candidate {
    pub fn score(&self, source: SignalSource) -> Option<f32> {
        find_score(&self.scores, source).map(|s| s.value)
    }

    pub fn pattern_category(&self) -> Option<PatternCategory> {
        find_score(&self.scores, SignalSource::Pattern).and_then(|s| s.category)
    }
}

// ===== OUTPUT TYPES =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HeadingLevel {
    Title,
    H1,
    H2,
    H3,
}

impl HeadingLevel {
    /// 1 → H1, 2 → H2, anything deeper → H3
    pub fn from_depth(depth: usize) -> Self {
        match depth {
            0 | 1 => HeadingLevel::H1,
            2 => HeadingLevel::H2,
            _ => HeadingLevel::H3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HeadingLevel::Title => "Title",
            HeadingLevel::H1 => "H1",
            HeadingLevel::H2 => "H2",
            HeadingLevel::H3 => "H3",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HeadingEntry {
    pub level: HeadingLevel,
    pub text: String,
    pub page: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentOutline {
    pub document_id: String,
    pub title: Option<String>,
    /// Includes the Title entry when one was found
    pub headings: Vec<HeadingEntry>,
}

impl DocumentOutline {
    pub fn empty(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            title: None,
            headings: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.headings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headings.is_empty()
    }

    pub fn at_level(&self, level: HeadingLevel) -> impl Iterator<Item = &HeadingEntry> {
        self.headings.iter().filter(move |h| h.level == level)
    }
}
