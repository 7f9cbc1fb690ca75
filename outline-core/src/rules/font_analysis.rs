use crate::config::FontConfig;
use crate::types::{SignalScore, SignalSource, TextFragment};
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

use super::engine::{DocumentContext, SignalDetector};
use super::validation::ValidationReport;

/// Font sizes bucketed to a tenth of a point
pub type SizeKey = u32;

pub fn size_key(size: f32) -> SizeKey {
    (size.max(0.0) * 10.0).round() as SizeKey
}

pub fn key_to_size(key: SizeKey) -> f32 {
    key as f32 / 10.0
}

const DEFAULT_BODY_SIZE: f32 = 12.0;

#[derive(Debug, Clone, Serialize)]
pub struct DocumentFontProfile {
    /// Most frequent size among usable fragments (smaller size wins ties)
    pub body_size: f32,
    pub size_histogram: BTreeMap<SizeKey, usize>,
    pub max_size: f32,
    pub bold_ratio: f32,
    pub italic_ratio: f32,
    pub sample_count: usize,
}

impl Default for DocumentFontProfile {
    fn default() -> Self {
        Self {
            body_size: DEFAULT_BODY_SIZE,
            size_histogram: BTreeMap::new(),
            max_size: DEFAULT_BODY_SIZE,
            bold_ratio: 0.0,
            italic_ratio: 0.0,
            sample_count: 0,
        }
    }
}

impl DocumentFontProfile {
    pub fn build(fragments: &[TextFragment], validation: &ValidationReport) -> Self {
        let mut size_histogram: BTreeMap<SizeKey, usize> = BTreeMap::new();
        let mut bold = 0usize;
        let mut italic = 0usize;
        let mut sample_count = 0usize;

        for (i, fragment) in fragments.iter().enumerate() {
            if !validation.is_usable(i) || !fragment.has_font_size() {
                continue;
            }
            *size_histogram.entry(size_key(fragment.font_size)).or_insert(0) += 1;
            bold += fragment.is_bold as usize;
            italic += fragment.is_italic as usize;
            sample_count += 1;
        }

        if sample_count == 0 {
            return Self::default();
        }

        // Ascending iteration + strict comparison keeps the smaller size on ties
        let mut body_key = 0;
        let mut body_count = 0;
        for (key, count) in &size_histogram {
            if *count > body_count {
                body_key = *key;
                body_count = *count;
            }
        }
        let max_key = size_histogram.keys().next_back().copied().unwrap_or(body_key);

        let profile = Self {
            body_size: key_to_size(body_key),
            max_size: key_to_size(max_key),
            bold_ratio: bold as f32 / sample_count as f32,
            italic_ratio: italic as f32 / sample_count as f32,
            sample_count,
            size_histogram,
        };

        debug!(
            "Font profile: body {:.1}pt, max {:.1}pt, {} distinct sizes, bold {:.0}%, italic {:.0}%",
            profile.body_size,
            profile.max_size,
            profile.size_histogram.len(),
            profile.bold_ratio * 100.0,
            profile.italic_ratio * 100.0
        );
        profile
    }

    /// One size for the whole document: size carries no evidence
    pub fn is_uniform(&self) -> bool {
        self.size_histogram.len() <= 1
    }

    pub fn distinct_sizes_desc(&self) -> Vec<f32> {
        self.size_histogram.keys().rev().map(|k| key_to_size(*k)).collect()
    }
}

// FontProfiler - size and style prominence relative to the document's body text
pub struct FontProfiler {
    config: FontConfig,
}

impl FontProfiler {
    pub fn new(config: &FontConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// 0 within tolerance of body size, rising linearly to 1 at the saturation multiple
    pub fn size_component(&self, profile: &DocumentFontProfile, size: f32) -> f32 {
        if size <= profile.body_size + self.config.size_tolerance || profile.body_size <= 0.0 {
            return 0.0;
        }
        let ratio = size / profile.body_size;
        ((ratio - 1.0) / (self.config.saturation_multiple - 1.0)).clamp(0.0, 1.0)
    }

    /// Bold/italic only count while they are a minority style in the document
    pub fn style_component(&self, profile: &DocumentFontProfile, fragment: &TextFragment) -> f32 {
        let mut bonus = 0.0;
        if fragment.is_bold && profile.bold_ratio < self.config.style_minority_ratio {
            bonus += self.config.bold_bonus;
        }
        if fragment.is_italic && profile.italic_ratio < self.config.style_minority_ratio {
            bonus += self.config.italic_bonus;
        }
        bonus
    }

    pub fn score_fragment(&self, profile: &DocumentFontProfile, fragment: &TextFragment) -> SignalScore {
        let value = self.size_component(profile, fragment.font_size)
            + self.style_component(profile, fragment);
        SignalScore::new(SignalSource::Font, value)
    }
}

impl SignalDetector for FontProfiler {
    fn source(&self) -> SignalSource {
        SignalSource::Font
    }

    fn score(&self, index: usize, ctx: &DocumentContext<'_>) -> Option<SignalScore> {
        let fragment = ctx.fragment(index);
        if !fragment.has_font_size() {
            return Some(SignalScore::zero(SignalSource::Font));
        }
        // Abstain rather than vote 0 so the weight moves to the other detectors
        if ctx.font_profile.is_uniform() {
            return None;
        }
        Some(self.score_fragment(ctx.font_profile, fragment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::validation::FragmentValidator;

    fn profile_of(fragments: &[TextFragment]) -> DocumentFontProfile {
        let report = FragmentValidator::new(0).validate(fragments);
        DocumentFontProfile::build(fragments, &report)
    }

    #[test]
    fn body_size_is_mode_with_smaller_tie_break() {
        let fragments = vec![
            TextFragment::new("a", 1, 11.0),
            TextFragment::new("b", 1, 11.0),
            TextFragment::new("c", 1, 10.0),
            TextFragment::new("d", 1, 10.0),
            TextFragment::new("e", 1, 18.0),
        ];
        let profile = profile_of(&fragments);
        assert_eq!(profile.body_size, 10.0);
        assert_eq!(profile.max_size, 18.0);
        assert_eq!(profile.distinct_sizes_desc(), vec![18.0, 11.0, 10.0]);
        assert!(!profile.is_uniform());
    }

    #[test]
    fn unusable_fragments_do_not_vote() {
        let fragments = vec![
            TextFragment::new("body", 1, 12.0),
            TextFragment::new("", 1, 30.0),
            TextFragment::new("bad", 1, -4.0),
            TextFragment::new("unread", 1, 0.0),
        ];
        let profile = profile_of(&fragments);
        assert_eq!(profile.sample_count, 1);
        assert!(profile.is_uniform());
        assert_eq!(profile.body_size, 12.0);
    }

    #[test]
    fn size_component_scales_and_saturates() {
        let profiler = FontProfiler::new(&FontConfig::default());
        let profile = DocumentFontProfile {
            body_size: 12.0,
            ..DocumentFontProfile::default()
        };
        assert_eq!(profiler.size_component(&profile, 12.4), 0.0);
        assert!((profiler.size_component(&profile, 15.0) - 0.5).abs() < 1e-5);
        assert_eq!(profiler.size_component(&profile, 24.0), 1.0);
    }

    #[test]
    fn bold_bonus_only_for_minority_style() {
        let profiler = FontProfiler::new(&FontConfig::default());
        let fragment = TextFragment::new("Key Terms", 1, 12.0).bold();
        let rare_bold = DocumentFontProfile {
            bold_ratio: 0.1,
            ..DocumentFontProfile::default()
        };
        let all_bold = DocumentFontProfile {
            bold_ratio: 0.9,
            ..DocumentFontProfile::default()
        };
        assert!((profiler.score_fragment(&rare_bold, &fragment).value - 0.2).abs() < 1e-6);
        assert_eq!(profiler.score_fragment(&all_bold, &fragment).value, 0.0);
    }
}
