use crate::config::HierarchyConfig;
use crate::types::*;
use log::debug;
use serde::Serialize;
use std::cmp::Ordering;

use super::font_analysis::{key_to_size, size_key, DocumentFontProfile, SizeKey};
use super::pattern_detection::numbering_depth;

/// A candidate after level assignment, still carrying the geometry the
/// merge and ordering steps need
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignedHeading {
    pub level: HeadingLevel,
    pub text: String,
    pub page: u32,
    /// Reading-order index of the (first) source fragment
    pub index: usize,
    pub position: BoundingBox,
    pub font_size: f32,
    pub confidence: f32,
    pub category: Option<PatternCategory>,
}

impl AssignedHeading {
    fn from_candidate(candidate: &Candidate, level: HeadingLevel) -> Self {
        Self {
            level,
            text: candidate.fragment.text.trim().to_string(),
            page: candidate.fragment.page,
            index: candidate.index,
            position: candidate.fragment.position,
            font_size: candidate.fragment.font_size,
            confidence: candidate.merged_confidence,
            category: candidate.pattern_category(),
        }
    }

    pub fn to_entry(&self) -> HeadingEntry {
        HeadingEntry {
            level: self.level,
            text: self.text.clone(),
            page: self.page,
        }
    }
}

// HierarchyAssigner - picks the title and maps candidate font sizes to heading tiers
pub struct HierarchyAssigner<'a> {
    config: &'a HierarchyConfig,
    font_profile: &'a DocumentFontProfile,
}

impl<'a> HierarchyAssigner<'a> {
    pub fn new(config: &'a HierarchyConfig, font_profile: &'a DocumentFontProfile) -> Self {
        Self {
            config,
            font_profile,
        }
    }

    pub fn assign(&self, candidates: &[Candidate]) -> Vec<AssignedHeading> {
        let title = self.select_title(candidates);
        let title_key = title.map(|i| size_key(candidates[i].fragment.font_size));
        let tiers = self.size_tiers(candidates, title_key);
        debug!(
            "Hierarchy: body {:.1}pt, tiers {:?}, title {:?}",
            self.font_profile.body_size,
            tiers.iter().map(|k| key_to_size(*k)).collect::<Vec<_>>(),
            title.map(|i| candidates[i].fragment.text.as_str())
        );

        let mut assigned = Vec::with_capacity(candidates.len());
        for (i, candidate) in candidates.iter().enumerate() {
            if Some(i) == title {
                assigned.push(AssignedHeading::from_candidate(candidate, HeadingLevel::Title));
                continue;
            }
            match self.level_for(candidate, &tiers) {
                Some(level) => assigned.push(AssignedHeading::from_candidate(candidate, level)),
                None => debug!(
                    "Dropped body-size candidate \"{}\" (weak pattern/semantic evidence)",
                    candidate.fragment.text
                ),
            }
        }
        assigned
    }

    /// Largest page-1 candidate; ties go to higher confidence, then earlier
    /// reading order
    pub fn select_title(&self, candidates: &[Candidate]) -> Option<usize> {
        if !self.config.detect_title {
            return None;
        }
        let first_page: Vec<usize> = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| c.fragment.page == 1)
            .map(|(i, _)| i)
            .collect();
        let max_key = first_page
            .iter()
            .map(|i| size_key(candidates[*i].fragment.font_size))
            .max()?;

        if self.config.title_requires_size_contrast
            && key_to_size(max_key) <= self.font_profile.body_size + self.config.size_tolerance
        {
            return None;
        }

        first_page
            .into_iter()
            .filter(|i| size_key(candidates[*i].fragment.font_size) == max_key)
            .min_by(|a, b| {
                candidates[*b]
                    .merged_confidence
                    .total_cmp(&candidates[*a].merged_confidence)
                    .then(candidates[*a].index.cmp(&candidates[*b].index))
            })
    }

    /// Distinct heading sizes above body text, largest first. Sizes within
    /// tolerance of each other share a tier; the title's size is excluded.
    fn size_tiers(&self, candidates: &[Candidate], title_key: Option<SizeKey>) -> Vec<SizeKey> {
        let tolerance_key = size_key(self.config.size_tolerance);
        let body = self.font_profile.body_size + self.config.size_tolerance;

        let mut keys: Vec<SizeKey> = candidates
            .iter()
            .map(|c| size_key(c.fragment.font_size))
            .filter(|k| key_to_size(*k) > body)
            .filter(|k| title_key.map_or(true, |t| t.abs_diff(*k) > tolerance_key))
            .collect();
        keys.sort_unstable_by(|a, b| b.cmp(a));
        keys.dedup();

        let mut tiers: Vec<SizeKey> = Vec::new();
        for key in keys {
            match tiers.last() {
                Some(last) if last - key <= tolerance_key => continue,
                _ => tiers.push(key),
            }
            if tiers.len() == self.config.tiers {
                break;
            }
        }
        tiers
    }

    fn level_for(&self, candidate: &Candidate, tiers: &[SizeKey]) -> Option<HeadingLevel> {
        let size = candidate.fragment.font_size;
        if size > self.font_profile.body_size + self.config.size_tolerance {
            // Larger than the top tier (e.g. title-sized) is still H1;
            // smaller than the last tier falls into the last level
            let key = size_key(size);
            let tolerance_key = size_key(self.config.size_tolerance);
            let depth = tiers
                .iter()
                .position(|tier| key + tolerance_key >= *tier)
                .map(|p| p + 1)
                .unwrap_or(tiers.len().max(1));
            return Some(self.clamp_depth(depth));
        }

        let evidence = candidate
            .score(SignalSource::Pattern)
            .unwrap_or(0.0)
            .max(candidate.score(SignalSource::Semantic).unwrap_or(0.0));
        if evidence < self.config.body_heading_min_signal {
            return None;
        }
        Some(self.level_from_text(candidate))
    }

    /// Level for body-size headings, read from the text itself
    fn level_from_text(&self, candidate: &Candidate) -> HeadingLevel {
        let depth = match candidate.pattern_category() {
            Some(PatternCategory::Chapter) => 1,
            Some(PatternCategory::Section) => 2,
            Some(PatternCategory::Numbered) | Some(PatternCategory::SubNumbered) => {
                numbering_depth(&candidate.fragment.text).unwrap_or(1)
            }
            _ => self.config.tiers,
        };
        self.clamp_depth(depth)
    }

    fn clamp_depth(&self, depth: usize) -> HeadingLevel {
        HeadingLevel::from_depth(depth.clamp(1, self.config.tiers))
    }
}

/// Stable page-then-vertical ordering; reading order breaks exact ties
pub fn reading_order(a: &AssignedHeading, b: &AssignedHeading) -> Ordering {
    a.page
        .cmp(&b.page)
        .then(a.position.y.total_cmp(&b.position.y))
        .then(a.index.cmp(&b.index))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(index: usize, text: &str, page: u32, size: f32, confidence: f32) -> Candidate {
        Candidate {
            index,
            fragment: TextFragment::new(text, page, size),
            scores: vec![SignalScore::new(SignalSource::Font, 0.5)],
            merged_confidence: confidence,
        }
    }

    fn with_pattern(mut c: Candidate, value: f32, category: PatternCategory) -> Candidate {
        c.scores
            .push(SignalScore::new(SignalSource::Pattern, value).with_category(category));
        c
    }

    fn profile(body: f32) -> DocumentFontProfile {
        DocumentFontProfile {
            body_size: body,
            ..DocumentFontProfile::default()
        }
    }

    #[test]
    fn tiers_follow_descending_size() {
        let config = HierarchyConfig::default();
        let profile = profile(12.0);
        let candidates = vec![
            candidate(0, "Annual Report", 1, 24.0, 0.9),
            candidate(1, "Overview", 1, 18.0, 0.8),
            candidate(2, "Market", 2, 15.0, 0.7),
            candidate(3, "Regions", 2, 13.5, 0.6),
            candidate(4, "Footnotes", 3, 13.0, 0.6),
        ];
        let levels: Vec<_> = HierarchyAssigner::new(&config, &profile)
            .assign(&candidates)
            .into_iter()
            .map(|h| h.level)
            .collect();
        assert_eq!(
            levels,
            vec![
                HeadingLevel::Title,
                HeadingLevel::H1,
                HeadingLevel::H2,
                HeadingLevel::H3,
                HeadingLevel::H3
            ]
        );
    }

    #[test]
    fn title_tie_breaks_on_confidence_then_order() {
        let config = HierarchyConfig::default();
        let profile = profile(12.0);
        let candidates = vec![
            candidate(0, "First", 1, 20.0, 0.6),
            candidate(1, "Second", 1, 20.0, 0.9),
            candidate(2, "Third", 1, 20.0, 0.9),
        ];
        let assigner = HierarchyAssigner::new(&config, &profile);
        assert_eq!(assigner.select_title(&candidates), Some(1));
    }

    #[test]
    fn no_title_without_size_contrast() {
        let config = HierarchyConfig::default();
        let profile = profile(12.0);
        let candidates = vec![with_pattern(
            candidate(0, "1. Introduction", 1, 12.0, 0.6),
            0.9,
            PatternCategory::Numbered,
        )];
        let assigned = HierarchyAssigner::new(&config, &profile).assign(&candidates);
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].level, HeadingLevel::H1);
    }

    #[test]
    fn body_size_levels_come_from_numbering() {
        let config = HierarchyConfig::default();
        let profile = profile(11.0);
        let candidates = vec![
            with_pattern(candidate(0, "2.1 Sampling", 2, 11.0, 0.6), 0.9, PatternCategory::SubNumbered),
            with_pattern(candidate(1, "2.1.4 Weights", 2, 11.0, 0.6), 0.9, PatternCategory::SubNumbered),
            with_pattern(candidate(2, "Chapter 3", 3, 11.0, 0.6), 0.95, PatternCategory::Chapter),
            with_pattern(candidate(3, "Appendix B", 3, 11.0, 0.6), 0.85, PatternCategory::Section),
            with_pattern(candidate(4, "Our Findings", 3, 11.0, 0.5), 0.55, PatternCategory::TitleCase),
        ];
        let levels: Vec<_> = HierarchyAssigner::new(&config, &profile)
            .assign(&candidates)
            .into_iter()
            .map(|h| (h.text, h.level))
            .collect();
        assert_eq!(
            levels,
            vec![
                ("2.1 Sampling".to_string(), HeadingLevel::H2),
                ("2.1.4 Weights".to_string(), HeadingLevel::H3),
                ("Chapter 3".to_string(), HeadingLevel::H1),
                ("Appendix B".to_string(), HeadingLevel::H2),
            ]
        );
    }
}
