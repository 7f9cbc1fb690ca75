use crate::config::DedupConfig;
use crate::types::{HeadingEntry, HeadingLevel, TextFragment};
use log::debug;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

use super::section_detection::{reading_order, AssignedHeading};
use super::spatial_clustering::{LineClusters, SpatialClusteringRule};

static PAGE_NUMBER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:page\s*)?\d{1,4}(?:\s*(?:/|of)\s*\d{1,4})?$|^[-–—]\s*\d{1,4}\s*[-–—]$").unwrap()
});

pub fn is_page_number(text: &str) -> bool {
    let normalized: String = text.nfkc().collect();
    PAGE_NUMBER_REGEX.is_match(normalized.trim())
}

/// Comparison key for repeat detection: NFKC, lowercase, single spaces
pub fn normalize_heading_text(text: &str) -> String {
    let normalized: String = text.nfkc().collect::<String>().to_lowercase();
    normalized.split_whitespace().collect::<Vec<_>>().join(" ")
}

// Deduplicator - final cleanup between level assignment and the outline
pub struct Deduplicator<'a> {
    config: &'a DedupConfig,
    size_tolerance: f32,
}

impl<'a> Deduplicator<'a> {
    pub fn new(config: &'a DedupConfig, size_tolerance: f32) -> Self {
        Self {
            config,
            size_tolerance,
        }
    }

    /// `clusters` groups the wrapped heading lines of `fragments`, see
    /// [`SpatialClusteringRule::cluster_lines`]
    pub fn apply(
        &self,
        headings: Vec<AssignedHeading>,
        clusters: &LineClusters,
        fragments: &[TextFragment],
        page_count: u32,
    ) -> Vec<HeadingEntry> {
        let mut headings = self.drop_page_numbers(headings);
        headings.sort_by(reading_order);
        let headings = SpatialClusteringRule::new(self.config, self.size_tolerance)
            .apply(headings, clusters, fragments);
        let headings = self.suppress_running_headers(headings, page_count);
        self.unique_entries(headings)
    }

    fn drop_page_numbers(&self, headings: Vec<AssignedHeading>) -> Vec<AssignedHeading> {
        if !self.config.drop_page_numbers {
            return headings;
        }
        headings
            .into_iter()
            .filter(|h| {
                let keep = !is_page_number(&h.text);
                if !keep {
                    debug!("Dropped page number \"{}\" on page {}", h.text, h.page);
                }
                keep
            })
            .collect()
    }

    /// Text repeated at the same level on several pages is a running
    /// header or footer; keep only its first occurrence
    fn suppress_running_headers(&self, headings: Vec<AssignedHeading>, page_count: u32) -> Vec<AssignedHeading> {
        if page_count < self.config.min_document_pages {
            return headings;
        }

        let mut pages_by_key: BTreeMap<(HeadingLevel, String), BTreeSet<u32>> = BTreeMap::new();
        for heading in &headings {
            pages_by_key
                .entry((heading.level, normalize_heading_text(&heading.text)))
                .or_default()
                .insert(heading.page);
        }

        let mut emitted: HashSet<(HeadingLevel, String)> = HashSet::new();
        headings
            .into_iter()
            .filter(|h| {
                let key = (h.level, normalize_heading_text(&h.text));
                let repeated = pages_by_key
                    .get(&key)
                    .is_some_and(|pages| pages.len() >= self.config.min_repeat_pages);
                if !repeated {
                    return true;
                }
                if emitted.contains(&key) {
                    debug!("Suppressed repeated heading \"{}\" on page {}", h.text, h.page);
                    false
                } else {
                    emitted.insert(key);
                    true
                }
            })
            .collect()
    }

    fn unique_entries(&self, headings: Vec<AssignedHeading>) -> Vec<HeadingEntry> {
        let mut seen: HashSet<HeadingEntry> = HashSet::new();
        let mut entries = Vec::with_capacity(headings.len());
        for heading in headings {
            let entry = heading.to_entry();
            if seen.insert(entry.clone()) {
                entries.push(entry);
            }
        }
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;

    fn heading(index: usize, text: &str, level: HeadingLevel, page: u32, y: f32) -> AssignedHeading {
        AssignedHeading {
            level,
            text: text.to_string(),
            page,
            index,
            position: BoundingBox::new(72.0, y, 200.0, 16.0),
            font_size: 14.0,
            confidence: 0.7,
            category: None,
        }
    }

    #[test]
    fn page_numbers_recognised() {
        assert!(is_page_number("12"));
        assert!(is_page_number("Page 3"));
        assert!(is_page_number("page 3 of 10"));
        assert!(is_page_number("– 7 –"));
        assert!(!is_page_number("2024 Outlook"));
        assert!(!is_page_number("1. Introduction"));
    }

    #[test]
    fn running_header_kept_once() {
        let config = DedupConfig::default();
        let dedup = Deduplicator::new(&config, 0.5);
        let headings = (2..=6)
            .map(|p| heading(p as usize, "Company  Confidential", HeadingLevel::H2, p, 20.0))
            .chain(std::iter::once(heading(99, "Overview", HeadingLevel::H1, 2, 200.0)))
            .collect();
        let entries = dedup.apply(headings, &LineClusters::default(), &[], 6);
        let confidential: Vec<_> = entries
            .iter()
            .filter(|e| e.text.contains("Confidential"))
            .collect();
        assert_eq!(confidential.len(), 1);
        assert_eq!(confidential[0].page, 2);
        assert!(entries.iter().any(|e| e.text == "Overview"));
    }

    #[test]
    fn short_documents_keep_repeats() {
        let config = DedupConfig::default();
        let dedup = Deduplicator::new(&config, 0.5);
        let headings = vec![
            heading(0, "Summary", HeadingLevel::H1, 1, 100.0),
            heading(1, "Summary", HeadingLevel::H1, 2, 100.0),
        ];
        assert_eq!(dedup.apply(headings, &LineClusters::default(), &[], 2).len(), 2);
    }

    #[test]
    fn output_sorted_by_page_then_position() {
        let config = DedupConfig::default();
        let dedup = Deduplicator::new(&config, 0.5);
        let headings = vec![
            heading(5, "Later", HeadingLevel::H1, 2, 100.0),
            heading(3, "Lower", HeadingLevel::H2, 1, 500.0),
            heading(4, "Upper", HeadingLevel::H2, 1, 100.0),
        ];
        let texts: Vec<_> = dedup
            .apply(headings, &LineClusters::default(), &[], 2)
            .into_iter()
            .map(|e| e.text)
            .collect();
        assert_eq!(texts, vec!["Upper", "Lower", "Later"]);
    }
}
