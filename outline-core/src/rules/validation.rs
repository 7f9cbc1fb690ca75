use crate::types::TextFragment;
use log::{debug, warn};
use serde::Serialize;

// FragmentValidator - input sanity checks ahead of every detector.
// Fragments with unusable text, a malformed size or no page are excluded
// from scoring; softer problems are reported but the fragment stays in play.
pub struct FragmentValidator {
    declared_page_count: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
    /// One flag per input fragment
    pub usable: Vec<bool>,
    pub quality_score: f32,
    pub total_fragments: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ValidationIssue {
    EmptyText {
        position: usize,
    },
    /// No font size reported; only the font evidence is lost
    MissingFontSize {
        position: usize,
    },
    MalformedFontSize {
        position: usize,
        font_size: f32,
    },
    InvalidPage {
        position: usize,
        page: u32,
    },
    /// Page exceeds the declared page count; the count is widened instead
    PageBeyondCount {
        position: usize,
        page: u32,
        page_count: u32,
    },
    /// Geometry is unusable; layout evidence is skipped for this fragment
    InvalidPosition {
        position: usize,
        coordinates: String,
    },
}

impl ValidationIssue {
    pub fn position(&self) -> usize {
        match self {
            ValidationIssue::EmptyText { position }
            | ValidationIssue::MissingFontSize { position }
            | ValidationIssue::MalformedFontSize { position, .. }
            | ValidationIssue::InvalidPage { position, .. }
            | ValidationIssue::PageBeyondCount { position, .. }
            | ValidationIssue::InvalidPosition { position, .. } => *position,
        }
    }

    /// Whether the fragment must be kept out of scoring
    pub fn excludes_fragment(&self) -> bool {
        matches!(
            self,
            ValidationIssue::EmptyText { .. }
                | ValidationIssue::MalformedFontSize { .. }
                | ValidationIssue::InvalidPage { .. }
        )
    }
}

impl ValidationReport {
    pub fn is_usable(&self, index: usize) -> bool {
        self.usable.get(index).copied().unwrap_or(false)
    }

    pub fn usable_count(&self) -> usize {
        self.usable.iter().filter(|u| **u).count()
    }

    pub fn issues_for(&self, index: usize) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |i| i.position() == index)
    }
}

impl FragmentValidator {
    /// `declared_page_count` of 0 skips the page-count check
    pub fn new(declared_page_count: u32) -> Self {
        Self {
            declared_page_count,
        }
    }

    pub fn validate(&self, fragments: &[TextFragment]) -> ValidationReport {
        let mut issues = Vec::new();
        let total_fragments = fragments.len();

        for (i, fragment) in fragments.iter().enumerate() {
            self.check_text(i, fragment, &mut issues);
            self.check_font(i, fragment, &mut issues);
            self.check_page(i, fragment, &mut issues);
            self.check_position(i, fragment, &mut issues);
        }

        let mut usable = vec![true; total_fragments];
        for issue in issues.iter().filter(|i| i.excludes_fragment()) {
            usable[issue.position()] = false;
        }

        // Calculate quality score (1.0 = perfect, 0.0 = many issues)
        let quality_score = if total_fragments == 0 {
            1.0
        } else {
            (1.0 - (issues.len() as f32 / total_fragments as f32)).max(0.0)
        };

        let report = ValidationReport {
            issues,
            usable,
            quality_score,
            total_fragments,
        };
        self.log_validation_report(&report, fragments);
        report
    }

    fn check_text(&self, i: usize, fragment: &TextFragment, issues: &mut Vec<ValidationIssue>) {
        if fragment.text.trim().is_empty() {
            issues.push(ValidationIssue::EmptyText { position: i });
        }
    }

    fn check_font(&self, i: usize, fragment: &TextFragment, issues: &mut Vec<ValidationIssue>) {
        if fragment.is_font_size_missing() {
            issues.push(ValidationIssue::MissingFontSize { position: i });
        } else if fragment.is_font_size_malformed() {
            issues.push(ValidationIssue::MalformedFontSize {
                position: i,
                font_size: fragment.font_size,
            });
        }
    }

    fn check_page(&self, i: usize, fragment: &TextFragment, issues: &mut Vec<ValidationIssue>) {
        if fragment.page == 0 {
            issues.push(ValidationIssue::InvalidPage {
                position: i,
                page: fragment.page,
            });
        } else if self.declared_page_count > 0 && fragment.page > self.declared_page_count {
            issues.push(ValidationIssue::PageBeyondCount {
                position: i,
                page: fragment.page,
                page_count: self.declared_page_count,
            });
        }
    }

    fn check_position(&self, i: usize, fragment: &TextFragment, issues: &mut Vec<ValidationIssue>) {
        let bbox = &fragment.position;
        // A zeroed box means "no geometry", not bad geometry
        if bbox.is_empty() && bbox.is_valid() {
            return;
        }
        if !bbox.is_valid() {
            issues.push(ValidationIssue::InvalidPosition {
                position: i,
                coordinates: format!(
                    "x:{:.1}, y:{:.1}, w:{:.1}, h:{:.1}",
                    bbox.x, bbox.y, bbox.width, bbox.height
                ),
            });
        }
    }

    fn log_validation_report(&self, report: &ValidationReport, fragments: &[TextFragment]) {
        debug!(
            "Fragment validation: {} of {} usable, quality {:.2}",
            report.usable_count(),
            report.total_fragments,
            report.quality_score
        );
        for issue in &report.issues {
            let preview: String = fragments
                .get(issue.position())
                .map(|f| f.text.chars().take(40).collect())
                .unwrap_or_default();
            match issue {
                ValidationIssue::EmptyText { position } => {
                    warn!("Fragment {} has no text, excluded", position)
                }
                ValidationIssue::MissingFontSize { position } => warn!(
                    "Fragment {} (\"{}\") has no font size, font evidence skipped",
                    position, preview
                ),
                ValidationIssue::MalformedFontSize {
                    position,
                    font_size,
                } => warn!(
                    "Fragment {} (\"{}\") has malformed font size {}, excluded",
                    position, preview, font_size
                ),
                ValidationIssue::InvalidPage { position, page } => warn!(
                    "Fragment {} (\"{}\") has invalid page {}, excluded",
                    position, preview, page
                ),
                ValidationIssue::PageBeyondCount {
                    position,
                    page,
                    page_count,
                } => warn!(
                    "Fragment {} is on page {} but the document declares {} pages",
                    position, page, page_count
                ),
                ValidationIssue::InvalidPosition {
                    position,
                    coordinates,
                } => warn!(
                    "Fragment {} (\"{}\") has invalid geometry ({}), layout evidence skipped",
                    position, preview, coordinates
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excludes_broken_fragments_only() {
        let fragments = vec![
            TextFragment::new("Introduction", 1, 16.0),
            TextFragment::new("   ", 1, 12.0),
            TextFragment::new("Negative size", 1, -3.0),
            TextFragment::new("Endless size", 1, f32::INFINITY),
            TextFragment::new("No page", 0, 12.0),
            TextFragment::new("Odd box", 1, 12.0).at(f32::INFINITY, 0.0, 10.0, 10.0),
        ];
        let report = FragmentValidator::new(1).validate(&fragments);
        assert_eq!(report.usable, vec![true, false, false, false, false, true]);
        assert_eq!(report.issues.len(), 5);
        assert!(report.quality_score < 1.0);
    }

    #[test]
    fn missing_font_size_keeps_fragment() {
        let fragments = vec![
            TextFragment::new("Zero size", 1, 0.0),
            TextFragment::new("Unread size", 1, f32::NAN),
        ];
        let report = FragmentValidator::new(1).validate(&fragments);
        assert_eq!(report.usable, vec![true, true]);
        assert_eq!(
            report.issues_for(1).collect::<Vec<_>>(),
            vec![&ValidationIssue::MissingFontSize { position: 1 }]
        );
    }

    #[test]
    fn page_beyond_declared_count_stays_usable() {
        let fragments = vec![TextFragment::new("Appendix", 4, 12.0)];
        let report = FragmentValidator::new(2).validate(&fragments);
        assert!(report.is_usable(0));
        assert!(matches!(
            report.issues[0],
            ValidationIssue::PageBeyondCount { page: 4, .. }
        ));
    }

    #[test]
    fn empty_input_is_perfect() {
        let report = FragmentValidator::new(0).validate(&[]);
        assert_eq!(report.quality_score, 1.0);
        assert_eq!(report.usable_count(), 0);
    }
}
