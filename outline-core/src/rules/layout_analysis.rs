use crate::config::StructuralConfig;
use crate::types::{BoundingBox, SignalScore, SignalSource, TextFragment};
use serde::Serialize;
use std::collections::BTreeMap;

use super::engine::{DocumentContext, SignalDetector};
use super::validation::ValidationReport;

/// Vertical whitespace around one fragment; None at the top/bottom of the page
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LineNeighbours {
    pub gap_above: Option<f32>,
    pub gap_below: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageLayout {
    pub page: u32,
    /// Median gap between consecutive lines; None with fewer than two lines
    pub median_gap: Option<f32>,
    pub left_margin: f32,
    pub right_edge: f32,
    pub line_count: usize,
}

impl PageLayout {
    pub fn content_width(&self) -> f32 {
        (self.right_edge - self.left_margin).max(0.0)
    }

    pub fn center_x(&self) -> f32 {
        (self.left_margin + self.right_edge) / 2.0
    }
}

/// Per-page geometry derived once per document
#[derive(Debug, Clone, Default, Serialize)]
pub struct LayoutIndex {
    pages: BTreeMap<u32, PageLayout>,
    neighbours: Vec<LineNeighbours>,
}

impl LayoutIndex {
    pub fn build(fragments: &[TextFragment], validation: &ValidationReport) -> Self {
        let mut neighbours = vec![LineNeighbours::default(); fragments.len()];
        let mut by_page: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
        for (i, fragment) in fragments.iter().enumerate() {
            if validation.is_usable(i) && fragment.has_geometry() {
                by_page.entry(fragment.page).or_default().push(i);
            }
        }

        let mut pages = BTreeMap::new();
        for (page, mut indices) in by_page {
            // Top-to-bottom; reading order breaks ties for side-by-side pieces
            indices.sort_by(|a, b| {
                fragments[*a]
                    .position
                    .y
                    .total_cmp(&fragments[*b].position.y)
                    .then(a.cmp(b))
            });

            let mut gaps = Vec::with_capacity(indices.len());
            for pair in indices.windows(2) {
                let (above, below) = (pair[0], pair[1]);
                let gap = vertical_gap(&fragments[above].position, &fragments[below].position);
                neighbours[above].gap_below = Some(gap);
                neighbours[below].gap_above = Some(gap);
                gaps.push(gap);
            }

            let left_margin = indices
                .iter()
                .map(|i| fragments[*i].position.x)
                .fold(f32::INFINITY, f32::min);
            let right_edge = indices
                .iter()
                .map(|i| fragments[*i].position.right())
                .fold(f32::NEG_INFINITY, f32::max);

            pages.insert(
                page,
                PageLayout {
                    page,
                    median_gap: median(&mut gaps),
                    left_margin,
                    right_edge,
                    line_count: indices.len(),
                },
            );
        }

        Self { pages, neighbours }
    }

    pub fn page(&self, page: u32) -> Option<&PageLayout> {
        self.pages.get(&page)
    }

    pub fn neighbours(&self, index: usize) -> LineNeighbours {
        self.neighbours.get(index).copied().unwrap_or_default()
    }
}

/// Gap between the bottom of `above` and the top of `below`; overlapping
/// boxes (same line) count as zero
pub fn vertical_gap(above: &BoundingBox, below: &BoundingBox) -> f32 {
    (below.y - above.bottom()).max(0.0)
}

fn median(values: &mut [f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

// StructuralAnalyzer - whitespace isolation, brevity and alignment
pub struct StructuralAnalyzer {
    config: StructuralConfig,
}

const ISOLATION_ABOVE_WEIGHT: f32 = 0.25;
const ISOLATION_BELOW_WEIGHT: f32 = 0.15;
const BREVITY_WEIGHT: f32 = 0.3;
const CENTERED_CREDIT: f32 = 0.2;
const LEFT_ALIGNED_CREDIT: f32 = 0.15;
const NARROW_LINE_RATIO: f32 = 0.75;

impl StructuralAnalyzer {
    pub fn new(config: &StructuralConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn score_fragment(
        &self,
        fragment: &TextFragment,
        neighbours: LineNeighbours,
        page: Option<&PageLayout>,
    ) -> SignalScore {
        let mut value = self.brevity(fragment.word_count());

        if let Some(page) = page.filter(|_| fragment.has_geometry()) {
            let baseline = page
                .median_gap
                .filter(|g| *g > 0.01)
                .unwrap_or(fragment.font_size * 0.25)
                .max(0.01);
            value += ISOLATION_ABOVE_WEIGHT * self.isolation(neighbours.gap_above, baseline);
            value += ISOLATION_BELOW_WEIGHT * self.isolation(neighbours.gap_below, baseline);
            value += self.alignment(&fragment.position, page);

            if fragment.has_font_size()
                && fragment.position.height > self.config.multiline_factor * fragment.font_size
            {
                value *= self.config.multiline_penalty;
            }
        }

        SignalScore::new(SignalSource::Structural, value)
    }

    /// 0 at or below the baseline gap, 1 at the saturation multiple
    pub fn isolation(&self, gap: Option<f32>, baseline: f32) -> f32 {
        match gap {
            None => self.config.edge_isolation,
            Some(gap) => {
                ((gap / baseline - 1.0) / (self.config.isolation_saturation - 1.0)).clamp(0.0, 1.0)
            }
        }
    }

    pub fn brevity(&self, words: usize) -> f32 {
        if words == 0 {
            return 0.0;
        }
        let short = self.config.short_line_words as f32;
        BREVITY_WEIGHT * (1.0 - (words as f32 - 1.0) / short).clamp(0.0, 1.0)
    }

    pub fn alignment(&self, bbox: &BoundingBox, page: &PageLayout) -> f32 {
        let content_width = page.content_width();
        if content_width <= 0.0 || page.line_count < 2 {
            return 0.0;
        }
        let width_ratio = bbox.width / content_width;
        if width_ratio >= NARROW_LINE_RATIO {
            return 0.0;
        }
        let center_tolerance = (self.config.center_tolerance_ratio * content_width).max(1.0);
        if (bbox.center_x() - page.center_x()).abs() <= center_tolerance {
            CENTERED_CREDIT
        } else if (bbox.x - page.left_margin).abs() <= self.config.alignment_tolerance {
            LEFT_ALIGNED_CREDIT
        } else {
            0.0
        }
    }
}

impl SignalDetector for StructuralAnalyzer {
    fn source(&self) -> SignalSource {
        SignalSource::Structural
    }

    fn score(&self, index: usize, ctx: &DocumentContext<'_>) -> Option<SignalScore> {
        let fragment = ctx.fragment(index);
        Some(self.score_fragment(
            fragment,
            ctx.layout.neighbours(index),
            ctx.layout.page(fragment.page),
        ))
    }
}
