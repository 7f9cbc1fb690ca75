use crate::config::DedupConfig;
use crate::types::{BoundingBox, FragmentSignals, HeadingLevel, TextFragment};
use log::debug;
use std::collections::HashMap;

use super::dedup::is_page_number;
use super::layout_analysis::vertical_gap;
use super::section_detection::{reading_order, AssignedHeading};
use super::validation::ValidationReport;

/// Runs of consecutive heading-sized lines that read as one wrapped heading.
/// Built from geometry and font size before any threshold is applied, so
/// the grouping is the same whichever lines end up retained.
#[derive(Debug, Clone, Default)]
pub struct LineClusters {
    cluster_of: HashMap<usize, usize>,
    members: Vec<Vec<usize>>,
}

impl LineClusters {
    pub fn cluster_of(&self, index: usize) -> Option<usize> {
        self.cluster_of.get(&index).copied()
    }

    /// Fragment indices of one cluster, top to bottom
    pub fn members(&self, cluster: usize) -> &[usize] {
        self.members.get(cluster).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn push(&mut self, members: Vec<usize>) {
        // Single lines need no merging
        if members.len() < 2 {
            return;
        }
        let cluster = self.members.len();
        for index in &members {
            self.cluster_of.insert(*index, cluster);
        }
        self.members.push(members);
    }
}

// SpatialClusteringRule - rejoins headings the decoder split across lines
pub struct SpatialClusteringRule<'a> {
    config: &'a DedupConfig,
    size_tolerance: f32,
}

impl<'a> SpatialClusteringRule<'a> {
    pub fn new(config: &'a DedupConfig, size_tolerance: f32) -> Self {
        Self {
            config,
            size_tolerance,
        }
    }

    /// Group usable lines above body size that sit directly under one
    /// another at the same size. Any other line breaks the run.
    pub fn cluster_lines(
        &self,
        fragments: &[TextFragment],
        validation: &ValidationReport,
        body_size: f32,
        signals: &[FragmentSignals],
    ) -> LineClusters {
        let mut order: Vec<usize> = (0..fragments.len())
            .filter(|i| validation.is_usable(*i) && fragments[*i].has_geometry())
            .collect();
        order.sort_by(|a, b| {
            let (fa, fb) = (&fragments[*a], &fragments[*b]);
            fa.page
                .cmp(&fb.page)
                .then(fa.position.y.total_cmp(&fb.position.y))
                .then(a.cmp(b))
        });

        let mut clusters = LineClusters::default();
        let mut current: Vec<usize> = Vec::new();
        let mut current_chars = 0;

        for index in order {
            let fragment = &fragments[index];
            if !self.is_heading_sized(fragment, body_size) {
                clusters.push(std::mem::take(&mut current));
                continue;
            }

            let continues = match (current.first(), current.last()) {
                (Some(first), Some(last)) => self.continues_heading(
                    &fragments[*first],
                    &fragments[*last],
                    fragment,
                    current_chars,
                    signals.get(index),
                ),
                _ => false,
            };
            if !continues {
                clusters.push(std::mem::take(&mut current));
                current_chars = 0;
            }
            if !current.is_empty() {
                current_chars += 1;
            }
            current_chars += fragment.char_count();
            current.push(index);
        }
        clusters.push(current);

        if !clusters.is_empty() {
            debug!("Found {} wrapped heading line groups", clusters.len());
        }
        clusters
    }

    fn is_heading_sized(&self, fragment: &TextFragment, body_size: f32) -> bool {
        fragment.has_font_size()
            && fragment.font_size > body_size + self.size_tolerance
            && !(self.config.drop_page_numbers && is_page_number(&fragment.text))
    }

    fn continues_heading(
        &self,
        first: &TextFragment,
        last: &TextFragment,
        next: &TextFragment,
        current_chars: usize,
        next_signals: Option<&FragmentSignals>,
    ) -> bool {
        if last.page != next.page {
            return false;
        }

        if (first.font_size - next.font_size).abs() > self.size_tolerance {
            return false;
        }

        // A line with its own section number starts a new heading
        if next_signals
            .and_then(|s| s.pattern_category())
            .is_some_and(|c| c.opens_heading())
        {
            return false;
        }

        if current_chars + next.char_count() + 1 > self.config.max_merged_chars {
            return false;
        }

        self.are_spatially_adjacent(&last.position, &next.position, first.font_size)
    }

    fn are_spatially_adjacent(&self, above: &BoundingBox, below: &BoundingBox, font_size: f32) -> bool {
        let same_line = (below.y - above.y).abs() <= above.height.max(below.height) * 0.5;
        if same_line {
            return true;
        }
        below.y >= above.y && vertical_gap(above, below) <= self.config.merge_gap_factor * font_size
    }

    /// Collapse retained headings onto their line groups. A group yields one
    /// heading carrying the text and box of every line in it, as soon as any
    /// one of its lines was retained.
    pub fn apply(
        &self,
        headings: Vec<AssignedHeading>,
        clusters: &LineClusters,
        fragments: &[TextFragment],
    ) -> Vec<AssignedHeading> {
        let original_count = headings.len();
        let mut clustered: Vec<AssignedHeading> = Vec::with_capacity(original_count);
        let mut slot_of_cluster: HashMap<usize, usize> = HashMap::new();

        for heading in headings {
            let Some(cluster) = clusters.cluster_of(heading.index) else {
                clustered.push(heading);
                continue;
            };
            match slot_of_cluster.get(&cluster) {
                Some(slot) => absorb_heading(&mut clustered[*slot], heading),
                None => {
                    slot_of_cluster.insert(cluster, clustered.len());
                    clustered.push(expand_heading(heading, clusters.members(cluster), fragments));
                }
            }
        }
        clustered.sort_by(reading_order);

        if clustered.len() != original_count {
            debug!(
                "Merged wrapped headings: {} → {}",
                original_count,
                clustered.len()
            );
        }
        clustered
    }
}

fn expand_heading(mut heading: AssignedHeading, members: &[usize], fragments: &[TextFragment]) -> AssignedHeading {
    let lines: Vec<&TextFragment> = members.iter().filter_map(|i| fragments.get(*i)).collect();
    let Some((first, rest)) = lines.split_first() else {
        return heading;
    };

    let mut text = first.text.trim().to_string();
    let mut position = first.position;
    for line in rest {
        text = join_fragments(&text, &line.text);
        position = merge_bounding_boxes(&position, &line.position);
    }
    heading.text = text;
    heading.position = position;
    heading.index = members[0];
    heading
}

fn absorb_heading(cluster: &mut AssignedHeading, heading: AssignedHeading) {
    cluster.confidence = cluster.confidence.max(heading.confidence);
    // Title absorbs its own continuation lines
    if heading.level == HeadingLevel::Title {
        cluster.level = HeadingLevel::Title;
    }
}

/// Merge two bounding boxes into one that encompasses both
fn merge_bounding_boxes(bbox1: &BoundingBox, bbox2: &BoundingBox) -> BoundingBox {
    let min_x = bbox1.x.min(bbox2.x);
    let min_y = bbox1.y.min(bbox2.y);
    let max_x = bbox1.right().max(bbox2.right());
    let max_y = bbox1.bottom().max(bbox2.bottom());
    BoundingBox::new(min_x, min_y, max_x - min_x, max_y - min_y)
}

/// Join two pieces of one heading; CJK-to-CJK joins take no space
pub fn join_fragments(first: &str, second: &str) -> String {
    let first = first.trim_end();
    let second = second.trim_start();
    let cjk_boundary = matches!(
        (first.chars().next_back(), second.chars().next()),
        (Some(a), Some(b)) if is_cjk(a) && is_cjk(b)
    );
    if first.is_empty() || cjk_boundary {
        format!("{}{}", first, second)
    } else {
        format!("{} {}", first, second)
    }
}

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{3040}'..='\u{30FF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{4E00}'..='\u{9FFF}'
        | '\u{AC00}'..='\u{D7AF}'
        | '\u{3000}'..='\u{303F}'
        | '\u{FF00}'..='\u{FFEF}')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::validation::FragmentValidator;
    use crate::types::{PatternCategory, SignalScore, SignalSource};

    const BODY: f32 = 11.0;

    fn line(text: &str, y: f32, size: f32) -> TextFragment {
        TextFragment::new(text, 1, size).at(72.0, y, 300.0, size * 1.2)
    }

    fn plain_signals(fragments: &[TextFragment]) -> Vec<FragmentSignals> {
        (0..fragments.len()).map(FragmentSignals::excluded).collect()
    }

    fn clusters_of(fragments: &[TextFragment], signals: &[FragmentSignals]) -> LineClusters {
        let config = DedupConfig::default();
        let validation = FragmentValidator::new(1).validate(fragments);
        SpatialClusteringRule::new(&config, 0.5).cluster_lines(fragments, &validation, BODY, signals)
    }

    fn assigned(fragments: &[TextFragment], index: usize, level: HeadingLevel, confidence: f32) -> AssignedHeading {
        let fragment = &fragments[index];
        AssignedHeading {
            level,
            text: fragment.text.clone(),
            page: fragment.page,
            index,
            position: fragment.position,
            font_size: fragment.font_size,
            confidence,
            category: None,
        }
    }

    /// Body line, then a heading wrapped over three 16pt lines 4pt apart
    fn wrapped_heading() -> Vec<TextFragment> {
        vec![
            line("Sales rose in every region during the year", 72.0, BODY),
            line("Regional Growth Across", 110.0, 16.0),
            line("Our Northern And Southern", 133.2, 16.0),
            line("Distribution Partners", 156.4, 16.0),
            line("The northern partners opened four new depots", 200.0, BODY),
        ]
    }

    #[test]
    fn wrapped_lines_form_one_group() {
        let fragments = wrapped_heading();
        let clusters = clusters_of(&fragments, &plain_signals(&fragments));
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters.members(0), &[1, 2, 3]);
        assert_eq!(clusters.cluster_of(0), None);
    }

    #[test]
    fn group_text_does_not_depend_on_retained_lines() {
        let fragments = wrapped_heading();
        let clusters = clusters_of(&fragments, &plain_signals(&fragments));
        let config = DedupConfig::default();
        let rule = SpatialClusteringRule::new(&config, 0.5);
        let full = "Regional Growth Across Our Northern And Southern Distribution Partners";

        let all = rule.apply(
            (1..=3).map(|i| assigned(&fragments, i, HeadingLevel::H1, 0.7)).collect(),
            &clusters,
            &fragments,
        );
        let outer_only = rule.apply(
            vec![
                assigned(&fragments, 1, HeadingLevel::H1, 0.7),
                assigned(&fragments, 3, HeadingLevel::H1, 0.7),
            ],
            &clusters,
            &fragments,
        );
        let middle_only = rule.apply(
            vec![assigned(&fragments, 2, HeadingLevel::H1, 0.66)],
            &clusters,
            &fragments,
        );

        for merged in [&all, &outer_only, &middle_only] {
            assert_eq!(merged.len(), 1);
            assert_eq!(merged[0].text, full);
            assert_eq!(merged[0].index, 1);
            assert_eq!(merged[0].position.y, 110.0);
        }
    }

    #[test]
    fn wrapped_title_lines_merge() {
        let fragments = vec![
            line("Annual Report on", 72.0, 24.0),
            line("Widget Production", 103.8, 24.0),
        ];
        let clusters = clusters_of(&fragments, &plain_signals(&fragments));
        let config = DedupConfig::default();
        let merged = SpatialClusteringRule::new(&config, 0.5).apply(
            vec![
                assigned(&fragments, 0, HeadingLevel::H1, 0.6),
                assigned(&fragments, 1, HeadingLevel::Title, 0.8),
            ],
            &clusters,
            &fragments,
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].text, "Annual Report on Widget Production");
        assert_eq!(merged[0].level, HeadingLevel::Title);
        assert_eq!(merged[0].confidence, 0.8);
    }

    #[test]
    fn distant_numbered_or_body_lines_stay_apart() {
        let fragments = vec![
            line("Overview", 72.0, 18.0),
            line("Scope", 300.0, 18.0),
            line("1. Scope", 400.0, 18.0),
            line("2. Methods", 425.6, 18.0),
            line("Plain body text on one line", 500.0, BODY),
            line("More plain body text below it", 516.2, BODY),
        ];
        let mut signals = plain_signals(&fragments);
        signals[3]
            .scores
            .push(SignalScore::new(SignalSource::Pattern, 0.9).with_category(PatternCategory::Numbered));
        let clusters = clusters_of(&fragments, &signals);
        assert!(clusters.is_empty());
    }

    #[test]
    fn size_change_breaks_group() {
        let fragments = vec![
            line("Annual Report", 72.0, 24.0),
            line("Introduction", 103.8, 18.0),
        ];
        assert!(clusters_of(&fragments, &plain_signals(&fragments)).is_empty());
    }

    #[test]
    fn cjk_join_has_no_space() {
        assert_eq!(join_fragments("第1章 研究の", "背景"), "第1章 研究の背景");
        assert_eq!(join_fragments("Annual", "Report"), "Annual Report");
        assert_eq!(join_fragments("概要", "Overview"), "概要 Overview");
    }
}
