use crate::error::OutlineError;
use crate::types::SignalSource;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::time::Duration;

// Default value functions for serde
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Relative weight of each detector in the merged confidence
    #[serde(default)]
    pub weights: DetectorWeights,
    /// Merged confidence a fragment must exceed to become a candidate
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    /// Which detectors run; a detector missing from the list does not run
    #[serde(default = "default_detectors")]
    pub detectors: Vec<DetectorConfig>,
    #[serde(default)]
    pub pattern: PatternConfig,
    #[serde(default)]
    pub font: FontConfig,
    #[serde(default)]
    pub structural: StructuralConfig,
    #[serde(default)]
    pub semantic: SemanticConfig,
    #[serde(default)]
    pub language: LanguageConfig,
    #[serde(default)]
    pub hierarchy: HierarchyConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    /// Pipeline tracing for fragments matching the given patterns
    #[serde(default)]
    pub debug: DebugConfig,
}

fn default_confidence_threshold() -> f32 {
    0.45
}

fn default_detectors() -> Vec<DetectorConfig> {
    SignalSource::ALL
        .iter()
        .map(|source| DetectorConfig {
            name: *source,
            enabled: true,
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Detector this entry controls
    pub name: SignalSource,
    /// Whether this detector is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorWeights {
    pub pattern: f32,
    pub semantic: f32,
    pub font: f32,
    pub structural: f32,
}

impl DetectorWeights {
    pub fn weight(&self, source: SignalSource) -> f32 {
        match source {
            SignalSource::Pattern => self.pattern,
            SignalSource::Font => self.font,
            SignalSource::Structural => self.structural,
            SignalSource::Semantic => self.semantic,
        }
    }

    pub fn sum(&self) -> f32 {
        self.pattern + self.semantic + self.font + self.structural
    }
}

impl Default for DetectorWeights {
    fn default() -> Self {
        Self {
            pattern: 0.35,
            semantic: 0.30,
            font: 0.25,
            structural: 0.10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Text longer than this (after normalization) never matches a heading rule
    pub max_heading_chars: usize,
    pub max_heading_words: usize,
    pub min_heading_chars: usize,
    /// Additional heading keywords per language tag ("generic" for the fallback set)
    pub extra_keywords: BTreeMap<String, Vec<String>>,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            max_heading_chars: 120,
            max_heading_words: 16,
            min_heading_chars: 2,
            extra_keywords: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FontConfig {
    /// Sizes within this many points of the body size count as body text
    pub size_tolerance: f32,
    /// Size ratio (against body) at which the size component saturates
    pub saturation_multiple: f32,
    pub bold_bonus: f32,
    pub italic_bonus: f32,
    /// A style earns its bonus only while fewer than this share of fragments use it
    pub style_minority_ratio: f32,
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            size_tolerance: 0.5,
            saturation_multiple: 1.5,
            bold_bonus: 0.2,
            italic_bonus: 0.1,
            style_minority_ratio: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuralConfig {
    /// Gap (as a multiple of the page's median gap) at which isolation saturates
    pub isolation_saturation: f32,
    /// Isolation credited for a missing neighbour (top or bottom of page)
    pub edge_isolation: f32,
    /// Lines with at least this many words earn no brevity credit
    pub short_line_words: usize,
    /// Centering tolerance as a share of the page's content width
    pub center_tolerance_ratio: f32,
    /// Left-alignment tolerance in points
    pub alignment_tolerance: f32,
    /// Box taller than this many font sizes counts as a multi-line block
    pub multiline_factor: f32,
    pub multiline_penalty: f32,
}

impl Default for StructuralConfig {
    fn default() -> Self {
        Self {
            isolation_saturation: 2.5,
            edge_isolation: 0.5,
            short_line_words: 12,
            center_tolerance_ratio: 0.05,
            alignment_tolerance: 5.0,
            multiline_factor: 1.8,
            multiline_penalty: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticConfig {
    /// Same-page neighbours on each side used for the contrast check
    pub context_window: usize,
    /// Largest adjustment the contrast check may apply
    pub contrast_weight: f32,
    /// Similarity to context below which a fragment counts as distinct
    pub distinct_threshold: f32,
    /// Skip embedding when pattern and font evidence alone reach this confidence
    pub shortcut_threshold: Option<f32>,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            context_window: 1,
            contrast_weight: 0.15,
            distinct_threshold: 0.7,
            shortcut_threshold: Some(0.85),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageConfig {
    /// Document-level guesses below this confidence are not trusted
    pub confidence_floor: f32,
    /// Share of tagged text a fragment language needs to win the vote
    pub fragment_vote_share: f32,
    /// Characters of text handed to the language identifier
    pub sample_chars: usize,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            confidence_floor: 0.5,
            fragment_vote_share: 0.5,
            sample_chars: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyConfig {
    /// Number of heading levels below the title
    #[serde(default = "default_tiers")]
    pub tiers: usize,
    /// Font size difference tolerance for considering headings at the same level (points)
    #[serde(default = "default_size_tolerance")]
    pub size_tolerance: f32,
    #[serde(default = "default_true")]
    pub detect_title: bool,
    /// Title must be set larger than body text
    #[serde(default = "default_true")]
    pub title_requires_size_contrast: bool,
    /// Body-size candidates need this much pattern or semantic evidence to be kept
    #[serde(default = "default_body_heading_min_signal")]
    pub body_heading_min_signal: f32,
}

fn default_tiers() -> usize {
    3
}

fn default_size_tolerance() -> f32 {
    0.5
}

fn default_body_heading_min_signal() -> f32 {
    0.7
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            tiers: default_tiers(),
            size_tolerance: default_size_tolerance(),
            detect_title: true,
            title_requires_size_contrast: true,
            body_heading_min_signal: default_body_heading_min_signal(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub drop_page_numbers: bool,
    /// Max vertical gap (as a multiple of font size) between wrapped heading lines
    pub merge_gap_factor: f32,
    pub max_merged_chars: usize,
    /// Heading text on at least this many pages counts as a running header
    pub min_repeat_pages: usize,
    /// Running-header suppression only applies to documents this long
    pub min_document_pages: u32,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            drop_page_numbers: true,
            merge_gap_factor: 0.6,
            max_merged_chars: 200,
            min_repeat_pages: 2,
            min_document_pages: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Whole-document time budget; None disables the deadline
    pub timeout_ms: Option<u64>,
    /// Scoring worker threads (0 = one per available core)
    pub workers: usize,
}

impl ProcessingConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            timeout_ms: Some(10_000),
            workers: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub enabled: bool,
    /// Regex (or plain substring when the regex fails to compile) per entry
    pub trace_patterns: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            weights: DetectorWeights::default(),
            confidence_threshold: default_confidence_threshold(),
            detectors: default_detectors(),
            pattern: PatternConfig::default(),
            font: FontConfig::default(),
            structural: StructuralConfig::default(),
            semantic: SemanticConfig::default(),
            language: LanguageConfig::default(),
            hierarchy: HierarchyConfig::default(),
            dedup: DedupConfig::default(),
            processing: ProcessingConfig::default(),
            debug: DebugConfig::default(),
        }
    }
}

impl ClassifierConfig {
    /// Load config from file path
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: ClassifierConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config with fallback to default
    pub fn load_with_fallback(path: Option<&str>) -> Self {
        match path {
            Some(p) => Self::load_from_file(p).unwrap_or_else(|e| {
                log::warn!("Failed to load config from {}, using defaults: {:#}", p, e);
                Self::default()
            }),
            None => Self::default(),
        }
    }

    pub fn is_enabled(&self, source: SignalSource) -> bool {
        self.detectors
            .iter()
            .any(|d| d.name == source && d.enabled)
    }

    pub fn validate(&self) -> std::result::Result<(), OutlineError> {
        let invalid = |msg: String| Err(OutlineError::InvalidConfig(msg));

        for source in SignalSource::ALL {
            let w = self.weights.weight(source);
            if !w.is_finite() || w < 0.0 {
                return invalid(format!(
                    "weight for {} must be a non-negative number, got {}",
                    source.as_str(),
                    w
                ));
            }
        }
        if (self.weights.sum() - 1.0).abs() > 1e-3 {
            return invalid(format!(
                "detector weights must sum to 1.0, got {:.3}",
                self.weights.sum()
            ));
        }
        let enabled_weight: f32 = SignalSource::ALL
            .iter()
            .filter(|s| self.is_enabled(**s))
            .map(|s| self.weights.weight(*s))
            .sum();
        if enabled_weight <= 0.0 {
            return invalid("enabled detectors carry no weight".to_string());
        }
        if !(0.0..1.0).contains(&self.confidence_threshold) {
            return invalid(format!(
                "confidence_threshold must lie in [0, 1), got {}",
                self.confidence_threshold
            ));
        }
        if self.font.saturation_multiple <= 1.0 {
            return invalid("font.saturation_multiple must exceed 1.0".to_string());
        }
        if self.structural.isolation_saturation <= 1.0 {
            return invalid("structural.isolation_saturation must exceed 1.0".to_string());
        }
        if self.structural.short_line_words == 0 {
            return invalid("structural.short_line_words must be at least 1".to_string());
        }
        if self.hierarchy.tiers == 0 || self.hierarchy.tiers > 3 {
            return invalid(format!(
                "hierarchy.tiers must be between 1 and 3, got {}",
                self.hierarchy.tiers
            ));
        }
        if self.hierarchy.size_tolerance < 0.0 || self.font.size_tolerance < 0.0 {
            return invalid("size tolerances must be non-negative".to_string());
        }
        if self.pattern.max_heading_chars == 0 || self.pattern.max_heading_words == 0 {
            return invalid("pattern length ceilings must be positive".to_string());
        }
        if self.pattern.min_heading_chars > self.pattern.max_heading_chars {
            return invalid("pattern.min_heading_chars exceeds max_heading_chars".to_string());
        }
        if let Some(shortcut) = self.semantic.shortcut_threshold {
            if !(0.0..=1.0).contains(&shortcut) {
                return invalid(format!(
                    "semantic.shortcut_threshold must lie in [0, 1], got {}",
                    shortcut
                ));
            }
        }
        if self.processing.timeout_ms == Some(0) {
            return invalid("processing.timeout_ms must be positive (omit it to disable)".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ClassifierConfig::default();
        assert!(config.validate().is_ok());
        assert!((config.weights.sum() - 1.0).abs() < 1e-6);
        assert!(SignalSource::ALL.iter().all(|s| config.is_enabled(*s)));
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = r#"
confidence_threshold: 0.5
detectors:
  - name: Pattern
  - name: Font
  - name: Semantic
    enabled: false
hierarchy:
  tiers: 2
"#;
        let config: ClassifierConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.confidence_threshold, 0.5);
        assert!(config.is_enabled(SignalSource::Pattern));
        assert!(!config.is_enabled(SignalSource::Semantic));
        assert!(!config.is_enabled(SignalSource::Structural));
        assert_eq!(config.hierarchy.tiers, 2);
        assert!(config.hierarchy.detect_title);
        assert_eq!(config.dedup.max_merged_chars, 200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_negative_weight() {
        let mut config = ClassifierConfig::default();
        config.weights.font = -0.1;
        assert!(matches!(
            config.validate(),
            Err(OutlineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_all_weight_on_disabled_detectors() {
        let mut config = ClassifierConfig::default();
        config.detectors = vec![DetectorConfig {
            name: SignalSource::Structural,
            enabled: true,
        }];
        config.weights.pattern = 0.45;
        config.weights.structural = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_weights_not_summing_to_one() {
        let mut config = ClassifierConfig::default();
        config.weights.pattern = 0.5;
        assert!(matches!(
            config.validate(),
            Err(OutlineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn fallback_uses_defaults_for_missing_file() {
        let config = ClassifierConfig::load_with_fallback(Some("/nonexistent/outline.yaml"));
        assert_eq!(config.confidence_threshold, 0.45);
    }
}
