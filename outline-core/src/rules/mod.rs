// Heading rules - one sub-module per pipeline stage:
// - validation.rs: fragment data-quality checks
// - pattern_detection.rs: language-tagged pattern rule tables
// - font_analysis.rs: document font profile and font signal
// - layout_analysis.rs: page layout and structural signal
// - semantic_validation.rs: prototype similarity and context contrast
// - merger.rs: weighted confidence merge
// - engine.rs: RuleEngine, detector plan and shared utilities
// - section_detection.rs: title selection and heading levels
// - spatial_clustering.rs: multi-line heading merge
// - dedup.rs: page numbers, running headers, final ordering

pub mod dedup;
pub mod engine;
pub mod font_analysis;
pub mod layout_analysis;
pub mod merger;
pub mod pattern_detection;
pub mod section_detection;
pub mod semantic_validation;
pub mod spatial_clustering;
pub mod validation;

pub use engine::*;
pub use font_analysis::{DocumentFontProfile, FontProfiler};
pub use layout_analysis::{LayoutIndex, StructuralAnalyzer};
pub use merger::ConfidenceMerger;
pub use pattern_detection::{PatternLibrary, PatternMatcher};
pub use semantic_validation::SemanticValidator;
pub use validation::{FragmentValidator, ValidationIssue, ValidationReport};
