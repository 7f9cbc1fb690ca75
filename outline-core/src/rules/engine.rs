use crate::config::{ClassifierConfig, DebugConfig};
use crate::embedding::EmbeddingProvider;
use crate::error::{OutlineError, Result};
use crate::language::LanguageProfile;
use crate::types::*;
use log::{debug, warn};
use rayon::prelude::*;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use super::font_analysis::{DocumentFontProfile, FontProfiler};
use super::layout_analysis::{LayoutIndex, StructuralAnalyzer};
use super::merger::ConfidenceMerger;
use super::pattern_detection::{PatternLibrary, PatternMatcher};
use super::semantic_validation::SemanticValidator;
use super::validation::ValidationReport;

/// Debug utility function to trace fragments through the pipeline
pub fn debug_pipeline_fragments<'a>(
    stage: &str,
    fragments: impl Iterator<Item = (usize, &'a str, String)>,
    debug_config: &DebugConfig,
) {
    if !debug_config.enabled || debug_config.trace_patterns.is_empty() {
        return;
    }

    // Try regex first, fall back to simple string contains
    let matchers: Vec<(Option<Regex>, &str)> = debug_config
        .trace_patterns
        .iter()
        .map(|p| (Regex::new(p).ok(), p.as_str()))
        .collect();

    for (index, text, detail) in fragments {
        let hit = matchers.iter().any(|(regex, pattern)| match regex {
            Some(regex) => regex.is_match(text),
            None => text.contains(pattern),
        });
        if hit {
            let text_preview: String = if text.chars().count() > 50 {
                format!("{}...", text.chars().take(47).collect::<String>())
            } else {
                text.to_string()
            };
            debug!("[{}] fragment {}: \"{}\" {}", stage, index, text_preview, detail);
        }
    }
}

/// Whole-document time budget, checked between stages and per fragment
#[derive(Debug, Clone)]
pub struct Deadline {
    started: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    pub fn new(limit: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    pub fn unlimited() -> Self {
        Self::new(None)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_expired(&self) -> bool {
        self.limit.is_some_and(|limit| self.started.elapsed() > limit)
    }

    pub fn check(&self, document_id: &str, stage: &str) -> Result<()> {
        match self.limit {
            Some(limit) if self.started.elapsed() > limit => Err(OutlineError::ProcessingTimeout {
                document_id: document_id.to_string(),
                stage: stage.to_string(),
                limit_ms: limit.as_millis() as u64,
            }),
            _ => Ok(()),
        }
    }
}

/// Read-only view of one document shared by all detectors. The embedding
/// memo is the only interior state; each slot is filled at most once.
pub struct DocumentContext<'a> {
    pub document_id: &'a str,
    pub fragments: &'a [TextFragment],
    pub validation: &'a ValidationReport,
    pub font_profile: &'a DocumentFontProfile,
    pub language: &'a LanguageProfile,
    pub layout: &'a LayoutIndex,
    pub deadline: &'a Deadline,
    embeddings: Vec<OnceLock<Option<Arc<Vec<f32>>>>>,
}

impl<'a> DocumentContext<'a> {
    pub fn new(
        document_id: &'a str,
        fragments: &'a [TextFragment],
        validation: &'a ValidationReport,
        font_profile: &'a DocumentFontProfile,
        language: &'a LanguageProfile,
        layout: &'a LayoutIndex,
        deadline: &'a Deadline,
    ) -> Self {
        Self {
            document_id,
            fragments,
            validation,
            font_profile,
            language,
            layout,
            deadline,
            embeddings: (0..fragments.len()).map(|_| OnceLock::new()).collect(),
        }
    }

    pub fn fragment(&self, index: usize) -> &'a TextFragment {
        &self.fragments[index]
    }

    pub fn is_usable(&self, index: usize) -> bool {
        self.validation.is_usable(index)
    }

    /// Embedding of a fragment's text, computed on first use. A provider
    /// failure is logged once and remembered as "no embedding".
    pub fn embedding(&self, index: usize, provider: &dyn EmbeddingProvider) -> Option<Arc<Vec<f32>>> {
        let slot = self.embeddings.get(index)?;
        slot.get_or_init(|| {
            let text = self.fragments[index].text.trim();
            match provider.embed(text) {
                Ok(vector) if !vector.is_empty() && vector.iter().all(|v| v.is_finite()) => {
                    Some(Arc::new(vector))
                }
                Ok(_) => {
                    warn!(
                        "{} returned an empty or non-finite embedding for fragment {}",
                        provider.name(),
                        index
                    );
                    None
                }
                Err(e) => {
                    warn!("{} failed on fragment {}: {:#}", provider.name(), index, e);
                    None
                }
            }
        })
        .clone()
    }

    /// Up to `window` usable fragments on each side of `index`, same page only
    pub fn context_indices(&self, index: usize, window: usize) -> Vec<usize> {
        let page = self.fragments[index].page;
        let mut indices = Vec::with_capacity(window * 2);

        let mut taken = 0;
        let mut i = index;
        while taken < window && i > 0 {
            i -= 1;
            if self.fragments[i].page != page {
                break;
            }
            if self.is_usable(i) {
                indices.push(i);
                taken += 1;
            }
        }

        taken = 0;
        let mut j = index + 1;
        while taken < window && j < self.fragments.len() {
            if self.fragments[j].page != page {
                break;
            }
            if self.is_usable(j) {
                indices.push(j);
                taken += 1;
            }
            j += 1;
        }
        indices
    }
}

pub trait SignalDetector: Send + Sync {
    fn source(&self) -> SignalSource;

    /// Expensive detectors run last and may be skipped by the fast path
    fn is_expensive(&self) -> bool {
        false
    }

    /// None means the detector abstains for this fragment
    fn score(&self, index: usize, ctx: &DocumentContext<'_>) -> Option<SignalScore>;
}

pub enum Detector {
    Pattern(PatternMatcher),
    Font(FontProfiler),
    Structural(StructuralAnalyzer),
    Semantic(SemanticValidator),
}

impl Detector {
    fn inner(&self) -> &dyn SignalDetector {
        match self {
            Detector::Pattern(d) => d,
            Detector::Font(d) => d,
            Detector::Structural(d) => d,
            Detector::Semantic(d) => d,
        }
    }
}

impl SignalDetector for Detector {
    fn source(&self) -> SignalSource {
        self.inner().source()
    }

    fn is_expensive(&self) -> bool {
        self.inner().is_expensive()
    }

    fn score(&self, index: usize, ctx: &DocumentContext<'_>) -> Option<SignalScore> {
        self.inner().score(index, ctx)
    }
}

const FAST_PATH_SOURCES: [SignalSource; 2] = [SignalSource::Pattern, SignalSource::Font];

pub struct RuleEngine {
    config: ClassifierConfig,
    detectors: Vec<Detector>,
    merger: ConfidenceMerger,
}

impl RuleEngine {
    /// Builds the cheap detectors enabled in `config`; the semantic
    /// detector is attached separately once an embedding provider exists
    pub fn new(config: &ClassifierConfig, library: Arc<PatternLibrary>) -> Self {
        let mut detectors = Vec::new();
        for detector_config in &config.detectors {
            if !detector_config.enabled {
                debug!("Skipping disabled detector: {}", detector_config.name.as_str());
                continue;
            }
            let detector = match detector_config.name {
                SignalSource::Pattern => {
                    Detector::Pattern(PatternMatcher::new(library.clone(), &config.pattern))
                }
                SignalSource::Font => Detector::Font(FontProfiler::new(&config.font)),
                SignalSource::Structural => {
                    Detector::Structural(StructuralAnalyzer::new(&config.structural))
                }
                // Needs a provider
                SignalSource::Semantic => continue,
            };
            if detectors.iter().any(|d: &Detector| d.source() == detector.source()) {
                continue;
            }
            detectors.push(detector);
        }

        Self {
            config: config.clone(),
            detectors,
            merger: ConfidenceMerger::from_config(config),
        }
    }

    /// Attach (or replace) the semantic detector. Ignored when the config
    /// disables semantic scoring.
    pub fn set_semantic(&mut self, validator: SemanticValidator) {
        if !self.config.is_enabled(SignalSource::Semantic) {
            debug!("Semantic detector disabled by configuration, provider ignored");
            return;
        }
        self.detectors
            .retain(|d| d.source() != SignalSource::Semantic);
        self.detectors.push(Detector::Semantic(validator));
    }

    pub fn active_sources(&self) -> Vec<SignalSource> {
        self.detectors.iter().map(|d| d.source()).collect()
    }

    pub fn merger(&self) -> &ConfidenceMerger {
        &self.merger
    }

    /// Score every fragment on the current rayon pool. Fails as soon as the
    /// deadline passes; no partial result is returned.
    pub fn score_document(&self, ctx: &DocumentContext<'_>) -> Result<Vec<FragmentSignals>> {
        let signals = (0..ctx.fragments.len())
            .into_par_iter()
            .map(|index| {
                ctx.deadline.check(ctx.document_id, "fragment scoring")?;
                Ok(self.score_fragment(index, ctx))
            })
            .collect::<Result<Vec<_>>>()?;

        debug_pipeline_fragments(
            "Scoring",
            signals.iter().map(|s| {
                (
                    s.index,
                    ctx.fragments[s.index].text.as_str(),
                    format!("{:?} merged={:.3} retained={}", s.scores, s.merged_confidence, s.retained),
                )
            }),
            &self.config.debug,
        );
        Ok(signals)
    }

    pub fn score_fragment(&self, index: usize, ctx: &DocumentContext<'_>) -> FragmentSignals {
        if !ctx.is_usable(index) {
            return FragmentSignals::excluded(index);
        }

        let mut scores = Vec::with_capacity(self.detectors.len());
        for detector in self.detectors.iter().filter(|d| !d.is_expensive()) {
            if let Some(score) = detector.score(index, ctx) {
                scores.push(score);
            }
        }
        if !self.fast_path_reached(&scores) {
            for detector in self.detectors.iter().filter(|d| d.is_expensive()) {
                if let Some(score) = detector.score(index, ctx) {
                    scores.push(score);
                }
            }
        }

        let merged_confidence = self.merger.merge(&scores);
        FragmentSignals {
            index,
            retained: self.merger.passes(merged_confidence),
            scores,
            merged_confidence,
        }
    }

    /// Pattern and font evidence alone already clear the shortcut threshold
    fn fast_path_reached(&self, scores: &[SignalScore]) -> bool {
        match self.config.semantic.shortcut_threshold {
            Some(threshold) => self.merger.merge_sources(scores, &FAST_PATH_SOURCES) >= threshold,
            None => false,
        }
    }

    pub fn candidates(&self, ctx: &DocumentContext<'_>, signals: &[FragmentSignals]) -> Vec<Candidate> {
        signals
            .iter()
            .filter(|s| s.retained)
            .map(|s| Candidate {
                index: s.index,
                fragment: ctx.fragment(s.index).clone(),
                scores: s.scores.clone(),
                merged_confidence: s.merged_confidence,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::LanguageProfile;
    use crate::rules::validation::FragmentValidator;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    impl EmbeddingProvider for CountingEmbedder {
        fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1.0, 0.0])
        }
    }

    fn fragments() -> Vec<TextFragment> {
        vec![
            TextFragment::new("Heading", 1, 14.0),
            TextFragment::new("", 1, 12.0),
            TextFragment::new("body one", 1, 12.0),
            TextFragment::new("body two", 1, 12.0),
            TextFragment::new("next page", 2, 12.0),
        ]
    }

    #[test]
    fn context_skips_unusable_and_stops_at_page_break() {
        let fragments = fragments();
        let validation = FragmentValidator::new(2).validate(&fragments);
        let profile = DocumentFontProfile::build(&fragments, &validation);
        let language = LanguageProfile::unknown();
        let layout = LayoutIndex::build(&fragments, &validation);
        let deadline = Deadline::unlimited();
        let ctx = DocumentContext::new(
            "doc", &fragments, &validation, &profile, &language, &layout, &deadline,
        );
        assert_eq!(ctx.context_indices(0, 1), vec![2]);
        assert_eq!(ctx.context_indices(3, 1), vec![2]);
        assert_eq!(ctx.context_indices(2, 2), vec![0, 3]);
    }

    #[test]
    fn embeddings_are_memoized() {
        let fragments = fragments();
        let validation = FragmentValidator::new(2).validate(&fragments);
        let profile = DocumentFontProfile::build(&fragments, &validation);
        let language = LanguageProfile::unknown();
        let layout = LayoutIndex::build(&fragments, &validation);
        let deadline = Deadline::unlimited();
        let ctx = DocumentContext::new(
            "doc", &fragments, &validation, &profile, &language, &layout, &deadline,
        );
        let embedder = CountingEmbedder {
            calls: AtomicUsize::new(0),
        };
        for _ in 0..3 {
            assert!(ctx.embedding(0, &embedder).is_some());
        }
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn expired_deadline_reports_stage() {
        let deadline = Deadline::new(Some(Duration::from_nanos(1)));
        std::thread::sleep(Duration::from_millis(2));
        assert!(deadline.is_expired());
        match deadline.check("doc-7", "scoring") {
            Err(OutlineError::ProcessingTimeout {
                document_id, stage, ..
            }) => {
                assert_eq!(document_id, "doc-7");
                assert_eq!(stage, "scoring");
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn semantic_detector_respects_config() {
        let mut config = ClassifierConfig::default();
        config.detectors.retain(|d| d.name != SignalSource::Semantic);
        let library = Arc::new(PatternLibrary::builtin().unwrap());
        let mut engine = RuleEngine::new(&config, library);
        let prototypes = crate::embedding::PrototypeSet::from_vectors(vec![vec![1.0, 0.0]]).unwrap();
        engine.set_semantic(SemanticValidator::new(
            Arc::new(CountingEmbedder {
                calls: AtomicUsize::new(0),
            }),
            Arc::new(prototypes),
            &config.semantic,
        ));
        assert!(!engine.active_sources().contains(&SignalSource::Semantic));
    }
}
