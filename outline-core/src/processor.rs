use crate::config::ClassifierConfig;
use crate::embedding::{EmbeddingProvider, PrototypeSet};
use crate::error::Result;
use crate::language::{LanguageIdentifier, LanguageProfile, LanguageProfileBuilder};
use crate::rules::dedup::Deduplicator;
use crate::rules::section_detection::HierarchyAssigner;
use crate::rules::spatial_clustering::SpatialClusteringRule;
use crate::rules::{
    debug_pipeline_fragments, Deadline, DocumentContext, DocumentFontProfile, FragmentValidator,
    LayoutIndex, PatternLibrary, RuleEngine, SemanticValidator, ValidationReport,
};
use crate::types::*;
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Captured intermediate outputs of one classification run.
/// Used for testing and diagnostics; lets you inspect each stage boundary.
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationTrace {
    pub outline: DocumentOutline,
    pub language: LanguageProfile,
    pub font_profile: DocumentFontProfile,
    pub validation: ValidationReport,
    /// One entry per input fragment, in input order
    pub signals: Vec<FragmentSignals>,
    pub timings: Vec<(String, Duration)>,
}

/// Simple profiler that collects timings for pipeline steps
pub struct StepProfiler {
    enabled: bool,
    timings: Vec<(String, Duration)>,
}

impl StepProfiler {
    /// Timings are always collected; `enabled` controls per-step logging
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            timings: Vec::new(),
        }
    }

    pub fn time_step<F, R>(&mut self, step_name: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let result = f();
        let elapsed = start.elapsed();

        if self.enabled {
            debug!("{}: {:.2}ms", step_name, elapsed.as_secs_f64() * 1000.0);
        }
        self.timings.push((step_name.to_string(), elapsed));
        result
    }

    pub fn timings(&self) -> &[(String, Duration)] {
        &self.timings
    }

    pub fn log_summary(&self) {
        if !self.enabled || self.timings.is_empty() {
            return;
        }

        let total: Duration = self.timings.iter().map(|(_, d)| *d).sum();
        debug!("Performance summary:");
        for (step, duration) in &self.timings {
            let percentage = if total.is_zero() {
                0.0
            } else {
                (duration.as_secs_f64() / total.as_secs_f64()) * 100.0
            };
            debug!(
                "   {:.<35} {:.2}ms ({:.1}%)",
                step,
                duration.as_secs_f64() * 1000.0,
                percentage
            );
        }
        debug!("   {:.<35} {:.2}ms", "Total", total.as_secs_f64() * 1000.0);
    }

    fn into_timings(self) -> Vec<(String, Duration)> {
        self.timings
    }
}

/// Turns one document's fragments into a Title/H1/H2/H3 outline.
///
/// Rule tables, prototypes and the worker pool are built once and are
/// read-only afterwards, so one classifier can serve many documents
/// concurrently.
pub struct OutlineClassifier {
    config: ClassifierConfig,
    engine: RuleEngine,
    identifier: Option<Arc<dyn LanguageIdentifier>>,
    pool: rayon::ThreadPool,
}

impl OutlineClassifier {
    /// Validates `config` and builds the cheap detectors. Semantic scoring
    /// stays off until an embedding provider is attached.
    pub fn new(config: ClassifierConfig) -> Result<Self> {
        config.validate()?;
        let library = Arc::new(PatternLibrary::from_config(&config.pattern)?);
        let engine = RuleEngine::new(&config, library);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.processing.workers)
            .thread_name(|i| format!("outline-score-{}", i))
            .build()?;

        debug!(
            "Outline classifier ready: detectors {:?}, threshold {:.2}, {} workers",
            engine.active_sources(),
            config.confidence_threshold,
            pool.current_num_threads()
        );

        Ok(Self {
            config,
            engine,
            identifier: None,
            pool,
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(ClassifierConfig::default())
    }

    /// Attach an embedding provider using the built-in prototype phrases.
    /// If the prototypes cannot be embedded the classifier keeps running
    /// without the semantic signal.
    pub fn with_embedding_provider(self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        match PrototypeSet::from_phrases(provider.as_ref(), PrototypeSet::default_phrases()) {
            Ok(prototypes) => self.with_semantic(provider, prototypes),
            Err(e) => {
                warn!(
                    "Could not build heading prototypes, semantic signal disabled: {:#}",
                    e
                );
                self
            }
        }
    }

    /// Attach an embedding provider with caller-supplied prototypes
    pub fn with_semantic(mut self, provider: Arc<dyn EmbeddingProvider>, prototypes: PrototypeSet) -> Self {
        debug!(
            "Semantic detector: {} with {} prototypes of dimension {}",
            provider.name(),
            prototypes.len(),
            prototypes.dimension()
        );
        let validator = SemanticValidator::new(provider, Arc::new(prototypes), &self.config.semantic);
        self.engine.set_semantic(validator);
        self
    }

    pub fn with_language_identifier(mut self, identifier: Arc<dyn LanguageIdentifier>) -> Self {
        self.identifier = Some(identifier);
        self
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn has_semantic(&self) -> bool {
        self.engine.active_sources().contains(&SignalSource::Semantic)
    }

    pub fn classify(&self, input: &DocumentInput) -> Result<DocumentOutline> {
        Ok(self.classify_detailed(input)?.outline)
    }

    /// Full run keeping every intermediate result. Fails only when the
    /// document's time budget runs out.
    pub fn classify_detailed(&self, input: &DocumentInput) -> Result<ClassificationTrace> {
        let document_id = input.document_id.as_str();
        let fragments = input.fragments.as_slice();
        let deadline = Deadline::new(self.config.processing.timeout());
        let mut profiler = StepProfiler::new(log::log_enabled!(log::Level::Debug));

        // Document aggregates, all complete before any fragment is scored
        let validation = profiler.time_step("1. Fragment Validation", || {
            FragmentValidator::new(input.page_count).validate(fragments)
        });
        deadline.check(document_id, "fragment validation")?;

        let language = profiler.time_step("2. Language Profile", || {
            LanguageProfileBuilder::new(&self.config.language, self.identifier.as_deref()).build(
                input.language.as_ref(),
                fragments,
                &validation,
            )
        });
        let font_profile = profiler.time_step("3. Font Profile", || {
            DocumentFontProfile::build(fragments, &validation)
        });
        let layout = profiler.time_step("4. Page Layout", || LayoutIndex::build(fragments, &validation));
        deadline.check(document_id, "document profiling")?;

        debug!(
            "Document '{}': {} usable of {} fragments, language {} ({:?}), body {:.1}pt",
            document_id,
            validation.usable_count(),
            fragments.len(),
            language.language.tag(),
            language.source,
            font_profile.body_size
        );

        let context = DocumentContext::new(
            document_id,
            fragments,
            &validation,
            &font_profile,
            &language,
            &layout,
            &deadline,
        );
        let signals = profiler.time_step("5. Fragment Scoring", || {
            self.pool.install(|| self.engine.score_document(&context))
        })?;
        deadline.check(document_id, "fragment scoring")?;

        let candidates = self.engine.candidates(&context, &signals);
        let assigned = profiler.time_step("6. Hierarchy Assignment", || {
            HierarchyAssigner::new(&self.config.hierarchy, &font_profile).assign(&candidates)
        });
        deadline.check(document_id, "hierarchy assignment")?;

        let headings = profiler.time_step("7. Deduplication", || {
            let size_tolerance = self.config.hierarchy.size_tolerance;
            let clusters = SpatialClusteringRule::new(&self.config.dedup, size_tolerance).cluster_lines(
                fragments,
                &validation,
                font_profile.body_size,
                &signals,
            );
            Deduplicator::new(&self.config.dedup, size_tolerance).apply(
                assigned,
                &clusters,
                fragments,
                input.effective_page_count(),
            )
        });
        deadline.check(document_id, "deduplication")?;

        debug_pipeline_fragments(
            "Outline",
            headings
                .iter()
                .enumerate()
                .map(|(i, h)| (i, h.text.as_str(), format!("{} page {}", h.level.as_str(), h.page))),
            &self.config.debug,
        );

        let title = headings
            .iter()
            .find(|h| h.level == HeadingLevel::Title)
            .map(|h| h.text.clone());
        let outline = DocumentOutline {
            document_id: document_id.to_string(),
            title,
            headings,
        };

        profiler.log_summary();
        info!(
            "Classified '{}': {} candidates → {} headings in {:.1}ms",
            document_id,
            candidates.len(),
            outline.len(),
            deadline.elapsed().as_secs_f64() * 1000.0
        );

        Ok(ClassificationTrace {
            outline,
            language,
            font_profile,
            validation,
            signals,
            timings: profiler.into_timings(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiler_keeps_timings_when_logging_is_off() {
        let mut profiler = StepProfiler::new(false);
        let value = profiler.time_step("step", || 41 + 1);
        assert_eq!(value, 42);
        assert_eq!(profiler.timings().len(), 1);
        assert_eq!(profiler.timings()[0].0, "step");
    }

    #[test]
    fn classifier_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<OutlineClassifier>();
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = ClassifierConfig::default();
        config.confidence_threshold = 1.5;
        assert!(matches!(
            OutlineClassifier::new(config),
            Err(crate::error::OutlineError::InvalidConfig(_))
        ));
    }
}
