use crate::config::SemanticConfig;
use crate::embedding::{cosine_similarity, mean_vector, EmbeddingProvider, PrototypeSet};
use crate::types::{clamp_unit, SignalScore, SignalSource};
use log::warn;
use std::sync::Arc;

use super::engine::{DocumentContext, SignalDetector};

/// Scores how much a fragment reads like a heading: similarity to the
/// prototype headings, nudged by how much it stands apart from its
/// same-page neighbours.
pub struct SemanticValidator {
    provider: Arc<dyn EmbeddingProvider>,
    prototypes: Arc<PrototypeSet>,
    config: SemanticConfig,
}

impl SemanticValidator {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        prototypes: Arc<PrototypeSet>,
        config: &SemanticConfig,
    ) -> Self {
        Self {
            provider,
            prototypes,
            config: config.clone(),
        }
    }

    pub fn score_embeddings(&self, embedding: &[f32], context: &[&[f32]]) -> f32 {
        let raw = clamp_unit(self.prototypes.max_similarity(embedding));
        let adjustment = match mean_vector(context) {
            Some(mean) => self.contrast_adjustment(cosine_similarity(embedding, &mean)),
            None => 0.0,
        };
        clamp_unit(raw + adjustment)
    }

    /// Positive when the fragment is distinct from its context, negative
    /// when it blends in; bounded by `contrast_weight`
    pub fn contrast_adjustment(&self, context_similarity: f32) -> f32 {
        let bound = self.config.contrast_weight;
        (bound * (self.config.distinct_threshold - context_similarity)).clamp(-bound, bound)
    }
}

impl SignalDetector for SemanticValidator {
    fn source(&self) -> SignalSource {
        SignalSource::Semantic
    }

    fn is_expensive(&self) -> bool {
        true
    }

    fn score(&self, index: usize, ctx: &DocumentContext<'_>) -> Option<SignalScore> {
        let dimension = self.prototypes.dimension();
        let embedding = ctx.embedding(index, self.provider.as_ref())?;
        if embedding.len() != dimension {
            warn!(
                "Embedding for fragment {} has dimension {}, prototypes have {}; semantic signal skipped",
                index,
                embedding.len(),
                dimension
            );
            return None;
        }

        let context: Vec<Arc<Vec<f32>>> = ctx
            .context_indices(index, self.config.context_window)
            .into_iter()
            .filter_map(|j| ctx.embedding(j, self.provider.as_ref()))
            .filter(|e| e.len() == dimension)
            .collect();
        let context_refs: Vec<&[f32]> = context.iter().map(|e| e.as_slice()).collect();

        Some(SignalScore::new(
            SignalSource::Semantic,
            self.score_embeddings(&embedding, &context_refs),
        ))
    }
}
