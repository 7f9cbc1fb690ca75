use crate::config::{ClassifierConfig, DetectorWeights};
use crate::types::{clamp_unit, find_score, SignalScore, SignalSource};

/// Weighted average of whatever detectors reported. Absent detectors drop
/// out of both numerator and denominator, so their weight is shared among
/// the rest.
#[derive(Debug, Clone)]
pub struct ConfidenceMerger {
    weights: DetectorWeights,
    threshold: f32,
}

impl ConfidenceMerger {
    pub fn new(weights: DetectorWeights, threshold: f32) -> Self {
        Self { weights, threshold }
    }

    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self::new(config.weights.clone(), config.confidence_threshold)
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn merge(&self, scores: &[SignalScore]) -> f32 {
        self.merge_sources(scores, &SignalSource::ALL)
    }

    /// Merge restricted to `sources`, summed in the given order so the
    /// result does not depend on the order detectors reported in
    pub fn merge_sources(&self, scores: &[SignalScore], sources: &[SignalSource]) -> f32 {
        let mut weighted = 0.0_f32;
        let mut total_weight = 0.0_f32;
        for source in sources {
            if let Some(score) = find_score(scores, *source) {
                let weight = self.weights.weight(*source);
                weighted += weight * score.value;
                total_weight += weight;
            }
        }
        if total_weight <= f32::EPSILON {
            0.0
        } else {
            clamp_unit(weighted / total_weight)
        }
    }

    pub fn passes(&self, confidence: f32) -> bool {
        confidence > self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merger() -> ConfidenceMerger {
        ConfidenceMerger::new(DetectorWeights::default(), 0.45)
    }

    #[test]
    fn full_evidence_is_weighted_average() {
        let scores = vec![
            SignalScore::new(SignalSource::Pattern, 1.0),
            SignalScore::new(SignalSource::Font, 0.0),
            SignalScore::new(SignalSource::Structural, 0.0),
            SignalScore::new(SignalSource::Semantic, 1.0),
        ];
        assert!((merger().merge(&scores) - 0.65).abs() < 1e-6);
    }

    #[test]
    fn missing_detector_redistributes_weight() {
        let scores = vec![
            SignalScore::new(SignalSource::Pattern, 0.9),
            SignalScore::new(SignalSource::Font, 0.9),
        ];
        assert!((merger().merge(&scores) - 0.9).abs() < 1e-6);
    }

    #[test]
    fn order_of_scores_does_not_matter() {
        let a = vec![
            SignalScore::new(SignalSource::Semantic, 0.3),
            SignalScore::new(SignalSource::Pattern, 0.7),
            SignalScore::new(SignalSource::Structural, 0.1),
        ];
        let mut b = a.clone();
        b.reverse();
        assert_eq!(merger().merge(&a).to_bits(), merger().merge(&b).to_bits());
    }

    #[test]
    fn no_evidence_merges_to_zero() {
        assert_eq!(merger().merge(&[]), 0.0);
        assert!(!merger().passes(0.45));
        assert!(merger().passes(0.4501));
    }
}
