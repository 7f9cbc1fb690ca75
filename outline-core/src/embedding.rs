use crate::error::OutlineError;
use anyhow::{Context, Result};

/// Sentence-embedding backend used by the semantic validator.
///
/// Implementations must be deterministic for a given input; the classifier
/// caches vectors per document and assumes repeated calls agree.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single piece of text
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts.
    ///
    /// Default implementation calls `embed` in a loop.
    /// Override for backends with native batch support.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    fn name(&self) -> &str {
        "embedding-provider"
    }
}

/// Short multilingual headings the semantic validator compares against.
pub const DEFAULT_PROTOTYPE_PHRASES: &[&str] = &[
    // English
    "Introduction",
    "Overview",
    "Background",
    "Methodology",
    "Results",
    "Discussion",
    "Conclusion",
    "Summary",
    "Chapter 1",
    "Section 2.1",
    // Japanese
    "第1章",
    "第2節",
    "概要",
    "序論",
    "方法論",
    "結果",
    "考察",
    "結論",
    "まとめ",
    "背景",
    "目的",
    "手法",
    "実験",
    "分析",
    // Arabic
    "المقدمة",
    "الخلاصة",
    "النتائج",
    "المنهجية",
    "الخلفية",
    "الهدف",
    "الفصل الأول",
    "القسم الثاني",
    "التحليل",
    "الاستنتاج",
    // Spanish
    "Introducción",
    "Resumen",
    "Metodología",
    "Resultados",
    "Conclusión",
    "Capítulo 1",
    "Sección 2",
    "Análisis",
    "Discusión",
    // French
    "Résumé",
    "Méthodologie",
    "Résultats",
    "Chapitre 1",
    "Section 2",
    "Analyse",
    // German
    "Einführung",
    "Zusammenfassung",
    "Methodologie",
    "Ergebnisse",
    "Schlussfolgerung",
    "Kapitel 1",
    "Abschnitt 2",
    "Diskussion",
    // Chinese
    "引言",
    "概述",
    "方法",
    "结果",
    "讨论",
    "结论",
    "第一章",
    "第二节",
];

/// Embedded prototype headings, all of one dimension
#[derive(Debug, Clone)]
pub struct PrototypeSet {
    vectors: Vec<Vec<f32>>,
    dimension: usize,
}

impl PrototypeSet {
    pub fn from_vectors(vectors: Vec<Vec<f32>>) -> crate::error::Result<Self> {
        let dimension = match vectors.first() {
            Some(first) => first.len(),
            None => {
                return Err(OutlineError::InvalidPrototypes(
                    "prototype set is empty".to_string(),
                ))
            }
        };
        if dimension == 0 {
            return Err(OutlineError::InvalidPrototypes(
                "prototype vectors have zero dimension".to_string(),
            ));
        }
        for (i, vector) in vectors.iter().enumerate() {
            if vector.len() != dimension {
                return Err(OutlineError::InvalidPrototypes(format!(
                    "prototype {} has dimension {}, expected {}",
                    i,
                    vector.len(),
                    dimension
                )));
            }
            if vector.iter().any(|v| !v.is_finite()) {
                return Err(OutlineError::InvalidPrototypes(format!(
                    "prototype {} contains non-finite values",
                    i
                )));
            }
        }
        Ok(Self { vectors, dimension })
    }

    /// Embed `phrases` with `provider`, skipping duplicate phrases
    pub fn from_phrases(provider: &dyn EmbeddingProvider, phrases: &[&str]) -> Result<Self> {
        let mut unique: Vec<&str> = Vec::with_capacity(phrases.len());
        for phrase in phrases {
            if !unique.contains(phrase) {
                unique.push(phrase);
            }
        }
        let vectors = provider
            .embed_batch(&unique)
            .with_context(|| format!("embedding prototypes with {}", provider.name()))?;
        Ok(Self::from_vectors(vectors)?)
    }

    pub fn default_phrases() -> &'static [&'static str] {
        DEFAULT_PROTOTYPE_PHRASES
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Highest cosine similarity between `embedding` and any prototype
    pub fn max_similarity(&self, embedding: &[f32]) -> f32 {
        self.vectors
            .iter()
            .map(|p| cosine_similarity(embedding, p))
            .fold(0.0_f32, f32::max)
    }
}

/// Cosine similarity; zero for mismatched lengths or zero-norm vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a > 0.0 && norm_b > 0.0 {
        dot / (norm_a * norm_b)
    } else {
        0.0
    }
}

/// Element-wise mean; None when empty or dimensions disagree
pub fn mean_vector(vectors: &[&[f32]]) -> Option<Vec<f32>> {
    let dimension = vectors.first()?.len();
    if vectors.iter().any(|v| v.len() != dimension) {
        return None;
    }
    let mut mean = vec![0.0_f32; dimension];
    for vector in vectors {
        for (acc, v) in mean.iter_mut().zip(vector.iter()) {
            *acc += v;
        }
    }
    let n = vectors.len() as f32;
    mean.iter_mut().for_each(|v| *v /= n);
    Some(mean)
}
