use thiserror::Error;

pub type Result<T> = std::result::Result<T, OutlineError>;

#[derive(Error, Debug)]
pub enum OutlineError {
    /// The document's time budget ran out; no partial outline is produced
    #[error("processing document '{document_id}' exceeded {limit_ms}ms during {stage}")]
    ProcessingTimeout {
        document_id: String,
        stage: String,
        limit_ms: u64,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid heading prototypes: {0}")]
    InvalidPrototypes(String),

    #[error("invalid pattern rule '{name}': {source}")]
    PatternRule {
        name: String,
        #[source]
        source: regex::Error,
    },

    #[error("failed to build scoring worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

impl OutlineError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, OutlineError::ProcessingTimeout { .. })
    }
}
