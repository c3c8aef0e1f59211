use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HicError {
    /// Mates are not adjacent in the alignment stream
    #[error("alignment stream is not grouped by read name: {0}")]
    StreamOrdering(String),

    #[error("normalization method `{0}` requires per-contig coverage")]
    MissingCoverage(String),

    #[error("unknown normalization method `{name}` (expected one of: {expected})")]
    UnknownMethod { name: String, expected: String },

    #[error("unknown restriction enzyme `{0}`")]
    UnknownEnzyme(String),

    /// Malformed line in one of the text inputs
    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid contact artifact {path}: {message}")]
    Artifact { path: String, message: String },

    /// Invalid values handed to a matrix or model
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("model error: {0}")]
    Model(String),
}
