/// Domain errors shared by every cranewatch crate.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The payload as a whole cannot be interpreted.
    #[error("Malformed batch: {0}")]
    MalformedBatch(String),

    /// A single reading or field failed validation.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },
}
