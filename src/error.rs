use thiserror::Error;

/// Crate-level error taxonomy.
///
/// Empty selection results are *not* errors; operations return short or
/// empty sequences for them instead.
#[derive(Debug, Error)]
pub enum MedikError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("export error: {0}")]
    Export(#[from] csv::Error),
}

impl MedikError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        MedikError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MedikError>;
