#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Str(String),

    /// The event log could not be read or written.  Nothing was partially
    /// applied: a failed append means the event does not exist.
    #[error("event log I/O error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("corrupt event record: {0}")]
    Json(#[from] serde_json::Error),

    /// Too few labeled categories survive filtering to fit a model.  The
    /// counts are included so the caller can tell the user what is missing.
    #[error(
        "not enough training data: {categories} categories with {samples} \
         usable samples (need at least 2 categories)"
    )]
    InsufficientData { categories: usize, samples: usize },

    #[error("no model has been trained yet, run training first")]
    ModelNotTrained,
}

pub type Result<T> = std::result::Result<T, Error>;
