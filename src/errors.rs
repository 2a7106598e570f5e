use thiserror::Error;

/// Failures of turning a raw service payload into a catalog, or of
/// aggregating it under a strict policy.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The embedded bootstrap call was not found exactly once in an HTML page.
    #[error("tour data not found in page: {0}")]
    Extraction(String),
    /// The payload had the right shape but its content is not the expected JSON.
    #[error("malformed tour data: {0}")]
    Parse(String),
    #[error("recorded tour '{tour_id}' has no usable distance ({value:?})")]
    InvalidDistance { tour_id: String, value: Option<String> },
}
