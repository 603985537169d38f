use crate::models::SeriesKind;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Provider returned HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("Failed to parse provider response: {0}")]
    ParseError(String),
    #[error("Failed to parse number: {0}")]
    NumberError(String),
    #[error("Provider returned no {0} data for the requested range")]
    EmptyData(SeriesKind),
    #[error("{kind} range must be between {min} and {max} hours, got {hours}")]
    InvalidRange {
        kind: SeriesKind,
        hours: u32,
        min: u32,
        max: u32,
    },
}

impl FetchError {
    /// Network, status and parse failures: the provider is unusable right now
    pub fn is_provider_failure(&self) -> bool {
        matches!(
            self,
            FetchError::Request(_)
                | FetchError::Status(_)
                | FetchError::ParseError(_)
                | FetchError::NumberError(_)
        )
    }
}
