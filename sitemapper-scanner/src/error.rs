use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Browser error: {0}")]
    BrowserError(String),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<chromiumoxide::error::CdpError> for ScanError {
    fn from(e: chromiumoxide::error::CdpError) -> Self {
        ScanError::BrowserError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;

/// Why a fetch produced no content. Neither variant is fatal to a traversal.
#[derive(Error, Debug)]
pub enum FetchFailure {
    #[error("fetch of {url} cancelled")]
    Cancelled { url: String },

    #[error("failed to load {url} after {attempts} attempts: {last_error}")]
    Exhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },
}

impl FetchFailure {
    pub fn url(&self) -> &str {
        match self {
            FetchFailure::Cancelled { url } | FetchFailure::Exhausted { url, .. } => url,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchFailure::Cancelled { .. })
    }
}
