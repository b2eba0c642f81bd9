use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("authentication rejected (HTTP 401); check the API token")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("gave up on {url} after {attempts} attempts")]
    RetriesExhausted { url: String, attempts: usize },

    #[error("no Location header on redirect from {0}")]
    MissingLocation(String),

    #[error("asset key '{key}' not found on item {item_id}")]
    AssetKeyNotFound { item_id: String, key: String },

    #[error("API token contains invalid header characters")]
    InvalidToken(#[from] reqwest::header::InvalidHeaderValue),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
