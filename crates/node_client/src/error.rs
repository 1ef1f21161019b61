#[derive(thiserror::Error, Debug)]
pub enum NodeClientError {
    #[error("node request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("node returned a malformed response: {0}")]
    MalformedResponse(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
