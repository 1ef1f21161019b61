#[derive(thiserror::Error, Debug)]
pub enum DatabaseError {
    #[error("database I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
