#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("malformed metadata.json: {0}")]
    InvalidMetadata(String),
    #[error("pool rejected a restored credential: {0}")]
    Pool(#[from] coproxy_pool::PoolError),
    #[error("incorrect password")]
    InvalidPassword,
}
