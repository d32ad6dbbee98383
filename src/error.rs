use crate::object::ObjectId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("content {0} not found at repository head")]
    NotFound(ObjectId),

    #[error("content {0} has no usable history")]
    NoHistory(ObjectId),

    #[error("repository backend error: {0}")]
    Backend(String),

    #[error("index update failed: {0}")]
    IndexWrite(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid object id: {0}")]
    InvalidId(#[from] hex::FromHexError),
}
