use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tag error: {0}")]
    Tag(#[from] lofty::error::LoftyError),

    #[error("no tags in {0:?}")]
    NoTags(PathBuf),

    #[error("failed to decode {path:?}: {message}")]
    Decode { path: PathBuf, message: String },

    #[error("invalid embedded tags: {0}")]
    EmbeddedTags(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
