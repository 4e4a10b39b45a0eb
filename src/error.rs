use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::transform::TransformError;

#[derive(Error, Debug)]
pub enum ViewerError {
    #[error("Can't open {}: {reason}", .path.display())]
    Decode { path: PathBuf, reason: String },

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error("Can't delete {}: {source}", .path.display())]
    Delete {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No images left")]
    Empty,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ViewerError>;
