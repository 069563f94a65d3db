use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StillreelError {
    /// An answer that failed validation. The message is shown to the user as-is.
    #[error("{0}")]
    InvalidInput(String),

    #[error("No images found in {}", .0.display())]
    NoImages(PathBuf),

    #[error("Encoder not found: looked for {0}")]
    EncoderNotFound(String),

    #[error("Failed to decode {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Invalid config: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StillreelError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        StillreelError::InvalidInput(msg.into())
    }

    /// Failures the user caused or can fix by rearranging the directory.
    /// These are reported and end the run quietly instead of bubbling up.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            StillreelError::InvalidInput(_)
                | StillreelError::NoImages(_)
                | StillreelError::EncoderNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, StillreelError>;
