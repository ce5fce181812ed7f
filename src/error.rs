use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VolumeError {
    /// Stacking direction could not be determined from the reference slices.
    #[error("Geometry error: {0}")]
    Geometry(String),

    #[error("Resample error: {0}")]
    Resample(String),

    /// A decoded slice does not fit the volume cross-section it is written to.
    #[error("Slice {index} has {actual} samples, expected {}x{}", .expected.0, .expected.1)]
    ShapeMismatch {
        index: usize,
        expected: (usize, usize),
        actual: usize,
    },

    #[error("Failed to decode slice {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid volume: {0}")]
    InvalidVolume(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, VolumeError>;
