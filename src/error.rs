use thiserror::Error;

// Main Engine Error Type

#[derive(Error, Debug)]
pub enum ColocError {
    #[error("Channel {channel} does not exist: image has {channel_count} channel(s)")]
    ChannelNotFound { channel: usize, channel_count: usize },
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Image I/O failed: {0}")]
    ImageLoad(#[from] image::ImageError),
    #[error("Failed to serialize report row: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("The worker pool is no longer accepting images.")]
    WorkerUnavailable,
    #[error("A worker panicked while analysing an image: {0}")]
    WorkerPanicked(String),
}

pub type Result<T> = std::result::Result<T, ColocError>;
