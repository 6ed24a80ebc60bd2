use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MergeError {
    #[error("quadrilateral needs exactly 4 points, got {0}")]
    Shape(usize),

    #[error("degenerate quadrilateral: {0}")]
    DegenerateGeometry(String),

    #[error("unsupported region format `{0}` (only `quad` is implemented)")]
    UnsupportedFormat(String),

    #[error("failed to decode region coordinates: {0}")]
    Decode(String),

    #[error("image dimensions must both be at least 2, got {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
}

pub type Result<T> = std::result::Result<T, MergeError>;
