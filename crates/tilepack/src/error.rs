use thiserror::Error;

#[derive(Error, Debug)]
pub enum TilepackError {
    #[error("required data is missing")]
    NullPtr,

    #[error("data payload is empty")]
    DataSize,

    #[error("missing or empty VPS header")]
    InvalidHeader,

    #[error("missing or empty SPS header")]
    InvalidSps,

    #[error("missing or empty PPS header")]
    InvalidPps,

    #[error("unsupported projection type: {0}")]
    InvalidProjectionType(u8),

    #[error("video stream {0} not found")]
    StreamNotFound(u8),

    #[error("extractor track {0} not found")]
    ExtractorTrackNotFound(u8),

    #[error("inconsistent data across streams: {0}")]
    InvalidData(&'static str),

    #[error("failed to create extractor track segmentation thread")]
    CreateThread,

    #[error("stream parser initialization failed")]
    ScvpInitFailed,

    #[error("undefined operation: {0}")]
    UndefinedOperation(String),

    #[error("segment writer error: {0}")]
    Segmenter(String),

    #[error(transparent)]
    IOError(#[from] std::io::Error),
}

pub type TilepackResult<T> = Result<T, TilepackError>;
