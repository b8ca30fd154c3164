/// Result alias that carries the custom [`BitwaveError`] type.
pub type Result<T> = std::result::Result<T, BitwaveError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum BitwaveError {
    /// Bad magic or a structurally unusable header.
    #[error("invalid bitwave data: {0}")]
    Format(String),
    /// A declared section needs more bytes than the input holds.
    #[error("file truncated while reading {section}: needed {needed} bytes, {available} available")]
    TruncatedFile {
        section: &'static str,
        needed: usize,
        available: usize,
    },
    /// The sample payload does not divide into whole frames.
    #[error("sample payload of {len} bytes is not a multiple of the {stride}-byte frame stride")]
    Alignment { len: usize, stride: usize },
    /// A buffer handed to the encoder or engine is malformed.
    #[error("invalid audio buffer: {0}")]
    InvalidBuffer(String),
    /// The output device cannot open a stream with the buffer's channel count.
    #[error("output device offers {device} channels but the buffer has {buffer}")]
    ChannelMismatch { device: u16, buffer: u16 },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A control operation was issued in a state that does not allow it.
    #[error("invalid playback state: {0}")]
    InvalidState(&'static str),
    /// Failure reported by the audio output backend.
    #[error("audio device error: {0}")]
    Device(String),
    /// Free-form message for the command line tooling.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl BitwaveError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub(crate) fn device(err: impl std::fmt::Display) -> Self {
        Self::Device(err.to_string())
    }
}
