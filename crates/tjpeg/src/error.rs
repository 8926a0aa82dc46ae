use std::fmt;
use tjpeg_base::TensorError;

/// Error type for libturbojpeg operations
#[derive(Debug)]
pub enum TurboError {
    /// None of the candidate shared libraries could be loaded.
    LibraryLoad(String),
    /// Native handle creation failed.
    Initialization { code: i32, message: String },
    /// The JPEG source could not be read.
    Io(std::io::Error),
    /// Rejected before any native call was made.
    InvalidArgument(String),
    /// Header parsing or decompression failed in the native library.
    Decode { code: i32, message: String },
    /// Compression failed in the native library.
    Encode { code: i32, message: String },
    Tensor(TensorError),
    /// The loaded library does not export an optional entry point.
    Unsupported(String),
    /// A blocking decode task panicked or was cancelled.
    Task(String),
}

impl TurboError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        TurboError::InvalidArgument(message.into())
    }

    /// Native error code, for errors that came out of libturbojpeg
    pub fn code(&self) -> Option<i32> {
        match self {
            TurboError::Initialization { code, .. }
            | TurboError::Decode { code, .. }
            | TurboError::Encode { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Native error string, for errors that came out of libturbojpeg
    pub fn native_message(&self) -> Option<&str> {
        match self {
            TurboError::Initialization { message, .. }
            | TurboError::Decode { message, .. }
            | TurboError::Encode { message, .. } => Some(message),
            _ => None,
        }
    }
}

impl fmt::Display for TurboError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurboError::LibraryLoad(msg) => write!(f, "library load error: {msg}"),
            TurboError::Initialization { code, message } => {
                write!(f, "handle initialization failed ({code}): {message}")
            }
            TurboError::Io(err) => write!(f, "io error: {err}"),
            TurboError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            TurboError::Decode { code, message } => write!(f, "decode error ({code}): {message}"),
            TurboError::Encode { code, message } => write!(f, "encode error ({code}): {message}"),
            TurboError::Tensor(err) => write!(f, "tensor error: {err}"),
            TurboError::Unsupported(msg) => write!(f, "unsupported: {msg}"),
            TurboError::Task(msg) => write!(f, "task error: {msg}"),
        }
    }
}

impl std::error::Error for TurboError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TurboError::Io(err) => Some(err),
            TurboError::Tensor(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TurboError {
    fn from(err: std::io::Error) -> Self {
        TurboError::Io(err)
    }
}

impl From<TensorError> for TurboError {
    fn from(err: TensorError) -> Self {
        TurboError::Tensor(err)
    }
}

/// Result type for libturbojpeg operations
pub type Result<T> = std::result::Result<T, TurboError>;
