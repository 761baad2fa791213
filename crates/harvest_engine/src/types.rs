use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct FeedError {
    pub kind: FeedFailureKind,
    pub message: String,
}

impl FeedError {
    pub fn new(kind: FeedFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedFailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    Decode,
    Network,
}

impl fmt::Display for FeedFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedFailureKind::InvalidUrl => write!(f, "invalid url"),
            FeedFailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FeedFailureKind::Timeout => write!(f, "timeout"),
            FeedFailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FeedFailureKind::Decode => write!(f, "undecodable response"),
            FeedFailureKind::Network => write!(f, "network error"),
        }
    }
}
