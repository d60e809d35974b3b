//! Error type shared by every codec.
//!
//! Only two things can actually go wrong while compressing: the backing
//! file misbehaves, or the configuration string contains garbage.
//! A value that does not fit a codec's model is *not* an error, it takes
//! the escape path instead.
use thiserror::Error;

/// Everything that can fail in this crate
#[derive(Debug, Error)]
pub enum CodecError {
    /// reading/writing the backing stream failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// a configuration value could not be parsed (key, offending value)
    #[error("invalid value {1:?} for config key {0:?}")]
    Config(String, String),

    /// no codec of that name
    #[error("unknown algorithm {0:?}")]
    UnknownAlgorithm(String),

    /// a serialized code table in the stream cannot describe a tree
    #[error("malformed code table: {0}")]
    MalformedTable(&'static str),
}

/// Shorthand used throughout the crate
pub type Result<T> = std::result::Result<T, CodecError>;
