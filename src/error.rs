//! Error kinds shared by the ingestion, cache, index, and query layers.
//!
//! Every kind propagates unchanged to the caller. A cached embedding that no
//! longer matches the configured model or dimensions is *not* an error; it
//! surfaces as [`CacheLookup::Stale`](crate::cache::CacheLookup::Stale) and is
//! treated as a cache miss.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// An external command could not be spawned, exited non-zero, or
    /// produced output that could not be interpreted.
    #[error("process error: {0}")]
    Process(String),

    /// A cached note line is malformed or internally inconsistent.
    #[error("failed to decode note: {0}")]
    Decode(String),

    /// The vector index could not be opened, read, or written.
    #[error("index store error: {0}")]
    Store(String),

    /// The embedding provider failed or returned an unusable vector.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// The conversational model failed to produce a reply.
    #[error("conversation error: {0}")]
    Conversation(String),

    /// A repository setting holds a value that cannot be parsed.
    #[error("invalid repository setting: {0}")]
    Config(String),
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Store(e.to_string())
    }
}
