//! Console error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("Invalid console host: {0}")]
    InvalidHost(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

pub type ConsoleResult<T> = Result<T, ConsoleError>;
