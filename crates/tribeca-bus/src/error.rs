//! Bus error types.

use crate::Topic;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("already registered {kind} for topic {topic}")]
    AlreadyRegistered { kind: &'static str, topic: Topic },

    #[error("no receiver registered for topic {0}")]
    NoReceiver(Topic),

    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    #[error("failed to decode message for topic {topic}: {source}")]
    Decode {
        topic: Topic,
        #[source]
        source: serde_json::Error,
    },
}

pub type BusResult<T> = Result<T, BusError>;
