//! Operator wire protocol.
//!
//! ```text
//! client -> {"type":"subscribe","topic":"marketData"}
//! server <- {"type":"snapshot","topic":"marketData","data":[...]}
//! server <- {"type":"message","topic":"marketData","data":...}
//! client -> {"type":"message","topic":"activeChange","data":true}
//! server <- {"type":"error","message":"..."}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tribeca_bus::Topic;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Subscribe {
        topic: String,
    },
    Message {
        topic: String,
        #[serde(default)]
        data: Value,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Snapshot { topic: String, data: Vec<Value> },
    Message { topic: String, data: Value },
    Error { message: String },
}

impl ServerMessage {
    pub fn snapshot(topic: Topic, data: Vec<Value>) -> Self {
        Self::Snapshot {
            topic: topic.as_str().to_string(),
            data,
        }
    }

    pub fn message(topic: Topic, data: Value) -> Self {
        Self::Message {
            topic: topic.as_str().to_string(),
            data,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_client_messages() {
        let sub: ClientMessage =
            serde_json::from_str(r#"{"type":"subscribe","topic":"fairValue"}"#).unwrap();
        assert_eq!(
            sub,
            ClientMessage::Subscribe {
                topic: "fairValue".into()
            }
        );

        let cmd: ClientMessage =
            serde_json::from_str(r#"{"type":"message","topic":"cancelAllOrders"}"#).unwrap();
        assert_eq!(
            cmd,
            ClientMessage::Message {
                topic: "cancelAllOrders".into(),
                data: Value::Null
            }
        );
    }

    #[test]
    fn test_server_message_shape() {
        let msg = ServerMessage::message(Topic::ActiveChange, json!(true));
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "message", "topic": "activeChange", "data": true})
        );
    }
}
