use {
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

/// A client request: `{id, method, params?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

/// A reply to a request: `{id, result?}` or `{id, error?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFrame {
    #[serde(default)]
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl ResponseFrame {
    pub fn ok(id: &str, result: Value) -> Self {
        Self {
            id: id.to_string(),
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: &str, code: u16, message: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            result: None,
            error: Some(ErrorDetail {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Error info carried inside a [`ResponseFrame`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: u16,
    pub message: String,
}

/// A server-initiated push: `{event, session_id?, run_seq?, data?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_seq: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl EventFrame {
    pub fn new(event: &str) -> Self {
        Self {
            event: event.to_string(),
            session_id: None,
            run_seq: None,
            data: None,
        }
    }

    /// An event scoped to one session's run.
    pub fn run(event: &str, session_id: &str, run_seq: u64) -> Self {
        Self {
            event: event.to_string(),
            session_id: Some(session_id.to_string()),
            run_seq: Some(run_seq),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}
