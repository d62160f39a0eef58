use {
    futures::StreamExt,
    serde_json::{json, Value},
    tokio::sync::mpsc,
    tokio_stream::wrappers::ReceiverStream,
    tracing::debug,
};

use crate::{
    provider::{EventStream, Provider},
    types::{Message, StreamEvent, ToolDef},
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 8192;
/// Events buffered between the SSE reader and the consumer.
const STREAM_BUFFER: usize = 64;

/// Provider for Claude models over the Anthropic Messages API.
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_request(&self, system_prompt: &str, messages: &[Message], tools: &[ToolDef]) -> Value {
        let mut body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "stream": true,
            "messages": messages,
        });
        if !system_prompt.is_empty() {
            body["system"] = json!(system_prompt);
        }
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }
        body
    }
}

impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn stream(&self, system_prompt: &str, messages: &[Message], tools: &[ToolDef]) -> EventStream {
        let body = self.build_request(system_prompt, messages, tools);
        let client = self.client.clone();
        let url = format!("{}/v1/messages", self.base_url);
        let api_key = self.api_key.clone();

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        tokio::spawn(async move {
            produce(client, url, api_key, body, tx).await;
        });
        Box::pin(ReceiverStream::new(rx))
    }
}

/// Read the SSE response and forward mapped events. Always terminates the
/// stream with `Complete` or `Error`.
async fn produce(
    client: reqwest::Client,
    url: String,
    api_key: String,
    body: Value,
    tx: mpsc::Sender<StreamEvent>,
) {
    let resp = match client
        .post(&url)
        .header("x-api-key", &api_key)
        .header("anthropic-version", API_VERSION)
        .header("content-type", "application/json")
        .json(&body)
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => {
            let _ = tx.send(StreamEvent::Error { message: e.to_string() }).await;
            return;
        },
    };

    if let Err(e) = resp.error_for_status_ref() {
        let status = e.status().map(|s| s.as_u16()).unwrap_or(0);
        let body_text = resp.text().await.unwrap_or_default();
        let _ = tx
            .send(StreamEvent::Error {
                message: format!("HTTP {status}: {body_text}"),
            })
            .await;
        return;
    }

    let mut byte_stream = resp.bytes_stream();
    let mut buf = String::new();
    let mut state = SseState::default();

    while let Some(chunk) = byte_stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                let _ = tx.send(StreamEvent::Error { message: e.to_string() }).await;
                return;
            },
        };
        buf.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(pos) = buf.find('\n') {
            let line = buf[..pos].trim().to_string();
            buf = buf[pos + 1..].to_string();

            let Some(data) = line.strip_prefix("data: ") else {
                continue;
            };
            let Ok(evt) = serde_json::from_str::<Value>(data) else {
                continue;
            };

            for mapped in state.map_event(&evt) {
                if tx.send(mapped).await.is_err() {
                    // Consumer gone; stop reading.
                    return;
                }
            }
            if state.terminal {
                return;
            }
        }
    }

    // The provider closed the connection without a terminal frame.
    if !state.terminal {
        debug!("sse stream ended without message_stop");
        let _ = tx
            .send(StreamEvent::Error {
                message: "stream closed before completion".to_string(),
            })
            .await;
    }
}

/// Tracks the in-progress tool block and stop reason across SSE frames.
#[derive(Default)]
struct SseState {
    current_tool_id: String,
    current_tool_name: String,
    tool_input_buf: String,
    stop_reason: String,
    terminal: bool,
}

impl SseState {
    /// Map one provider SSE event to zero or more stream events.
    fn map_event(&mut self, evt: &Value) -> Vec<StreamEvent> {
        match evt["type"].as_str().unwrap_or("") {
            "content_block_start" => {
                let block = &evt["content_block"];
                if block["type"] == "tool_use" {
                    self.current_tool_id = block["id"].as_str().unwrap_or("").to_string();
                    self.current_tool_name = block["name"].as_str().unwrap_or("").to_string();
                    self.tool_input_buf.clear();
                    return vec![StreamEvent::ToolUse {
                        tool_use_id: self.current_tool_id.clone(),
                        tool_name: self.current_tool_name.clone(),
                    }];
                }
                vec![]
            },
            "content_block_delta" => {
                let delta = &evt["delta"];
                match delta["type"].as_str().unwrap_or("") {
                    "text_delta" => {
                        let text = delta["text"].as_str().unwrap_or("").to_string();
                        vec![StreamEvent::Delta { text }]
                    },
                    "input_json_delta" => {
                        self.tool_input_buf
                            .push_str(delta["partial_json"].as_str().unwrap_or(""));
                        vec![]
                    },
                    _ => vec![],
                }
            },
            "content_block_stop" => {
                if self.current_tool_id.is_empty() {
                    return vec![];
                }
                let done = StreamEvent::ToolDone {
                    tool_use_id: std::mem::take(&mut self.current_tool_id),
                    tool_name: std::mem::take(&mut self.current_tool_name),
                    tool_input: std::mem::take(&mut self.tool_input_buf),
                };
                vec![done]
            },
            "message_delta" => {
                if let Some(reason) = evt["delta"]["stop_reason"].as_str() {
                    self.stop_reason = reason.to_string();
                }
                vec![]
            },
            "message_stop" => {
                self.terminal = true;
                vec![StreamEvent::Complete {
                    stop_reason: self.stop_reason.clone(),
                }]
            },
            "error" => {
                self.terminal = true;
                let message = evt["error"]["message"]
                    .as_str()
                    .unwrap_or("unknown error")
                    .to_string();
                vec![StreamEvent::Error { message }]
            },
            _ => vec![],
        }
    }
}
