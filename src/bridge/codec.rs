//! Stateless codec for the agent wire protocol.
//!
//! The agent emits newline-delimited JSON objects discriminated by a `type`
//! field. A line that fails to decode is dropped, never propagated, so one
//! malformed line cannot abort a run. Unknown `type` values are preserved
//! verbatim as an opaque stream event rather than dropped.

use serde_json::Value;

/// Token accounting from `assistant` and `result` messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
}

impl Usage {
    fn from_value(usage: &Value) -> Self {
        let get = |key: &str| usage.get(key).and_then(Value::as_u64).unwrap_or(0);
        Self {
            input_tokens: get("input_tokens"),
            output_tokens: get("output_tokens"),
            cache_creation_tokens: get("cache_creation_input_tokens"),
            cache_read_tokens: get("cache_read_input_tokens"),
        }
    }
}

/// Final accounting carried by a `result` message.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub usage: Usage,
    pub session_id: Option<String>,
    pub cost_usd: Option<f64>,
    pub duration_ms: Option<u64>,
    pub num_turns: Option<u64>,
    pub result: Option<String>,
    pub is_error: bool,
}

/// One block of an `assistant`/`user` message's content array.
#[derive(Debug, Clone)]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        /// Opaque structured payload; only the question coordinator ever
        /// imposes a shape on it.
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: Value,
        is_error: bool,
    },
}

/// One decoded wire message. Closed set; anything else lands in `Stream`.
#[derive(Debug, Clone)]
pub enum AgentMessage {
    System {
        subtype: Option<String>,
        session_id: Option<String>,
    },
    Assistant {
        model: Option<String>,
        stop_reason: Option<String>,
        content: Vec<ContentBlock>,
        usage: Option<Usage>,
    },
    User {
        content: Vec<ContentBlock>,
    },
    Result(RunStats),
    /// Fallback for unrecognized `type` values; the raw object is kept.
    Stream {
        kind: String,
        payload: Value,
    },
}

/// Decodes one line of agent output. Returns `None` for blank or malformed
/// lines and for objects without a string `type` field.
pub fn decode_line(line: &str) -> Option<AgentMessage> {
    if line.trim().is_empty() {
        return None;
    }

    let json: Value = serde_json::from_str(line).ok()?;
    let msg_type = json.get("type").and_then(Value::as_str)?.to_string();

    match msg_type.as_str() {
        "system" => Some(AgentMessage::System {
            subtype: str_field(&json, "subtype"),
            session_id: str_field(&json, "session_id"),
        }),
        "assistant" => {
            // Block fields may sit on the object itself or under a nested
            // `message` envelope.
            let message = json.get("message").unwrap_or(&json);
            Some(AgentMessage::Assistant {
                model: str_field(message, "model"),
                stop_reason: str_field(message, "stop_reason"),
                content: decode_content(message),
                usage: message.get("usage").map(Usage::from_value),
            })
        }
        "user" => {
            let message = json.get("message").unwrap_or(&json);
            Some(AgentMessage::User {
                content: decode_content(message),
            })
        }
        "result" => {
            let cost_usd = json
                .get("total_cost_usd")
                .or_else(|| json.get("cost_usd"))
                .and_then(Value::as_f64);
            Some(AgentMessage::Result(RunStats {
                usage: json.get("usage").map(Usage::from_value).unwrap_or_default(),
                session_id: str_field(&json, "session_id"),
                cost_usd,
                duration_ms: json.get("duration_ms").and_then(Value::as_u64),
                num_turns: json.get("num_turns").and_then(Value::as_u64),
                result: str_field(&json, "result"),
                is_error: json
                    .get("is_error")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            }))
        }
        _ => Some(AgentMessage::Stream {
            kind: msg_type,
            payload: json,
        }),
    }
}

/// Encodes a tool-response reply as a single wire line.
pub fn tool_result_line(tool_use_id: &str, content: &Value, is_error: bool) -> String {
    serde_json::json!({
        "type": "user",
        "content": [{
            "type": "tool_result",
            "tool_use_id": tool_use_id,
            "content": content,
            "is_error": is_error,
        }],
    })
    .to_string()
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(String::from)
}

fn decode_content(message: &Value) -> Vec<ContentBlock> {
    let Some(arr) = message.get("content").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut blocks = Vec::new();
    for item in arr {
        let block_type = item.get("type").and_then(Value::as_str).unwrap_or("text");
        match block_type {
            "text" => {
                if let Some(text) = item.get("text").and_then(Value::as_str) {
                    blocks.push(ContentBlock::Text {
                        text: text.to_string(),
                    });
                }
            }
            "tool_use" => {
                let id = item.get("id").and_then(Value::as_str).unwrap_or("");
                let name = item.get("name").and_then(Value::as_str).unwrap_or("");
                if !name.is_empty() {
                    blocks.push(ContentBlock::ToolUse {
                        id: id.to_string(),
                        name: name.to_string(),
                        input: item.get("input").cloned().unwrap_or(Value::Null),
                    });
                }
            }
            "tool_result" => {
                blocks.push(ContentBlock::ToolResult {
                    tool_use_id: item
                        .get("tool_use_id")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string(),
                    content: item.get("content").cloned().unwrap_or(Value::Null),
                    is_error: item
                        .get("is_error")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                });
            }
            _ => {}
        }
    }
    blocks
}

#[cfg(test)]
#[path = "tests/codec_tests.rs"]
mod tests;
