use anyhow::Result;
use futures::StreamExt;
use reqwest::Response;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::traits::EventStream;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Message {
        content: String,
    },

    Done {
        #[serde(skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatStreamChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    pub choices: Vec<StreamChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChoice {
    #[serde(default)]
    pub index: u32,
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delta {
    pub role: Option<String>,
    pub content: Option<String>,
}

impl ChatStreamChunk {
    fn to_stream_events(&self) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if let Some(choice) = self.choices.first() {
            if let Some(content) = &choice.delta.content {
                if !content.is_empty() {
                    events.push(StreamEvent::Message {
                        content: content.clone(),
                    });
                }
            }

            if let Some(finish_reason) = &choice.finish_reason {
                events.push(StreamEvent::Done {
                    finish_reason: Some(finish_reason.clone()),
                });
            }
        }

        events
    }
}

/// Turn an SSE `chat/completions` response body into [`StreamEvent`]s
///
/// Lines are split on `\n` from a byte buffer so multi-byte characters cut across
/// network chunks are only decoded once the full line has arrived.
pub fn parse_chat_sse_stream(response: Response) -> EventStream {
    let stream = response.bytes_stream();

    Box::pin(async_stream::stream! {
        let mut byte_chunks = Box::pin(stream);
        let mut buffer = VecDeque::with_capacity(8192);
        let mut finished = false;

        while let Some(chunk_result) = byte_chunks.next().await {
            let bytes = match chunk_result {
                Ok(bytes) => bytes,
                Err(e) => {
                    yield Err(anyhow::anyhow!("Stream error: {}", e));
                    return;
                }
            };
            buffer.extend(bytes);

            while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                let line_bytes: Vec<u8> = buffer.drain(..=newline_pos).collect();

                let Ok(line_str) = std::str::from_utf8(&line_bytes) else {
                    continue;
                };
                let line = line_str.trim();

                // Blank separators and `: keep-alive` comments carry no data
                if line.is_empty() || line.starts_with(':') {
                    continue;
                }

                if let Some(data) = line.strip_prefix("data:") {
                    let data = data.trim_start();
                    if data == "[DONE]" {
                        finished = true;
                        break;
                    }

                    match serde_json::from_str::<ChatStreamChunk>(data) {
                        Ok(chunk) => {
                            for event in chunk.to_stream_events() {
                                yield Ok(event);
                            }
                        }
                        Err(e) => yield Err(anyhow::anyhow!("Failed to parse chat chunk: {}", e)),
                    }
                }
            }

            if finished {
                break;
            }
        }

        yield Ok(StreamEvent::Done { finish_reason: None });
    })
}
