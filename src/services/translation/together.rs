// Together AI chat client (OpenAI-compatible /chat/completions with SSE streaming)

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::ChatBackend;
use crate::core::errors::{TranslationError, TranslationResult};
use crate::core::types::ChatMessage;

const STOP_SEQUENCE: &str = "<｜end▁of▁sentence｜>";

pub struct TogetherChatClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    top_p: f32,
    top_k: u32,
    repetition_penalty: f32,
    stop: [&'a str; 1],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct SseChunk {
    #[serde(default)]
    choices: Vec<SseChoice>,
}

#[derive(Debug, Deserialize)]
struct SseChoice {
    delta: SseDelta,
}

#[derive(Debug, Deserialize)]
struct SseDelta {
    content: Option<String>,
}

/// One parsed server-sent-events line
#[derive(Debug, PartialEq, Eq)]
enum SseLine {
    Content(String),
    Done,
    Skip,
}

/// Raw stream bytes waiting for a newline.
///
/// Only complete lines are decoded, so a multi-byte character split across
/// two network chunks is reassembled before it becomes text.
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    fn next_line(&mut self) -> Option<String> {
        let newline_pos = self.pending.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=newline_pos).collect();
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Whatever is left once the stream has ended
    fn into_remainder(self) -> String {
        String::from_utf8_lossy(&self.pending).into_owned()
    }
}

fn parse_sse_line(line: &str) -> TranslationResult<SseLine> {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return Ok(SseLine::Skip);
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }

    let chunk: SseChunk = serde_json::from_str(data)
        .map_err(|e| TranslationError::InvalidResponse(format!("bad stream chunk: {e}")))?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|c| !c.is_empty())
        .map(SseLine::Content)
        .unwrap_or(SseLine::Skip))
}

impl TogetherChatClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> TranslationResult<Self> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl ChatBackend for TogetherChatClient {
    async fn chat(
        &self,
        history: &[ChatMessage],
        on_fragment: &mut (dyn for<'s> FnMut(&'s str) + Send),
    ) -> TranslationResult<()> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: history,
            temperature: 0.7,
            top_p: 0.7,
            top_k: 50,
            repetition_penalty: 1.0,
            stop: [STOP_SEQUENCE],
            stream: true,
        };

        let start = Instant::now();
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranslationError::ApiStatus {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let mut stream = response.bytes_stream();
        let mut lines = LineBuffer::default();
        let mut fragments = 0usize;

        'stream: while let Some(chunk) = stream.next().await {
            lines.push(&chunk?);

            while let Some(line) = lines.next_line() {
                match parse_sse_line(&line)? {
                    SseLine::Content(content) => {
                        fragments += 1;
                        on_fragment(&content);
                    }
                    SseLine::Done => break 'stream,
                    SseLine::Skip => {}
                }
            }
        }

        if let SseLine::Content(content) = parse_sse_line(&lines.into_remainder())? {
            fragments += 1;
            on_fragment(&content);
        }

        info!(
            "Together: {} fragments in {:.2}s ({} turns of context)",
            fragments,
            start.elapsed().as_secs_f64(),
            history.len()
        );
        debug!("Together model {}", self.model);
        Ok(())
    }
}
