//! HTTP fetch tool.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use talon_core::{CallContext, Error, Result, Tool, ToolResult};

const MAX_BODY_BYTES: usize = 512 * 1024;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct WebFetchTool {
    client: reqwest::Client,
}

impl WebFetchTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch a URL over HTTP GET and return the response body as text (truncated to 512 KiB)."
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "The http(s) URL to fetch" }
            },
            "required": ["url"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &CallContext, input: serde_json::Value) -> Result<ToolResult> {
        let url = input["url"].as_str().ok_or_else(|| Error::InvalidToolArgs {
            tool: "web_fetch".into(),
            reason: "missing 'url'".into(),
        })?;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(Error::InvalidToolArgs {
                tool: "web_fetch".into(),
                reason: "url must be http(s)".into(),
            });
        }

        let timeout = call.remaining().unwrap_or(DEFAULT_TIMEOUT).min(DEFAULT_TIMEOUT);
        debug!(%url, ?timeout, "fetching url");
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Error::ToolExecutionFailed {
                tool: "web_fetch".into(),
                reason: e.to_string(),
            })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| Error::ToolExecutionFailed {
            tool: "web_fetch".into(),
            reason: e.to_string(),
        })?;

        let truncated = body.len() > MAX_BODY_BYTES;
        let mut text = if truncated {
            let mut end = MAX_BODY_BYTES;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            body[..end].to_string()
        } else {
            body
        };
        if truncated {
            text.push_str("\n[... truncated]");
        }

        Ok(ToolResult::ok("", "web_fetch", text)
            .with_metadata("status", status.into())
            .with_metadata("truncated", truncated.into()))
    }
}
