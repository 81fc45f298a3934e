//! Web search tool — deterministic offline results.
//!
//! Wired to a fixed result generator so agents exercising the loop don't
//! need network access or an API key; a production deployment swaps this
//! for a real search backend behind the same schema.

use async_trait::async_trait;
use serde::Serialize;

use talon_core::{CallContext, Error, Result, Tool, ToolResult};

pub struct WebSearchTool;

#[derive(Serialize)]
struct SearchResult {
    title: String,
    url: String,
    snippet: String,
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web. Returns result titles, URLs, and snippets."
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "The search query" },
                "num_results": {
                    "type": "integer",
                    "description": "Number of results to return (default 3, max 5)"
                }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, _call: &CallContext, input: serde_json::Value) -> Result<ToolResult> {
        let query = input["query"].as_str().ok_or_else(|| Error::InvalidToolArgs {
            tool: "web_search".into(),
            reason: "missing 'query'".into(),
        })?;
        let count = input["num_results"].as_u64().unwrap_or(3).min(5) as usize;

        let slug: String = query
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '-' })
            .collect();
        let results: Vec<SearchResult> = (1..=count)
            .map(|rank| SearchResult {
                title: format!("{query} — result {rank}"),
                url: format!("https://search.example.com/{slug}/{rank}"),
                snippet: format!("Reference material about {query} (entry {rank})."),
            })
            .collect();

        let output = serde_json::to_string_pretty(&results)?;
        Ok(ToolResult::ok("", "web_search", output)
            .with_metadata("results", results.len().into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_requested_count() {
        let tool = WebSearchTool;
        let result = tool
            .execute(
                &CallContext::unbounded(),
                serde_json::json!({"query": "rust agents", "num_results": 2}),
            )
            .await
            .unwrap();
        assert_eq!(result.metadata["results"], 2);
        assert!(result.output.contains("rust agents"));
    }

    #[tokio::test]
    async fn count_is_capped() {
        let tool = WebSearchTool;
        let result = tool
            .execute(
                &CallContext::unbounded(),
                serde_json::json!({"query": "q", "num_results": 50}),
            )
            .await
            .unwrap();
        assert_eq!(result.metadata["results"], 5);
    }
}
