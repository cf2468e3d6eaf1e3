use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;

use super::JsonSchema;
use super::Tool;
use super::ToolContext;
use super::ToolOutput;
use super::ToolSpec;

const MAX_BODY_BYTES: usize = 512 * 1024;

#[derive(Debug, Deserialize)]
struct WebSearchArgs {
    query: String,
}

/// Runs a web search and returns raw result-page text for the model to
/// read. No ranking/parsing beyond truncation: the model does its own
/// extraction over the returned text.
pub struct WebSearchTool;

#[async_trait]
impl Tool for WebSearchTool {
    fn spec(&self) -> ToolSpec {
        let mut properties = BTreeMap::new();
        properties.insert(
            "query".to_string(),
            JsonSchema::String {
                description: Some("Search query".to_string()),
            },
        );
        ToolSpec {
            name: "web_search".to_string(),
            description: "Searches the web and returns result text".to_string(),
            input_schema: JsonSchema::Object {
                properties,
                required: Some(vec!["query".to_string()]),
            },
        }
    }

    async fn execute(&self, _ctx: &ToolContext, args: serde_json::Value) -> ToolOutput {
        let args: WebSearchArgs = serde_json::from_value(args).map_err(|e| e.to_string())?;
        let url = format!("https://html.duckduckgo.com/html/?q={}", urlencode(&args.query));

        let response = reqwest::Client::new()
            .get(&url)
            .header(reqwest::header::USER_AGENT, "cowork-agent/0.1")
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let bytes = response.bytes().await.map_err(|e| e.to_string())?;
        let truncated = bytes.len() > MAX_BODY_BYTES;
        let body = String::from_utf8_lossy(&bytes[..bytes.len().min(MAX_BODY_BYTES)]).into_owned();

        Ok(serde_json::json!({ "results": body, "truncated": truncated }))
    }
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
