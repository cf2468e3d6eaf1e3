use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;

use super::JsonSchema;
use super::Tool;
use super::ToolContext;
use super::ToolOutput;
use super::ToolSpec;

const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;
const ALLOWED_CONTENT_TYPES: &[&str] = &["text/", "application/json", "application/xml"];

#[derive(Debug, Deserialize)]
struct WebFetchArgs {
    url: String,
}

/// Fetches a URL, bounded in size and restricted to text-ish content types.
pub struct WebFetchTool;

#[async_trait]
impl Tool for WebFetchTool {
    fn spec(&self) -> ToolSpec {
        let mut properties = BTreeMap::new();
        properties.insert(
            "url".to_string(),
            JsonSchema::String {
                description: Some("URL to fetch".to_string()),
            },
        );
        ToolSpec {
            name: "web_fetch".to_string(),
            description: "Fetches the contents of a URL".to_string(),
            input_schema: JsonSchema::Object {
                properties,
                required: Some(vec!["url".to_string()]),
            },
        }
    }

    async fn execute(&self, _ctx: &ToolContext, args: serde_json::Value) -> ToolOutput {
        let args: WebFetchArgs = serde_json::from_value(args).map_err(|e| e.to_string())?;
        let response = reqwest::get(&args.url).await.map_err(|e| e.to_string())?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !ALLOWED_CONTENT_TYPES
            .iter()
            .any(|allowed| content_type.starts_with(allowed))
        {
            return Err(format!("disallowed content type: {content_type}"));
        }

        let bytes = response.bytes().await.map_err(|e| e.to_string())?;
        let truncated = bytes.len() > MAX_BODY_BYTES;
        let body = String::from_utf8_lossy(&bytes[..bytes.len().min(MAX_BODY_BYTES)]).into_owned();

        Ok(serde_json::json!({ "body": body, "truncated": truncated, "contentType": content_type }))
    }
}
