//! Cloud API passthrough tool.

use std::path::Path;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};

use super::{required_str, Tool};
use crate::cloud::CloudClient;
use crate::config::CloudConfig;
use crate::util::truncate_chars;

/// Responses longer than this are cut before being handed back to the client.
const MAX_RESPONSE_CHARS: usize = 50_000;

pub struct CloudRequest {
    client: CloudClient,
}

impl CloudRequest {
    pub fn new(config: &CloudConfig) -> Self {
        Self {
            client: CloudClient::new(config),
        }
    }

    pub fn with_client(client: CloudClient) -> Self {
        Self { client }
    }
}

fn parse_method(raw: Option<&str>) -> anyhow::Result<Method> {
    match raw.unwrap_or("GET").to_ascii_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "DELETE" => Ok(Method::DELETE),
        other => Err(anyhow::anyhow!(
            "Unsupported method '{}' (expected GET, POST or DELETE)",
            other
        )),
    }
}

#[async_trait]
impl Tool for CloudRequest {
    fn name(&self) -> &str {
        "cursor_cloud_request"
    }

    fn description(&self) -> &str {
        "Call the Cursor cloud API (background agents) with the configured CURSOR_API_KEY. \
         Returns the JSON response."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "method": {
                    "type": "string",
                    "enum": ["GET", "POST", "DELETE"],
                    "description": "HTTP method (default: GET)"
                },
                "path": {
                    "type": "string",
                    "description": "API path, e.g. '/v0/agents'"
                },
                "body": {
                    "type": "object",
                    "description": "Optional: JSON body for POST requests"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value, _working_dir: &Path) -> anyhow::Result<String> {
        let path = required_str(&args, "path")?;
        let method = parse_method(args["method"].as_str())?;
        let body = args.get("body").filter(|b| !b.is_null());

        let value = self.client.request(method, path, body).await?;
        let text = serde_json::to_string_pretty(&value)?;
        Ok(truncate_chars(&text, MAX_RESPONSE_CHARS))
    }
}
