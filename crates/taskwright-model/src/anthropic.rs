use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::{CompletionRequest, CompletionResponse, ContentBlock, StopReason, Usage};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// Non-streaming client for the Anthropic Messages API.
pub struct AnthropicProvider {
    model: String,
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(model: String, api_key: Option<String>, base_url: Option<String>) -> Self {
        Self {
            model,
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.into()),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    content: Vec<Value>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Usage,
}

#[async_trait]
impl crate::ModelProvider for AnthropicProvider {
    fn name(&self) -> &str { "anthropic" }
    fn model_name(&self) -> &str { &self.model }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<CompletionResponse> {
        let key = self.api_key.as_deref().context("ANTHROPIC_API_KEY not set")?;
        let body = request_body(&self.model, &req)?;

        debug!(model = %self.model, messages = req.messages.len(), "sending anthropic request");

        let resp = self.client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .context("Anthropic request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("Anthropic error {status}: {text}");
        }

        let wire: WireResponse = resp.json().await.context("decoding Anthropic response")?;
        Ok(parse_response(wire))
    }
}

fn request_body(model: &str, req: &CompletionRequest) -> anyhow::Result<Value> {
    // An explicit request model wins over the provider default.
    let model = if req.model.is_empty() { model } else { req.model.as_str() };
    let mut body = json!({
        "model": model,
        "messages": serde_json::to_value(&req.messages)?,
        "max_tokens": req.max_tokens,
        "temperature": req.temperature,
    });
    if !req.system.is_empty() {
        body["system"] = json!(req.system);
    }
    if !req.tools.is_empty() {
        body["tools"] = serde_json::to_value(&req.tools)?;
    }
    Ok(body)
}

fn parse_response(wire: WireResponse) -> CompletionResponse {
    // Unknown block kinds (thinking, server tools) are skipped.
    let content = wire
        .content
        .into_iter()
        .filter_map(|b| serde_json::from_value::<ContentBlock>(b).ok())
        .collect();
    CompletionResponse {
        stop_reason: StopReason::parse(wire.stop_reason.as_deref().unwrap_or("")),
        content,
        usage: wire.usage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Message, ModelProvider, ToolSchema};

    #[test]
    fn body_carries_system_tools_and_blocks() {
        let req = CompletionRequest {
            model: String::new(),
            system: "be terse".into(),
            messages: vec![
                Message::user("list things"),
                Message::tool_results(vec![ContentBlock::tool_result("t1", "[]", false)]),
            ],
            tools: vec![ToolSchema {
                name: "list_categories".into(),
                description: "List categories".into(),
                input_schema: json!({"type": "object"}),
            }],
            temperature: 0.0,
            max_tokens: 512,
        };
        let body = request_body("claude-x", &req).unwrap();
        assert_eq!(body["model"], "claude-x");
        assert_eq!(body["system"], "be terse");
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"][0]["type"], "text");
        assert_eq!(body["messages"][1]["content"][0]["tool_use_id"], "t1");
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
    }

    #[test]
    fn empty_system_and_tools_are_omitted() {
        let req = CompletionRequest { messages: vec![Message::user("hi")], ..Default::default() };
        let body = request_body("m", &req).unwrap();
        assert!(body.get("system").is_none());
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn response_parsing_keeps_order_and_skips_unknown_blocks() {
        let wire: WireResponse = serde_json::from_value(json!({
            "content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "checking"},
                {"type": "tool_use", "id": "toolu_1", "name": "get_question", "input": {"question_id": "q"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 12, "output_tokens": 7}
        }))
        .unwrap();
        let resp = parse_response(wire);
        assert_eq!(resp.stop_reason, StopReason::ToolUse);
        assert_eq!(resp.content.len(), 2);
        assert_eq!(resp.text(), "checking");
        assert_eq!(resp.tool_uses()[0].id, "toolu_1");
        assert_eq!(resp.usage.output_tokens, 7);
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let p = AnthropicProvider::new("m".into(), None, Some("http://127.0.0.1:9".into()));
        let err = p.complete(CompletionRequest::default()).await.unwrap_err();
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }
}
