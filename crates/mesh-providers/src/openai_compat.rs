//! An OpenAI-compatible HTTP adapter: the most portable wire shape across
//! real chat-model vendors (local llama.cpp/Ollama servers, vLLM, and the
//! hosted OpenAI API itself all speak a variant of it), grounded on
//! `sa-providers::openai_compat`.

use async_trait::async_trait;
use mesh_domain::tool::{Message, Role, ToolCall};
use mesh_domain::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::traits::{ChatRequest, ChatResponse, LlmProvider, Usage};

pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiCompatProvider {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builds with a valid timeout");
        Self {
            client,
            base_url: base_url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let wire = WireRequest::from_internal(&request);
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let mut builder = self.client.post(&url).json(&wire);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| Error::unavailable(format!("chat model request failed: {e}")))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::unavailable(format!(
                "chat model returned {status}: {body}"
            )));
        }
        let wire_response: WireResponse = response
            .json()
            .await
            .map_err(|e| Error::internal(format!("malformed chat model response: {e}")))?;
        wire_response.into_internal(&request.model)
    }

    fn provider_id(&self) -> &str {
        "openai_compat"
    }
}

#[derive(Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
}

impl WireRequest {
    fn from_internal(req: &ChatRequest) -> Self {
        Self {
            model: req.model.clone(),
            messages: req.messages.iter().map(WireMessage::from_internal).collect(),
            temperature: req.temperature,
            max_tokens: req.max_tokens,
            tools: req
                .tools
                .iter()
                .map(|t| WireTool {
                    r#type: "function".into(),
                    function: WireFunction {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.parameters.clone(),
                    },
                })
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
}

impl WireMessage {
    fn from_internal(m: &Message) -> Self {
        Self {
            role: match m.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            },
            content: m.content.clone(),
            tool_call_id: m.tool_call_id.clone(),
            tool_calls: m
                .tool_calls
                .iter()
                .map(|c| WireToolCall {
                    id: c.call_id.clone(),
                    r#type: "function".into(),
                    function: WireFunctionCall {
                        name: c.tool_name.clone(),
                        arguments: c.arguments.to_string(),
                    },
                })
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct WireTool {
    r#type: String,
    function: WireFunction,
}

#[derive(Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Serialize)]
struct WireToolCall {
    id: String,
    r#type: String,
    function: WireFunctionCall,
}

#[derive(Serialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireResponseToolCall>,
}

#[derive(Deserialize)]
struct WireResponseToolCall {
    id: String,
    function: WireResponseFunctionCall,
}

#[derive(Deserialize)]
struct WireResponseFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl WireResponse {
    fn into_internal(self, model: &str) -> Result<ChatResponse> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::internal("chat model returned no choices"))?;
        let tool_calls = choice
            .message
            .tool_calls
            .into_iter()
            .map(|c| -> Result<ToolCall> {
                let arguments = serde_json::from_str(&c.function.arguments)
                    .map_err(|e| Error::internal(format!("malformed tool-call arguments: {e}")))?;
                Ok(ToolCall {
                    call_id: c.id,
                    tool_name: c.function.name,
                    arguments,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
            model: model.to_string(),
            usage: self
                .usage
                .map(|u| Usage {
                    input_tokens: u.prompt_tokens,
                    output_tokens: u.completion_tokens,
                })
                .unwrap_or_default(),
        })
    }
}
