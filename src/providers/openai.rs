use anyhow::{Context, Result, anyhow};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::agent::ProtocolViolation;
use crate::config::Config;
use crate::model::{ConversationItem, OutputEvent, ToolCallRequest, ToolSpec, Usage};
use crate::model_gateway::{ModelGatewayRequest, ModelGatewayResponse};
use crate::providers::http_errors::model_api_request_error;

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: Vec<InputItem<'a>>,
    tools: Vec<ToolParam<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InputItem<'a> {
    Message {
        role: &'static str,
        content: &'a str,
    },
    FunctionCall {
        call_id: &'a str,
        name: &'a str,
        arguments: &'a str,
    },
    FunctionCallOutput {
        call_id: &'a str,
        output: &'a str,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ToolParam<'a> {
    Function {
        name: &'a str,
        description: &'a str,
        strict: bool,
        parameters: &'a Value,
    },
    WebSearchPreview {
        search_context_size: &'a str,
    },
}

#[derive(Debug, Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    output: Vec<RawOutputItem>,
    #[serde(default)]
    usage: Option<RawUsage>,
}

#[derive(Debug, Deserialize)]
struct RawOutputItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    call_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
    #[serde(default)]
    content: Vec<RawContentPart>,
}

#[derive(Debug, Deserialize)]
struct RawContentPart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
    #[serde(default)]
    input_tokens_details: Option<RawInputTokenDetails>,
}

#[derive(Debug, Default, Deserialize)]
struct RawInputTokenDetails {
    #[serde(default)]
    cached_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

fn responses_url(base_url: &str) -> String {
    format!("{}/responses", base_url.trim_end_matches('/'))
}

fn to_input_items(conversation: &[ConversationItem]) -> Vec<InputItem<'_>> {
    conversation
        .iter()
        .map(|item| match item {
            ConversationItem::Message(message) => InputItem::Message {
                role: message.role.as_str(),
                content: &message.content,
            },
            ConversationItem::ToolCall(call) => InputItem::FunctionCall {
                call_id: &call.call_id,
                name: &call.name,
                arguments: &call.arguments,
            },
            ConversationItem::ToolResult(result) => InputItem::FunctionCallOutput {
                call_id: &result.call_id,
                output: &result.output,
            },
        })
        .collect()
}

fn to_tool_params(tools: &[ToolSpec]) -> Vec<ToolParam<'_>> {
    tools
        .iter()
        .map(|tool| match tool {
            ToolSpec::Function(definition) => ToolParam::Function {
                name: &definition.name,
                description: &definition.description,
                strict: definition.strict,
                parameters: &definition.parameters,
            },
            ToolSpec::WebSearch {
                search_context_size,
            } => ToolParam::WebSearchPreview {
                search_context_size: *search_context_size,
            },
        })
        .collect()
}

fn request_body<'a>(request: &ModelGatewayRequest<'a>) -> ResponsesRequest<'a> {
    ResponsesRequest {
        model: request.model,
        input: to_input_items(request.input),
        tools: to_tool_params(request.tools),
    }
}

fn message_text(item: &RawOutputItem) -> String {
    item.content
        .iter()
        .filter(|part| part.kind == "output_text")
        .filter_map(|part| part.text.as_deref())
        .collect()
}

fn to_output_event(item: &RawOutputItem) -> Result<OutputEvent> {
    let event = match item.kind.as_str() {
        "message" => OutputEvent::Message {
            text: message_text(item),
        },
        "function_call" => {
            let (Some(call_id), Some(name)) = (&item.call_id, &item.name) else {
                return Err(ProtocolViolation::MalformedToolCall.into());
            };
            OutputEvent::FunctionCall(ToolCallRequest {
                call_id: call_id.clone(),
                name: name.clone(),
                arguments: item.arguments.clone().unwrap_or_else(|| "{}".to_string()),
            })
        }
        "web_search_call" | "file_search_call" => OutputEvent::ToolCompletion {
            kind: item.kind.clone(),
        },
        other => OutputEvent::Unknown {
            kind: other.to_string(),
        },
    };
    Ok(event)
}

fn to_gateway_response(parsed: ResponsesResponse) -> Result<ModelGatewayResponse> {
    let output_text = parsed
        .output
        .iter()
        .filter(|item| item.kind == "message")
        .map(message_text)
        .collect();
    let output = parsed
        .output
        .iter()
        .map(to_output_event)
        .collect::<Result<Vec<_>>>()?;
    let raw_usage = parsed.usage.unwrap_or_default();
    let usage = Usage {
        input_tokens: raw_usage.input_tokens,
        output_tokens: raw_usage.output_tokens,
        cached_tokens: raw_usage
            .input_tokens_details
            .map(|details| details.cached_tokens)
            .unwrap_or_default(),
        total_tokens: raw_usage.total_tokens,
    };

    Ok(ModelGatewayResponse {
        output,
        output_text,
        usage,
    })
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.to_string())
}

pub async fn create_response(
    client: &Client,
    cfg: &Config,
    request: &ModelGatewayRequest<'_>,
) -> Result<ModelGatewayResponse> {
    let api_key = cfg
        .api_key
        .as_deref()
        .ok_or_else(|| anyhow!("OPENAI_API_KEY is not set. Export it or add it to .env."))?;
    let api_url = responses_url(&cfg.api_base_url);
    let body = request_body(request);
    debug!(
        api_url = %api_url,
        model = %request.model,
        input_items = body.input.len(),
        tool_count = body.tools.len(),
        "sending responses request"
    );

    let response = client
        .post(&api_url)
        .bearer_auth(api_key)
        .json(&body)
        .send()
        .await
        .map_err(|err| {
            warn!(
                api_url = %api_url,
                model = %request.model,
                error = %err,
                "responses request failed"
            );
            model_api_request_error(err, &api_url, cfg.model_timeout_secs)
        })?;

    if !response.status().is_success() {
        let status = response.status();
        let response_body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read response body>".to_string());
        warn!(
            api_url = %api_url,
            model = %request.model,
            status = %status,
            response_body_len = response_body.len(),
            "responses API returned non-success status"
        );
        return Err(anyhow!(
            "Model request failed with status {}: {}",
            status,
            error_message(&response_body)
        ));
    }

    let parsed: ResponsesResponse = response
        .json()
        .await
        .context("Failed to parse model response")?;
    let converted = to_gateway_response(parsed)?;
    debug!(
        model = %request.model,
        output_events = converted.output.len(),
        output_text_len = converted.output_text.len(),
        total_tokens = converted.usage.total_tokens,
        "received responses reply"
    );
    Ok(converted)
}
