use serde_json::{Value, json};
use std::ops::AddAssign;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    Developer,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Developer => "developer",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn developer(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Developer,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// A `function_call` event emitted by the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallResult {
    pub call_id: String,
    pub output: String,
}

/// One entry of the conversation sent back to the remote service on every
/// request. Entries are never mutated once pushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationItem {
    Message(Message),
    ToolCall(ToolCallRequest),
    ToolResult(ToolCallResult),
}

impl From<Message> for ConversationItem {
    fn from(message: Message) -> Self {
        Self::Message(message)
    }
}

/// Static description of a local function exposed to the remote service.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub strict: bool,
}

impl ToolDefinition {
    /// Builds a strict definition for a function that takes no arguments.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: json!({
                "type": "object",
                "properties": {},
                "required": [],
                "additionalProperties": false,
            }),
            strict: true,
        }
    }
}

pub const WEB_SEARCH_CONTEXT_SIZE: &str = "low";

/// Entry of the tool schema list attached to each request.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolSpec {
    Function(ToolDefinition),
    WebSearch { search_context_size: &'static str },
}

impl ToolSpec {
    pub fn web_search() -> Self {
        Self::WebSearch {
            search_context_size: WEB_SEARCH_CONTEXT_SIZE,
        }
    }

    pub fn is_web_search(&self) -> bool {
        matches!(self, Self::WebSearch { .. })
    }
}

/// Output event of a single remote response, keyed by its `type` tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Message { text: String },
    FunctionCall(ToolCallRequest),
    /// A hosted tool (web or file search) that ran on the service side.
    ToolCompletion { kind: String },
    Unknown { kind: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_tokens: u64,
    pub total_tokens: u64,
}

impl AddAssign for Usage {
    fn add_assign(&mut self, other: Self) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cached_tokens += other.cached_tokens;
        self.total_tokens += other.total_tokens;
    }
}
