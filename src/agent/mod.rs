pub mod tools;

use anyhow::{Result, anyhow};
use std::error::Error;
use std::fmt;
use tracing::{debug, warn};

use crate::model::{ConversationItem, Message, OutputEvent, ToolCallResult, ToolSpec, Usage};
use crate::model_gateway::{ModelGateway, ModelGatewayRequest, ModelGatewayResponse};
use crate::session::SessionSettings;
use crate::spinner::Spinner;
use tools::ToolRegistry;

const DEFAULT_MAX_TOOL_ROUNDS: usize = 16;
const SPINNER_MESSAGE: &str = "Thinking";

/// The remote service broke the response contract. There is no local
/// recovery, so callers end the session on this error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    UnregisteredTool(String),
    UnknownEvent(String),
    MalformedToolCall,
    EmptyOutput,
}

impl fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnregisteredTool(name) => {
                write!(f, "model requested unregistered tool '{name}'")
            }
            Self::UnknownEvent(kind) => {
                write!(f, "model returned unsupported output event type '{kind}'")
            }
            Self::MalformedToolCall => {
                write!(f, "model returned a function_call without call_id or name")
            }
            Self::EmptyOutput => write!(f, "model returned no output events"),
        }
    }
}

impl Error for ProtocolViolation {}

pub fn is_protocol_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<ProtocolViolation>().is_some()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutput {
    pub text: String,
    /// Summed over every request made during the turn.
    pub usage: Usage,
}

pub struct Agent<'a, G> {
    gateway: &'a G,
    registry: &'a ToolRegistry,
    conversation: Vec<ConversationItem>,
    max_tool_rounds: usize,
    show_spinner: bool,
}

impl<'a, G: ModelGateway> Agent<'a, G> {
    pub fn new(gateway: &'a G, registry: &'a ToolRegistry, developer_message: &str) -> Self {
        Self {
            gateway,
            registry,
            conversation: vec![Message::developer(developer_message).into()],
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            show_spinner: false,
        }
    }

    pub fn with_max_tool_rounds(mut self, max_tool_rounds: usize) -> Self {
        self.max_tool_rounds = max_tool_rounds.max(1);
        self
    }

    pub fn with_spinner(mut self, show_spinner: bool) -> Self {
        self.show_spinner = show_spinner;
        self
    }

    pub fn conversation(&self) -> &[ConversationItem] {
        &self.conversation
    }

    /// Drives one user turn until the model produces a final answer.
    ///
    /// On error every entry added during the turn is dropped again, so a
    /// failed turn leaves the conversation as it was.
    pub async fn run_turn(
        &mut self,
        settings: &SessionSettings,
        user_input: &str,
    ) -> Result<TurnOutput> {
        let checkpoint = self.conversation.len();
        self.conversation.push(Message::user(user_input).into());

        let result = self.drive_turn(settings).await;
        if result.is_err() {
            self.conversation.truncate(checkpoint);
        }
        result
    }

    async fn drive_turn(&mut self, settings: &SessionSettings) -> Result<TurnOutput> {
        let tools = settings.tool_specs(self.registry);
        let mut usage = Usage::default();
        let mut tool_rounds = 0usize;

        loop {
            let response = self.send(settings.model(), &tools).await?;
            usage += response.usage;

            let ModelGatewayResponse {
                output,
                output_text,
                ..
            } = response;
            let Some(event) = output.into_iter().next() else {
                return Err(ProtocolViolation::EmptyOutput.into());
            };

            match event {
                OutputEvent::Message { .. } | OutputEvent::ToolCompletion { .. } => {
                    self.conversation
                        .push(Message::assistant(output_text.clone()).into());
                    return Ok(TurnOutput {
                        text: output_text,
                        usage,
                    });
                }
                OutputEvent::FunctionCall(call) => {
                    if tool_rounds == self.max_tool_rounds {
                        warn!(
                            max_tool_rounds = self.max_tool_rounds,
                            "tool round limit reached"
                        );
                        return Err(anyhow!(
                            "Gave up after {} tool calls without a final answer (MAX_TOOL_ROUNDS)",
                            self.max_tool_rounds
                        ));
                    }
                    tool_rounds += 1;

                    let tool = self.registry.lookup(&call.name).ok_or_else(|| {
                        warn!(tool_name = %call.name, "model requested unregistered tool");
                        ProtocolViolation::UnregisteredTool(call.name.clone())
                    })?;
                    let output = self.registry.invoke(tool);
                    debug!(
                        tool_name = %call.name,
                        call_id = %call.call_id,
                        output_len = output.len(),
                        "tool call completed"
                    );

                    let call_id = call.call_id.clone();
                    self.conversation.push(ConversationItem::ToolCall(call));
                    self.conversation
                        .push(ConversationItem::ToolResult(ToolCallResult { call_id, output }));
                }
                OutputEvent::Unknown { kind } => {
                    warn!(event_type = %kind, "unsupported output event");
                    return Err(ProtocolViolation::UnknownEvent(kind).into());
                }
            }
        }
    }

    async fn send(&self, model: &str, tools: &[ToolSpec]) -> Result<ModelGatewayResponse> {
        debug!(
            model = %model,
            input_items = self.conversation.len(),
            tool_count = tools.len(),
            "requesting model response"
        );
        let _spinner = self.show_spinner.then(|| Spinner::start(SPINNER_MESSAGE));
        self.gateway
            .create(ModelGatewayRequest {
                model,
                input: &self.conversation,
                tools,
            })
            .await
    }
}
