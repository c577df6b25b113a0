use anyhow::Result;
use reqwest::Client;
use std::future::Future;
use std::pin::Pin;

use crate::config::Config;
use crate::model::{ConversationItem, OutputEvent, ToolSpec, Usage};
use crate::providers;

pub struct ModelGatewayRequest<'a> {
    pub model: &'a str,
    pub input: &'a [ConversationItem],
    pub tools: &'a [ToolSpec],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelGatewayResponse {
    pub output: Vec<OutputEvent>,
    /// Concatenated text of every message event in `output`.
    pub output_text: String,
    pub usage: Usage,
}

pub type ModelGatewayFuture<'a> = Pin<Box<dyn Future<Output = Result<ModelGatewayResponse>> + 'a>>;

pub trait ModelGateway {
    fn create<'a>(&'a self, request: ModelGatewayRequest<'a>) -> ModelGatewayFuture<'a>;
}

/// Gateway backed by the hosted Responses API.
pub struct HostModelGateway<'a> {
    client: &'a Client,
    cfg: &'a Config,
}

impl<'a> HostModelGateway<'a> {
    pub fn new(client: &'a Client, cfg: &'a Config) -> Self {
        Self { client, cfg }
    }
}

impl ModelGateway for HostModelGateway<'_> {
    fn create<'b>(&'b self, request: ModelGatewayRequest<'b>) -> ModelGatewayFuture<'b> {
        Box::pin(
            async move { providers::openai::create_response(self.client, self.cfg, &request).await },
        )
    }
}
