//! Azure OpenAI client (C9), grounded in the teacher's `azure.rs`: unlike
//! the other OpenAI-compatible vendors it authenticates with an `api-key`
//! header instead of a bearer token and the endpoint is a
//! resource-scoped deployment URL carrying an `api-version` query
//! parameter, so it can't be expressed as a plain
//! `OpenAiCompatibleClient` instantiation. The wire translation and
//! response parsing are still reused from `clients::openai_compatible`.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::json;

use crate::clients::openai_compatible::{parse_response, wire_messages};
use crate::error::{classify, ProviderError};
use crate::message::{MessageRequest, MessageResponse, RequestOptions, StreamChunk};
use crate::provider::Provider;
use crate::stream::{OpenAiStreamAssembler, SseLineBuffer};
use crate::transform::{resolve_reasoning_variant, resolve_temperature_top_p, ReasoningVariant};

const DEFAULT_API_VERSION: &str = "2024-02-15-preview";

pub struct AzureClient {
    api_key: String,
    endpoint: String,
    deployment_name: Option<String>,
    api_version: String,
    http: Client,
    models: Vec<String>,
}

impl AzureClient {
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            deployment_name: None,
            api_version: DEFAULT_API_VERSION.to_string(),
            http: Client::new(),
            models: vec![
                "gpt-4o".to_string(),
                "gpt-4o-mini".to_string(),
                "gpt-4-turbo".to_string(),
                "gpt-35-turbo".to_string(),
            ],
        }
    }

    pub fn with_deployment(mut self, deployment_name: impl Into<String>) -> Self {
        self.deployment_name = Some(deployment_name.into());
        self
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    fn url(&self, model: &str) -> String {
        let deployment = self.deployment_name.as_deref().unwrap_or(model);
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint.trim_end_matches('/'),
            deployment,
            self.api_version
        )
    }

    fn wire_request(
        &self,
        request: &MessageRequest,
        stream: bool,
        options: &RequestOptions,
    ) -> serde_json::Value {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({"role": "system", "content": system}));
        }
        for m in &request.messages {
            messages.extend(wire_messages(m));
        }
        let mut body = json!({
            "messages": messages,
            "max_tokens": request.max_tokens,
            "stream": stream,
        });
        let (temperature, top_p) =
            resolve_temperature_top_p(&request.model, request.temperature, request.top_p);
        if let Some(t) = temperature {
            body["temperature"] = json!(t);
        }
        if let Some(p) = top_p {
            body["top_p"] = json!(p);
        }
        if let Some(ReasoningVariant::OpenAiEffort { effort }) =
            resolve_reasoning_variant("azure", options)
        {
            body["reasoning_effort"] = json!(effort);
        }
        if let Some(tools) = &request.tools {
            body["tools"] = json!(tools
                .iter()
                .map(|t| json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.input_schema,
                    }
                }))
                .collect::<Vec<_>>());
        }
        body
    }
}

#[async_trait]
impl Provider for AzureClient {
    fn name(&self) -> &str {
        "azure"
    }

    async fn models(&self) -> Vec<String> {
        self.models.clone()
    }

    async fn create_message(
        &self,
        request: MessageRequest,
        options: &RequestOptions,
    ) -> Result<MessageResponse, ProviderError> {
        crate::retry::with_retry(&crate::retry::RetryConfig::default(), || async {
            let body = self.wire_request(&request, false, options);
            let resp = self
                .http
                .post(self.url(&request.model))
                .header("api-key", &self.api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| ProviderError::Network(e.to_string()))?;

            let status = resp.status();
            let retry_after = crate::error::retry_after_header(resp.headers());
            let text = resp
                .text()
                .await
                .map_err(|e| ProviderError::Network(e.to_string()))?;
            if !status.is_success() {
                return Err(classify(Some(status.as_u16()), &text, None, retry_after.as_deref()).into());
            }
            let value: serde_json::Value = serde_json::from_str(&text)
                .map_err(|e| ProviderError::Network(e.to_string()))?;
            parse_response(&value)
        })
        .await
    }

    async fn stream_message(
        &self,
        request: MessageRequest,
        options: &RequestOptions,
        callback: &mut (dyn FnMut(StreamChunk) -> Result<(), ProviderError> + Send),
    ) -> Result<(), ProviderError> {
        let body = self.wire_request(&request, true, options);
        let resp = self
            .http
            .post(self.url(&request.model))
            .header("api-key", &self.api_key)
            .header("accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let retry_after = crate::error::retry_after_header(resp.headers());
            let text = resp.text().await.unwrap_or_default();
            return Err(classify(Some(status.as_u16()), &text, None, retry_after.as_deref()).into());
        }

        let mut assembler = OpenAiStreamAssembler::new();
        let mut buffer = SseLineBuffer::default();
        let mut byte_stream = resp.bytes_stream();
        while let Some(chunk) = byte_stream.next().await {
            let bytes = chunk.map_err(|e| ProviderError::Stream(e.to_string()))?;
            for line in buffer.push(&bytes) {
                let Some(data) = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")) else {
                    continue;
                };
                for chunk in assembler.feed(data) {
                    callback(chunk)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployment_name_falls_back_to_model_id() {
        let client = AzureClient::new("key", "https://my-resource.openai.azure.com");
        let url = client.url("gpt-4o");
        assert!(url.contains("/openai/deployments/gpt-4o/chat/completions"));
        assert!(url.contains("api-version=2024-02-15-preview"));
    }

    #[test]
    fn explicit_deployment_overrides_model_id() {
        let client = AzureClient::new("key", "https://my-resource.openai.azure.com/")
            .with_deployment("prod-gpt4o");
        let url = client.url("gpt-4o");
        assert!(url.contains("/openai/deployments/prod-gpt4o/chat/completions"));
    }
}
