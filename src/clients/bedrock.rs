//! Native AWS Bedrock client, grounded in the teacher's
//! `bedrock.rs` signing/streaming shape but replacing its Converse API
//! usage with raw `/invoke` and `/invoke-with-response-stream` against the
//! Anthropic-native body shape, full-header SigV4, and a line-delimited
//! `{bytes: ...}`-wrapped event framing.

use async_trait::async_trait;
use base64::Engine;
use futures::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};

use crate::clients::anthropic::{parse_response, wire_body_common};
use crate::error::{classify, ProviderError};
use crate::message::{MessageRequest, MessageResponse, RequestOptions, StreamChunk};
use crate::provider::Provider;
use crate::sigv4::{self, SigningCredentials};
use crate::stream::parse_anthropic_sse;

const ANTHROPIC_VERSION_BEDROCK: &str = "bedrock-2023-05-31";

pub struct BedrockClient {
    credentials: SigningCredentials,
    http: Client,
}

impl BedrockClient {
    pub fn new(credentials: SigningCredentials) -> Self {
        Self {
            credentials,
            http: Client::new(),
        }
    }

    /// Constructs a client from the standard AWS environment variables;
    /// returns `Config` error if the required pair is missing.
    pub fn from_env() -> Result<Self, ProviderError> {
        let credentials = sigv4::credentials_from_env().ok_or_else(|| {
            ProviderError::Config(
                "AWS_ACCESS_KEY_ID/AWS_SECRET_ACCESS_KEY not set for bedrock".to_string(),
            )
        })?;
        Ok(Self::new(credentials))
    }

    fn host(&self) -> String {
        format!("bedrock-runtime.{}.amazonaws.com", self.credentials.region)
    }

    fn invoke_body(&self, request: &MessageRequest, options: &RequestOptions) -> Vec<u8> {
        let mut body = wire_body_common("bedrock", request, options);
        body["anthropic_version"] = json!(ANTHROPIC_VERSION_BEDROCK);
        serde_json::to_vec(&body).expect("body serializes")
    }

    async fn create_message_once(
        &self,
        request: &MessageRequest,
        options: &RequestOptions,
    ) -> Result<MessageResponse, ProviderError> {
        let model_id = urlencoding::encode(&request.model).into_owned();
        let path = format!("/model/{model_id}/invoke");
        let body = self.invoke_body(request, options);
        let host = self.host();

        let signed = sigv4::sign(
            &self.credentials,
            "POST",
            &path,
            "",
            &[
                ("host".to_string(), host.clone()),
                ("content-type".to_string(), "application/json".to_string()),
            ],
            &body,
        );

        let mut req = self
            .http
            .post(format!("https://{host}{path}"))
            .header("host", host)
            .header("content-type", "application/json")
            .header("x-amz-date", signed.x_amz_date)
            .header("x-amz-content-sha256", signed.x_amz_content_sha256)
            .header("authorization", signed.authorization);
        if let Some(token) = &signed.x_amz_security_token {
            req = req.header("x-amz-security-token", token);
        }

        let resp = req
            .body(body)
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

        let value: Value =
            serde_json::from_str(&text).map_err(|e| ProviderError::Network(e.to_string()))?;
        let mut parsed = parse_response(&value);
        parsed.model = request.model.clone();
        Ok(parsed)
    }
}

#[async_trait]
impl Provider for BedrockClient {
    fn name(&self) -> &str {
        "bedrock"
    }

    async fn models(&self) -> Vec<String> {
        vec![
            "anthropic.claude-sonnet-4-5-v1:0".to_string(),
            "anthropic.claude-haiku-4-5-v1:0".to_string(),
        ]
    }

    async fn create_message(
        &self,
        request: MessageRequest,
        options: &RequestOptions,
    ) -> Result<MessageResponse, ProviderError> {
        crate::retry::with_retry(&crate::retry::RetryConfig::default(), || {
            self.create_message_once(&request, options)
        })
        .await
    }

    async fn stream_message(
        &self,
        request: MessageRequest,
        options: &RequestOptions,
        callback: &mut (dyn FnMut(StreamChunk) -> Result<(), ProviderError> + Send),
    ) -> Result<(), ProviderError> {
        let model_id = urlencoding::encode(&request.model).into_owned();
        let path = format!("/model/{model_id}/invoke-with-response-stream");
        let body = self.invoke_body(&request, options);
        let host = self.host();

        let signed = sigv4::sign(
            &self.credentials,
            "POST",
            &path,
            "",
            &[
                ("host".to_string(), host.clone()),
                ("content-type".to_string(), "application/json".to_string()),
            ],
            &body,
        );

        let mut req = self
            .http
            .post(format!("https://{host}{path}"))
            .header("host", host)
            .header("content-type", "application/json")
            .header("accept", "application/vnd.amazon.eventstream")
            .header("x-amz-date", signed.x_amz_date)
            .header("x-amz-content-sha256", signed.x_amz_content_sha256)
            .header("authorization", signed.authorization);
        if let Some(token) = &signed.x_amz_security_token {
            req = req.header("x-amz-security-token", token);
        }

        let resp = req
            .body(body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let retry_after = crate::error::retry_after_header(resp.headers());
            let text = resp.text().await.unwrap_or_default();
            return Err(classify(Some(status.as_u16()), &text, None, retry_after.as_deref()).into());
        }

        let mut pending = String::new();
        let mut byte_stream = resp.bytes_stream();
        while let Some(chunk) = byte_stream.next().await {
            let bytes = chunk.map_err(|e| ProviderError::Stream(e.to_string()))?;
            pending.push_str(&String::from_utf8_lossy(&bytes));
            while let Some(pos) = pending.find('\n') {
                let line = pending[..pos].trim().to_string();
                pending.drain(..=pos);
                if line.is_empty() {
                    continue;
                }
                if let Some(inner) = unwrap_event_payload(&line) {
                    if let Some(chunk) = parse_anthropic_sse(&inner) {
                        callback(chunk)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Unwraps one event-stream payload line. Bedrock wraps each Anthropic
/// streaming event in `{"bytes": "<base64-or-literal inner JSON>"}`; this
/// decodes that one level, returning the inner event JSON text verbatim.
fn unwrap_event_payload(line: &str) -> Option<String> {
    let outer: Value = serde_json::from_str(line).ok()?;
    match outer.get("bytes") {
        Some(Value::String(encoded)) => {
            match base64::engine::general_purpose::STANDARD.decode(encoded) {
                Ok(decoded) => Some(String::from_utf8_lossy(&decoded).into_owned()),
                Err(_) => Some(encoded.clone()),
            }
        }
        _ => Some(line.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[test]
    fn invoke_body_carries_bedrock_anthropic_version_not_model() {
        let client = BedrockClient::new(SigningCredentials {
            access_key: "AKIDEXAMPLE".into(),
            secret_key: "secret".into(),
            session_token: None,
            region: "us-east-1".into(),
        });
        let request = MessageRequest::new(
            "anthropic.claude-sonnet-4-5-v1:0",
            vec![Message::user("hi")],
            100,
        );
        let body: Value =
            serde_json::from_slice(&client.invoke_body(&request, &RequestOptions::default())).unwrap();
        assert_eq!(body["anthropic_version"], "bedrock-2023-05-31");
        assert!(body.get("model").is_none());
    }

    #[test]
    fn unwrap_event_payload_decodes_base64_bytes_field() {
        let inner = r#"{"type":"message_stop"}"#;
        let encoded = base64::engine::general_purpose::STANDARD.encode(inner);
        let line = format!(r#"{{"bytes":"{encoded}"}}"#);
        let unwrapped = unwrap_event_payload(&line).unwrap();
        assert_eq!(unwrapped, inner);
    }

    #[test]
    fn unwrap_event_payload_passes_through_unwrapped_line() {
        let line = r#"{"type":"message_stop"}"#;
        assert_eq!(unwrap_event_payload(line).unwrap(), line);
    }
}
